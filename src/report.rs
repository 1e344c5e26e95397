//! Reporting (component 16): a pure projection of `ScanReport` into text or
//! JSON. Never recomputes or reinterprets a score.

use crate::classifier::CloneType;
use crate::pipeline::ScanReport;
use console::style;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown output format '{other}', expected 'text' or 'json'")),
        }
    }
}

pub fn render(report: &ScanReport, format: Format) -> String {
    match format {
        Format::Text => render_text(report),
        Format::Json => serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")),
    }
}

fn clone_type_label(t: CloneType) -> &'static str {
    t.label()
}

fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} files in {:.3}s",
        style("Scanned").green().bold(),
        report.files_scanned,
        report.elapsed.as_secs_f64()
    );

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n{} ({})", style("Errors").red().bold(), report.errors.len());
        for (path, message) in &report.errors {
            let _ = writeln!(out, "  {}: {}", path.display(), message);
        }
    }

    if !report.dead_code.is_empty() {
        let _ = writeln!(out, "\n{} ({})", style("Dead code findings").yellow().bold(), report.dead_code.len());
        for finding in &report.dead_code {
            let _ = writeln!(
                out,
                "  {}:{}-{}  {} [{:?}] ({:?})",
                finding.file.display(),
                finding.start_line,
                finding.end_line,
                finding.function,
                finding.reason,
                finding.severity
            );
        }
    }

    if !report.clone_pairs.is_empty() {
        let _ = writeln!(out, "\n{} ({})", style("Clone pairs").cyan().bold(), report.clone_pairs.len());
        for pair in &report.clone_pairs {
            let _ = writeln!(
                out,
                "  [{}] {} ~ {}  sim={:.3} conf={:.2} ({})",
                clone_type_label(pair.clone_type),
                pair.a.name,
                pair.b.name,
                pair.similarity,
                pair.confidence,
                pair.analyzer
            );
        }
    }

    if !report.clone_groups.is_empty() {
        let _ = writeln!(out, "\n{} ({})", style("Clone groups").magenta().bold(), report.clone_groups.len());
        for group in &report.clone_groups {
            let _ = writeln!(
                out,
                "  group #{} [{}] avg_sim={:.3} members={}",
                group.id,
                clone_type_label(group.clone_type),
                group.average_similarity,
                group.members.len()
            );
            for member in &group.members {
                let _ = writeln!(out, "    - {} ({})", member.name, member.file.display());
            }
        }
    }

    let high_complexity: Vec<_> = report.function_metrics.iter().filter(|m| m.cyclomatic_complexity > 10).collect();
    if !high_complexity.is_empty() {
        let _ = writeln!(
            out,
            "\n{} ({})",
            style("High-complexity functions").yellow().bold(),
            high_complexity.len()
        );
        for m in high_complexity {
            let _ = writeln!(out, "  {} (CC={}, depth={})", m.name, m.cyclomatic_complexity, m.nesting_depth);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn empty_report() -> ScanReport {
        ScanReport {
            files_scanned: 3,
            errors: Vec::new(),
            dead_code: Vec::new(),
            function_metrics: Vec::new(),
            class_metrics: Vec::new(),
            clone_pairs: Vec::new(),
            clone_groups: Vec::new(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn text_render_includes_file_count() {
        let report = empty_report();
        let text = render(&report, Format::Text);
        assert!(text.contains('3'));
    }

    #[test]
    fn json_render_round_trips_as_valid_json() {
        let report = empty_report();
        let json = render(&report, Format::Json);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["files_scanned"], 3);
    }

    #[test]
    fn format_from_str_rejects_unknown_values() {
        assert!("xml".parse::<Format>().is_err());
        assert_eq!("text".parse::<Format>().unwrap(), Format::Text);
        let _ = PathBuf::from("unused");
    }
}
