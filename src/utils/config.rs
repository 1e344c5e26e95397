use crate::errors::{AnalyzerError, AnalyzerResult};
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-cloneforge.conf");

/// The four clone-type thresholds plus the two risk thresholds used by the
/// metric analyzers. `T1 >= T2 >= T3 >= T4` is expected but not enforced here;
/// an inverted ladder simply never classifies past Type-1.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
    pub low_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            t1: 0.95,
            t2: 0.80,
            t3: 0.65,
            t4: 0.50,
            low_threshold: 0.30,
            medium_threshold: 0.60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Toggles {
    pub enable_textual_analysis: bool,
    pub enable_semantic_analysis: bool,
    pub enable_dfa_analysis: bool,
    pub enable_multidimensional_analysis: bool,
    pub ignore_literals: bool,
    pub ignore_identifiers: bool,
    pub reduce_boilerplate_weight: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            enable_textual_analysis: true,
            enable_semantic_analysis: true,
            enable_dfa_analysis: true,
            enable_multidimensional_analysis: true,
            ignore_literals: false,
            ignore_identifiers: false,
            reduce_boilerplate_weight: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct NumericKnobs {
    pub boilerplate_multiplier: f64,
    pub min_lines: usize,
    pub min_nodes: usize,
    pub max_edit_distance: Option<f64>,
    pub max_subtree_height: usize,
    pub k_gram_size: usize,
    pub lsh_bands: usize,
    pub lsh_rows: usize,
    pub lsh_min_hash_count: usize,
    pub lsh_similarity_threshold: f64,
}

impl Default for NumericKnobs {
    fn default() -> Self {
        Self {
            boilerplate_multiplier: 0.1,
            min_lines: 5,
            min_nodes: 15,
            max_edit_distance: None,
            max_subtree_height: 3,
            k_gram_size: 4,
            lsh_bands: 32,
            lsh_rows: 4,
            lsh_min_hash_count: 128,
            lsh_similarity_threshold: 0.5,
        }
    }
}

/// Optional custom edit-operation weights; when left at `None` the cost
/// model's own defaults (uniform or language-aware) apply.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct CustomCosts {
    pub insert: Option<f64>,
    pub delete: Option<f64>,
    pub rename: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub include_builtins: bool,
    pub include_imports: bool,
    pub include_third_party: bool,
    pub public_classes_only: bool,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WalkerConfig {
    /// File extensions to exclude from scanning.
    pub excluded_extensions: Vec<String>,
    /// Directories to exclude from scanning.
    pub excluded_directories: Vec<String>,
    pub read_vcsignore: bool,
    pub follow_symlinks: bool,
    pub scan_hidden_files: bool,
    pub max_file_size_mb: Option<u64>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            excluded_extensions: Vec::new(),
            excluded_directories: vec![
                "__pycache__",
                ".git",
                ".venv",
                "venv",
                "node_modules",
                "build",
                "dist",
                ".tox",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            read_vcsignore: true,
            follow_symlinks: false,
            scan_hidden_files: false,
            max_file_size_mb: Some(8),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    pub worker_threads: Option<usize>,
    pub batch_size: usize,
    pub channel_multiplier: usize,
    pub rayon_thread_stack_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            batch_size: 64,
            channel_multiplier: 4,
            rayon_thread_stack_size: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub quiet: bool,
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub walker: WalkerConfig,
    pub thresholds: Thresholds,
    pub toggles: Toggles,
    pub knobs: NumericKnobs,
    pub costs: CustomCosts,
    pub filters: FilterConfig,
    pub performance: PerformanceConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> AnalyzerResult<Self> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("cloneforge.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("cloneforge.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: Config = toml::from_str(&user_config_content)?;

            config = merge_configs(config, user_config);

            println!(
                "{}: loaded user config from {}\n",
                style("note").green().bold(),
                style(user_config_path.display()).underlined().white().bold()
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path (the CLI's `--config`
    /// override), merged over the built-in defaults the same way a user
    /// config found in the app config directory would be.
    pub fn load_from_file(path: &Path) -> AnalyzerResult<Self> {
        let content = fs::read_to_string(path)?;
        let user_config: Config = toml::from_str(&content)?;
        let config = merge_configs(Config::default(), user_config);
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that §7 classifies as configuration-invalid rather
    /// than tolerated at runtime: an LSH band/row product that exceeds the
    /// signature length can never retrieve a candidate.
    pub fn validate(&self) -> AnalyzerResult<()> {
        let t = &self.thresholds;
        if !(t.t1 >= t.t2 && t.t2 >= t.t3 && t.t3 >= t.t4) {
            return Err(AnalyzerError::Config(format!(
                "clone thresholds must satisfy T1 >= T2 >= T3 >= T4, got T1={} T2={} T3={} T4={}",
                t.t1, t.t2, t.t3, t.t4
            )));
        }

        let bands = self.knobs.lsh_bands;
        let rows = self.knobs.lsh_rows;
        let sig_len = self.knobs.lsh_min_hash_count;
        if bands == 0 || rows == 0 {
            return Err(AnalyzerError::Config(
                "LSHBands and LSHRows must both be non-zero".into(),
            ));
        }
        if bands.saturating_mul(rows) > sig_len {
            return Err(AnalyzerError::Config(format!(
                "LSHBands ({bands}) * LSHRows ({rows}) = {} exceeds LSHMinHashCount ({sig_len})",
                bands * rows
            )));
        }
        Ok(())
    }
}

fn create_example_config(config_dir: &Path) -> AnalyzerResult<()> {
    let example_path = config_dir.join("cloneforge.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config, overriding anything the user
/// supplied and preserving exclusion-list defaults otherwise.
fn merge_configs(mut default: Config, user: Config) -> Config {
    default.thresholds = user.thresholds;
    default.toggles = user.toggles;
    default.knobs = user.knobs;
    default.costs = user.costs;
    default.filters = user.filters;

    default.walker.read_vcsignore = user.walker.read_vcsignore;
    default.walker.follow_symlinks = user.walker.follow_symlinks;
    default.walker.scan_hidden_files = user.walker.scan_hidden_files;
    default.walker.max_file_size_mb = user.walker.max_file_size_mb;
    default
        .walker
        .excluded_extensions
        .extend(user.walker.excluded_extensions);
    default
        .walker
        .excluded_directories
        .extend(user.walker.excluded_directories);
    default.walker.excluded_extensions.sort_unstable();
    default.walker.excluded_extensions.dedup();
    default.walker.excluded_directories.sort_unstable();
    default.walker.excluded_directories.dedup();

    default.performance = user.performance;
    default.output = user.output;
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_configs_dedupes_and_keeps_order() {
        let mut default_cfg = Config::default();
        default_cfg.walker.excluded_directories = vec!["build".into(), "dist".into()];

        let mut user_cfg = Config::default();
        user_cfg.walker.excluded_directories = vec!["build".into(), "venv".into()];

        let merged = merge_configs(default_cfg, user_cfg);
        assert_eq!(
            merged.walker.excluded_directories,
            vec!["build", "dist", "venv"]
        );
    }

    #[test]
    fn load_creates_example_and_reads_user_overrides() {
        let cfg_dir = tempfile::tempdir().unwrap();
        let cfg_path = cfg_dir.path();

        let user_toml = r#"
            [thresholds]
            t1 = 0.99

            [output]
            quiet = true
        "#;
        fs::write(cfg_path.join("cloneforge.local"), user_toml).unwrap();

        let cfg = Config::load(cfg_path).expect("Config::load should succeed");

        assert!(cfg_path.join("cloneforge.conf").is_file());
        assert_eq!(cfg.thresholds.t1, 0.99);
        assert!(cfg.output.quiet);
    }

    #[test]
    fn validate_rejects_oversized_band_row_product() {
        let mut cfg = Config::default();
        cfg.knobs.lsh_bands = 64;
        cfg.knobs.lsh_rows = 8;
        cfg.knobs.lsh_min_hash_count = 128;
        assert!(cfg.validate().is_err());
    }
}
