mod adapter;
mod apted;
mod cfg;
mod classifier;
mod cli;
mod dfa;
mod errors;
mod features;
mod fragment;
mod grouping;
mod lsh;
mod metrics;
mod minhash;
mod pipeline;
mod reachability;
mod report;
mod similarity;
mod tree;
mod utils;
mod walk;

use crate::errors::AnalyzerResult;
use crate::report::Format;
use crate::utils::Config;
use clap::Parser;
use cli::{Cli, Commands, OutputFormat};
use console::style;
use directories::ProjectDirs;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::from_default_env();
    if json {
        Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_timer(time::UtcTime::rfc_3339()))
            .init();
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt::layer().pretty().with_thread_ids(true).with_timer(time::UtcTime::rfc_3339()))
            .init();
    }
}

fn load_config(config_override: Option<&str>) -> AnalyzerResult<Config> {
    if let Some(path) = config_override {
        return Config::load_from_file(Path::new(path));
    }

    let proj_dirs = ProjectDirs::from("dev", "cloneforge", "cloneforge")
        .ok_or("unable to determine project directories")?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;
    Config::load(config_dir)
}

fn apply_overrides(
    config: &mut Config,
    t1: Option<f64>,
    t2: Option<f64>,
    t3: Option<f64>,
    t4: Option<f64>,
    no_textual: bool,
    no_semantic: bool,
    no_dfa: bool,
) {
    if let Some(v) = t1 {
        config.thresholds.t1 = v;
    }
    if let Some(v) = t2 {
        config.thresholds.t2 = v;
    }
    if let Some(v) = t3 {
        config.thresholds.t3 = v;
    }
    if let Some(v) = t4 {
        config.thresholds.t4 = v;
    }
    if no_textual {
        config.toggles.enable_textual_analysis = false;
    }
    if no_semantic {
        config.toggles.enable_semantic_analysis = false;
    }
    if no_dfa {
        config.toggles.enable_dfa_analysis = false;
    }
}

fn main() -> AnalyzerResult<()> {
    let now = Instant::now();
    let cli = Cli::parse();

    let Commands::Scan {
        path,
        config,
        output,
        threshold_t1,
        threshold_t2,
        threshold_t3,
        threshold_t4,
        no_textual,
        no_semantic,
        no_dfa,
    } = cli.command;

    init_tracing(matches!(output, OutputFormat::Json));
    tracing::debug!("cloneforge starting up");

    let mut app_config = load_config(config.as_deref())?;
    apply_overrides(
        &mut app_config,
        threshold_t1,
        threshold_t2,
        threshold_t3,
        threshold_t4,
        no_textual,
        no_semantic,
        no_dfa,
    );
    app_config.validate()?;

    rayon::ThreadPoolBuilder::new()
        .stack_size(app_config.performance.rayon_thread_stack_size)
        .build_global()
        .expect("set rayon stack size");

    let scan_path = Path::new(&path).canonicalize()?;
    let report = pipeline::run(&scan_path, &app_config)?;

    let format = match output {
        OutputFormat::Text => Format::Text,
        OutputFormat::Json => Format::Json,
    };
    println!("{}", report::render(&report, format));

    let has_errors = !report.errors.is_empty();
    let has_findings = !report.dead_code.is_empty() || !report.clone_pairs.is_empty();
    if has_errors && !has_findings {
        eprintln!("{} in {:.3}s.", style("Failed").red().bold(), now.elapsed().as_secs_f32());
        std::process::exit(1);
    }

    eprintln!("{} in {:.3}s.", style("Finished").green().bold(), now.elapsed().as_secs_f32());
    Ok(())
}
