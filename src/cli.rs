use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cloneforge")]
#[command(about = "Structural static analyzer: dead-code detection and clone classification")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory tree for dead code and duplicated fragments
    Scan {
        /// Path to scan (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Load configuration from this file instead of the user config directory
        #[arg(long)]
        config: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,

        /// Override the Type-1 (textual) clone threshold
        #[arg(long)]
        threshold_t1: Option<f64>,

        /// Override the Type-2 (syntactic) clone threshold
        #[arg(long)]
        threshold_t2: Option<f64>,

        /// Override the Type-3 (structural) clone threshold
        #[arg(long)]
        threshold_t3: Option<f64>,

        /// Override the Type-4 (semantic) clone threshold
        #[arg(long)]
        threshold_t4: Option<f64>,

        /// Disable the textual (Type-1) analyzer
        #[arg(long)]
        no_textual: bool,

        /// Disable the semantic (Type-4) analyzer
        #[arg(long)]
        no_semantic: bool,

        /// Disable DFA-feature blending in the semantic analyzer
        #[arg(long)]
        no_dfa: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
