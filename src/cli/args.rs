use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coloc-processor")]
#[command(about = "Colocate gridded model output with gridded or station observations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a colocation sweep for one model and one obs dataset
    Run {
        #[arg(short, long, help = "Setup file (TOML, YAML or JSON)")]
        config: Option<PathBuf>,

        #[arg(long, help = "Root directory of gridded CSV datasets")]
        model_dir: PathBuf,

        #[arg(long, help = "Root directory of obs datasets [default: --model-dir]")]
        obs_dir: Option<PathBuf>,

        #[arg(long)]
        model_id: Option<String>,

        #[arg(long)]
        obs_id: Option<String>,

        #[arg(long = "var", help = "Obs variable to colocate (repeatable)")]
        vars: Vec<String>,

        #[arg(long, help = "Output base directory [default: from setup]")]
        basedir: Option<PathBuf>,

        #[arg(long, help = "Recompute existing output files (true/false)")]
        reanalyse_existing: Option<bool>,

        #[arg(long, help = "Abort on the first failing job")]
        raise_exceptions: bool,

        #[arg(long)]
        max_workers: Option<usize>,
    },

    /// Display information about a colocated Parquet file
    Info {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,
    },
}
