pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stratus")]
#[command(about = "Multi-tenant cloud storage with streaming uploads")]
pub struct Args {
    /// Path to the stratus config directory (defaults to ~/.stratus)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
