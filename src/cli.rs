use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "larder", about = "Ingredient tracking and recipe suggestion pipeline")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available audio input devices.
    ListDevices,
    /// Run the pipeline: listen for voice commands and accept image frames.
    Run {
        /// Path to the settings JSON file.
        #[arg(long, default_value = "larder.json")]
        settings: PathBuf,
        /// Audio input device name (overrides settings).
        #[arg(long)]
        device: Option<String>,
        /// Voice command keyword (overrides settings).
        #[arg(long)]
        keyword: Option<String>,
        /// Image files to submit as camera frames at startup.
        #[arg(long)]
        image: Vec<PathBuf>,
    },
}
