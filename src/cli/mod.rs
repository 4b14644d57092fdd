//! CLI commands: batched generation against a shared engine and the
//! interactive single-request loop.

mod batch;
mod run;

pub use batch::batch;
pub use run::run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ExecutionProvider;

#[derive(Parser)]
#[command(name = "llm-generation")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a batch of requests and stream their completions
    Batch {
        /// Model folder path (must contain genai_config.json)
        #[arg(short = 'm', long)]
        model_path: PathBuf,

        /// Execution provider to run the model with
        #[arg(short = 'e', long, value_enum)]
        execution_provider: ExecutionProvider,

        /// Number of requests to submit
        #[arg(long, default_value = "1")]
        num_requests: usize,

        /// Prompt used for every request
        #[arg(long, default_value = "What is 2 + 3?")]
        prompt: String,

        /// Maximum total sequence length per request
        #[arg(long, default_value = "256")]
        max_length: usize,

        /// Upper bound on in-flight requests
        #[arg(long, default_value = "16")]
        pool_capacity: usize,
    },

    /// Interactive generation with streamed output
    Run {
        /// Model folder path (must contain genai_config.json)
        #[arg(short = 'm', long)]
        model_path: PathBuf,

        /// Execution provider to run the model with
        #[arg(short = 'e', long, value_enum)]
        execution_provider: ExecutionProvider,

        /// Prompt to generate from, mainly for CI usage
        #[arg(short = 'p', long)]
        prompt: Option<String>,

        /// Run a single round and exit instead of prompting
        #[arg(long)]
        non_interactive: bool,

        /// Image paths, mainly for CI usage
        #[arg(long, num_args = 0..)]
        image_paths: Vec<PathBuf>,

        /// Audio paths, mainly for CI usage
        #[arg(long, num_args = 0..)]
        audio_paths: Vec<PathBuf>,

        /// Maximum total sequence length
        #[arg(long, default_value = "7680")]
        max_length: usize,
    },
}
