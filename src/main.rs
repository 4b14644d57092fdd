use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_generation::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llm_generation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Batch {
            model_path,
            execution_provider,
            num_requests,
            prompt,
            max_length,
            pool_capacity,
        } => {
            cli::batch(
                model_path,
                execution_provider,
                num_requests,
                prompt,
                max_length,
                pool_capacity,
            )
            .await?;
        }
        Commands::Run {
            model_path,
            execution_provider,
            prompt,
            non_interactive,
            image_paths,
            audio_paths,
            max_length,
        } => {
            cli::run(
                model_path,
                execution_provider,
                prompt,
                non_interactive,
                image_paths,
                audio_paths,
                max_length,
            )
            .await?;
        }
    }

    Ok(())
}
