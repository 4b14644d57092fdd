use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;

use crate::config::ExecutionProvider;
use crate::engine::request::GeneratorParams;
use crate::runtime::Model;
use crate::session::InteractiveSession;

const DEFAULT_PROMPT: &str =
    "Does the audio summarize what is shown in the image? If not, what is different?";

/// Interactive generation loop: one round per prompt, streamed to stdout.
/// With `--non-interactive` exactly one round runs, then the command exits.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    model_path: PathBuf,
    execution_provider: ExecutionProvider,
    prompt: Option<String>,
    non_interactive: bool,
    image_paths: Vec<PathBuf>,
    audio_paths: Vec<PathBuf>,
    max_length: usize,
) -> Result<()> {
    if !image_paths.is_empty() || !audio_paths.is_empty() {
        tracing::warn!(
            "ignoring {} image path(s) and {} audio path(s): this model takes text prompts only",
            image_paths.len(),
            audio_paths.len()
        );
    }

    println!("Loading model...");
    let model = Model::load(&model_path, execution_provider)?;
    println!("Model loaded");

    let mut params = GeneratorParams::from_config(model.config());
    params.max_length = max_length;
    let session = InteractiveSession::new(model, params);

    let interactive = !non_interactive;
    let mut out = io::stdout();

    loop {
        let text = if interactive {
            print!("Prompt: ");
            out.flush()?;
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            line
        } else {
            prompt.clone().unwrap_or_else(|| DEFAULT_PROMPT.to_string())
        };

        session.run_round(&text, &mut out).await?;
        for _ in 0..3 {
            println!();
        }

        if !interactive {
            break;
        }
    }

    Ok(())
}
