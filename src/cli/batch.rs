use std::path::PathBuf;

use anyhow::Result;

use crate::config::ExecutionProvider;
use crate::engine::request::GeneratorParams;
use crate::pool::RequestPool;
use crate::runtime::Model;

/// Fill a pool with identical requests, then alternate engine steps with
/// drain passes, printing each conversation as it completes.
pub async fn batch(
    model_path: PathBuf,
    execution_provider: ExecutionProvider,
    num_requests: usize,
    prompt: String,
    max_length: usize,
    pool_capacity: usize,
) -> Result<()> {
    tracing::info!("loading model from {}", model_path.display());
    let model = Model::load(&model_path, execution_provider)?;

    let mut params = GeneratorParams::from_config(model.config());
    params.max_length = max_length;
    params.do_sample = false;

    let mut pool = RequestPool::new(model, pool_capacity, params);
    pool.fill(num_requests, |_| prompt.clone())?;
    tracing::info!("submitted {} request(s)", num_requests);

    while pool.engine().has_pending_requests() {
        pool.engine_mut().step().await?;
        for completion in pool.drain()? {
            println!("user: {}", completion.prompt);
            println!("assistant: {}", completion.text);
            println!();
        }
    }
    for completion in pool.drain()? {
        println!("user: {}", completion.prompt);
        println!("assistant: {}", completion.text);
        println!();
    }

    Ok(())
}
