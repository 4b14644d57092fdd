pub mod generator;
pub mod request;
pub mod scheduler;

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::engine::request::Request;
use crate::engine::scheduler::Scheduler;
use crate::error::{Error, Result};
use crate::runtime::{ModelRuntime, sampler};

pub use generator::Generator;
pub use request::{GeneratorParams, RequestStatus};

/// Stepped decoding engine. One `step` schedules the current batch, runs a
/// single decode pass through the model runtime, and appends one token to
/// every in-flight request. The engine is not re-entrant: stepping goes
/// through `&mut self` and must never happen from two call sites.
pub struct Engine {
    scheduler: Scheduler,
    runtime: Arc<dyn ModelRuntime>,
    rng: StdRng,
}

impl Engine {
    pub fn new(runtime: Arc<dyn ModelRuntime>) -> Self {
        Self { scheduler: Scheduler::new(), runtime, rng: StdRng::from_entropy() }
    }

    /// Same engine with a fixed sampling seed, for reproducible runs.
    pub fn with_seed(runtime: Arc<dyn ModelRuntime>, seed: u64) -> Self {
        Self { scheduler: Scheduler::new(), runtime, rng: StdRng::seed_from_u64(seed) }
    }

    /// Submits a request. The request's status machine guarantees it can be
    /// added to an engine exactly once.
    pub fn add_request(&mut self, request: &Request) -> Result<()> {
        request.assign()?;
        self.scheduler.add_request(request.clone());
        counter!("requests_submitted_total", 1);
        Ok(())
    }

    pub fn remove_request(&mut self, request: &Request) {
        self.scheduler.remove_request(request.id());
    }

    /// Runs one decode step over every schedulable request.
    pub async fn step(&mut self) -> Result<()> {
        let batch = self.scheduler.schedule()?;
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!("stepping batch of {} request(s)", batch.len());
        let start = Instant::now();

        let contexts: Vec<_> = batch.iter().map(Request::decode_context).collect();
        let logits = self.runtime.decode(&contexts).await?;
        if logits.len() != batch.len() {
            return Err(Error::EngineStep {
                request_id: None,
                reason: format!(
                    "runtime returned {} logit rows for a batch of {}",
                    logits.len(),
                    batch.len()
                ),
            });
        }

        let eos_token_id = self.runtime.eos_token_id();
        for (request, row) in batch.iter().zip(logits) {
            let params = request.params();
            let token = sampler::select_next_token(&row, &params, &mut self.rng)
                .map_err(|e| Error::EngineStep {
                    request_id: Some(request.id()),
                    reason: e.to_string(),
                })?;
            request.complete_step(token, eos_token_id);
            counter!("tokens_generated_total", 1);
            if request.is_done() {
                counter!("requests_completed_total", 1);
            }
        }

        histogram!("engine_step_latency_ms", start.elapsed().as_millis() as f64);
        Ok(())
    }

    pub fn has_pending_requests(&self) -> bool {
        self.scheduler.has_pending_requests()
    }

    /// Requests currently tracked, completed ones included until removal.
    pub fn request_count(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dummy::DummyRuntime;
    use crate::tokenizer::{ByteTokenizer, Tokenizer};

    fn echo_engine() -> Engine {
        let tokenizer = ByteTokenizer::new();
        Engine::new(Arc::new(DummyRuntime::new(
            tokenizer.vocab_size(),
            tokenizer.eos_token_id(),
        )))
    }

    #[tokio::test]
    async fn step_without_requests_is_a_no_op() {
        let mut engine = echo_engine();
        engine.step().await.unwrap();
        assert!(!engine.has_pending_requests());
    }

    #[tokio::test]
    async fn echoes_prompt_then_stops() {
        let mut engine = echo_engine();
        let request = Request::new(vec![104, 105], GeneratorParams::default());
        engine.add_request(&request).unwrap();

        while engine.has_pending_requests() {
            engine.step().await.unwrap();
        }
        assert!(request.is_done());
        // prompt echoed back, then EOS
        assert_eq!(request.generated_tokens(), vec![104, 105, 256]);
    }

    #[tokio::test]
    async fn resubmission_is_rejected() {
        let mut engine = echo_engine();
        let request = Request::new(vec![1], GeneratorParams::default());
        engine.add_request(&request).unwrap();
        assert!(matches!(engine.add_request(&request), Err(Error::RequestState(_))));
    }
}
