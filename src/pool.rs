use metrics::counter;
use uuid::Uuid;

use crate::engine::Engine;
use crate::engine::request::{GeneratorParams, Request, RequestStatus};
use crate::error::{Error, Result};
use crate::runtime::Model;
use crate::tokenizer::{Tokenizer as _, TokenizerStream};

/// One in-flight generation request as the client sees it: the prompt, its
/// encoded form, the engine-side handle, and the text streamed out so far.
pub struct ClientRequest {
    prompt: String,
    request: Request,
    stream: TokenizerStream,
    accumulated: String,
}

impl ClientRequest {
    fn new(prompt: String, model: &Model, params: GeneratorParams) -> Result<Self> {
        let input_ids = model.tokenizer().encode(&prompt)?;
        let request = Request::new(input_ids, params);
        let stream = model.create_tokenizer_stream();
        Ok(Self { prompt, request, stream, accumulated: String::new() })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn status(&self) -> RequestStatus {
        self.request.status()
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }
}

/// A finished request as reported by `drain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: Uuid,
    pub prompt: String,
    pub text: String,
}

/// Bounded set of concurrent generation requests against one engine. The
/// pool owns the engine; every submission and every step goes through this
/// single owner, so the engine is never advanced from two call sites.
pub struct RequestPool {
    model: Model,
    engine: Engine,
    capacity: usize,
    default_params: GeneratorParams,
    requests: Vec<ClientRequest>,
}

impl RequestPool {
    pub fn new(model: Model, capacity: usize, default_params: GeneratorParams) -> Self {
        let engine = model.create_engine();
        Self { model, engine, capacity, default_params, requests: Vec::new() }
    }

    /// Creates and submits `count` requests, prompts supplied per index.
    /// A batch that would push the pool past its capacity is rejected
    /// whole; nothing from it reaches the engine.
    pub fn fill(&mut self, count: usize, prompt: impl Fn(usize) -> String) -> Result<()> {
        if self.requests.len() + count > self.capacity {
            return Err(Error::PoolCapacityExceeded {
                capacity: self.capacity,
                requested: self.requests.len() + count,
            });
        }
        for i in 0..count {
            let client_request =
                ClientRequest::new(prompt(i), &self.model, self.default_params.clone())?;
            self.engine.add_request(&client_request.request)?;
            self.requests.push(client_request);
        }
        counter!("pool_requests_filled_total", count as u64);
        Ok(())
    }

    /// One non-blocking harvesting pass, in insertion order: pull every
    /// token not yet seen into each request's text buffer, then report and
    /// remove the requests the engine has finished. Removal happens after
    /// the scan so the collection is never mutated while iterated.
    pub fn drain(&mut self) -> Result<Vec<Completion>> {
        let mut finished: Vec<Uuid> = Vec::new();
        for client_request in &mut self.requests {
            while let Some(token) = client_request.request.next_unseen_token() {
                let piece = client_request.stream.decode(token)?;
                client_request.accumulated.push_str(&piece);
            }
            if client_request.request.is_done() {
                finished.push(client_request.request.id());
            }
        }

        if finished.is_empty() {
            return Ok(Vec::new());
        }

        let mut completions = Vec::with_capacity(finished.len());
        let mut kept = Vec::with_capacity(self.requests.len() - finished.len());
        for client_request in self.requests.drain(..) {
            if finished.contains(&client_request.request.id()) {
                self.engine.remove_request(&client_request.request);
                completions.push(Completion {
                    request_id: client_request.request.id(),
                    prompt: client_request.prompt,
                    text: client_request.accumulated,
                });
            } else {
                kept.push(client_request);
            }
        }
        self.requests = kept;
        counter!("pool_requests_drained_total", completions.len() as u64);
        Ok(completions)
    }

    /// Steps the engine until no work remains, draining between steps.
    /// Completions are returned in the order the engine finished them.
    pub async fn run_to_completion(&mut self) -> Result<Vec<Completion>> {
        let mut completions = Vec::new();
        while self.engine.has_pending_requests() {
            self.engine.step().await?;
            completions.extend(self.drain()?);
        }
        completions.extend(self.drain()?);
        Ok(completions)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn requests(&self) -> &[ClientRequest] {
        &self.requests
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
