use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use uuid::Uuid;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::runtime::DecodeContext;

/// Search options for one generation request. `max_length` bounds the total
/// sequence length, prompt tokens included.
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub max_length: usize,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
}

impl GeneratorParams {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_length: config.search.max_length,
            do_sample: config.search.do_sample,
            temperature: config.search.temperature,
            top_p: config.search.top_p,
        }
    }
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self { max_length: 256, do_sample: false, temperature: 1.0, top_p: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Created but not yet added to an engine.
    Unassigned,
    /// Added to an engine, waiting to be scheduled.
    Assigned,
    /// Scheduled and being decoded step by step.
    InProgress,
    /// Finished; no further tokens will be produced.
    Completed,
}

struct RequestInner {
    status: RequestStatus,
    params: GeneratorParams,
    /// Prompt followed by generated tokens.
    sequence: Vec<u32>,
    prompt_len: usize,
    /// Client-side cursor: tokens before this index have been surfaced
    /// through `next_unseen_token`.
    seen_len: usize,
    /// Runtime-side cursor: tokens before this index have been consumed by
    /// a decode step.
    processed_len: usize,
    assigned_at: Option<Instant>,
}

/// One generation request, shared between the submitting client and the
/// engine. Cloning clones the handle, not the request; the status machine
/// enforces single submission.
#[derive(Clone)]
pub struct Request {
    id: Uuid,
    inner: Arc<Mutex<RequestInner>>,
}

impl Request {
    pub fn new(input_ids: Vec<u32>, params: GeneratorParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(Mutex::new(RequestInner {
                status: RequestStatus::Unassigned,
                params,
                sequence: input_ids,
                prompt_len: 0,
                seen_len: 0,
                processed_len: 0,
                assigned_at: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestInner> {
        self.inner.lock().expect("request state poisoned")
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> RequestStatus {
        self.lock().status
    }

    pub fn params(&self) -> GeneratorParams {
        self.lock().params.clone()
    }

    /// Appends prompt tokens. Only legal before the request is assigned.
    pub fn add_tokens(&self, tokens: &[u32]) -> Result<()> {
        let mut inner = self.lock();
        if inner.status != RequestStatus::Unassigned {
            return Err(Error::RequestState(
                "cannot add tokens to a request that has been submitted".into(),
            ));
        }
        inner.sequence.extend_from_slice(tokens);
        Ok(())
    }

    /// Marks the request as owned by an engine. A request may be submitted
    /// exactly once.
    pub(crate) fn assign(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.status != RequestStatus::Unassigned {
            return Err(Error::RequestState(
                "request has already been added to an engine".into(),
            ));
        }
        inner.prompt_len = inner.sequence.len();
        inner.seen_len = inner.sequence.len();
        inner.assigned_at = Some(Instant::now());
        inner.status = RequestStatus::Assigned;
        Ok(())
    }

    /// Assigned -> InProgress. Rejects requests with no tokens to decode.
    pub(crate) fn schedule(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.status != RequestStatus::Assigned {
            return Err(Error::RequestState(
                "only an assigned request can be scheduled".into(),
            ));
        }
        if inner.sequence.is_empty() {
            return Err(Error::RequestState("cannot schedule a request with no tokens".into()));
        }
        inner.status = RequestStatus::InProgress;
        Ok(())
    }

    pub(crate) fn assigned_at(&self) -> Option<Instant> {
        self.lock().assigned_at
    }

    pub(crate) fn decode_context(&self) -> DecodeContext {
        let inner = self.lock();
        DecodeContext {
            request_id: self.id,
            sequence: inner.sequence.clone(),
            position: inner.processed_len,
            is_prefill: inner.processed_len == 0,
        }
    }

    /// Records the outcome of one decode step: the pending span is now
    /// processed, the selected token is appended, and the request completes
    /// on EOS or when the sequence reaches `max_length`.
    pub(crate) fn complete_step(&self, token: u32, eos_token_id: u32) {
        let mut inner = self.lock();
        inner.processed_len = inner.sequence.len();
        inner.sequence.push(token);
        if token == eos_token_id || inner.sequence.len() >= inner.params.max_length {
            inner.status = RequestStatus::Completed;
        }
    }

    pub fn has_unseen_tokens(&self) -> bool {
        let inner = self.lock();
        inner.seen_len < inner.sequence.len()
    }

    /// Pulls the next generated token the client has not observed yet,
    /// advancing the cursor.
    pub fn next_unseen_token(&self) -> Option<u32> {
        let mut inner = self.lock();
        if inner.seen_len < inner.sequence.len() {
            let token = inner.sequence[inner.seen_len];
            inner.seen_len += 1;
            Some(token)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.lock().status == RequestStatus::Completed
    }

    pub fn is_prefill(&self) -> bool {
        self.lock().processed_len == 0
    }

    pub fn current_sequence_length(&self) -> usize {
        self.lock().sequence.len()
    }

    pub fn generated_token_count(&self) -> usize {
        let inner = self.lock();
        inner.sequence.len() - inner.prompt_len
    }

    /// Generated portion of the sequence, for whole-output decoding.
    pub fn generated_tokens(&self) -> Vec<u32> {
        let inner = self.lock();
        inner.sequence[inner.prompt_len..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(tokens: &[u32]) -> Request {
        Request::new(tokens.to_vec(), GeneratorParams::default())
    }

    #[test]
    fn assign_is_single_shot() {
        let request = request_with(&[1, 2, 3]);
        request.assign().unwrap();
        assert_eq!(request.status(), RequestStatus::Assigned);
        assert!(matches!(request.assign(), Err(Error::RequestState(_))));
    }

    #[test]
    fn schedule_requires_assignment_and_tokens() {
        let unassigned = request_with(&[1]);
        assert!(matches!(unassigned.schedule(), Err(Error::RequestState(_))));

        let empty = request_with(&[]);
        empty.assign().unwrap();
        assert!(matches!(empty.schedule(), Err(Error::RequestState(_))));
    }

    #[test]
    fn add_tokens_only_before_submission() {
        let request = request_with(&[1]);
        request.add_tokens(&[2, 3]).unwrap();
        request.assign().unwrap();
        assert!(request.add_tokens(&[4]).is_err());
        assert_eq!(request.current_sequence_length(), 3);
    }

    #[test]
    fn unseen_cursor_starts_after_prompt() {
        let request = request_with(&[10, 11]);
        request.assign().unwrap();
        request.schedule().unwrap();
        assert!(!request.has_unseen_tokens());

        request.complete_step(42, 999);
        assert!(request.has_unseen_tokens());
        assert_eq!(request.next_unseen_token(), Some(42));
        assert_eq!(request.next_unseen_token(), None);
    }

    #[test]
    fn completes_on_eos_or_max_length() {
        let by_eos = request_with(&[1]);
        by_eos.assign().unwrap();
        by_eos.schedule().unwrap();
        by_eos.complete_step(7, 7);
        assert!(by_eos.is_done());

        let mut params = GeneratorParams::default();
        params.max_length = 3;
        let by_length = Request::new(vec![1, 2], params);
        by_length.assign().unwrap();
        by_length.schedule().unwrap();
        by_length.complete_step(5, 999);
        assert!(by_length.is_done());
        assert_eq!(by_length.generated_token_count(), 1);
    }
}
