use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::runtime::{DecodeContext, ModelRuntime};

/// Deterministic echo backend: every request gets its own prompt played
/// back one token per step, followed by EOS. Logits are one-hot, so greedy
/// selection reproduces the echo exactly. Always available; stands in for
/// a real model during development and in tests.
pub struct DummyRuntime {
    vocab_size: usize,
    eos_token_id: u32,
    pending: Mutex<HashMap<Uuid, VecDeque<u32>>>,
}

impl DummyRuntime {
    pub fn new(vocab_size: usize, eos_token_id: u32) -> Self {
        Self { vocab_size, eos_token_id, pending: Mutex::new(HashMap::new()) }
    }

    fn one_hot(&self, token: u32) -> Vec<f32> {
        let mut row = vec![0.0_f32; self.vocab_size];
        let index = token as usize;
        if index < self.vocab_size {
            row[index] = 1.0;
        } else {
            row[self.eos_token_id as usize] = 1.0;
        }
        row
    }
}

#[async_trait]
impl ModelRuntime for DummyRuntime {
    async fn decode(&self, batch: &[DecodeContext]) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(batch.len());
        let mut pending = self.pending.lock().expect("echo state poisoned");
        for context in batch {
            if context.is_prefill {
                pending.insert(context.request_id, context.unprocessed().iter().copied().collect());
            }
            let next = pending
                .get_mut(&context.request_id)
                .and_then(VecDeque::pop_front);
            let token = match next {
                Some(token) => token,
                None => {
                    pending.remove(&context.request_id);
                    self.eos_token_id
                }
            };
            rows.push(self.one_hot(token));
        }
        Ok(rows)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(id: Uuid, sequence: Vec<u32>, position: usize) -> DecodeContext {
        DecodeContext { request_id: id, is_prefill: position == 0, sequence, position }
    }

    fn argmax(row: &[f32]) -> u32 {
        row.iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i as u32)
            .unwrap()
    }

    #[tokio::test]
    async fn replays_prompt_then_eos() {
        let runtime = DummyRuntime::new(257, 256);
        let id = Uuid::new_v4();

        let rows = runtime.decode(&[context(id, vec![7, 8], 0)]).await.unwrap();
        assert_eq!(argmax(&rows[0]), 7);

        let rows = runtime.decode(&[context(id, vec![7, 8, 7], 2)]).await.unwrap();
        assert_eq!(argmax(&rows[0]), 8);

        let rows = runtime.decode(&[context(id, vec![7, 8, 7, 8], 3)]).await.unwrap();
        assert_eq!(argmax(&rows[0]), 256);
    }

    #[tokio::test]
    async fn batch_rows_follow_batch_order() {
        let runtime = DummyRuntime::new(257, 256);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let rows = runtime
            .decode(&[context(first, vec![1], 0), context(second, vec![2], 0)])
            .await
            .unwrap();
        assert_eq!(argmax(&rows[0]), 1);
        assert_eq!(argmax(&rows[1]), 2);
    }
}
