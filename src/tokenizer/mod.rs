use std::sync::Arc;

#[cfg(feature = "onnx-tokenizer")]
pub mod hf;

use crate::error::{Error, Result};

/// Text <-> token-id conversion for a loaded model. Implementations must be
/// exact round-trips over the ids they produce; streamed decoding goes
/// through [`TokenizerStream`].
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;

    fn vocab_size(&self) -> usize;

    fn eos_token_id(&self) -> u32;
}

/// Incremental decoder for one request. Feeding tokens one at a time yields
/// text pieces; a piece is held back (returned empty) while the pending
/// tokens end in an incomplete UTF-8 sequence, and released once the
/// sequence completes. Nothing is lost or emitted twice.
pub struct TokenizerStream {
    tokenizer: Arc<dyn Tokenizer>,
    tokens: Vec<u32>,
    emitted: usize,
}

impl TokenizerStream {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer, tokens: Vec::new(), emitted: 0 }
    }

    pub fn decode(&mut self, token: u32) -> Result<String> {
        self.tokens.push(token);
        let text = self.tokenizer.decode(&self.tokens)?;
        if text.len() <= self.emitted {
            return Ok(String::new());
        }
        // A trailing replacement character marks an incomplete byte
        // sequence still waiting for its continuation tokens.
        if text.ends_with('\u{FFFD}') {
            return Ok(String::new());
        }
        let piece = text[self.emitted..].to_string();
        self.emitted = text.len();
        Ok(piece)
    }
}

/// Byte-level tokenizer: every UTF-8 byte is its own token id (0..=255),
/// with a single EOS id one past the byte range. Always available, exact
/// round-trip, no external vocabulary.
pub struct ByteTokenizer;

const BYTE_VOCAB: u32 = 256;

impl ByteTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ByteTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut bytes = Vec::with_capacity(tokens.len());
        for &token in tokens {
            if token < BYTE_VOCAB {
                bytes.push(token as u8);
            } else if token == BYTE_VOCAB {
                // EOS carries no text.
            } else {
                return Err(Error::Tokenizer(format!("token id {} out of range", token)));
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn vocab_size(&self) -> usize {
        (BYTE_VOCAB + 1) as usize
    }

    fn eos_token_id(&self) -> u32 {
        BYTE_VOCAB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip_ascii_and_multibyte() {
        let tokenizer = ByteTokenizer::new();
        for text in ["hello", "héllo wörld", "日本語 ✓"] {
            let ids = tokenizer.encode(text).unwrap();
            assert_eq!(tokenizer.decode(&ids).unwrap(), text);
        }
    }

    #[test]
    fn decode_skips_eos_and_rejects_out_of_range() {
        let tokenizer = ByteTokenizer::new();
        let mut ids = tokenizer.encode("ok").unwrap();
        ids.push(tokenizer.eos_token_id());
        assert_eq!(tokenizer.decode(&ids).unwrap(), "ok");
        assert!(tokenizer.decode(&[999]).is_err());
    }

    #[test]
    fn stream_holds_partial_utf8_until_complete() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(ByteTokenizer::new());
        let ids = tokenizer.encode("é").unwrap();
        assert_eq!(ids.len(), 2);

        let mut stream = TokenizerStream::new(tokenizer);
        assert_eq!(stream.decode(ids[0]).unwrap(), "");
        assert_eq!(stream.decode(ids[1]).unwrap(), "é");
    }

    #[test]
    fn stream_emits_every_piece_exactly_once() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(ByteTokenizer::new());
        let text = "a✓b";
        let ids = tokenizer.encode(text).unwrap();

        let mut stream = TokenizerStream::new(tokenizer.clone());
        let mut accumulated = String::new();
        for id in ids {
            accumulated.push_str(&stream.decode(id).unwrap());
        }
        assert_eq!(accumulated, text);

        // EOS contributes nothing.
        assert_eq!(stream.decode(tokenizer.eos_token_id()).unwrap(), "");
    }
}
