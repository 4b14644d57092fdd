use std::path::Path;

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

/// HuggingFace `tokenizer.json` backend for models that ship a real
/// vocabulary next to their weights.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    eos_token_id: u32,
}

impl HfTokenizer {
    pub fn from_model_dir(model_path: &Path, eos_token_id: u32) -> Result<Self> {
        let tokenizer_path = model_path.join("tokenizer.json");
        let inner = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Tokenizer(format!("cannot load {}: {}", tokenizer_path.display(), e)))?;
        Ok(Self { inner, eos_token_id })
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(format!("encode failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, true)
            .map_err(|e| Error::Tokenizer(format!("decode failed: {}", e)))
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}
