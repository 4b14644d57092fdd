use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

pub mod dummy;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod sampler;

use crate::config::{ExecutionProvider, ModelConfig};
use crate::error::{Error, Result};
use crate::tokenizer::{ByteTokenizer, Tokenizer, TokenizerStream};

/// Decode input for one scheduled request. `sequence` is the full token
/// sequence so far; everything from `position` onwards has not been
/// consumed by the runtime yet (the whole prompt on the prefill step, the
/// single newest token afterwards).
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub request_id: Uuid,
    pub sequence: Vec<u32>,
    pub position: usize,
    pub is_prefill: bool,
}

impl DecodeContext {
    pub fn unprocessed(&self) -> &[u32] {
        &self.sequence[self.position..]
    }
}

/// Model execution backend. One call runs a single decode step for the
/// whole batch and returns next-token logits per request, in batch order.
/// Token selection happens engine-side.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn decode(&self, batch: &[DecodeContext]) -> Result<Vec<Vec<f32>>>;

    fn vocab_size(&self) -> usize;

    fn eos_token_id(&self) -> u32;
}

/// A loaded model: parsed config, execution backend, tokenizer.
#[derive(Clone)]
pub struct Model {
    config: ModelConfig,
    runtime: Arc<dyn ModelRuntime>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Model {
    /// Loads a model directory (must contain `genai_config.json`) for the
    /// given execution provider. Providers other than `cpu` require the
    /// `onnx` backend.
    pub fn load(model_path: &Path, provider: ExecutionProvider) -> Result<Self> {
        let mut config = ModelConfig::load(model_path)?;
        config.clear_providers();
        if provider != ExecutionProvider::Cpu {
            config.append_provider(provider);
        }

        #[cfg(not(feature = "onnx"))]
        {
            if provider != ExecutionProvider::Cpu {
                return Err(Error::UnsupportedProvider {
                    provider,
                    reason: "this build has no onnx backend; only cpu is available".into(),
                });
            }
            let tokenizer: Arc<dyn Tokenizer> = Arc::new(ByteTokenizer::new());
            let runtime: Arc<dyn ModelRuntime> = Arc::new(dummy::DummyRuntime::new(
                tokenizer.vocab_size(),
                tokenizer.eos_token_id(),
            ));
            tracing::info!(
                "loaded model {} ({}) with the echo backend",
                model_path.display(),
                config.model.model_type
            );
            Ok(Self { config, runtime, tokenizer })
        }

        #[cfg(feature = "onnx")]
        {
            if provider == ExecutionProvider::Webgpu {
                return Err(Error::UnsupportedProvider {
                    provider,
                    reason: "the onnx backend does not expose a webgpu provider".into(),
                });
            }
            let tokenizer = Self::tokenizer_for(model_path, &config)?;
            let runtime: Arc<dyn ModelRuntime> =
                Arc::new(onnx::OnnxRuntime::new(model_path, &config)?);
            tracing::info!(
                "loaded model {} ({}) with the onnx backend",
                model_path.display(),
                config.model.model_type
            );
            Ok(Self { config, runtime, tokenizer })
        }
    }

    #[cfg(feature = "onnx")]
    fn tokenizer_for(model_path: &Path, config: &ModelConfig) -> Result<Arc<dyn Tokenizer>> {
        #[cfg(feature = "onnx-tokenizer")]
        {
            return Ok(Arc::new(crate::tokenizer::hf::HfTokenizer::from_model_dir(
                model_path,
                config.model.eos_token_id,
            )?));
        }
        #[cfg(not(feature = "onnx-tokenizer"))]
        {
            let _ = (model_path, config);
            Ok(Arc::new(ByteTokenizer::new()))
        }
    }

    /// Assembles a model from already-built parts. Used by tests and by
    /// callers embedding their own backend.
    pub fn from_parts(
        config: ModelConfig,
        runtime: Arc<dyn ModelRuntime>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self { config, runtime, tokenizer }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn runtime(&self) -> Arc<dyn ModelRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn tokenizer(&self) -> Arc<dyn Tokenizer> {
        Arc::clone(&self.tokenizer)
    }

    pub fn create_tokenizer_stream(&self) -> TokenizerStream {
        TokenizerStream::new(self.tokenizer())
    }

    pub fn create_engine(&self) -> crate::engine::Engine {
        crate::engine::Engine::new(self.runtime())
    }
}

/// Echo model over the byte tokenizer, used across the crate's tests.
#[cfg(test)]
pub(crate) fn model_for_tests() -> Model {
    let raw = r#"{
        "model": { "type": "echo", "vocab_size": 257, "eos_token_id": 256 },
        "search": { "max_length": 256 }
    }"#;
    let config: ModelConfig = serde_json::from_str(raw).expect("test config parses");
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(ByteTokenizer::new());
    let runtime: Arc<dyn ModelRuntime> = Arc::new(dummy::DummyRuntime::new(
        tokenizer.vocab_size(),
        tokenizer.eos_token_id(),
    ));
    Model::from_parts(config, runtime, tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_non_cpu_without_backend() {
        #[cfg(not(feature = "onnx"))]
        {
            let dir = std::env::temp_dir().join(format!("model-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join(crate::config::CONFIG_FILE_NAME),
                r#"{ "model": { "type": "echo", "vocab_size": 257, "eos_token_id": 256 } }"#,
            )
            .unwrap();

            match Model::load(&dir, ExecutionProvider::Cuda) {
                Err(Error::UnsupportedProvider { provider, .. }) => {
                    assert_eq!(provider, ExecutionProvider::Cuda);
                }
                other => panic!("expected UnsupportedProvider, got {:?}", other.map(|_| ())),
            }

            let model = Model::load(&dir, ExecutionProvider::Cpu).unwrap();
            assert!(model.config().providers().is_empty());
            std::fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn load_reports_missing_config() {
        let dir = std::env::temp_dir().join(format!("model-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        match Model::load(&dir, ExecutionProvider::Cpu) {
            Err(Error::ModelLoad { .. }) => {}
            other => panic!("expected ModelLoad, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
