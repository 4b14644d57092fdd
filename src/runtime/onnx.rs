use std::path::Path;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;

use crate::config::{ExecutionProvider, ModelConfig};
use crate::error::{Error, Result};
use crate::runtime::{DecodeContext, ModelRuntime};

const MODEL_FILE_NAME: &str = "model.onnx";

/// ONNX Runtime decoder backend. Expects the common decoder export layout:
/// `input_ids` of shape [batch, seq] in, `logits` of shape
/// [batch, seq, vocab] out. KV-cache inputs are not bound, so every step
/// re-runs the full sequence.
pub struct OnnxRuntime {
    session: Session,
    vocab_size: usize,
    eos_token_id: u32,
}

impl OnnxRuntime {
    pub fn new(model_path: &Path, config: &ModelConfig) -> Result<Self> {
        let model_file = model_path.join(MODEL_FILE_NAME);
        let mut builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| Error::ModelLoad {
                path: model_path.to_path_buf(),
                reason: format!("cannot create session: {}", e),
            })?;

        for provider in config.providers() {
            builder = match provider {
                ExecutionProvider::Cuda => builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ])
                    .map_err(|e| Error::UnsupportedProvider {
                        provider: *provider,
                        reason: e.to_string(),
                    })?,
                ExecutionProvider::Dml => builder
                    .with_execution_providers([
                        ort::execution_providers::DirectMLExecutionProvider::default().build(),
                    ])
                    .map_err(|e| Error::UnsupportedProvider {
                        provider: *provider,
                        reason: e.to_string(),
                    })?,
                ExecutionProvider::Cpu => builder,
                ExecutionProvider::Webgpu => {
                    return Err(Error::UnsupportedProvider {
                        provider: *provider,
                        reason: "no webgpu execution provider in this backend".into(),
                    });
                }
            };
        }

        let session = builder.commit_from_file(&model_file).map_err(|e| Error::ModelLoad {
            path: model_path.to_path_buf(),
            reason: format!("cannot load {}: {}", MODEL_FILE_NAME, e),
        })?;

        Ok(Self {
            session,
            vocab_size: config.model.vocab_size,
            eos_token_id: config.model.eos_token_id,
        })
    }

    fn forward(&self, sequence: &[u32]) -> Result<Vec<f32>> {
        let ids: Vec<i64> = sequence.iter().map(|&t| t as i64).collect();
        let input = Array2::from_shape_vec((1, ids.len()), ids).map_err(|e| Error::EngineStep {
            request_id: None,
            reason: format!("cannot shape input_ids: {}", e),
        })?;

        let step_error = |reason: String| Error::EngineStep { request_id: None, reason };
        let outputs = self
            .session
            .run(ort::inputs!["input_ids" => input.view()].map_err(|e| step_error(e.to_string()))?)
            .map_err(|e| step_error(e.to_string()))?;
        let logits = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| step_error(e.to_string()))?;

        // Next-token distribution sits at the last sequence position.
        let flat: Vec<f32> = logits.iter().copied().collect();
        if flat.len() < self.vocab_size {
            return Err(step_error(format!(
                "logits output has {} values, expected at least {}",
                flat.len(),
                self.vocab_size
            )));
        }
        Ok(flat[flat.len() - self.vocab_size..].to_vec())
    }
}

#[async_trait]
impl ModelRuntime for OnnxRuntime {
    async fn decode(&self, batch: &[DecodeContext]) -> Result<Vec<Vec<f32>>> {
        // TODO: bind the exported KV-cache tensors so incremental steps feed
        // only the unprocessed span instead of re-running the whole sequence.
        let mut rows = Vec::with_capacity(batch.len());
        for context in batch {
            let row = self.forward(&context.sequence).map_err(|e| match e {
                Error::EngineStep { reason, .. } => {
                    Error::EngineStep { request_id: Some(context.request_id), reason }
                }
                other => other,
            })?;
            rows.push(row);
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
