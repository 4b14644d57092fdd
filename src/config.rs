use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Hardware backend the model graph runs on. Parsed straight from the CLI
/// and passed through to the runtime; only validated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    Dml,
    Webgpu,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::Dml => "dml",
            ExecutionProvider::Webgpu => "webgpu",
        };
        f.write_str(name)
    }
}

/// Parsed `genai_config.json` from the model directory, plus the provider
/// list built up at load time. Only the fields this crate consumes are
/// modeled; the rest of the file is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub model: ModelSection,
    #[serde(default)]
    pub search: SearchDefaults,
    #[serde(skip)]
    providers: Vec<ExecutionProvider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    #[serde(rename = "type")]
    pub model_type: String,
    pub vocab_size: usize,
    pub eos_token_id: u32,
    #[serde(default)]
    pub bos_token_id: Option<u32>,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

/// Generation defaults from the config's `search` section; individual
/// requests may override any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub do_sample: bool,
    pub max_length: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self { do_sample: false, max_length: 256, temperature: 1.0, top_p: 1.0 }
    }
}

fn default_context_length() -> usize {
    4096
}

pub const CONFIG_FILE_NAME: &str = "genai_config.json";

impl ModelConfig {
    /// Reads `genai_config.json` from a model directory.
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.is_dir() {
            return Err(Error::ModelLoad {
                path: model_path.to_path_buf(),
                reason: "not a directory".into(),
            });
        }
        let config_path = model_path.join(CONFIG_FILE_NAME);
        let raw = std::fs::read_to_string(&config_path).map_err(|e| Error::ModelLoad {
            path: model_path.to_path_buf(),
            reason: format!("cannot read {}: {}", CONFIG_FILE_NAME, e),
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::ModelLoad {
            path: model_path.to_path_buf(),
            reason: format!("malformed {}: {}", CONFIG_FILE_NAME, e),
        })
    }

    pub fn clear_providers(&mut self) {
        self.providers.clear();
    }

    pub fn append_provider(&mut self, provider: ExecutionProvider) {
        self.providers.push(provider);
    }

    /// Providers appended so far; empty means the default cpu path.
    pub fn providers(&self) -> &[ExecutionProvider] {
        &self.providers
    }
}
