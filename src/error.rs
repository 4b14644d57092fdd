use std::fmt;
use std::path::PathBuf;

use crate::config::ExecutionProvider;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the engine and its client loops. All of these are
/// fatal; nothing in this crate retries.
#[derive(Debug)]
pub enum Error {
    /// The model directory or its `genai_config.json` could not be loaded.
    ModelLoad { path: PathBuf, reason: String },
    /// The requested execution provider is not available in this build.
    UnsupportedProvider { provider: ExecutionProvider, reason: String },
    /// A decode step failed. Carries the failing request id when known.
    EngineStep { request_id: Option<uuid::Uuid>, reason: String },
    /// A request was driven through an invalid status transition.
    RequestState(String),
    /// A fill would grow the pool past its configured capacity.
    PoolCapacityExceeded { capacity: usize, requested: usize },
    Tokenizer(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ModelLoad { path, reason } => {
                write!(f, "failed to load model from {}: {}", path.display(), reason)
            }
            Error::UnsupportedProvider { provider, reason } => {
                write!(f, "execution provider {} is not supported: {}", provider, reason)
            }
            Error::EngineStep { request_id, reason } => match request_id {
                Some(id) => write!(f, "engine step failed for request {}: {}", id, reason),
                None => write!(f, "engine step failed: {}", reason),
            },
            Error::RequestState(msg) => write!(f, "invalid request state: {}", msg),
            Error::PoolCapacityExceeded { capacity, requested } => write!(
                f,
                "pool capacity exceeded: {} requests against a capacity of {}",
                requested, capacity
            ),
            Error::Tokenizer(msg) => write!(f, "tokenizer error: {}", msg),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_identifies_the_failing_request() {
        let id = uuid::Uuid::new_v4();
        let err = Error::EngineStep { request_id: Some(id), reason: "decode failed".into() };
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn display_reports_capacity_numbers() {
        let err = Error::PoolCapacityExceeded { capacity: 4, requested: 5 };
        let msg = err.to_string();
        assert!(msg.contains('4') && msg.contains('5'));
    }
}
