//! Error types for backtrace capture and configuration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktraceError {
    /// Target-context capture was handed something that is not an execution context.
    #[error("expected an execution context (thread or a subclass of it), got '{got}'")]
    InvalidArgument { got: String },

    /// Caller-relative capture from an OS thread with no attached execution context.
    #[error("the calling thread has no attached execution context")]
    NoCurrentContext,

    /// A serialized location whose fields contradict each other.
    #[error("invalid location: {reason}")]
    InvalidLocation { reason: String },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl BacktraceError {
    pub fn invalid_argument(got: impl Into<String>) -> Self {
        BacktraceError::InvalidArgument { got: got.into() }
    }

    pub fn invalid_location(reason: impl Into<String>) -> Self {
        BacktraceError::InvalidLocation {
            reason: reason.into(),
        }
    }

    pub fn config_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BacktraceError::ConfigRead {
            path: path.into(),
            source,
        }
    }

    pub fn config_parse(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        BacktraceError::ConfigParse {
            path: path.into(),
            source,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, BacktraceError::InvalidArgument { .. })
    }
}
