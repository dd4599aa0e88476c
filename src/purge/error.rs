use std::path::PathBuf;

use thiserror::Error;

/// Failure raised inside a backend's own purge call.
///
/// An unavailable backend is never reported through this type; it is skipped.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("{backend} purge request failed: {source}")]
    Http {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} purge endpoint answered {status}")]
    Status {
        backend: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("failed to clear `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{backend} purge failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl PurgeError {
    pub fn http(backend: &'static str, source: reqwest::Error) -> Self {
        Self::Http { backend, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}
