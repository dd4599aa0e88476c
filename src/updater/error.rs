use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("release request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("release request answered {0}")]
    Status(reqwest::StatusCode),
    #[error("release response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("release response is missing `{0}`")]
    MissingField(&'static str),
    #[error("release has no downloadable assets")]
    NoAssets,
    #[error("release asset has no download url")]
    EmptyDownloadUrl,
    #[error("failed to move `{from}` to `{to}`: {source}")]
    Install {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    pub fn install(from: impl Into<PathBuf>, to: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Install {
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}
