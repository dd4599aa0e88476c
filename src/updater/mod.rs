//! Self-update support backed by a source code host's release API.

pub mod error;
pub mod service;
pub mod source;
pub mod version;

pub use error::UpdateError;
pub use service::{
    CachedRelease, Icons, InstallResult, PluginInfo, ReleaseUpdater, UpdateCheck, UpdateOffer,
    UpdaterConfig,
};
pub use source::{GithubReleaseSource, ReleaseInfo, ReleaseSource};
pub use version::{compare_versions, is_newer};
