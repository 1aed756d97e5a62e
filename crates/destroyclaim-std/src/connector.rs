//! Storage backend the standard extensions act on.

use destroyclaim_core::Result;
use std::path::PathBuf;

/// Content-addressed storage: data is identified by the hex SHA-256 of its bytes.
#[async_trait::async_trait]
pub trait DataConnector: Send + Sync {
    /// True if data with this hash is present.
    async fn exists(&self, hash: &str) -> bool;

    /// Remove the data. Returns where it lived.
    async fn destroy(&self, hash: &str) -> Result<PathBuf>;

    /// Overwrite the data before removing it.
    async fn wipe(&self, hash: &str) -> Result<PathBuf>;

    /// Report what `destroy` would remove without touching it.
    async fn simulate_destroy(&self, hash: &str) -> Result<PathBuf>;
}
