//! Media scanner for desktop hosts

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    storage::{MediaScanner, ScanEntry},
};
use tracing::info;

/// Desktop platforms keep no media index; scanned files are only logged.
#[derive(Debug, Default, Clone)]
pub struct LoggingMediaScanner;

#[async_trait]
impl MediaScanner for LoggingMediaScanner {
    async fn scan(&self, entries: Vec<ScanEntry>) -> Result<()> {
        for entry in &entries {
            info!(path = ?entry.path, mime = ?entry.mime, "Media scan requested");
        }
        Ok(())
    }
}
