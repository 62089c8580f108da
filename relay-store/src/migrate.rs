use async_trait::async_trait;
use relay_core::Result;
use std::path::Path;

/// Hook invoked when a session has no event log yet.
///
/// Implementations convert whatever older on-disk format a session may have
/// into the AG-UI event log at `log_path`. The session's write lock is held
/// while this runs, so implementations must write the file directly rather
/// than going through [`EventLog::append`](crate::EventLog::append).
#[async_trait]
pub trait LegacyMigrator: Send + Sync {
    async fn migrate(&self, session_key: &str, log_path: &Path) -> Result<()>;
}

/// Migrator for deployments with no legacy data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMigrator;

#[async_trait]
impl LegacyMigrator for NoopMigrator {
    async fn migrate(&self, _session_key: &str, _log_path: &Path) -> Result<()> {
        Ok(())
    }
}
