//! Append-only JSONL event log, one file per session.
//!
//! Layout: `<base_dir>/sessions/<session_key>/agui-events.jsonl`. Each line
//! is one complete JSON object. Appends and reads for the same session are
//! serialized through [`SessionLocks`]; different sessions never contend.

use crate::locks::SessionLocks;
use crate::migrate::{LegacyMigrator, NoopMigrator};
use relay_core::{Event, RelayError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub const SESSIONS_DIR: &str = "sessions";
pub const EVENT_LOG_FILE: &str = "agui-events.jsonl";

#[derive(Clone)]
pub struct EventLog {
    base_dir: PathBuf,
    locks: Arc<SessionLocks>,
    migrator: Arc<dyn LegacyMigrator>,
}

impl EventLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: Arc::new(SessionLocks::new()),
            migrator: Arc::new(NoopMigrator),
        }
    }

    pub fn with_migrator(mut self, migrator: Arc<dyn LegacyMigrator>) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn with_locks(mut self, locks: Arc<SessionLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<SessionLocks> {
        &self.locks
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of a session's log. Keys that could escape the sessions
    /// directory are rejected.
    pub fn log_path(&self, session_key: &str) -> Result<PathBuf> {
        validate_session_key(session_key)?;
        Ok(self.base_dir.join(SESSIONS_DIR).join(session_key).join(EVENT_LOG_FILE))
    }

    pub async fn append(&self, session_key: &str, event: &Event) -> Result<()> {
        self.append_then(session_key, event, || {}).await
    }

    /// Append one event, then run `after` while the session lock is still
    /// held.
    ///
    /// `after` runs exactly once whether or not the write succeeded. Callers
    /// use it to publish the event so that a reader holding the same lock
    /// sees every line either in the file or in its live queue, never both.
    pub async fn append_then<F>(&self, session_key: &str, event: &Event, after: F) -> Result<()>
    where
        F: FnOnce() + Send,
    {
        let prepared = self.log_path(session_key).and_then(|path| {
            let mut line = event.to_json()?;
            line.push('\n');
            Ok((path, line))
        });
        let (path, line) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                after();
                return Err(e);
            }
        };

        let _guard = self.locks.acquire(session_key).await;
        let written = write_line(&path, line.as_bytes()).await;
        after();

        if let Err(e) = &written {
            tracing::error!(session = %session_key, path = %path.display(), error = %e, "failed to append event");
        }
        written
    }

    pub async fn load(&self, session_key: &str) -> Result<Vec<Event>> {
        self.load_then(session_key, || {}).await
    }

    /// Read every well-formed event of a session, then run `after` while the
    /// session lock is still held.
    ///
    /// A missing log triggers the legacy migrator once; if the log is still
    /// missing afterwards the session simply has no events. Blank, malformed
    /// and truncated lines are skipped.
    pub async fn load_then<F>(&self, session_key: &str, after: F) -> Result<Vec<Event>>
    where
        F: FnOnce() + Send,
    {
        let path = match self.log_path(session_key) {
            Ok(path) => path,
            Err(e) => {
                after();
                return Err(e);
            }
        };

        let _guard = self.locks.acquire(session_key).await;
        let loaded = self.read_or_migrate(session_key, &path).await;
        after();
        loaded
    }

    async fn read_or_migrate(&self, session_key: &str, path: &Path) -> Result<Vec<Event>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => return Ok(parse_records(&bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.migrator.migrate(session_key, path).await {
            tracing::warn!(session = %session_key, error = %e, "legacy migration failed");
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(parse_records(&bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("base_dir", &self.base_dir).finish_non_exhaustive()
    }
}

fn validate_session_key(session_key: &str) -> Result<()> {
    let invalid = session_key.is_empty()
        || session_key.contains('/')
        || session_key.contains('\\')
        || session_key.contains('\0')
        || session_key.contains("..");
    if invalid {
        return Err(RelayError::InvalidSessionKey(session_key.to_string()));
    }
    Ok(())
}

async fn write_line(path: &Path, line: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line).await?;
    file.flush().await?;
    Ok(())
}

/// Decode a JSONL buffer, skipping anything that is not a complete object.
///
/// A final line without its terminating newline is kept when it parses; a
/// write in progress (or one cut short by a crash) does not and is skipped.
pub fn parse_records(bytes: &[u8]) -> Vec<Event> {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| match serde_json::from_slice::<Event>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed event log line");
                None
            }
        })
        .collect()
}
