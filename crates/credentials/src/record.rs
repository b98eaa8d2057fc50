//! Durable per-account state records
//!
//! One JSON file per account. All writes use atomic temp-file + rename so a
//! crash mid-write leaves the previous record intact. A tokio Mutex per store
//! serializes concurrent saves of the same record (throttle and ban events can
//! race with the shutdown flush).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Per-process counter keeping temp file names unique across stores.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// The persisted state of one account.
///
/// Timestamps are unix seconds. `throttled_until == 0` means not throttled.
/// Missing fields default, and the field names written by older tooling
/// (`is_banned`, `flood_wait`) are accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecord {
    pub id: String,
    pub app_id: i64,
    pub app_hash: String,
    #[serde(alias = "is_banned")]
    pub banned: bool,
    pub usage_count: u64,
    pub last_used: i64,
    #[serde(alias = "flood_wait")]
    pub throttled_until: i64,
}

impl AccountRecord {
    /// Fresh record for an account that has never been persisted.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether the record carries a usable app credential pair.
    pub fn has_app_credentials(&self) -> bool {
        self.app_id != 0 && !self.app_hash.is_empty()
    }
}

/// Reads and writes one account's state record.
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. `Ok(None)` when the file does not exist yet.
    pub async fn load(&self) -> Result<Option<AccountRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading state record {}: {e}",
                    self.path.display()
                )));
            }
        };
        let record = serde_json::from_str(&contents).map_err(|e| {
            Error::Parse(format!("parsing state record {}: {e}", self.path.display()))
        })?;
        Ok(Some(record))
    }

    /// Persist `record`, replacing the file atomically.
    pub async fn save(&self, record: &AccountRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, record).await
    }

    /// Persist the record built by `snapshot`. The snapshot is taken under
    /// the write lock, so the last save to land carries the newest state.
    pub async fn save_with<F>(&self, snapshot: F) -> Result<()>
    where
        F: FnOnce() -> AccountRecord,
    {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, &snapshot()).await
    }
}

/// Write a record atomically.
///
/// The temp file lives next to the target so the rename never crosses a
/// filesystem, and its name is unique per call so two stores over the same
/// path never share one. Permissions are 0600 on unix since the record
/// holds the app credential pair.
async fn write_atomic(path: &Path, record: &AccountRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Parse(format!("serializing state record: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("state record path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("state record path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp state record: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting state record permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp state record: {e}")))?;

    debug!(path = %path.display(), "persisted state record");
    Ok(())
}
