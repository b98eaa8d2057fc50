//! Credential source discovery
//!
//! Walks the sessions directory recursively and returns one source per
//! `*.session` file, sorted by path so proxy assignment is stable between runs.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::constants::{METADATA_EXTENSION, SESSION_EXTENSION, STATE_EXTENSION};
use crate::error::{Error, Result};

/// One account's files on disk, identified by the session file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSource {
    pub id: String,
    pub session_path: PathBuf,
}

impl CredentialSource {
    /// Build a source from a session file path. Returns `None` when the path
    /// has no usable stem.
    pub fn from_session_path(path: PathBuf) -> Option<Self> {
        let id = path.file_stem()?.to_str()?.to_string();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            session_path: path,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.session_path.with_extension(STATE_EXTENSION)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.session_path.with_extension(METADATA_EXTENSION)
    }

    /// Read the raw session material. An empty file is rejected.
    pub async fn read_material(&self) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.session_path).await.map_err(|e| {
            Error::Io(format!(
                "reading session file {}: {e}",
                self.session_path.display()
            ))
        })?;
        if bytes.is_empty() {
            return Err(Error::NotFound(format!(
                "session file {} is empty",
                self.session_path.display()
            )));
        }
        Ok(bytes)
    }
}

/// Find every `*.session` file under `dir`.
pub async fn discover(dir: &Path) -> Result<Vec<CredentialSource>> {
    let mut pending = vec![dir.to_path_buf()];
    let mut paths = Vec::new();

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| Error::Io(format!("listing {}: {e}", current.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io(format!("listing {}: {e}", current.display())))?
        {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == SESSION_EXTENSION) {
                paths.push(path);
            }
        }
    }

    paths.sort();
    let sources: Vec<CredentialSource> = paths
        .into_iter()
        .filter_map(CredentialSource::from_session_path)
        .collect();

    info!(dir = %dir.display(), sources = sources.len(), "discovered credential sources");
    Ok(sources)
}
