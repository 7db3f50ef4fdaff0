use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::entry::AuditEntry;

/// Errors that can occur during audit log I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create directory for audit log {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open audit log {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to audit log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush audit log: {0}")]
    Flush(std::io::Error),
}

/// Buffered append-only writer producing one JSON object per line.
///
/// Lines reach the file on [`flush`](Self::flush); the sink's background
/// task flushes when idle and on shutdown.
pub struct AuditWriter {
    path: PathBuf,
    file: BufWriter<tokio::fs::File>,
}

impl AuditWriter {
    /// Open (or create) the audit log at `path` in append mode, creating
    /// parent directories as needed.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, AuditWriteError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AuditWriteError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditWriteError::OpenFile {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise `entry` as a single JSON line into the buffer.
    pub async fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(AuditWriteError::Write)
    }

    pub async fn flush(&mut self) -> Result<(), AuditWriteError> {
        self.file.flush().await.map_err(AuditWriteError::Flush)
    }
}
