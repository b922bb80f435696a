//! File-based accounting sink
//!
//! Writes one JSON object per line (JSON Lines), which standard tools such
//! as `jq` can process directly.

use super::{AccountingRecord, AccountingSink};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct FileAccountingSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAccountingSink {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(FileAccountingSink {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AccountingSink for FileAccountingSink {
    async fn record(&self, record: &AccountingRecord) -> Result<(), std::io::Error> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // One writer at a time keeps lines whole.
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
