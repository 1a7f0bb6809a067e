use anyhow::{Context, Result};
use hostmon_common::types::Snapshot;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Append-only JSON stream: one pretty-printed snapshot per poll, each
/// preceded by a newline.
pub struct JsonSink {
    path: PathBuf,
    file: File,
}

impl JsonSink {
    /// Opens `path` for writing, truncating whatever a previous run left.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .with_context(|| format!("failed to create output file {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, snapshot: &Snapshot) -> Result<()> {
        let mut record = String::from("\n");
        record.push_str(&serde_json::to_string_pretty(snapshot)?);
        self.file
            .write_all(record.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.file.flush().await?;
        Ok(())
    }
}
