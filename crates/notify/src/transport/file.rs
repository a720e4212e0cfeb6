//! File sink transport.
//!
//! Writes each message as a pretty-printed JSON file into a directory. Dev
//! mode points this at `POSTBOX_DEV_OUTPUT_PATH` so nothing leaves the
//! machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Transport, TransportError};
use crate::render::RenderedMessage;

#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), TransportError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Timestamp prefix keeps a directory listing in send order.
        let file_name = format!(
            "{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            Uuid::now_v7()
        );
        let path = self.dir.join(file_name);
        let bytes = serde_json::to_vec_pretty(message)?;
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), to = %message.to, "Message written to file sink");
        Ok(())
    }
}
