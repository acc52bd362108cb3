use crate::domain::model::BeatEvent;
use crate::domain::ports::EventSink;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

fn encode_ndjson(events: &[BeatEvent]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    for event in events {
        serde_json::to_writer(&mut buffer, event)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// 每個事件一行 JSON 寫到 stdout
pub struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    async fn publish(&self, events: &[BeatEvent]) -> Result<()> {
        let buffer = encode_ndjson(events)?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&buffer).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// 每個事件一行 JSON 附加到檔案
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn publish(&self, events: &[BeatEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let buffer = encode_ndjson(events)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}
