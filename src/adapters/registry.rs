use crate::domain::ports::Registry;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::PathBuf;

/// 單一 RFC 3339 時間戳的檢查點檔案
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Registry for FileRegistry {
    async fn load(&self) -> Result<DateTime<Utc>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => {
                // 第一次執行沒有檔案是正常的
                tracing::warn!(
                    "could not read registry file {}, may not exist (normal on first run); \
                     starting from the earliest possible time",
                    self.path.display()
                );
                return Ok(DateTime::<Utc>::UNIX_EPOCH);
            }
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(timestamp) => Ok(timestamp.with_timezone(&Utc)),
            Err(e) => {
                // 壞掉的檔案和不存在一樣處理，從頭抓
                tracing::warn!(
                    "error parsing timestamp in registry file {} ({:?}): {}; \
                     starting from the earliest possible time",
                    self.path.display(),
                    raw,
                    e
                );
                Ok(DateTime::<Utc>::UNIX_EPOCH)
            }
        }
    }

    async fn store(&self, last_processed: DateTime<Utc>) -> Result<()> {
        tracing::debug!(
            "writing registry checkpoint {} to {}",
            last_processed,
            self.path.display()
        );
        tokio::fs::write(
            &self.path,
            last_processed.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .await?;
        Ok(())
    }
}
