use crate::domain::model::BeatEvent;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 進度檢查點：最後一個已完整發佈 blob 的 contentCreated 時間。
/// 存了這個時間代表該 blob 與更早的都已送達。
#[async_trait]
pub trait Registry: Send + Sync {
    async fn load(&self) -> Result<DateTime<Utc>>;
    async fn store(&self, last_processed: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, events: &[BeatEvent]) -> Result<()>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Box<T> {
    async fn publish(&self, events: &[BeatEvent]) -> Result<()> {
        (**self).publish(events).await
    }
}
