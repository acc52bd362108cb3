use crate::config::BeatConfig;
use crate::core::api::ActivityApi;
use crate::domain::model::BeatEvent;
use crate::domain::ports::{EventSink, Registry};
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::monitor::SystemMonitor;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatState {
    Starting,
    Running,
    Stopped,
}

/// 從其他 task (通常是 ctrl-c handler) 要求 beat 結束
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Beat<R: Registry, S: EventSink> {
    api: ActivityApi,
    registry: R,
    sink: S,
    period: std::time::Duration,
    content_max_age: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<BeatState>,
    state_rx: watch::Receiver<BeatState>,
    #[cfg(feature = "cli")]
    monitor: Option<SystemMonitor>,
}

impl<R: Registry, S: EventSink> Beat<R, S> {
    pub fn new(config: &BeatConfig, registry: R, sink: S) -> Result<Self> {
        let api = ActivityApi::from_config(config)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(BeatState::Starting);

        Ok(Self {
            api,
            registry,
            sink,
            period: config.period(),
            content_max_age: config.content_max_age(),
            shutdown_tx,
            shutdown_rx,
            state_tx,
            state_rx,
            #[cfg(feature = "cli")]
            monitor: None,
        })
    }

    #[cfg(feature = "cli")]
    pub fn new_with_monitoring(
        config: &BeatConfig,
        registry: R,
        sink: S,
        monitor_enabled: bool,
    ) -> Result<Self> {
        let mut beat = Self::new(config, registry, sink)?;
        beat.monitor = Some(SystemMonitor::new(monitor_enabled));
        Ok(beat)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// 觀察 beat 目前的生命週期狀態
    pub fn state(&self) -> watch::Receiver<BeatState> {
        self.state_rx.clone()
    }

    /// 長駐模式：啟用訂閱、立即輪詢一次，之後照設定週期輪詢，
    /// 收到 shutdown 訊號即結束並回傳 Ok
    pub async fn run(&self) -> Result<()> {
        tracing::info!("o365beat is running! Hit CTRL-C to stop it.");
        let _ = self.state_tx.send(BeatState::Running);

        let result = self.run_loop().await;

        let _ = self.state_tx.send(BeatState::Stopped);
        #[cfg(feature = "cli")]
        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }
        tracing::info!("o365beat stopped");
        result
    }

    async fn run_loop(&self) -> Result<()> {
        self.api.enable_subscriptions().await?;

        // 啟動時先跑一輪，之後 interval 第一次 tick 是立即的，先吞掉
        let last_processed = self.registry.load().await?;
        self.poll(last_processed).await?;

        let mut ticker = tokio::time::interval(self.period);
        ticker.tick().await;

        let mut shutdown_rx = self.shutdown_rx.clone();
        // 初始輪詢期間就收到的 shutdown 也要處理
        if *shutdown_rx.borrow_and_update() {
            return Ok(());
        }
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::debug!("shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // 每輪重新讀 registry，上一輪失敗的 blob 才會重抓
            let last_processed = match self.registry.load().await {
                Ok(last_processed) => last_processed,
                Err(e) => {
                    tracing::error!("failed to read registry: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.poll(last_processed).await {
                // 輪詢失敗多半是暫時性 API 問題，留到下個週期再試
                tracing::error!("poll cycle failed: {}", e);
            }

            #[cfg(feature = "cli")]
            if let Some(monitor) = &self.monitor {
                monitor.log_stats("poll cycle");
            }
        }
        Ok(())
    }

    /// 單次模式：啟用訂閱後輪詢一輪就結束
    pub async fn run_once(&self) -> Result<()> {
        let _ = self.state_tx.send(BeatState::Running);
        let result = async {
            self.api.enable_subscriptions().await?;
            let last_processed = self.registry.load().await?;
            self.poll(last_processed).await
        }
        .await;
        let _ = self.state_tx.send(BeatState::Stopped);
        result
    }

    /// 一輪輪詢：列出新 blob、逐一下載發佈、推進 registry。
    /// 單一 blob 下載失敗只跳過，發佈或 registry 寫入失敗中止整輪。
    pub async fn poll(&self, last_processed: DateTime<Utc>) -> Result<()> {
        tracing::debug!("polling since {}", last_processed);
        let now = Utc::now();

        // 從上次進度的下一秒開始 (API 的時間精度是秒)，最多回溯到保留期限
        let floor = now - self.content_max_age;
        let start = if floor < last_processed {
            last_processed + Duration::seconds(1)
        } else {
            floor
        };

        let blobs = self.api.list_all_available_content(start, now).await?;

        let mut last_processed = last_processed;
        for blob in blobs {
            let records = match self.api.get_content(&blob.content_uri).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        "error getting content from {}: {}, moving to next blob",
                        blob.content_uri,
                        e
                    );
                    continue;
                }
            };

            let events = records
                .into_iter()
                .map(BeatEvent::from_audit_record)
                .collect::<Result<Vec<_>>>()?;

            tracing::debug!("publishing {} event(s)", events.len());
            self.sink.publish(&events).await?;

            tracing::debug!(
                "published blob created {}, last was {}, updating registry",
                blob.content_created,
                last_processed
            );
            self.registry.store(blob.content_created).await?;
            last_processed = blob.content_created;
        }
        Ok(())
    }
}
