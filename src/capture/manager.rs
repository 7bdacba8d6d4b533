use super::source::{CaptureConfig, CaptureEvent, CaptureResult, CaptureSource, CaptureStatus};
use crate::recording::RecordingStore;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Counters for the running capture session
#[derive(Default)]
pub struct CaptureStats {
    pub events_received: AtomicU64,
    pub game_frames: AtomicU64,
    pub solver_frames: AtomicU64,
    pub batches_written: AtomicU64,
    pub errors: AtomicU64,
    pub start_time: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
}

impl CaptureStats {
    fn reset(&self) {
        self.events_received.store(0, Ordering::SeqCst);
        self.game_frames.store(0, Ordering::SeqCst);
        self.solver_frames.store(0, Ordering::SeqCst);
        self.batches_written.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
    }

    fn record(&self, event: &CaptureEvent) {
        self.events_received.fetch_add(1, Ordering::SeqCst);
        match event {
            CaptureEvent::GameFrame(_) => {
                self.game_frames.fetch_add(1, Ordering::SeqCst);
            }
            CaptureEvent::SolverFrame { .. } => {
                self.solver_frames.fetch_add(1, Ordering::SeqCst);
            }
            CaptureEvent::SolverDiscovered(_) => {}
        }
    }
}

/// Runs a capture source in the background and appends what it produces to
/// a live [`RecordingStore`]
pub struct CaptureManager {
    store: Arc<RecordingStore>,
    status: Arc<Mutex<CaptureStatus>>,
    stats: Arc<CaptureStats>,
    stop_signal: Arc<AtomicBool>,
    source_name: Arc<Mutex<Option<String>>>,
    task: Option<JoinHandle<()>>,
}

impl CaptureManager {
    pub fn new(store: Arc<RecordingStore>) -> Self {
        Self {
            store,
            status: Arc::new(Mutex::new(CaptureStatus::Disconnected)),
            stats: Arc::new(CaptureStats::default()),
            stop_signal: Arc::new(AtomicBool::new(false)),
            source_name: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    pub fn store(&self) -> Arc<RecordingStore> {
        self.store.clone()
    }

    pub async fn status(&self) -> CaptureStatus {
        *self.status.lock().await
    }

    pub async fn source_name(&self) -> Option<String> {
        self.source_name.lock().await.clone()
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Start streaming `source` into the store
    pub async fn connect<C>(&mut self, source: C, config: CaptureConfig)
    where
        C: CaptureSource + 'static,
    {
        if self.task.is_some() {
            self.disconnect().await;
        }

        *self.status.lock().await = CaptureStatus::Connecting;
        *self.source_name.lock().await = Some(source.name().to_string());
        self.stats.reset();
        *self.stats.start_time.lock().await = Some(Utc::now());
        self.stop_signal.store(false, Ordering::SeqCst);
        self.store.set_live(true);

        let store = self.store.clone();
        let status = self.status.clone();
        let stats = self.stats.clone();
        let stop_signal = self.stop_signal.clone();

        self.task = Some(tokio::spawn(async move {
            let result = Self::run(source, config, store.clone(), status.clone(), stats, stop_signal).await;
            store.set_live(false);
            match result {
                Ok(()) => *status.lock().await = CaptureStatus::Disconnected,
                Err(e) => {
                    *status.lock().await = CaptureStatus::Error;
                    error!("Capture error: {}", e);
                }
            }
        }));
    }

    async fn run<C: CaptureSource>(
        mut source: C,
        config: CaptureConfig,
        store: Arc<RecordingStore>,
        status: Arc<Mutex<CaptureStatus>>,
        stats: Arc<CaptureStats>,
        stop_signal: Arc<AtomicBool>,
    ) -> CaptureResult<()> {
        let poll_interval = tokio::time::Duration::from_millis(config.poll_interval_ms);
        let batch_size = config.batch_size.max(1);
        source.connect(config).await?;
        *status.lock().await = CaptureStatus::Connected;
        info!("Capturing from {}", source.name());

        loop {
            if stop_signal.load(Ordering::SeqCst) {
                break;
            }

            let mut batch = Vec::new();
            while batch.len() < batch_size {
                match source.receive().await {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) => break,
                    Err(e) => {
                        stats.errors.fetch_add(1, Ordering::SeqCst);
                        warn!("Capture receive error: {}", e);
                        break;
                    }
                }
            }

            if batch.is_empty() {
                if source.is_exhausted() {
                    info!("{} has no more data", source.name());
                    break;
                }
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            // Readers see either none or all of a batch
            {
                let mut writer = store.write();
                for event in batch {
                    stats.record(&event);
                    event.apply_to(&mut writer);
                }
            }
            stats.batches_written.fetch_add(1, Ordering::SeqCst);
            debug!(
                "Captured {} events so far",
                stats.events_received.load(Ordering::SeqCst)
            );
            tokio::task::yield_now().await;
        }

        source.disconnect().await?;
        Ok(())
    }

    /// Whether the background task has finished on its own
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait until the source runs out of data
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Capture task failed: {}", e);
            }
        }
    }

    /// Stop capturing. The store keeps its data but is no longer live.
    pub async fn disconnect(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.join().await;
        self.store.set_live(false);
        *self.status.lock().await = CaptureStatus::Disconnected;
        *self.source_name.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::SyntheticCapture;
    use crate::recording::fixtures::simple_recording;

    fn config() -> CaptureConfig {
        CaptureConfig {
            batch_size: 4,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_finite_source_fills_store() {
        let recording = simple_recording();
        let store = Arc::new(RecordingStore::live("session"));
        let mut manager = CaptureManager::new(store.clone());

        manager.connect(SyntheticCapture::from_recording(&recording), config()).await;
        assert_eq!(manager.source_name().await.as_deref(), Some("fixture"));
        manager.join().await;

        let snapshot = store.read();
        assert_eq!(snapshot.game_frame_count(), 10);
        assert_eq!(snapshot.solver_frame_count(1), Some(10));
        assert!(!store.is_live());
        assert_eq!(manager.stats().game_frames.load(Ordering::SeqCst), 10);
        assert_eq!(manager.stats().solver_frames.load(Ordering::SeqCst), 10);
        assert!(manager.stats().batches_written.load(Ordering::SeqCst) >= 6);
        assert_eq!(manager.status().await, CaptureStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_stops_endless_source() {
        let store = Arc::new(RecordingStore::live("session"));
        let mut manager = CaptureManager::new(store.clone());
        let mut source = SyntheticCapture::new("generator");
        source.set_auto_generate(true, None);

        manager.connect(source, config()).await;
        for _ in 0..200 {
            if store.read().game_frame_count() >= 3 {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        }
        assert!(store.is_live());

        manager.disconnect().await;
        assert!(!store.is_live());
        assert!(manager.is_finished());
        assert!(store.read().game_frame_count() >= 3);
        assert_eq!(manager.status().await, CaptureStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_every_batch_bumps_version() {
        let store = Arc::new(RecordingStore::live("session"));
        let before = store.last_updated_version();
        let mut manager = CaptureManager::new(store.clone());
        manager.connect(SyntheticCapture::from_recording(&simple_recording()), config()).await;
        manager.join().await;

        let batches = manager.stats().batches_written.load(Ordering::SeqCst);
        assert_eq!(store.last_updated_version(), before + batches);
    }
}
