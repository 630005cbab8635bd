use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Detects a stalled capture stream: if `feed` is not called within the
/// timeout, the capture thread restarts the stream on the next candidate
/// device.
#[derive(Clone)]
pub struct WatchdogTimer {
    timeout: Duration,
    epoch: Instant,
    last_feed_ms: Arc<AtomicU64>,
    triggered: Arc<AtomicBool>,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WatchdogTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            epoch: Instant::now(),
            last_feed_ms: Arc::new(AtomicU64::new(0)),
            triggered: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn start(&mut self, running: Arc<AtomicBool>) {
        let timeout = self.timeout;
        let epoch = self.epoch;
        let last_feed_ms = Arc::clone(&self.last_feed_ms);
        let triggered = Arc::clone(&self.triggered);

        last_feed_ms.store(epoch.elapsed().as_millis() as u64, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));

                let now_ms = epoch.elapsed().as_millis() as u64;
                let last_ms = last_feed_ms.load(Ordering::SeqCst);
                let idle = Duration::from_millis(now_ms.saturating_sub(last_ms));

                if idle > timeout && !triggered.load(Ordering::SeqCst) {
                    tracing::error!("Watchdog timeout: no audio data for {:?}", idle);
                    triggered.store(true, Ordering::SeqCst);
                }
            }
        });

        *self.handle.write() = Some(handle);
    }

    /// Called from the audio callback on every frame.
    pub fn feed(&self) {
        self.last_feed_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::SeqCst);
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.write().take() {
            let _ = handle.join();
        }
        self.triggered.store(false, Ordering::SeqCst);
    }
}
