use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-thread pipeline monitoring
#[derive(Clone)]
pub struct PipelineMetrics {
    // Audio level monitoring
    pub current_peak: Arc<AtomicU64>,   // Peak |sample| * 10000 in current window
    pub current_rms: Arc<AtomicU64>,    // RMS * 10000 for precision
    pub audio_level_db: Arc<AtomicI16>, // Current level in dB * 10

    // Pipeline stage tracking
    pub stage_capture: Arc<AtomicBool>,   // Data reached capture stage
    pub stage_encode: Arc<AtomicBool>,    // Data reached resample/encode stage
    pub stage_transport: Arc<AtomicBool>, // Data reached transport stage

    // Buffer monitoring
    pub capture_buffer_fill: Arc<AtomicUsize>, // Capture ring buffer fill %
    pub chunk_queue_fill: Arc<AtomicUsize>,    // Chunk channel fill %

    // Frame rate tracking
    pub capture_fps: Arc<AtomicU64>, // Frames per second * 10
    pub encode_fps: Arc<AtomicU64>,  // Chunks per second * 10

    // Event counters
    pub capture_frames: Arc<AtomicU64>,
    pub chunks_emitted: Arc<AtomicU64>,
    pub chunks_sent: Arc<AtomicU64>,
    pub chunks_dropped: Arc<AtomicU64>,
    pub bytes_sent: Arc<AtomicU64>,
    pub transcripts_received: Arc<AtomicU64>,

    // Error tracking
    pub capture_errors: Arc<AtomicU64>,
    pub transport_errors: Arc<AtomicU64>,

    // Activity indicators
    pub last_chunk_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            current_peak: Arc::new(AtomicU64::new(0)),
            current_rms: Arc::new(AtomicU64::new(0)),
            audio_level_db: Arc::new(AtomicI16::new(-900)),

            stage_capture: Arc::new(AtomicBool::new(false)),
            stage_encode: Arc::new(AtomicBool::new(false)),
            stage_transport: Arc::new(AtomicBool::new(false)),

            capture_buffer_fill: Arc::new(AtomicUsize::new(0)),
            chunk_queue_fill: Arc::new(AtomicUsize::new(0)),

            capture_fps: Arc::new(AtomicU64::new(0)),
            encode_fps: Arc::new(AtomicU64::new(0)),

            capture_frames: Arc::new(AtomicU64::new(0)),
            chunks_emitted: Arc::new(AtomicU64::new(0)),
            chunks_sent: Arc::new(AtomicU64::new(0)),
            chunks_dropped: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            transcripts_received: Arc::new(AtomicU64::new(0)),

            capture_errors: Arc::new(AtomicU64::new(0)),
            transport_errors: Arc::new(AtomicU64::new(0)),

            last_chunk_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn update_audio_level(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        self.current_peak
            .store((peak * 10_000.0) as u64, Ordering::Relaxed);

        let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
        let rms = (sum / samples.len() as f64).sqrt();
        self.current_rms
            .store((rms * 10_000.0) as u64, Ordering::Relaxed);

        let db = if peak > 0.0 {
            (20.0 * (peak as f64).log10() * 10.0) as i16
        } else {
            -900
        };
        self.audio_level_db.store(db, Ordering::Relaxed);
    }

    pub fn mark_stage_active(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Capture => self.stage_capture.store(true, Ordering::Relaxed),
            PipelineStage::Encode => self.stage_encode.store(true, Ordering::Relaxed),
            PipelineStage::Transport => self.stage_transport.store(true, Ordering::Relaxed),
        }
    }

    pub fn decay_stages(&self) {
        self.stage_capture.store(false, Ordering::Relaxed);
        self.stage_encode.store(false, Ordering::Relaxed);
        self.stage_transport.store(false, Ordering::Relaxed);
    }

    pub fn update_buffer_fill(&self, buffer: BufferType, fill_percent: usize) {
        let fill = fill_percent.min(100);
        match buffer {
            BufferType::Capture => self.capture_buffer_fill.store(fill, Ordering::Relaxed),
            BufferType::ChunkQueue => self.chunk_queue_fill.store(fill, Ordering::Relaxed),
        }
    }

    pub fn update_capture_fps(&self, fps: f64) {
        self.capture_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn update_encode_fps(&self, fps: f64) {
        self.encode_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn increment_capture_frames(&self) {
        self.capture_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_emitted(&self) {
        self.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        *self.last_chunk_time.write() = Some(Instant::now());
    }

    pub fn record_chunk_sent(&self, bytes: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PipelineStage {
    Capture,
    Encode,
    Transport,
}

#[derive(Debug, Clone, Copy)]
pub enum BufferType {
    Capture,
    ChunkQueue,
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_level_tracks_peak_and_rms() {
        let m = PipelineMetrics::default();
        m.update_audio_level(&[0.0, 0.5, -0.25]);
        assert_eq!(m.current_peak.load(Ordering::Relaxed), 5_000);
        assert!(m.current_rms.load(Ordering::Relaxed) > 0);
        // peak 0.5 -> ~ -6.0 dB, stored * 10
        let db = m.audio_level_db.load(Ordering::Relaxed);
        assert!((-70..=-50).contains(&db), "unexpected dB*10: {db}");
    }

    #[test]
    fn empty_frame_leaves_level_untouched() {
        let m = PipelineMetrics::default();
        m.update_audio_level(&[]);
        assert_eq!(m.audio_level_db.load(Ordering::Relaxed), -900);
    }

    #[test]
    fn chunk_counters_accumulate() {
        let m = PipelineMetrics::default();
        m.record_chunk_emitted();
        m.record_chunk_sent(16_000);
        m.record_chunk_sent(320);
        assert_eq!(m.chunks_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(m.chunks_sent.load(Ordering::Relaxed), 2);
        assert_eq!(m.bytes_sent.load(Ordering::Relaxed), 16_320);
        assert!(m.last_chunk_time.read().is_some());
    }

    #[test]
    fn buffer_fill_is_clamped() {
        let m = PipelineMetrics::default();
        m.update_buffer_fill(BufferType::Capture, 250);
        assert_eq!(m.capture_buffer_fill.load(Ordering::Relaxed), 100);
    }
}
