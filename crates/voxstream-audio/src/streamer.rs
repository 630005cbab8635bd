use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use super::capture::{AudioFrame, DeviceConfig};
use super::frame_reader::FrameReader;
use super::pipeline::{PcmChunk, PcmPipeline, PipelineConfig};
use voxstream_telemetry::{FpsTracker, PipelineMetrics, PipelineStage};

#[derive(Debug, Clone, Copy)]
pub struct StreamerConfig {
    pub chunk_size_samples: usize,
    pub target_rate_hz: u32,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        let p = PipelineConfig::default();
        Self {
            chunk_size_samples: p.chunk_size_samples,
            target_rate_hz: p.target_rate_hz,
        }
    }
}

/// Pulls frames out of the capture ring buffer, downmixes to mono, runs
/// them through the resample/encode pipeline, and forwards every emitted
/// chunk to the transport channel. Flushes the pipeline remainder when
/// the session stops.
pub struct AudioStreamer {
    frame_reader: FrameReader,
    chunk_tx: mpsc::Sender<PcmChunk>,
    cfg: StreamerConfig,
    running: Arc<AtomicBool>,
    metrics: Option<Arc<PipelineMetrics>>,
    device_cfg_rx: Option<broadcast::Receiver<DeviceConfig>>,
}

impl AudioStreamer {
    pub fn new(
        frame_reader: FrameReader,
        chunk_tx: mpsc::Sender<PcmChunk>,
        cfg: StreamerConfig,
    ) -> Self {
        Self {
            frame_reader,
            chunk_tx,
            cfg,
            running: Arc::new(AtomicBool::new(false)),
            metrics: None,
            device_cfg_rx: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_device_config(mut self, rx: broadcast::Receiver<DeviceConfig>) -> Self {
        self.device_cfg_rx = Some(rx);
        self
    }

    /// Returns the flag that stops the worker loop; clearing it makes the
    /// worker flush and exit.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let mut worker = StreamerWorker::new(
            self.frame_reader,
            self.chunk_tx,
            self.cfg,
            self.metrics,
            self.device_cfg_rx,
        );
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        tokio::spawn(async move {
            worker.run(running).await;
        })
    }
}

struct StreamerWorker {
    frame_reader: FrameReader,
    chunk_tx: mpsc::Sender<PcmChunk>,
    pipeline: PcmPipeline,
    metrics: Option<Arc<PipelineMetrics>>,
    capture_fps_tracker: FpsTracker,
    encode_fps_tracker: FpsTracker,
    device_cfg_rx: Option<broadcast::Receiver<DeviceConfig>>,
}

impl StreamerWorker {
    fn new(
        frame_reader: FrameReader,
        chunk_tx: mpsc::Sender<PcmChunk>,
        cfg: StreamerConfig,
        metrics: Option<Arc<PipelineMetrics>>,
        device_cfg_rx: Option<broadcast::Receiver<DeviceConfig>>,
    ) -> Self {
        Self {
            frame_reader,
            chunk_tx,
            pipeline: PcmPipeline::new(PipelineConfig {
                target_rate_hz: cfg.target_rate_hz,
                chunk_size_samples: cfg.chunk_size_samples,
            }),
            metrics,
            capture_fps_tracker: FpsTracker::new(),
            encode_fps_tracker: FpsTracker::new(),
            device_cfg_rx,
        }
    }

    async fn run(&mut self, running: Arc<AtomicBool>) {
        tracing::info!("Audio streamer started");

        while running.load(Ordering::SeqCst) {
            // Apply device config updates if any
            if let Some(rx) = &mut self.device_cfg_rx {
                while let Ok(cfg) = rx.try_recv() {
                    self.frame_reader
                        .update_device_config(cfg.sample_rate, cfg.channels);
                }
            }
            if !self.pump_once().await {
                // Nothing buffered. A 0.5 s chunk fills every ~500 ms even
                // at small device frame sizes, so a 25 ms poll keeps
                // latency negligible without spinning.
                time::sleep(Duration::from_millis(25)).await;
            }
        }

        // Capture has stopped; drain what the ring buffer still holds,
        // then flush so the partial last chunk is not dropped.
        while self.pump_once().await {}
        if let Some(rest) = self.pipeline.flush() {
            tracing::debug!("Flushing final chunk of {} samples", rest.len_samples());
            self.dispatch(rest).await;
        }

        tracing::info!("Audio streamer stopped");
    }

    /// Process at most one frame from the ring buffer. Returns false when
    /// no data was available.
    async fn pump_once(&mut self) -> bool {
        let Some(frame) = self.frame_reader.read_frame(4096) else {
            return false;
        };

        if let Some(m) = &self.metrics {
            m.increment_capture_frames();
            if let Some(fps) = self.capture_fps_tracker.tick() {
                m.update_capture_fps(fps);
            }
            m.update_audio_level(&frame.samples);
            m.mark_stage_active(PipelineStage::Capture);
        }

        let mono = downmix_to_mono(&frame);
        let chunks = self.pipeline.ingest(&mono, frame.sample_rate);
        for chunk in chunks {
            self.dispatch(chunk).await;
        }
        true
    }

    async fn dispatch(&mut self, chunk: PcmChunk) {
        if let Some(m) = &self.metrics {
            m.record_chunk_emitted();
            if let Some(fps) = self.encode_fps_tracker.tick() {
                m.update_encode_fps(fps);
            }
            m.mark_stage_active(PipelineStage::Encode);
        }

        // The transport owns delivery; a slow or closed sink must never
        // stall ingest, so a full queue drops the chunk.
        match self.chunk_tx.try_send(chunk) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Chunk queue full; dropping one chunk");
                if let Some(m) = &self.metrics {
                    m.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Transport is gone; dropping chunk");
                if let Some(m) = &self.metrics {
                    m.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Average interleaved channels down to mono. A trailing partial sample
/// group is discarded.
fn downmix_to_mono(frame: &AudioFrame) -> Vec<f32> {
    if frame.channels <= 1 {
        return frame.samples.clone();
    }
    let channels = frame.channels as usize;
    frame
        .samples
        .chunks_exact(channels)
        .map(|group| group.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;
    use std::time::Instant;

    fn test_frame(samples: Vec<f32>, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            timestamp: Instant::now(),
            sample_rate,
            channels,
        }
    }

    fn worker_with_io(
        chunk_size_samples: usize,
        sample_rate: u32,
        channels: u16,
    ) -> (
        crate::ring_buffer::AudioProducer,
        StreamerWorker,
        mpsc::Receiver<PcmChunk>,
    ) {
        let rb = AudioRingBuffer::new(65_536);
        let (prod, cons) = rb.split();
        let reader = FrameReader::new(cons, sample_rate, channels, 65_536, None);
        let (tx, rx) = mpsc::channel(8);
        let cfg = StreamerConfig {
            chunk_size_samples,
            target_rate_hz: 16_000,
        };
        (prod, StreamerWorker::new(reader, tx, cfg, None, None), rx)
    }

    #[test]
    fn stereo_downmix_averages_pairs() {
        let frame = test_frame(
            vec![1.0, -1.0, 0.5, -0.5, 0.25, 0.75, -0.25, -0.75],
            16_000,
            2,
        );
        let mono = downmix_to_mono(&frame);
        assert_eq!(mono, vec![0.0, 0.0, 0.5, -0.5]);
    }

    #[test]
    fn mono_passes_through_unchanged() {
        let frame = test_frame(vec![0.1, 0.2, 0.3], 16_000, 1);
        assert_eq!(downmix_to_mono(&frame), vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn pump_returns_false_on_empty_buffer() {
        let (_prod, mut worker, _rx) = worker_with_io(100, 16_000, 1);
        assert!(!worker.pump_once().await);
    }

    #[tokio::test]
    async fn chunks_flow_to_transport_channel() {
        let (mut prod, mut worker, mut rx) = worker_with_io(100, 16_000, 1);

        prod.write(&vec![0.5f32; 250]).unwrap();
        assert!(worker.pump_once().await);

        // 250 samples at the target rate against a 100-sample chunk: two
        // full chunks out, 50 samples still buffered.
        let c1 = rx.try_recv().unwrap();
        let c2 = rx.try_recv().unwrap();
        assert_eq!(c1.len_samples(), 100);
        assert_eq!(c2.len_samples(), 100);
        assert!(rx.try_recv().is_err());
        assert_eq!(worker.pipeline.buffered_samples(), 50);
    }

    #[tokio::test]
    async fn flush_emits_partial_remainder() {
        let (mut prod, mut worker, mut rx) = worker_with_io(8_000, 48_000, 1);

        // 480 samples at 48 kHz -> 160 buffered, no chunk yet
        prod.write(&vec![0.5f32; 480]).unwrap();
        assert!(worker.pump_once().await);
        assert!(rx.try_recv().is_err());

        if let Some(rest) = worker.pipeline.flush() {
            worker.dispatch(rest).await;
        }
        let rest = rx.try_recv().unwrap();
        assert_eq!(rest.len_samples(), 160);
    }

    #[tokio::test]
    async fn stereo_input_halves_sample_count_before_resample() {
        let (mut prod, mut worker, mut rx) = worker_with_io(100, 16_000, 2);

        // 400 interleaved samples = 200 mono samples -> two 100-sample chunks
        prod.write(&vec![0.25f32; 400]).unwrap();
        assert!(worker.pump_once().await);
        assert_eq!(rx.try_recv().unwrap().len_samples(), 100);
        assert_eq!(rx.try_recv().unwrap().len_samples(), 100);
        assert_eq!(worker.pipeline.buffered_samples(), 0);
    }
}
