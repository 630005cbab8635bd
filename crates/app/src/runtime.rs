use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use voxstream_audio::{
    AudioCaptureThread, AudioRingBuffer, AudioStreamer, FrameReader, StreamerConfig,
    TARGET_SAMPLE_RATE_HZ,
};
use voxstream_foundation::{CaptureConfig, SessionState, StateManager};
use voxstream_telemetry::PipelineMetrics;
use voxstream_transport::{TransportError, WsSink};

/// Ring capacity between the capture callback and the streamer: ~1.4 s of
/// 48 kHz mono, plenty for a 25 ms polling worker.
const RING_CAPACITY_SAMPLES: usize = 16_384 * 4;

const CHUNK_QUEUE_CAPACITY: usize = 32;
const TRANSCRIPT_QUEUE_CAPACITY: usize = 32;

/// Options for starting one recording session
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub server_url: String,
    pub device: Option<String>,
    pub chunk_size_samples: usize,
    pub silence_threshold: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000/ws/audio/".to_string(),
            device: None,
            chunk_size_samples: voxstream_audio::DEFAULT_CHUNK_SIZE_SAMPLES,
            silence_threshold: CaptureConfig::default().silence_threshold,
        }
    }
}

/// Handle to one running session. Owns every pipeline stage; dropping it
/// without calling [`SessionHandle::shutdown`] aborts the session without
/// a final flush.
pub struct SessionHandle {
    pub metrics: Arc<PipelineMetrics>,
    state: StateManager,
    transcript_rx: Option<mpsc::Receiver<String>>,
    audio_capture: AudioCaptureThread,
    streamer_running: Arc<AtomicBool>,
    streamer_handle: JoinHandle<()>,
    sink_handle: JoinHandle<Result<(), TransportError>>,
}

impl SessionHandle {
    /// Take the transcript receiver (once); the caller decides how to
    /// present the server's text.
    pub fn take_transcripts(&mut self) -> Option<mpsc::Receiver<String>> {
        self.transcript_rx.take()
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// Gracefully stop the session: quiesce capture, let the streamer
    /// drain and flush, then wait for the sink to close the socket.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        info!("Shutting down streaming session...");
        self.state.transition(SessionState::Stopping)?;

        // 1. Stop the source so no new samples enter the ring buffer.
        self.audio_capture.stop();

        // 2. Ask the streamer to finish. It drains the ring buffer,
        //    flushes the pipeline remainder, and drops the chunk channel.
        self.streamer_running.store(false, Ordering::SeqCst);
        let _ = self.streamer_handle.await;

        // 3. The sink sees the closed channel, sends Close, and returns.
        match self.sink_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Transport ended with error: {}", e),
            Err(e) => tracing::warn!("Transport task join failed: {}", e),
        }

        self.state.transition(SessionState::Stopped)?;
        info!("Session shutdown complete");
        Ok(())
    }
}

/// Build and start the full capture -> pipeline -> WebSocket graph. The
/// transport connects first: no point opening the microphone when the
/// server is unreachable.
pub async fn start(opts: SessionOptions) -> anyhow::Result<SessionHandle> {
    let state = StateManager::new();
    let metrics = Arc::new(PipelineMetrics::default());

    // --- 1. WebSocket sink ---
    let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);
    let (transcript_tx, transcript_rx) = mpsc::channel(TRANSCRIPT_QUEUE_CAPACITY);
    let sink_handle = WsSink::new(opts.server_url.clone(), chunk_rx, transcript_tx)
        .with_metrics(metrics.clone())
        .connect_and_spawn()
        .await?;
    info!("WebSocket sink connected ({})", opts.server_url);

    // --- 2. Audio capture ---
    let ring_buffer = AudioRingBuffer::new(RING_CAPACITY_SAMPLES);
    let (audio_producer, audio_consumer) = ring_buffer.split();
    let capture_cfg = CaptureConfig {
        silence_threshold: opts.silence_threshold,
    };
    let (audio_capture, device_cfg, device_cfg_rx) =
        AudioCaptureThread::spawn(capture_cfg, audio_producer, opts.device.clone())?;
    info!(
        "Audio capture started: {} Hz, {} channel(s)",
        device_cfg.sample_rate, device_cfg.channels
    );

    // --- 3. Resample/encode streamer ---
    let frame_reader = FrameReader::new(
        audio_consumer,
        device_cfg.sample_rate,
        device_cfg.channels,
        RING_CAPACITY_SAMPLES,
        Some(metrics.clone()),
    );
    let streamer = AudioStreamer::new(
        frame_reader,
        chunk_tx,
        StreamerConfig {
            chunk_size_samples: opts.chunk_size_samples,
            target_rate_hz: TARGET_SAMPLE_RATE_HZ,
        },
    )
    .with_metrics(metrics.clone())
    .with_device_config(device_cfg_rx);
    let streamer_running = streamer.running_flag();
    let streamer_handle = streamer.spawn();
    info!("Audio streamer task started");

    state.transition(SessionState::Running)?;

    Ok(SessionHandle {
        metrics,
        state,
        transcript_rx: Some(transcript_rx),
        audio_capture,
        streamer_running,
        streamer_handle,
        sink_handle,
    })
}
