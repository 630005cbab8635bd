use std::sync::Arc;
use std::time::Instant;

use super::capture::AudioFrame;
use super::ring_buffer::AudioConsumer;
use voxstream_telemetry::{BufferType, PipelineMetrics};

/// Drains the capture ring buffer into timestamped frames for the
/// streamer worker. Sample rate and channel count follow the live device
/// config so frames always describe themselves correctly, even after a
/// capture restart on a different device.
pub struct FrameReader {
    consumer: AudioConsumer,
    sample_rate: u32,
    channels: u16,
    capacity: usize,
    metrics: Option<Arc<PipelineMetrics>>,
    samples_read: u64,
    start_time: Instant,
}

impl FrameReader {
    pub fn new(
        consumer: AudioConsumer,
        sample_rate: u32,
        channels: u16,
        capacity: usize,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Self {
        Self {
            consumer,
            sample_rate,
            channels,
            capacity,
            metrics,
            samples_read: 0,
            start_time: Instant::now(),
        }
    }

    /// Apply a device config change broadcast by the capture thread.
    pub fn update_device_config(&mut self, sample_rate: u32, channels: u16) {
        if self.sample_rate != sample_rate || self.channels != channels {
            tracing::info!(
                "Frame reader device config: {} Hz {} ch -> {} Hz {} ch",
                self.sample_rate,
                self.channels,
                sample_rate,
                channels
            );
            self.sample_rate = sample_rate;
            self.channels = channels;
        }
    }

    /// Read the next frame, up to `max_samples` interleaved samples.
    /// Returns `None` when the ring buffer is empty.
    pub fn read_frame(&mut self, max_samples: usize) -> Option<AudioFrame> {
        let mut buffer = vec![0.0f32; max_samples];
        let samples_read = self.consumer.read(&mut buffer);

        if samples_read == 0 {
            return None;
        }

        buffer.truncate(samples_read);

        if let Some(m) = &self.metrics {
            let fill = (self.consumer.slots() * 100) / self.capacity.max(1);
            m.update_buffer_fill(BufferType::Capture, fill);
        }

        // Reconstruct the timestamp from the running sample count
        let frames_elapsed = self.samples_read / self.channels.max(1) as u64;
        let elapsed_ms = (frames_elapsed * 1000) / self.sample_rate as u64;
        let timestamp = self.start_time + std::time::Duration::from_millis(elapsed_ms);

        self.samples_read += samples_read as u64;

        Some(AudioFrame {
            samples: buffer,
            timestamp,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    /// Interleaved samples currently waiting in the ring buffer.
    pub fn available_samples(&self) -> usize {
        self.consumer.slots()
    }
}
