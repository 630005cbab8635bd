pub mod capture;
pub mod detector;
pub mod device;
pub mod frame_reader;
pub mod pipeline;
pub mod ring_buffer;
pub mod streamer;
pub mod watchdog;

// Public API
pub use capture::{AudioCaptureThread, AudioFrame, DeviceConfig};
pub use device::{DeviceInfo, DeviceManager};
pub use frame_reader::FrameReader;
pub use pipeline::{
    PcmChunk, PcmPipeline, PipelineConfig, DEFAULT_CHUNK_SIZE_SAMPLES, TARGET_SAMPLE_RATE_HZ,
};
pub use ring_buffer::AudioRingBuffer;
pub use streamer::{AudioStreamer, StreamerConfig};
pub use watchdog::WatchdogTimer;
