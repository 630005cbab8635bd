use std::collections::VecDeque;

/// Output rate of the pipeline. The transcription server consumes 16 kHz
/// mono PCM16 and nothing else.
pub const TARGET_SAMPLE_RATE_HZ: u32 = 16_000;

/// Samples per emitted chunk: 0.5 s at 16 kHz.
pub const DEFAULT_CHUNK_SIZE_SAMPLES: usize = 8_000;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub target_rate_hz: u32,
    pub chunk_size_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: TARGET_SAMPLE_RATE_HZ,
            chunk_size_samples: DEFAULT_CHUNK_SIZE_SAMPLES,
        }
    }
}

/// One encoded unit of audio, ready for the transport. Little-endian
/// signed 16-bit samples, no header or framing; chunk boundaries are
/// message boundaries at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    bytes: Vec<u8>,
}

impl PcmChunk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len_samples(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Streaming resample-and-encode pipeline: arbitrary-rate f32 frames in,
/// fixed-size 16 kHz PCM16 chunks out.
///
/// - Linear-interpolation resampler; not bandlimited. Aliasing is an
///   accepted tradeoff for latency and CPU cost on speech input.
/// - Accumulates resampled samples across calls and drains them FIFO in
///   `chunk_size_samples` units.
/// - Pure computation, no I/O. Never fails: out-of-range samples are
///   clamped, empty frames degenerate to empty output.
///
/// One instance per recording session; call [`PcmPipeline::flush`] when the
/// session stops so the partial final chunk is not dropped.
pub struct PcmPipeline {
    cfg: PipelineConfig,
    buffer: VecDeque<f32>,
}

impl PcmPipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        let cap = cfg.chunk_size_samples * 2;
        Self {
            cfg,
            buffer: VecDeque::with_capacity(cap),
        }
    }

    /// Resample one mono frame down to the target rate, accumulate, and
    /// return every full chunk that became available. The input rate is
    /// taken per call; a device restart at a different rate needs no
    /// reconfiguration here.
    pub fn ingest(&mut self, frame: &[f32], input_rate_hz: u32) -> Vec<PcmChunk> {
        if input_rate_hz == self.cfg.target_rate_hz {
            // Identity copy, no interpolation arithmetic
            self.buffer.extend(frame.iter().copied());
        } else {
            self.resample_into_buffer(frame, input_rate_hz);
        }

        let mut chunks = Vec::new();
        while self.buffer.len() >= self.cfg.chunk_size_samples {
            chunks.push(self.drain_chunk(self.cfg.chunk_size_samples));
        }
        chunks
    }

    /// Encode whatever remains in the accumulation buffer as one final
    /// (variable-size) chunk. Returns `None` when nothing is buffered.
    pub fn flush(&mut self) -> Option<PcmChunk> {
        if self.buffer.is_empty() {
            return None;
        }
        let len = self.buffer.len();
        Some(self.drain_chunk(len))
    }

    /// Samples currently accumulated and not yet emitted.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    fn resample_into_buffer(&mut self, frame: &[f32], input_rate_hz: u32) {
        let ratio = input_rate_hz as f64 / self.cfg.target_rate_hz as f64;
        let output_len = (frame.len() as f64 / ratio).round() as usize;
        self.buffer.reserve(output_len);

        for i in 0..output_len {
            let src = i as f64 * ratio;
            let left = src.floor() as usize;
            let right = src.ceil() as usize;
            let frac = (src - src.floor()) as f32;

            let left_val = frame.get(left).copied().unwrap_or(0.0);
            let right_val = frame.get(right).copied().unwrap_or(left_val);

            self.buffer.push_back(left_val + (right_val - left_val) * frac);
        }
    }

    fn drain_chunk(&mut self, len: usize) -> PcmChunk {
        let mut bytes = Vec::with_capacity(len * 2);
        for sample in self.buffer.drain(..len) {
            bytes.extend_from_slice(&encode_sample(sample).to_le_bytes());
        }
        PcmChunk { bytes }
    }
}

/// Clamp to [-1, 1] and scale to i16. Negative samples scale by 32768 and
/// non-negative by 32767, so both ends of the signed range are reachable
/// without overflowing the positive side.
pub fn encode_sample(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32_768.0).round() as i16
    } else {
        (clamped * 32_767.0).round() as i16
    }
}

/// Encode a whole slice without chunking. Used by tests and by callers
/// that already hold exactly one chunk's worth of samples.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&encode_sample(s).to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_with_chunk(chunk_size_samples: usize) -> PcmPipeline {
        PcmPipeline::new(PipelineConfig {
            target_rate_hz: TARGET_SAMPLE_RATE_HZ,
            chunk_size_samples,
        })
    }

    #[test]
    fn identity_rate_matches_direct_encoding() {
        let frame: Vec<f32> = (0..100).map(|i| (i as f32 / 100.0) - 0.5).collect();
        let mut p = pipeline_with_chunk(100);
        let chunks = p.ingest(&frame, TARGET_SAMPLE_RATE_HZ);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_bytes(), &encode_pcm16(&frame)[..]);
    }

    #[test]
    fn ingest_is_deterministic() {
        let frame: Vec<f32> = (0..480).map(|i| ((i * 7) % 200) as f32 / 200.0 - 0.5).collect();
        let run = || {
            let mut p = pipeline_with_chunk(100);
            let mut out: Vec<u8> = p
                .ingest(&frame, 48_000)
                .into_iter()
                .flat_map(PcmChunk::into_bytes)
                .collect();
            if let Some(rest) = p.flush() {
                out.extend(rest.into_bytes());
            }
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn length_law_holds_for_all_small_inputs() {
        for rate in [8_000u32, 22_050, 44_100, 48_000] {
            let ratio = rate as f64 / TARGET_SAMPLE_RATE_HZ as f64;
            for n in 0..200usize {
                let frame = vec![0.25f32; n];
                let mut p = pipeline_with_chunk(1_000_000); // never chunk
                p.ingest(&frame, rate);
                let expected = (n as f64 / ratio).round() as usize;
                assert_eq!(
                    p.buffered_samples(),
                    expected,
                    "rate={rate} n={n}"
                );
            }
        }
    }

    #[test]
    fn out_of_range_samples_clamp() {
        assert_eq!(encode_sample(2.0), encode_sample(1.0));
        assert_eq!(encode_sample(1.0), 32_767);
        assert_eq!(encode_sample(-5.0), encode_sample(-1.0));
        assert_eq!(encode_sample(-1.0), -32_768);
        assert_eq!(encode_sample(0.0), 0);
    }

    #[test]
    fn empty_frame_is_a_no_op() {
        let mut p = pipeline_with_chunk(100);
        let chunks = p.ingest(&[], 48_000);
        assert!(chunks.is_empty());
        assert_eq!(p.buffered_samples(), 0);
        assert!(p.flush().is_none());
    }

    #[test]
    fn flush_on_empty_buffer_returns_none() {
        let mut p = pipeline_with_chunk(100);
        assert!(p.flush().is_none());
        // and stays empty after a flush that emitted everything
        p.ingest(&[0.1; 50], TARGET_SAMPLE_RATE_HZ);
        assert!(p.flush().is_some());
        assert!(p.flush().is_none());
    }

    #[test]
    fn half_second_scenario_48k() {
        // 480 samples of 0.5 at 48 kHz: ratio 3, 160 resampled samples,
        // far from the 8000-sample chunk threshold.
        let frame = vec![0.5f32; 480];
        let mut p = PcmPipeline::new(PipelineConfig::default());
        let chunks = p.ingest(&frame, 48_000);
        assert!(chunks.is_empty());
        assert_eq!(p.buffered_samples(), 160);

        let rest = p.flush().expect("remainder expected");
        assert_eq!(rest.len_samples(), 160);
        // round(0.5 * 32767) = 16384 = 0x4000, little-endian
        for pair in rest.as_bytes().chunks_exact(2) {
            assert_eq!(pair, [0x00, 0x40]);
        }
        assert_eq!(p.buffered_samples(), 0);
    }

    #[test]
    fn chunks_drain_fifo_across_calls() {
        // chunk size 6, frames of 4 at the target rate: chunk boundaries
        // land mid-frame and must preserve order.
        let mut p = pipeline_with_chunk(6);
        let first = p.ingest(&[0.1, 0.2, 0.3, 0.4], TARGET_SAMPLE_RATE_HZ);
        assert!(first.is_empty());
        let second = p.ingest(&[0.5, 0.6, 0.7, 0.8], TARGET_SAMPLE_RATE_HZ);
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0].as_bytes(),
            &encode_pcm16(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6])[..]
        );
        assert_eq!(p.buffered_samples(), 2);
        let rest = p.flush().unwrap();
        assert_eq!(rest.as_bytes(), &encode_pcm16(&[0.7, 0.8])[..]);
    }

    #[test]
    fn one_ingest_can_emit_multiple_chunks() {
        let mut p = pipeline_with_chunk(10);
        let frame = vec![0.0f32; 35];
        let chunks = p.ingest(&frame, TARGET_SAMPLE_RATE_HZ);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len_samples() == 10));
        assert_eq!(p.buffered_samples(), 5);
    }

    #[test]
    fn upsampling_interpolates_between_neighbors() {
        // 8 kHz -> 16 kHz doubles the length; odd outputs sit halfway
        // between their neighbors.
        let mut p = pipeline_with_chunk(1_000);
        p.ingest(&[0.0, 1.0], 8_000);
        assert_eq!(p.buffered_samples(), 4);
        let chunk = p.flush().unwrap();
        let samples: Vec<i16> = chunk
            .as_bytes()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], encode_sample(0.5));
        assert_eq!(samples[2], encode_sample(1.0));
        // past the end: right clamps to left
        assert_eq!(samples[3], encode_sample(1.0));
    }
}
