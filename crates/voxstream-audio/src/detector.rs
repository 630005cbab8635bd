use std::time::{Duration, Instant};

/// RMS-based silence detector feeding capture statistics. Works on the
/// f32 sample scale [-1.0, 1.0].
#[derive(Clone)]
pub struct SilenceDetector {
    threshold: f32,
    silence_start: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            silence_start: None,
        }
    }

    pub fn is_silence(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }

        let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
        let rms = (sum / samples.len() as f64).sqrt() as f32;

        tracing::trace!(
            "SilenceDetector: rms={:.5}, threshold={:.5}, samples={}",
            rms,
            self.threshold,
            samples.len()
        );

        if rms < self.threshold {
            if self.silence_start.is_none() {
                self.silence_start = Some(Instant::now());
                tracing::debug!("Silence started (rms {:.5} < {:.5})", rms, self.threshold);
            }
            true
        } else {
            if let Some(start) = self.silence_start.take() {
                tracing::debug!(
                    "Silence ended after {:?} (rms {:.5} >= {:.5})",
                    start.elapsed(),
                    rms,
                    self.threshold
                );
            }
            false
        }
    }

    pub fn silence_duration(&self) -> Duration {
        self.silence_start
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn reset(&mut self) {
        self.silence_start = None;
    }
}
