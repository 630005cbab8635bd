use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

/// Real-time safe SPSC ring buffer carrying f32 samples from the cpal
/// callback to the streamer task.
pub struct AudioRingBuffer {
    producer: Producer<f32>,
    consumer: Consumer<f32>,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    /// Split into producer and consumer for separate threads
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        (
            AudioProducer {
                producer: self.producer,
            },
            AudioConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer half, owned by the audio callback thread.
pub struct AudioProducer {
    producer: Producer<f32>,
}

impl AudioProducer {
    /// Write samples from the audio callback. Non-blocking: a full buffer
    /// rejects the whole frame rather than stalling the audio thread.
    pub fn write(&mut self, samples: &[f32]) -> Result<usize, ()> {
        let mut chunk = match self.producer.write_chunk(samples.len()) {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(
                    "Capture ring buffer full; rejecting frame of {} samples",
                    samples.len()
                );
                return Err(());
            }
        };

        // Write may wrap; fill both slices
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        if split > 0 {
            first.copy_from_slice(&samples[..split]);
        }
        if !second.is_empty() {
            second.copy_from_slice(&samples[split..]);
        }
        chunk.commit_all();
        Ok(samples.len())
    }

    /// Check available space
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half, owned by the processing task.
pub struct AudioConsumer {
    consumer: Consumer<f32>,
}

impl AudioConsumer {
    /// Read up to `buffer.len()` samples (non-blocking). Returns the
    /// number of samples actually read.
    pub fn read(&mut self, buffer: &mut [f32]) -> usize {
        let chunk = match self.consumer.read_chunk(buffer.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                self.consumer.read_chunk(available).unwrap()
            }
        };

        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        let split = first.len();
        if split > 0 {
            buffer[..split].copy_from_slice(first);
        }
        if !second.is_empty() {
            buffer[split..split + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }

    /// Check available samples to read
    pub fn slots(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_samples() {
        let rb = AudioRingBuffer::new(1024);
        let (mut producer, mut consumer) = rb.split();

        let samples = vec![0.1f32, -0.2, 0.3, -0.4, 0.5];
        assert_eq!(producer.write(&samples).unwrap(), 5);

        let mut buffer = vec![0.0f32; 10];
        let read = consumer.read(&mut buffer);

        assert_eq!(read, 5);
        assert_eq!(&buffer[..5], &samples[..]);
    }

    #[test]
    fn overflow_rejects_whole_frame() {
        let rb = AudioRingBuffer::new(16);
        let (mut producer, mut _consumer) = rb.split();

        assert!(producer.write(&vec![0.5f32; 20]).is_err());
        assert!(producer.write(&vec![0.5f32; 16]).is_ok());
        assert!(producer.write(&[0.5f32]).is_err());
    }

    #[test]
    fn read_from_empty_returns_zero() {
        let rb = AudioRingBuffer::new(64);
        let (_producer, mut consumer) = rb.split();
        let mut buffer = vec![0.0f32; 32];
        assert_eq!(consumer.read(&mut buffer), 0);
    }
}
