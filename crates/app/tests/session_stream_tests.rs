//! End-to-end test of the streaming graph below the capture layer:
//! ring buffer -> frame reader -> streamer -> WebSocket sink -> server.
//!
//! Capture itself needs real hardware; here samples are written straight
//! into the ring buffer at the identity rate so the bytes reaching the
//! server must reproduce the input exactly.

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use std::sync::atomic::Ordering;

use voxstream_audio::pipeline::encode_pcm16;
use voxstream_audio::{AudioRingBuffer, AudioStreamer, FrameReader, StreamerConfig};
use voxstream_transport::WsSink;

#[tokio::test]
async fn full_stream_reaches_server_byte_exact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut received: Vec<Vec<u8>> = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Binary(bytes) => received.push(bytes),
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    // 20k samples at the 16 kHz target rate: two full 8000-sample chunks
    // plus a 4000-sample flush remainder.
    let samples: Vec<f32> = (0..20_000)
        .map(|i| (i as f32 / 20_000.0) * 1.6 - 0.8)
        .collect();

    let ring = AudioRingBuffer::new(65_536);
    let (mut producer, consumer) = ring.split();
    producer.write(&samples).unwrap();

    let reader = FrameReader::new(consumer, 16_000, 1, 65_536, None);
    let (chunk_tx, chunk_rx) = mpsc::channel(32);
    let streamer = AudioStreamer::new(
        reader,
        chunk_tx,
        StreamerConfig {
            chunk_size_samples: 8_000,
            target_rate_hz: 16_000,
        },
    );
    let running = streamer.running_flag();
    let streamer_handle = streamer.spawn();

    let (transcript_tx, _transcript_rx) = mpsc::channel(8);
    let sink = WsSink::new(format!("ws://{}", addr), chunk_rx, transcript_tx)
        .connect_and_spawn()
        .await
        .unwrap();

    // Stop immediately: the worker's shutdown drain must still push every
    // sample through, ending with the partial flush chunk.
    running.store(false, Ordering::SeqCst);
    streamer_handle.await.unwrap();
    sink.await.unwrap().unwrap();

    let received = server.await.unwrap();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].len(), 16_000);
    assert_eq!(received[1].len(), 16_000);
    assert_eq!(received[2].len(), 8_000);

    let all: Vec<u8> = received.concat();
    assert_eq!(all, encode_pcm16(&samples));
}
