use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use voxstream_audio::PcmChunk;
use voxstream_telemetry::{PipelineMetrics, PipelineStage};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket connect failed: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("WebSocket send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("WebSocket receive failed: {0}")]
    Receive(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("Server closed the connection mid-session")]
    UnexpectedClose,
}

/// Per-session WebSocket sink. Forwards every PCM16 chunk as one binary
/// message (chunk boundary == message boundary, no extra framing) and
/// surfaces text frames from the server as transcript lines.
///
/// Holds exactly one connection; when the chunk channel closes (the
/// streamer has flushed), it sends a Close frame, drains any trailing
/// transcripts, and finishes. No reconnection: a transport failure ends
/// the session.
pub struct WsSink {
    url: String,
    chunk_rx: mpsc::Receiver<PcmChunk>,
    transcript_tx: mpsc::Sender<String>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl WsSink {
    pub fn new(
        url: impl Into<String>,
        chunk_rx: mpsc::Receiver<PcmChunk>,
        transcript_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            url: url.into(),
            chunk_rx,
            transcript_tx,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Connect, then spawn the forwarding task. Connecting up front means
    /// an unreachable server fails the session before capture starts,
    /// instead of silently discarding chunks.
    pub async fn connect_and_spawn(
        self,
    ) -> Result<JoinHandle<Result<(), TransportError>>, TransportError> {
        let WsSink {
            url,
            chunk_rx,
            transcript_tx,
            metrics,
        } = self;

        let (ws, _response) = connect_async(url.as_str()).await.map_err(|e| {
            if let Some(m) = &metrics {
                m.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            TransportError::Connect(e)
        })?;
        tracing::info!("WebSocket connected to {}", url);

        Ok(tokio::spawn(Self::run_connected(
            ws,
            chunk_rx,
            transcript_tx,
            metrics,
        )))
    }

    async fn run_connected(
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut chunk_rx: mpsc::Receiver<PcmChunk>,
        transcript_tx: mpsc::Sender<String>,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Result<(), TransportError> {
        let (mut sender, mut receiver) = ws.split();

        // Stream until the chunk channel closes (session stop) or the
        // connection fails. The close handshake happens after the loop so
        // the receiver is not borrowed by two arms at once.
        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => match chunk {
                    Some(chunk) => {
                        let bytes = chunk.into_bytes();
                        let len = bytes.len();
                        if let Err(e) = sender.send(Message::Binary(bytes)).await {
                            if let Some(m) = &metrics {
                                m.transport_errors.fetch_add(1, Ordering::Relaxed);
                            }
                            return Err(TransportError::Send(e));
                        }
                        if let Some(m) = &metrics {
                            m.record_chunk_sent(len);
                            m.mark_stage_active(PipelineStage::Transport);
                        }
                        tracing::trace!("Sent {} byte chunk", len);
                    }
                    None => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        forward_transcript(&transcript_tx, &metrics, text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        if let Some(m) = &metrics {
                            m.transport_errors.fetch_add(1, Ordering::Relaxed);
                        }
                        return Err(TransportError::UnexpectedClose);
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by the protocol layer; binary
                        // from the server has no meaning here
                    }
                    Some(Err(e)) => {
                        if let Some(m) = &metrics {
                            m.transport_errors.fetch_add(1, Ordering::Relaxed);
                        }
                        return Err(TransportError::Receive(e));
                    }
                }
            }
        }

        // Streamer flushed and hung up: close politely and collect any
        // transcripts still in flight.
        tracing::info!("Chunk stream ended; closing WebSocket");
        let _ = sender.send(Message::Close(None)).await;
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    forward_transcript(&transcript_tx, &metrics, text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }
}

async fn forward_transcript(
    transcript_tx: &mpsc::Sender<String>,
    metrics: &Option<Arc<PipelineMetrics>>,
    text: String,
) {
    tracing::debug!("Transcript received ({} chars)", text.len());
    if let Some(m) = metrics {
        m.transcripts_received.fetch_add(1, Ordering::Relaxed);
    }
    // Nobody listening is not an error; the session may already be
    // tearing down.
    let _ = transcript_tx.send(text).await;
}
