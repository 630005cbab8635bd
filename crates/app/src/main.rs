use clap::Parser;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use voxstream_app::runtime::{self, SessionOptions};
use voxstream_app::Settings;
use voxstream_audio::DeviceManager;
use voxstream_foundation::ShutdownHandler;

#[derive(Parser, Debug)]
#[command(name = "voxstream", about = "Stream microphone audio to a transcription server over WebSocket")]
struct Cli {
    /// WebSocket URL of the transcription server
    #[arg(long, env = "VOXSTREAM_SERVER_URL")]
    url: Option<String>,

    /// Input device name (exact or substring match)
    #[arg(long, env = "VOXSTREAM_DEVICE")]
    device: Option<String>,

    /// Chunk duration in milliseconds at the 16 kHz target rate
    #[arg(long)]
    chunk_ms: Option<u64>,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "voxstream.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let manager = DeviceManager::new()?;
    let devices = manager.enumerate_devices();
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }
    for d in devices {
        let mark = if d.is_default { " (default)" } else { "" };
        println!("{}{}", d.name, mark);
        for cfg in d.supported_configs.iter().take(3) {
            println!("    {} ch @ {} Hz", cfg.channels, cfg.sample_rate.0);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging()?;

    if cli.list_devices {
        return list_devices();
    }

    tracing::info!("Starting VoxStream");

    let mut settings = Settings::new()?;
    if let Some(url) = cli.url {
        settings.server_url = url;
    }
    if let Some(device) = cli.device {
        settings.device = Some(device);
    }
    if let Some(chunk_ms) = cli.chunk_ms {
        settings.chunk_ms = chunk_ms;
    }
    settings.validate()?;

    let shutdown = ShutdownHandler::new().install().await;

    let opts = SessionOptions {
        server_url: settings.server_url.clone(),
        device: settings.device.clone(),
        chunk_size_samples: settings.chunk_size_samples(),
        silence_threshold: settings.silence_threshold,
    };
    let mut session = runtime::start(opts).await?;
    tracing::info!("Recording; press Ctrl-C to stop");

    // Print transcripts as the server produces them
    let mut transcript_rx = session
        .take_transcripts()
        .expect("transcript receiver already taken");
    let printer = tokio::spawn(async move {
        while let Some(text) = transcript_rx.recv().await {
            println!("{}", text);
        }
    });

    let time_limit = async {
        match cli.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(time_limit);

    let metrics = session.metrics.clone();
    let mut stats_interval = tokio::time::interval(Duration::from_secs(10));
    stats_interval.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = &mut time_limit => {
                tracing::info!("Duration limit reached");
                break;
            }
            _ = stats_interval.tick() => {
                tracing::info!(
                    "chunks sent: {}, bytes: {}, dropped: {}, level: {:.1} dB",
                    metrics.chunks_sent.load(Ordering::Relaxed),
                    metrics.bytes_sent.load(Ordering::Relaxed),
                    metrics.chunks_dropped.load(Ordering::Relaxed),
                    metrics.audio_level_db.load(Ordering::Relaxed) as f64 / 10.0,
                );
            }
        }
    }

    session.shutdown().await?;
    let _ = printer.await;
    tracing::info!("Goodbye");

    Ok(())
}
