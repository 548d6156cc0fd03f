//! edgelink demo client — entry point.
//!
//! ```text
//! edgelink-client                    Stream the synthetic test pattern
//! edgelink-client --file clip.y4m    Stream a Y4M file
//! edgelink-client --config <path>    Load a custom config TOML
//! edgelink-client --gen-config       Write default config to stdout
//! ```
//!
//! Frames are JPEG-encoded and sent on the configured image channel;
//! JSON results from the NetApp are printed as they arrive.

mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edgelink_core::{
    CallbackInfo, ChannelType, ClientError, ConnectionInfo, FrameSource, JpegOptions,
    NetAppClient, Payload, TestPatternSource, Y4mFileSource,
};

use config::ClientConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "edgelink-client", about = "Stream frames to a NetApp and print results")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "edgelink-client.toml")]
    config: PathBuf,

    /// NetApp address (overrides the config).
    #[arg(long)]
    address: Option<String>,

    /// NetApp port (overrides the config).
    #[arg(long)]
    port: Option<u16>,

    /// Stream this Y4M file instead of the synthetic pattern.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply CLI overrides.
    let mut config = ClientConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.netapp.address = address;
    }
    if let Some(port) = cli.port {
        config.netapp.port = port;
    }
    if let Some(file) = &cli.file {
        config.video.source = "file".into();
        config.video.file = file.display().to_string();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("edgelink-client v{}", env!("CARGO_PKG_VERSION"));
    let endpoint = ConnectionInfo::new(config.netapp.address.clone(), config.netapp.port);
    info!("netapp endpoint: {endpoint}");
    info!("video source: {}", config.video.source);

    // Results callback: print whatever the NetApp sends back.
    let mut callbacks = HashMap::new();
    callbacks.insert(
        "results".to_string(),
        CallbackInfo::with_error(
            ChannelType::Json,
            |payload, timestamp_ns| {
                if let Payload::Json(value) = payload {
                    info!(timestamp_ns, "results: {value}");
                }
            },
            |raw, reason| {
                warn!(bytes = raw.len(), %reason, "undecodable result payload");
            },
        ),
    );
    let client = NetAppClient::new(callbacks)?;

    // Ctrl-C handler.
    let stopped = Arc::new(AtomicBool::new(false));
    let stopped_clone = Arc::clone(&stopped);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        stopped_clone.store(true, Ordering::SeqCst);
    });

    // Connect, optionally retrying until the NetApp is available.
    connect_with_retry(&client, &endpoint, &config, &stopped).await?;

    // Open the frame source.
    let mut source: Box<dyn FrameSource> = if config.video.source == "file" {
        Box::new(Y4mFileSource::open(&config.video.file)?)
    } else {
        Box::new(TestPatternSource::new(
            config.video.width,
            config.video.height,
            config.video.fps,
        )?)
    };

    // Capture loop: JPEG-encode each frame and send it with its
    // capture timestamp.
    let interval = Duration::from_secs_f64(1.0 / source.fps().max(1.0));
    let options = JpegOptions {
        quality: config.video.jpeg_quality,
    };
    let mut sent: u64 = 0;
    while !stopped.load(Ordering::SeqCst) {
        let loop_start = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(sent, "source reached end of stream");
                break;
            }
            Err(e) => {
                error!(error = %e, "capture failed");
                break;
            }
        };

        match client
            .send_image(
                &frame,
                &config.video.channel,
                ChannelType::Jpeg,
                None,
                Some(options.clone()),
                None,
            )
            .await
        {
            Ok(()) => sent += 1,
            Err(ClientError::NotConnected) => {
                error!("connection lost");
                break;
            }
            Err(e) => {
                error!(error = %e, "send failed");
                break;
            }
        }

        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }

    info!(sent, "disconnecting");
    client.disconnect().await;
    Ok(())
}

/// Dial the NetApp, retrying once a second while
/// `wait_until_available` is set and the retry budget lasts.
async fn connect_with_retry(
    client: &NetAppClient,
    endpoint: &ConnectionInfo,
    config: &ClientConfig,
    stopped: &AtomicBool,
) -> Result<(), ClientError> {
    let timeout = Duration::from_secs(config.netapp.connect_timeout_secs.max(1));
    let start = Instant::now();
    loop {
        match client.connect(endpoint, timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                let budget_spent = config.netapp.wait_timeout_secs >= 0
                    && start.elapsed().as_secs() as i64 >= config.netapp.wait_timeout_secs;
                if !config.netapp.wait_until_available
                    || budget_spent
                    || stopped.load(Ordering::SeqCst)
                {
                    return Err(e);
                }
                warn!(error = %e, "failed to connect to the NetApp; retrying in 1 second");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
