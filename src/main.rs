//! Zentinel SOAP header inspector binary.
//!
//! Run with: `zentinel-soap-headers --config config.yaml message.xml`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_headers::{
    detect_envelope_version, HeaderCollection, HeaderEngineConfig, HeaderReport, MessageVersion, XmlBuffer,
};

/// SOAP header inspector for Zentinel proxy.
///
/// Scans the header block of a SOAP message, classifies its WS-Addressing headers
/// and reports MustUnderstand headers the message carries.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Also print the re-serialized header block
    #[arg(long)]
    emit_header_block: bool,

    /// SOAP message to inspect
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP header inspector v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        HeaderEngineConfig::from_yaml(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        HeaderEngineConfig::default()
    };

    info!(
        envelope = %config.message_version.envelope,
        addressing = %config.message_version.addressing,
        max_size_of_headers = config.quotas.max_size_of_headers,
        "Configuration loaded"
    );

    let message = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read message {}", args.input.display()))?;

    let envelope = detect_envelope_version(&message).context("Failed to detect envelope version")?;
    if envelope != config.message_version.envelope {
        warn!(
            detected = %envelope,
            configured = %config.message_version.envelope,
            "Envelope version differs from configuration, using detected version"
        );
    }
    let version = MessageVersion::new(envelope, config.message_version.addressing);

    let buffer = Arc::new(XmlBuffer::with_quotas(message, config.quotas));
    let mut headers = HeaderCollection::from_buffered_message(version, buffer, &config)
        .context("Failed to scan message headers")?;

    info!(headers = headers.len(), version = %version, "Message scanned");

    let block = if args.emit_header_block {
        Some(headers.header_block_string().context("Failed to write header block")?)
    } else {
        None
    };

    let report = HeaderReport::build(&mut headers).context("Failed to build header report")?;
    if !report.mandatory_headers_understood {
        warn!(
            count = report.not_understood.len(),
            "Message carries MustUnderstand headers that are not understood"
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );
    if let Some(block) = block {
        println!("{}", block);
    }

    Ok(())
}
