//! Suggest Console entry point
//!
//! Usage:
//!   suggest-console [OPTIONS]
//!
//! Options:
//!   --relay-url <URL>          Relay base URL (default: http://127.0.0.1:3001)
//!   --content-type <TYPE>      Content type to ask about (default: H5P.Course)
//!   --config <FILE>            Configuration file
//!
//! Type a description and press Enter. Ctrl-C cancels the suggestion in
//! flight; Ctrl-C at the prompt or end of input exits.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use suggest_console::{render_events, Renderer, Session, Turn};
use suggest_core::{default_config_path, load_config_from_path, ConfigOverrides, HttpTransport};

/// Suggest Console - stream content suggestions from the relay
#[derive(Parser, Debug)]
#[command(name = "suggest-console")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SUGGEST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Relay base URL
    #[arg(short = 'r', long, value_name = "URL")]
    relay_url: Option<String>,

    /// Content type suggestions are requested for
    #[arg(short = 't', long, value_name = "TYPE")]
    content_type: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SUGGEST_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.relay_url {
            overrides = overrides.with_relay_url(url.clone());
        }
        if let Some(ref content_type) = self.content_type {
            overrides = overrides.with_content_type(content_type.clone());
        }
        overrides
    }
}

/// Initialize logging on stderr so stdout only carries suggestions
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "suggest_console={level},suggest_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

async fn interrupted() {
    // A failed handler registration means no interrupt ever arrives
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let consumer_config = config.consumer.clone();
    info!(
        relay = %consumer_config.relay_url,
        content_type = %consumer_config.content_type,
        "Console starting"
    );

    let transport = HttpTransport::new(&consumer_config.relay_url, consumer_config.open_timeout)
        .context("Failed to create relay client")?;
    let (mut session, events) = Session::new(transport, consumer_config);
    let renderer = tokio::spawn(render_events(events, Renderer::new(tokio::io::stdout())));

    eprintln!("Describe the content you want suggestions for. Ctrl-C cancels, Ctrl-D exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            () = interrupted() => None,
        };
        let Some(line) = line else { break };

        match session.ask(&line, interrupted()).await {
            Turn::Rejected(e) => eprintln!("[rejected: {e}]"),
            Turn::Skipped | Turn::Finished(_) => {}
        }
    }

    drop(session);
    renderer.await.context("Renderer task failed")?;
    Ok(())
}
