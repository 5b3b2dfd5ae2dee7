//! Suggest Relay - HTTP relay between the editor and the model server
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3001, upstream http://localhost:11434)
//! suggest-relay
//!
//! # Custom upstream and model
//! suggest-relay --upstream-url http://gpu-box:11434 --model llama3.1
//!
//! # With config file
//! suggest-relay --config ~/.config/suggest/suggest.toml
//!
//! # Verbose logging
//! RUST_LOG=debug suggest-relay
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: stop accepting connections and drain open streams

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use suggest_core::{
    default_config_path, load_config_from_path, ConfigOverrides, GenerationBackend,
    OllamaBackend, PromptBuilder, Relay,
};
use suggest_relay::{router, serve, shutdown_signal, AppState};

/// Suggest Relay - streams model suggestions to the authoring editor
#[derive(Parser, Debug)]
#[command(name = "suggest-relay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SUGGEST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Model server base URL
    #[arg(short = 'u', long, value_name = "URL")]
    upstream_url: Option<String>,

    /// Model to request suggestions from
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Allow cross-origin requests from any origin
    #[arg(long)]
    cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SUGGEST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.upstream_url {
            overrides = overrides.with_upstream_url(url.clone());
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(ref host) = self.host {
            overrides = overrides.with_host(host.clone());
        }
        if let Some(port) = self.port {
            overrides = overrides.with_port(port);
        }
        if self.cors {
            overrides = overrides.with_cors(true);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "suggest_relay={level},suggest_core={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Log whether the configured model is available upstream
///
/// Startup continues either way; requests fail with the upstream's
/// error until the model server is reachable and the model is pulled.
async fn check_upstream(backend: &OllamaBackend, model: &str) {
    match backend.has_model(model).await {
        Ok(true) => info!(model = %model, "Model available upstream"),
        Ok(false) => warn!(model = %model, "Model not found upstream, pull it before use"),
        Err(e) => warn!(error = %e, upstream = %backend.base_url(), "Model server not reachable"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level)?;

    info!("Suggest relay starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        upstream = %config.upstream.base_url,
        model = %config.upstream.model,
        "Configuration loaded"
    );

    let backend = Arc::new(
        OllamaBackend::from_config(&config.upstream).context("Failed to create upstream client")?,
    );
    check_upstream(&backend, &config.upstream.model).await;

    let relay = Relay::new(backend, PromptBuilder::from_config(&config));
    let app = router(
        AppState::new(relay, config.upstream.base_url.clone()),
        config.relay.cors,
    );

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Relay listening");

    serve(listener, app, shutdown_signal())
        .await
        .context("Relay server failed")?;

    info!("Suggest relay stopped cleanly");
    Ok(())
}
