//! Guardrail service.
//!
//! ```text
//!     Client request
//!          │
//!          ▼
//!   ┌─────────────┐   ┌──────────────┐   ┌───────────────────────────┐
//!   │ http server │──▶│ rate limiter │──▶│ handlers                  │
//!   │ id/trace    │   │ ip, then user│   │  url guard                │
//!   └─────────────┘   └──────────────┘   │  text sanitizer           │
//!                                        │  file integrity validator │
//!                                        │  ordering coordinator     │
//!                                        └─────────────┬─────────────┘
//!                                                      ▼
//!                                                 order store
//!
//!   config (TOML + watcher) · observability (tracing, prometheus) · lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use guardrail::config::{load_config, watcher::ConfigWatcher, GuardConfig};
use guardrail::lifecycle::{signals, Shutdown};
use guardrail::observability::{logging, metrics};
use guardrail::HttpServer;

#[derive(Parser)]
#[command(name = "guardrail")]
#[command(about = "Input validation and rate limiting service", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "guardrail starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    HttpServer::new(config)
        .run(listener, config_updates, &shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
