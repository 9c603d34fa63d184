//! linechat Daemon - Line-oriented TCP broadcast chat server
//!
//! Every connected participant picks a unique name, receives the whole
//! conversation so far, then sees every line anyone sends.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (8080)
//! linechatd
//!
//! # Pick a port and interface
//! linechatd --port 9000 --bind 127.0.0.1
//!
//! # Load settings from a file, then override one of them
//! linechatd --config linechat.toml --max-sessions 10
//! ```
//!
//! Connect with any line-based client, e.g. `nc localhost 8080`.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use linechatd::{ChatServer, ServerConfig};

/// linechat daemon - TCP broadcast chat server
#[derive(Parser, Debug)]
#[command(name = "linechatd", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LINECHAT_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long, env = "LINECHAT_BIND")]
    bind: Option<String>,

    /// TOML file with server settings
    #[arg(short, long, env = "LINECHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of connected participants
    #[arg(long, env = "LINECHAT_MAX_SESSIONS")]
    max_sessions: Option<usize>,
}

impl Args {
    /// Defaults, then the config file, then flags and env vars.
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(max_sessions) = self.max_sessions {
            config.max_sessions = max_sessions;
        }

        config.validate().context("Invalid settings")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    run_daemon(config)
}

#[tokio::main]
async fn run_daemon(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("linechatd=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "linechat daemon starting"
    );

    let addr = config.listen_addr();
    let server = ChatServer::new(config);

    let shutdown = async {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = server.run_until(shutdown).await {
        error!(error = %e, "Server error");
        return Err(e).with_context(|| format!("Failed to serve on {addr}"));
    }

    info!("linechat daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
