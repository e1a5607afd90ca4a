//! Brick Player: headless entry point.
//!
//! Loads the player configuration and a controller profile, starts the remote
//! event listener, and runs one play session over the configured devices
//! until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! brick-player [OPTIONS]
//!
//! Options:
//!   --config    <PATH>   Config file [default: platform config dir]
//!   --profile   <PATH>   Controller profile TOML
//!   --port      <PORT>   Remote event listener port [default: 8080]
//!   --bind      <ADDR>   Remote event listener address [default: 0.0.0.0]
//!   --log-level <LEVEL>  tracing filter [default: info]
//! ```
//!
//! Every option can also be set through a `BRICK_PLAYER_*` environment
//! variable (`BRICK_PLAYER_PROFILE`, `BRICK_PLAYER_PORT`, …).  Options given on
//! the command line override the config file; `RUST_LOG` overrides both for
//! logging.
//!
//! # Architecture overview
//!
//! ```text
//! phone / browser ──HTTP GET──► RemoteEventListener ──► EventMultiplexer
//!                                                            │
//!                                                  PlayerSession mapping task
//!                                                            │
//!                                          ConnectionOrchestrator + devices
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use brick_core::ControllerProfile;
use brick_player::application::multiplexer::{EventMultiplexer, DEFAULT_QUEUE_CAPACITY};
use brick_player::application::session::{PlayerSession, SessionOptions};
use brick_player::infrastructure::console::ConsoleObserver;
use brick_player::infrastructure::device::simulated::devices_from_entries;
use brick_player::infrastructure::network::RemoteEventListener;
use brick_player::infrastructure::storage::config::{self, PlayerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Drive toy motor hubs from local and remote game-controller input.
#[derive(Debug, Parser)]
#[command(name = "brick-player", version)]
struct Cli {
    /// Config file to use instead of the platform config directory.
    #[arg(long, env = "BRICK_PLAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Controller profile to play.  Without one, events are received and
    /// echoed but drive nothing.
    #[arg(long, env = "BRICK_PLAYER_PROFILE")]
    profile: Option<PathBuf>,

    /// Remote event listener port.
    #[arg(long, env = "BRICK_PLAYER_PORT")]
    port: Option<u16>,

    /// Remote event listener bind address.
    #[arg(long, env = "BRICK_PLAYER_BIND")]
    bind: Option<String>,

    /// `tracing` filter directive, e.g. `debug` or `brick_player=trace`.
    #[arg(long, env = "BRICK_PLAYER_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Reads the config file named on the command line, or the platform one.
    fn load_config(&self) -> anyhow::Result<PlayerConfig> {
        match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("cannot load config {}", path.display())),
            None => match config::load_config() {
                Err(config::ConfigError::NoPlatformConfigDir) => Ok(PlayerConfig::default()),
                other => other.context("cannot load config"),
            },
        }
    }

    /// Command-line values win over the config file.
    fn apply_overrides(&self, cfg: &mut PlayerConfig) {
        if let Some(port) = self.port {
            cfg.listener.port = port;
        }
        if let Some(bind) = &self.bind {
            cfg.listener.bind_address = bind.clone();
        }
        if let Some(level) = &self.log_level {
            cfg.player.log_level = level.clone();
        }
    }

    fn load_profile(&self) -> anyhow::Result<ControllerProfile> {
        match &self.profile {
            Some(path) => config::load_profile(path)
                .with_context(|| format!("cannot load profile {}", path.display())),
            None => Ok(ControllerProfile::new("(none)")),
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = cli.load_config()?;
    cli.apply_overrides(&mut cfg);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&cfg.player.log_level))
        .init();

    let profile = cli.load_profile()?;
    info!(profile = %profile.name, devices = cfg.devices.len(), "Brick Player starting");

    let multiplexer = EventMultiplexer::start(DEFAULT_QUEUE_CAPACITY);

    // ── Remote event listener ─────────────────────────────────────────────────
    let mut listener = RemoteEventListener::new(multiplexer.source("remote"));
    if cfg.listener.enabled {
        let addr = cfg.listener.socket_addr()?;
        listener
            .start(addr)
            .await
            .context("cannot start remote event listener")?;
    }

    // ── Play session ──────────────────────────────────────────────────────────
    let exit = CancellationToken::new();
    let observer = Arc::new(ConsoleObserver::new(exit.clone()));
    let options = SessionOptions {
        keep_running_in_background: cfg.player.keep_running_in_background,
        bluetooth_enabled: cfg.player.bluetooth_enabled,
    };
    let mut session = PlayerSession::start(
        profile,
        devices_from_entries(&cfg.devices),
        multiplexer.clone(),
        observer.clone(),
        options,
    )
    .context("cannot start play session")?;

    info!("Brick Player ready.  Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            _ = exit.cancelled() => break,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for Ctrl+C: {e}");
                    break;
                }
                // First Ctrl+C while connecting only aborts the attempt; the
                // failed attempt then cancels `exit`.
                if !observer.cancel_progress() {
                    info!("shutdown requested");
                    break;
                }
            }
        }
    }

    session.end().await;
    listener.stop().await;
    info!("Brick Player stopped");
    Ok(())
}
