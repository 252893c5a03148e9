//! # rapport-daemon
//!
//! Rapport server binary: loads settings, wires the session hub to JSONL
//! persistence and the token table, and serves `WebSocket` connections until
//! interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rapport_core::clock::SystemClock;
use rapport_core::logging::init_subscriber;
use rapport_server::hub::{Hub, HubDeps};
use rapport_server::{RapportServer, ServerConfig, StaticTokenAuthenticator, metrics};
use rapport_session::{JsonlPersistence, SessionConfig};
use rapport_settings::RapportSettings;

/// Rapport live interview session server.
#[derive(Parser, Debug)]
#[command(name = "rapport", about = "Rapport live interview session server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.rapport/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory for session records (overrides settings).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<RapportSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(rapport_settings::settings_path);
        let mut settings = rapport_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.ws_port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

/// Assemble the server from settings.
fn build_server(settings: &RapportSettings, data_dir: PathBuf) -> RapportServer {
    let store = JsonlPersistence::new(data_dir);
    let auth = StaticTokenAuthenticator::new(settings.server.auth.tokens.iter().cloned());
    if auth.is_empty() {
        tracing::warn!("no connect tokens configured; every connection will be refused");
    }

    let config = ServerConfig::from_settings(settings);
    let hub = Hub::new(
        &config,
        SessionConfig::from_settings(settings),
        HubDeps {
            persistence: Arc::new(store.clone()),
            reader: Arc::new(store),
            auth: Arc::new(auth),
            clock: Arc::new(SystemClock),
        },
    );
    RapportServer::new(config, Arc::new(hub))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| rapport_settings::resolve_persistence_dir(&settings));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create directory: {}", data_dir.display()))?;

    let mut server = build_server(&settings, data_dir.clone());
    match metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!(data_dir = %data_dir.display(), "Rapport listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server
        .shutdown()
        .graceful_shutdown(server.hub(), handle, server.config().shutdown_timeout)
        .await;
    tracing::info!(
        aborted_sessions = report.aborted_sessions,
        listener_aborted = report.listener_aborted,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cli_without_args_keeps_settings() {
        let cli = Cli::parse_from(["rapport"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.data_dir.is_none());
    }

    #[test]
    fn cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"wsPort": 9000}}"#).unwrap();

        let cli = Cli::parse_from([
            "rapport",
            "--settings",
            path.to_str().unwrap(),
            "--port",
            "0",
            "--host",
            "0.0.0.0",
            "--log-level",
            "debug",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.ws_port, 0);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cli = Cli::parse_from(["rapport", "--settings", path.to_str().unwrap()]);
        assert!(cli.load_settings().is_err());
    }

    #[tokio::test]
    async fn server_starts_and_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RapportSettings::default();
        settings.server.ws_port = 0;

        let server = build_server(&settings, dir.path().to_path_buf());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        let report = server
            .shutdown()
            .graceful_shutdown(server.hub(), handle, Duration::from_secs(5))
            .await;
        assert!(!report.listener_aborted);
        assert_eq!(report.aborted_sessions, 0);
    }
}
