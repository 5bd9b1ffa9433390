//! pepi-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store and serves the JSON API under `/api`.
//!
//! # First admin
//!
//! No admin exists to authorise the first registration, so seed one:
//!
//! ```
//! cargo run -p pepi-server -- bootstrap-admin \
//!   --name "Dana Whitfield" --badge-number 1001 \
//!   --email dana@unit.example --user-id <uuid>
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use pepi_api::{AppState, api_router};
use pepi_core::{
  agent::{NewAgent, Role},
  directory,
  pipeline::Dispatch,
  workflow::WorkflowConfig,
};
use pepi_server::{EmailNotifier, ServerConfig};
use pepi_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "PEPI fund accounting server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Insert the first admin agent and exit.
  BootstrapAdmin {
    #[arg(long)]
    name:         String,
    #[arg(long)]
    badge_number: String,
    #[arg(long)]
    email:        Option<String>,
    /// External identity the auth proxy will send as `x-user-id`.
    #[arg(long)]
    user_id:      Uuid,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg =
    ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(server_cfg, store).await,
    Command::BootstrapAdmin { name, badge_number, email, user_id } => {
      let input = NewAgent { name, badge_number, email, role: Role::Admin, user_id };
      let agent = directory::bootstrap_admin(&store, input)
        .await
        .context("failed to bootstrap admin")?;
      println!("admin {} created (badge {})", agent.id, agent.badge_number);
      Ok(())
    }
  }
}

async fn serve(server_cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let notifier = EmailNotifier::from_config(&server_cfg.email)
    .context("failed to configure email provider")?;
  tracing::info!(provider = notifier.name(), "email provider ready");

  let workflow = WorkflowConfig {
    dispatch: Dispatch::Background,
    app_url:  server_cfg.email.app_url.clone(),
  };
  let state = AppState::new(Arc::new(store), Arc::new(notifier), workflow);

  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
