use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;

use chapterwatch::api::TrackerApi;
use chapterwatch::app::{App, AppEvent};
use chapterwatch::channel::channel_url;
use chapterwatch::config::Config;
use chapterwatch::dom::Viewport;
use chapterwatch::preferences::PreferenceManager;
use chapterwatch::storage::{StateStore, StorageError};
use chapterwatch::ui::{self, actions, table};

/// Get the config directory path (~/.config/chapterwatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("chapterwatch");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "chapterwatch",
    about = "Live view of a self-hosted chapter tracker"
)]
struct Args {
    /// Tracker server URL (overrides server_url in config.toml)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Category to open (defaults to default_category in config.toml)
    #[arg(long, value_name = "NAME")]
    category: Option<String>,

    /// Config file (defaults to ~/.config/chapterwatch/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Forget stored preferences and section states
    #[arg(long)]
    reset_state: bool,

    /// Start a full update of the category on launch
    #[arg(long)]
    force_update: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        eprintln!("Created config directory: {}", config_dir.display());
    }

    // Stored state is user-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    let category = args
        .category
        .clone()
        .unwrap_or_else(|| config.default_category.clone());

    // Open the client state store
    let db_path = config_dir.join("state.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in state path"))?;
    let store = match StateStore::open(db_path_str).await {
        Ok(store) => store,
        Err(StorageError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of chapterwatch appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open state store: {}", e));
        }
    };

    if args.reset_state {
        let removed = store.clear().await.context("Failed to reset stored state")?;
        tracing::info!(removed, "Stored state reset");
        eprintln!("Stored state reset.");
    }

    let prefs = PreferenceManager::load(&config, &store)
        .await
        .context("Failed to load preferences")?;
    let api = TrackerApi::new(&config.server_url, config.request_timeout())
        .context("Invalid server URL")?;
    let ws_url = channel_url(api.base_url(), &config.channel_path)
        .context("Failed to derive live channel URL")?;

    // Create event channel for background tasks
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(32);

    let viewport = Viewport::new(config.viewport_width, config.viewport_height);
    let mut app = App::new(api, prefs, &category, viewport, event_tx);
    tracing::info!(server = %config.server_url, category = %category, "Starting");

    app.connect_channel(ws_url, config.reconnect_delay());
    actions::refresh_categories(&mut app);
    table::refresh(&mut app);
    if args.force_update {
        actions::force_update(&mut app);
    }

    ui::run(
        &mut app,
        event_rx,
        config.time_refresh_interval(),
        config.nav_poll_interval(),
    )
    .await?;

    eprintln!("Goodbye!");
    Ok(())
}
