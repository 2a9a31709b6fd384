use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use gator::commands::{self, Command, Session};
use gator::config::Config;
use gator::feed::FeedClient;
use gator::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

/// Create `dir` if missing and restrict it to the current user.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Polling RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides `db_path` from the config)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let client = FeedClient::new(config.request_timeout(), &config.user_agent())
        .context("Failed to create HTTP client")?;

    let mut stdout = std::io::stdout();

    // One-shot fetch never opens the store
    if let Command::Fetch { url } = &args.command {
        return commands::fetch_and_print(&client, url, &mut stdout).await;
    }

    let db_path = match args.db.or_else(|| config.db_path.clone()) {
        Some(path) => path,
        None => {
            let dir = get_config_dir()?;
            ensure_private_dir(&dir)?;
            dir.join("gator.db")
        }
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            ensure_private_dir(parent)?;
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The gator database is locked by another process. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let mut session = Session {
        db,
        client,
        config,
        config_path,
    };
    commands::run(args.command, &mut session, &mut stdout).await
}
