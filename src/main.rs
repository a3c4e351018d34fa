use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gator::commands::{self, AppState, Cli};
use gator::config::Config;
use gator::db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = Config::default_path()?;
    let config = Config::load(&config_path)?;
    debug!(path = %config_path.display(), "Loaded configuration");

    // Initialize database
    let db = Database::new(&config.database_url()).await?;
    db.initialize().await?;

    let mut state = AppState::new(db, config, config_path);
    let mut stdout = std::io::stdout();
    commands::run(&mut state, cli.command, &mut stdout).await
}
