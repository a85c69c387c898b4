use anyhow::{Context, Result};
use shelf::cli::{Args, execute};
use shelf::config::{ConfigDiscovery, ShelfConfig};
use shelf::{LibraryClient, SessionEvent, env};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "shelf=debug" } else { "shelf=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = args.command else {
        anyhow::bail!("No command specified. Use 'shelf --help' to see available commands.");
    };

    if !command.needs_client() {
        ConfigDiscovery::show_discovery_info();
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    info!("Using library service at {}", config.api.base_url);

    let client = LibraryClient::from_config(&config)?;
    let mut session_events = client.session_events();

    if let Some(user) = client.initialize().await {
        info!("Resumed session of {}", user.username);
    }

    let result = execute(&client, command).await;

    while let Ok(event) = session_events.try_recv() {
        if let SessionEvent::Expired { reason } = event {
            error!("Session ended by the service: {}", reason);
            eprintln!("Your session has expired. Sign in again with `shelf login`.");
        }
    }

    result
}

fn load_config(path: Option<&std::path::Path>) -> Result<ShelfConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            let mut config = ShelfConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            config.apply_api_url_override(std::env::var(env::API_URL_ENV).ok());
            Ok(config)
        }
        None => {
            let (config, _) = ConfigDiscovery::discover().context("Failed to discover configuration")?;
            Ok(config)
        }
    }
}
