use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyring_server::{
    Config, MemoryDirectory, MemoryStore, Registrar, Server, SessionManager, account_routes,
};

#[derive(Parser)]
#[command(name = "keyring-server")]
#[command(about = "Keyring web service", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), keyring_server::Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.bind_address,
        api_root = %config.api_root,
        "configuration loaded"
    );

    let mut registrar = Registrar::new(config.api_root.clone());
    registrar.api_index(config.api.index);
    account_routes(&mut registrar, Arc::new(MemoryDirectory::new(config.accounts.bcrypt_cost)))?;

    let sessions = SessionManager::new(Arc::new(MemoryStore::new()), config.session.cookie_name.clone());
    let app = registrar.finish(sessions)?;

    Server::bind(&config.bind_address)?.serve(app).await
}
