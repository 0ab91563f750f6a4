//! Credential and session authority server.
//!
//! Serves the warden HTTP API over PostgreSQL, or over an in-memory store
//! for local development.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use pico_args::Arguments;
use tracing::info;
use warden::db::{Database, InMemoryStore};
use warden::identity::{GithubProvider, GoogleProvider, ProviderRegistry};
use warden::mail::{ChannelMailQueue, MailMessage};
use warden::risk::{DisabledLocator, GeoLocator, IpApiLocator};
use warden::{Stores, Warden};
use warden_server::api::{self, AppState};
use warden_server::config::ServerConfig;
use warden_server::logging;

const HELP: &str = "\
Run the warden credential and session server

USAGE:
  warden_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Use a throwaway in-memory store instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  ACCESS_TOKEN_SECRET      Access credential signing secret (>= 32 chars)
  REFRESH_TOKEN_SECRET     Refresh credential signing secret (>= 32 chars)
  PASSWORD_PEPPER          Password hashing pepper (>= 16 chars)
  FRONTEND_URL             Frontend origin for emailed links
  TRUSTED_PROXIES          Comma-separated proxy IPs allowed to set X-Forwarded-For
  GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, GOOGLE_REDIRECT_URL
  GITHUB_CLIENT_ID, GITHUB_CLIENT_SECRET, GITHUB_REDIRECT_URL
  (A .env file in the working directory is loaded if present)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory: pargs.contains("--memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.memory)?;
    info!("Starting warden server at {}", config.bind);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let (stores, database) = match &config.database {
        Some(db_config) => {
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            info!("Database connected successfully");
            (Stores::postgres(db.pool().clone()), Some(db))
        }
        None => {
            info!("Using in-memory store; all data is lost on exit");
            (Stores::memory(Arc::new(InMemoryStore::new())), None)
        }
    };

    let geo: Arc<dyn GeoLocator> = if config.geolocation.enabled {
        Arc::new(IpApiLocator::new(http.clone(), config.geolocation.url.clone()))
    } else {
        info!("Geolocation disabled");
        Arc::new(DisabledLocator)
    };

    let mut providers = ProviderRegistry::new();
    if let Some(google) = config.providers.google.clone() {
        providers.register(Arc::new(GoogleProvider::new(http.clone(), google)));
    }
    if let Some(github) = config.providers.github.clone() {
        providers.register(Arc::new(GithubProvider::new(http.clone(), github)));
    }
    info!("Identity providers: {:?}", providers.kinds());

    let (mail, outbox) = ChannelMailQueue::new(config.mail_queue_capacity);
    tokio::spawn(drain_outbox(outbox));

    let warden = Warden::new(
        &config.warden_config(),
        stores,
        geo,
        Arc::new(mail),
        providers,
    );

    let state = AppState::new(
        warden,
        database,
        config.frontend_url.clone(),
        config.cookie_secure,
    )
    .with_trusted_proxies(config.trusted_proxies.clone());
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");

    Ok(())
}

/// Delivery worker for the outbound mail queue.
///
/// No transport is wired in. Only the envelope is logged since bodies carry
/// live one-time tokens.
async fn drain_outbox(mut outbox: tokio::sync::mpsc::Receiver<MailMessage>) {
    while let Some(message) = outbox.recv().await {
        info!("Outbound mail {}", envelope(&message));
    }
}

fn envelope(message: &MailMessage) -> String {
    format!("to={} subject={:?}", message.to, message.subject)
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
