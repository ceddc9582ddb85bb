//! visit-quota: profile visit quota service
//!
//! Serves the gate and settings API for a host member site.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use visit_quota::api::{ApiServer, AppState};
use visit_quota::config::LoggingConfig;
use visit_quota::host::{NoticeBuffer, SystemClock};
use visit_quota::storage::SqliteHost;
use visit_quota::{Config, Gate};

#[derive(Parser, Debug)]
#[command(name = "visit-quota")]
#[command(about = "Role based daily profile visit quota service")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("visit_quota={},tower_http=info", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    init_tracing(&config.logging);

    info!("Starting visit-quota v{}", env!("CARGO_PKG_VERSION"));
    info!("  API listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.storage.database_url);
    info!("  Site: {} (UTC{:+} min)", config.site.site_url, config.site.utc_offset_minutes);
    if config.server.api_token.is_none() {
        info!("  No API token configured, /api is open");
    }

    let host = Arc::new(SqliteHost::connect(&config.storage.database_url).await?);
    let notices = Arc::new(NoticeBuffer::new());
    let gate = Gate::for_host(host.clone(), notices.clone(), Arc::new(SystemClock), &config)?;

    let state = AppState {
        gate,
        registry: host,
        notices,
        api_token: config.server.api_token.clone(),
    };

    ApiServer::new(state, config.server.listen_addr.clone())
        .run()
        .await?;

    Ok(())
}
