//! Report server entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use narrative_gen::GateConfig;
use report_server::config::{Credentials, Directories, Settings};
use report_server::{router, AppState};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for the report server
#[derive(Parser, Debug)]
#[command(name = "report-server")]
#[command(about = "Climate adaptation plan report generator")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory holding uploaded/, output/, cache/ and mural_data/
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Settings file with default metadata and heading overrides
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Outbound text generation budget per minute
    #[arg(long, default_value = "10")]
    ai_requests_per_minute: u32,

    /// Minutes a finished task stays pollable
    #[arg(long, default_value = "60")]
    progress_ttl_minutes: u32,

    /// Rate limit: requests per second per IP
    #[arg(long, default_value = "10")]
    rate_limit: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    info!("Starting report server on {}:{}", args.host, args.port);

    let settings = Settings::load(&args.settings)?;
    let gate_config = GateConfig {
        requests_per_minute: args.ai_requests_per_minute.max(1),
        ..GateConfig::default()
    };
    let state = AppState::new(
        Directories::under(&args.data_dir),
        settings,
        Credentials::from_env(),
        gate_config,
    )?;

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.max(1).into())
            .burst_size(args.rate_limit.max(1) * 2)
            .finish()
            .ok_or_else(|| anyhow!("invalid rate limit {}", args.rate_limit))?,
    );

    // Periodically drop stale per-IP limiter entries
    let limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    // Forget finished tasks once clients have had time to fetch them
    let progress_state = state.clone();
    let progress_ttl = chrono::Duration::minutes(i64::from(args.progress_ttl_minutes.max(1)));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            progress_state.evict_finished(progress_ttl);
        }
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(cors)
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
