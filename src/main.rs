use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stockscope::analysis::Analyzer;
use stockscope::api::{AlphaVantageClient, GeminiClient};
use stockscope::config::Settings;
use stockscope::quota::AnalysisQuota;
use stockscope::screener::Screener;
use stockscope::store::PostgresStore;
use stockscope::sync::Synchronizer;
use stockscope::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "stockscope", about = "Market data, screening and AI analysis service")]
struct Cli {
    /// Configuration file (optional; environment variables always apply)
    #[arg(long)]
    config: Option<String>,

    /// Override the configured bind address, e.g. 127.0.0.1:3000
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;

    tracing::info!("🚀 stockscope starting");

    let store = Arc::new(
        PostgresStore::connect(&settings.database.url, settings.database.max_connections)
            .await
            .context("failed to connect to Postgres")?,
    );

    let provider = AlphaVantageClient::new(settings.providers.alphavantage_api_key.clone())
        .context("failed to build market data client")?;
    let model = GeminiClient::new(settings.providers.gemini_api_key.clone())
        .context("failed to build model client")?;

    let synchronizer = Arc::new(Synchronizer::new(Arc::clone(&store), provider));
    let screener = Arc::new(Screener::new(Arc::clone(&store)));
    let analyzer = Arc::new(Analyzer::new(
        Arc::clone(&store),
        model,
        AnalysisQuota::new(settings.analysis.daily_limit),
    ));

    let app = web::router(AppState {
        store,
        synchronizer,
        screener,
        analyzer,
    });

    let addr = cli.bind.unwrap_or_else(|| settings.bind_addr());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("  Daily analysis limit: {}", settings.analysis.daily_limit);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("👋 stockscope stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("stockscope=info,stockscope::analysis=debug")
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");
}
