use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use circles::config::{MatchingConfig, ServerConfig, SweepConfig};
use circles::matching::sweep::spawn_daily_sweep;
use circles::matching::{MatchingEngine, matching_routes};
use circles::notify::{EmailConfig, Notifier, SmtpNotifier};
use circles::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env();
    let matching_config = MatchingConfig::from_env();
    let sweep_config = SweepConfig::from_env();

    eprintln!("Circles v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", server_config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api", server_config.port);

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&server_config.db_path)
            .await
            .context("Failed to open database")?,
    );

    let mut engine = MatchingEngine::new(Arc::clone(&db), matching_config);
    match EmailConfig::from_env() {
        Some(email_config) => {
            let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(email_config)?);
            engine = engine.with_notifier(notifier);
            eprintln!("   Introductions: SMTP");
        }
        None => eprintln!("   Introductions: disabled (SMTP_HOST not set)"),
    }
    let engine = Arc::new(engine);

    let _sweep_handle = if sweep_config.enabled {
        eprintln!("   Sweep: {}", sweep_config.schedule);
        Some(spawn_daily_sweep(Arc::clone(&engine), sweep_config.clone())?)
    } else {
        eprintln!("   Sweep: disabled");
        None
    };

    let app = matching_routes(engine, sweep_config.test_mode).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Circles server started");
    axum::serve(listener, app).await?;

    Ok(())
}
