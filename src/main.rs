use std::sync::Arc;

use memorial_order_bot::admin::admin_routes;
use memorial_order_bot::assets::{AssetLister, AssetPager, HttpAssetLister, StaticAssetLister};
use memorial_order_bot::bot::{BotDeps, OrderBot};
use memorial_order_bot::catalog::Catalog;
use memorial_order_bot::channels::{Channel, CliChannel, TelegramChannel};
use memorial_order_bot::config::BotConfig;
use memorial_order_bot::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🕯  Memorial order bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Assets ───────────────────────────────────────────────────────────
    let lister: Arc<dyn AssetLister> = if let Some(path) = &config.asset_manifest {
        eprintln!("   Assets: manifest {}", path.display());
        Arc::new(StaticAssetLister::from_manifest_file(path)?)
    } else if let Some(base_url) = &config.asset_base_url {
        eprintln!("   Assets: {base_url}");
        Arc::new(HttpAssetLister::new(base_url)?)
    } else {
        tracing::warn!(
            "Neither ORDER_BOT_ASSET_MANIFEST nor ORDER_BOT_ASSET_BASE_URL is set; \
             font and background galleries will be empty"
        );
        Arc::new(StaticAssetLister::new())
    };
    let pager = Arc::new(AssetPager::new(
        lister,
        config.flow.page_size,
        config.flow.external_timeout,
    ));

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram_token {
        Some(token) => {
            let telegram = TelegramChannel::new(token.clone(), config.allowed_users.clone());
            if let Err(e) = telegram.health_check().await {
                tracing::warn!("Telegram health check failed: {e}");
            }
            eprintln!("   Channel: telegram");
            Arc::new(telegram)
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN for Telegram)");
            Arc::new(CliChannel::new())
        }
    };

    // ── Admin API ────────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = admin_routes(db.clone(), pager.clone(), config.name.clone());
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        eprintln!("   Admin API: http://0.0.0.0:{port}/api/orders");
        tokio::spawn(async move {
            tracing::info!(port, "Admin API server started");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Admin API server stopped: {e}");
            }
        });
    }
    eprintln!();

    let deps = BotDeps {
        store: db.clone(),
        sink: db,
        pager,
        catalog: Arc::new(Catalog::new()),
    };
    OrderBot::new(config, deps, channel).run().await?;

    Ok(())
}
