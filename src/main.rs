use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use auction_backend::{
    AppState,
    auth::{HttpMailer, LogNotifier, Notifier},
    cache::RedisCache,
    config::Config,
    router::build_router,
    store::PgStore,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env()?;

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'auction_backend';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    let store = PgStore::new(pool);
    store.migrate().await?;

    // 设置 Redis 客户端
    let redis_client = Arc::new(redis::Client::open(config.redis_url.clone())?);
    let cache = Arc::new(RedisCache::new(redis_client));

    let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone())?),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, OTP codes will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    let state = AppState::new(config, Arc::new(store), cache, notifier);
    let app = build_router(state);

    // 启动服务器
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
