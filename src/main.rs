//! Sports Buddy API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client (Frontend)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  Authorization: Bearer <token>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /catalog/*  /auth/*  /events/*  /me/*  /admin/*││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  SessionGateway  EventRepository  MatchingEngine         ││
//! │  │  AdminAggregator  DiagnosticsSink                        ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL / in-memory stores    JSON file cache        ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use sports_buddy_api::{
    config::StorageBackend,
    db::cache::{FileCache, KeyValueCache, MemoryCache},
    db::memory::MemoryStore,
    routes,
    services::session::AdminBootstrap,
    AppState, Config, Database,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sports_buddy_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Sports Buddy API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded");

    // 영구 캐시 (파일 쓰기는 백그라운드 태스크)
    let mut file_cache: Option<Arc<FileCache>> = None;
    let cache: Arc<dyn KeyValueCache> = match &config.cache_path {
        Some(path) => {
            let cache = Arc::new(FileCache::open(path)?);
            cache.clone().spawn_flusher();
            file_cache = Some(cache.clone());
            tracing::info!("💾 Cache file: {}", path);
            cache
        }
        None => {
            tracing::warn!("CACHE_PATH not set, sessions and log history are kept in memory only");
            Arc::new(MemoryCache::new())
        }
    };

    // 저장소 및 앱 상태 구성
    let state = match config.storage {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database_url).await?;
            tracing::info!("🗄️  Database connected");

            db.run_migrations().await?;
            tracing::info!("📦 Migrations completed");

            let db = Arc::new(db);
            AppState::new(config.clone(), db.clone(), cache, Some(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            AppState::new(config.clone(), Arc::new(MemoryStore::new()), cache, None)
        }
    };

    // 부트스트랩 관리자
    if let Some((email, password)) = &config.admin {
        match state.sessions.ensure_admin(email, password).await {
            Ok(AdminBootstrap::Created) => tracing::info!("👤 Admin account created: {}", email),
            Ok(AdminBootstrap::Present) => tracing::info!("👤 Admin account present: {}", email),
            Ok(AdminBootstrap::NotAdmin) => {
                tracing::warn!("ADMIN_EMAIL {} belongs to a non-admin account, no admin bootstrapped", email)
            }
            Err(err) => tracing::error!("Failed to create admin account {}: {}", email, err),
        }
    }

    // 라우터 구성
    let app = routes::create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 아직 기록되지 않은 캐시 변경분
    if let Some(cache) = file_cache {
        cache.flush()?;
        tracing::info!("💾 Cache flushed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutting down");
}
