//! Sports Buddy API Library
//!
//! # Overview
//!
//! 스포츠 이벤트 매칭 서비스의 백엔드 API.
//! 회원가입/로그인, 이벤트 생성과 참가, 지역 기반 추천, 관리자 대시보드.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          API                              │
//! │                                                           │
//! │  ┌─────────┐   ┌──────────────────────────────────────┐  │
//! │  │ Routes  │──▶│ Services                             │  │
//! │  └─────────┘   │  SessionGateway   EventRepository    │  │
//! │                │  MatchingEngine   AdminAggregator    │  │
//! │                │  DiagnosticsSink                     │  │
//! │                └──────────────┬───────────────────────┘  │
//! │                               │                           │
//! │          ┌────────────────────┴───────────────┐           │
//! │          ▼                                    ▼           │
//! │  ┌────────────────┐                 ┌─────────────────┐   │
//! │  │ Store traits   │                 │ KeyValueCache   │   │
//! │  │ (Postgres/Mem) │                 │ (File/Memory)   │   │
//! │  └────────────────┘                 └─────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직
//! - `db`: 저장소 trait, PostgreSQL/인메모리 구현, 영구 캐시
//! - `types`: 공통 타입과 카탈로그
//! - `validation`: 폼 검증 규칙
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sports_buddy_api::{config::Config, db::{cache::MemoryCache, memory::MemoryStore}, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()), None);
//!     let app = sports_buddy_api::routes::create_router(state);
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::ApiError;

use db::cache::KeyValueCache;
use db::{ActivityStore, CredentialStore, EventStore, UserStore};
use services::{
    AdminAggregator, DiagnosticsSink, EventRepository, MatchingEngine, SessionGateway,
    StoreIdentityProvider,
};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionGateway>,
    pub events: Arc<EventRepository>,
    pub matching: Arc<MatchingEngine>,
    pub admin: Arc<AdminAggregator>,
    pub log: Arc<DiagnosticsSink>,
    /// PostgreSQL 백엔드일 때만 존재 (헬스 체크용)
    pub db: Option<Arc<Database>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 하나의 저장소로 모든 서비스를 구성
    ///
    /// 진단 로그는 여기서 생성되며 저장된 히스토리를 바로 읽어 들임
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        cache: Arc<dyn KeyValueCache>,
        db: Option<Arc<Database>>,
    ) -> Self
    where
        S: UserStore + EventStore + ActivityStore + CredentialStore + 'static,
    {
        let log = Arc::new(DiagnosticsSink::new(config.log, cache.clone()));
        let identity = Arc::new(StoreIdentityProvider::new(store.clone()));

        let sessions = SessionGateway::new(identity, store.clone(), store.clone(), cache, log.clone())
            .with_session_ttl(chrono::Duration::hours(config.session_ttl_hours));
        let events = EventRepository::new(store.clone(), store.clone(), store.clone(), log.clone());
        let matching = MatchingEngine::new(store.clone(), store.clone(), log.clone());
        let admin = AdminAggregator::new(store.clone(), store.clone(), store, log.clone());

        Self {
            sessions: Arc::new(sessions),
            events: Arc::new(events),
            matching: Arc::new(matching),
            admin: Arc::new(admin),
            log,
            db,
            config: Arc::new(config),
        }
    }
}
