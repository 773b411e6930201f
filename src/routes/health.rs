//! Health Check Endpoint
//!
//! # Interview Q&A
//!
//! Q: Health check 엔드포인트는 왜 필요한가?
//! A: 로드밸런서/Kubernetes probe와 모니터링 연동
//!
//! Q: 인메모리 백엔드일 때는?
//! A: 외부 의존성이 없으므로 항상 connected, latency 없음

use axum::{extract::State, Json};
use serde::Serialize;

use crate::services::LogLevel;
use crate::AppState;

/// Health check 응답
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageStatus,
    /// 메모리에 보관 중인 진단 로그 개수
    pub log_entries: usize,
    /// 진단 로그 최소 레벨
    pub log_level: LogLevel,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct StorageStatus {
    pub backend: &'static str,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
///
/// 서버 및 저장소 상태 확인
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = match &state.db {
        Some(db) => {
            let db_start = std::time::Instant::now();
            match db.health_check().await {
                Ok(_) => StorageStatus {
                    backend: "postgres",
                    connected: true,
                    latency_ms: Some(db_start.elapsed().as_millis() as u64),
                },
                Err(err) => {
                    tracing::warn!("Database health check failed: {:?}", err);
                    StorageStatus {
                        backend: "postgres",
                        connected: false,
                        latency_ms: None,
                    }
                }
            }
        }
        None => StorageStatus {
            backend: "memory",
            connected: true,
            latency_ms: None,
        },
    };

    Json(HealthResponse {
        status: if storage.connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage,
        log_entries: state.log.len(),
        log_level: state.log.level(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
