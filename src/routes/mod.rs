//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/catalog/*` - 종목, 도시/지역 카탈로그
//! - `/auth/*` - 가입, 로그인/로그아웃, 내 프로필
//! - `/events/*` - 이벤트 CRUD, 참가/탈퇴 (로그인 필요)
//! - `/me/*` - 내 이벤트, 다가오는 일정, 추천 (로그인 필요)
//! - `/admin/*` - 대시보드, 사용자 관리, 진단 로그 (관리자 전용)

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod events;
pub mod guard;
pub mod health;
pub mod logs;
pub mod me;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET    /health
/// GET    /catalog/sports
/// GET    /catalog/cities
/// GET    /catalog/cities/:city/areas
/// POST   /auth/register
/// POST   /auth/login
/// GET    /auth/remembered/:device_id
///
/// -- 로그인 필요 --
/// POST   /auth/logout
/// GET    /auth/me                 PATCH /auth/me
/// GET    /events                  POST  /events
/// GET    /events/stats
/// GET    /events/:id              PATCH /events/:id    DELETE /events/:id
/// POST   /events/:id/join         POST  /events/:id/leave
/// GET    /me/events
/// GET    /me/upcoming?limit
/// GET    /me/suggestions
///
/// -- 관리자 전용 --
/// GET    /admin/stats
/// GET    /admin/users
/// PUT    /admin/users/:id/active
/// POST   /admin/users/:id/reconcile
/// GET    /admin/events
/// GET    /admin/activity?limit
/// GET    /admin/logs              DELETE /admin/logs
/// GET    /admin/logs/export
/// PUT    /admin/logs/level
/// ```
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/catalog/sports", get(catalog::sports))
        .route("/catalog/cities", get(catalog::cities))
        .route("/catalog/cities/:city/areas", get(catalog::areas))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/remembered/:device_id", get(auth::remembered_email));

    let signed_in = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).patch(auth::update_me))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/stats", get(events::event_stats))
        .route(
            "/events/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/join", post(events::join_event))
        .route("/events/:id/leave", post(events::leave_event))
        .route("/me/events", get(me::my_events))
        .route("/me/upcoming", get(me::my_upcoming))
        .route("/me/suggestions", get(me::my_suggestions))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard::require_session));

    let admin_only = Router::new()
        .route("/admin/stats", get(admin::dashboard_stats))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id/active", put(admin::set_user_active))
        .route("/admin/users/:id/reconcile", post(admin::reconcile_user_stats))
        .route("/admin/events", get(admin::list_events))
        .route("/admin/activity", get(admin::recent_activity))
        .route("/admin/logs", get(logs::list_logs).delete(logs::clear_logs))
        .route("/admin/logs/export", get(logs::export_logs))
        .route("/admin/logs/level", put(logs::set_level))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard::require_admin));

    let cors = cors_layer(&state);

    Router::new()
        .merge(public)
        .merge(signed_in)
        .merge(admin_only)
        // 미들웨어
        .layer(middleware::from_fn_with_state(state.clone(), guard::record_failures))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // 상태 주입
        .with_state(state)
}

/// CORS 설정
///
/// 프로덕션: `ALLOWED_ORIGINS`에 나열된 도메인만 허용
/// 개발: localhost 허용
fn cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

    if state.config.is_production() {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([
                HeaderValue::from_static("http://localhost:5173"), // Vite dev server
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ]))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
