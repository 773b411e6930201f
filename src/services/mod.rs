//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `SessionGateway`: 가입, 로그인/로그아웃, 역할 검사
//! - `EventRepository`: 이벤트 CRUD, 참가자 명단, 사용자 통계
//! - `MatchingEngine`: 지역 기반 이벤트 추천
//! - `AdminAggregator`: 관리자 대시보드 집계
//! - `DiagnosticsSink`: 조회 가능한 애플리케이션 로그
//! - `IdentityProvider`: 이메일/비밀번호 계정

pub mod admin;
pub mod diagnostics;
pub mod events;
pub mod identity;
pub mod matching;
pub mod session;

pub use admin::{AdminAggregator, DashboardStats};
pub use diagnostics::{DiagnosticsSink, LogEntry, LogLevel, SinkConfig};
pub use events::{EventRepository, EventStats};
pub use identity::{IdentityProvider, StoreIdentityProvider};
pub use matching::MatchingEngine;
pub use session::{Session, SessionGateway, SignInRequest};
