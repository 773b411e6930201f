//! Admin Aggregator
//!
//! Read-only rollups for the admin dashboard plus the user activation
//! toggle. Callers are expected to have passed the admin role check.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::db::{Activity, ActivityStore, Event, EventQuery, EventStore, User, UserStore};
use crate::error::ApiError;
use crate::services::diagnostics::DiagnosticsSink;

/// 최근 활동 기본 개수
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub users: u64,
    pub events: u64,
}

pub struct AdminAggregator {
    users: Arc<dyn UserStore>,
    events: Arc<dyn EventStore>,
    activities: Arc<dyn ActivityStore>,
    log: Arc<DiagnosticsSink>,
}

impl AdminAggregator {
    pub fn new(
        users: Arc<dyn UserStore>,
        events: Arc<dyn EventStore>,
        activities: Arc<dyn ActivityStore>,
        log: Arc<DiagnosticsSink>,
    ) -> Self {
        Self {
            users,
            events,
            activities,
            log,
        }
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        let stats = DashboardStats {
            users: self.users.count_users().await?,
            events: self.events.count_events().await?,
        };
        self.log.info("Dashboard stats loaded", json!(stats));
        Ok(stats)
    }

    /// 최신 가입순. `User`에는 자격 증명이 없음
    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        let users = self.users.list_users().await?;
        self.log.info("Users loaded", json!({ "count": users.len() }));
        Ok(users)
    }

    pub async fn set_active(&self, admin_id: &str, user_id: &str, is_active: bool) -> Result<User, ApiError> {
        if !self.users.set_active(user_id, is_active, Utc::now()).await? {
            return Err(ApiError::NotFound("User".to_string()));
        }
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        let action = if is_active { "User Activated" } else { "User Deactivated" };
        let activity = Activity::new(action, &user.display_name(), "user-cog", Some(admin_id));
        // 상태 변경은 이미 저장됨. 감사 기록 실패는 로그만.
        if let Err(err) = self.activities.append_activity(&activity).await {
            self.log.error(
                Some(admin_id),
                "Failed to record activity",
                json!({ "action": action, "error": format!("{:#}", err) }),
            );
        }

        self.log.user_action(
            admin_id,
            "User status updated",
            json!({ "userId": user_id, "isActive": is_active }),
        );
        Ok(user)
    }

    /// 비활성 포함 전체 이벤트, 최신 생성순
    pub async fn events(&self) -> Result<Vec<Event>, ApiError> {
        let events = self.events.query_events(&EventQuery::default()).await?;
        self.log.info("Events loaded", json!({ "count": events.len() }));
        Ok(events)
    }

    pub async fn recent_activity(&self, limit: u32) -> Result<Vec<Activity>, ApiError> {
        Ok(self.activities.recent_activities(limit).await?)
    }
}
