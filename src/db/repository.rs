//! Repository Pattern Implementation
//!
//! 저장소 인터페이스. 서비스 레이어는 이 trait만 의존함.
//!
//! - PostgreSQL 구현: `db/mod.rs`의 [`Database`](super::Database)
//! - 인메모리 구현: [`memory::MemoryStore`] (`STORAGE_BACKEND=memory`, 테스트)

use async_trait::async_trait;
use anyhow::Result;
use chrono::{DateTime, Utc};

use super::models::{Activity, Credential, Event, EventPatch, EventQuery, ProfilePatch, User, UserStats};

/// `users` 컬렉션
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn find_user(&self, uid: &str) -> Result<Option<User>>;
    async fn update_profile(&self, uid: &str, patch: &ProfilePatch, now: DateTime<Utc>) -> Result<()>;
    async fn record_login(&self, uid: &str, now: DateTime<Utc>) -> Result<()>;
    /// 사용자가 없으면 `false`
    async fn set_active(&self, uid: &str, is_active: bool, now: DateTime<Utc>) -> Result<bool>;
    async fn save_stats(&self, uid: &str, stats: &UserStats, now: DateTime<Utc>) -> Result<()>;
    /// 최신 가입순
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn count_users(&self) -> Result<u64>;
}

/// `events` 컬렉션
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: &Event) -> Result<()>;
    async fn find_event(&self, id: &str) -> Result<Option<Event>>;
    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>>;
    /// 참가자 목록은 건드리지 않음
    async fn update_event(&self, id: &str, patch: &EventPatch, now: DateTime<Utc>) -> Result<()>;
    /// participants와 participant_count를 함께 기록
    async fn set_roster(&self, id: &str, participants: &[String], now: DateTime<Utc>) -> Result<()>;
    /// 이벤트가 없으면 `false`
    async fn delete_event(&self, id: &str) -> Result<bool>;
    async fn count_events(&self) -> Result<u64>;
}

/// 관리자 최근 활동 (감사 로그)
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append_activity(&self, activity: &Activity) -> Result<()>;
    /// 최신순
    async fn recent_activities(&self, limit: u32) -> Result<Vec<Activity>>;
}

/// 아이덴티티 프로바이더의 계정 저장소
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 같은 이메일이 이미 있으면 `false`
    async fn insert_credential(&self, credential: &Credential) -> Result<bool>;
    async fn find_credential(&self, email: &str) -> Result<Option<Credential>>;
    async fn set_display_name(&self, uid: &str, display_name: &str) -> Result<()>;
    /// 프로필 생성 실패 시 계정 되돌리기
    async fn delete_credential(&self, uid: &str) -> Result<()>;
}

pub mod memory {
    //! 인메모리 저장소
    //!
    //! 이벤트는 삽입 순서를 유지하며, 이 순서가 "저장소 반환 순서"가 됨.

    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, PoisonError};

    use anyhow::bail;
    use tokio::sync::RwLock;

    use super::*;
    use crate::db::models::EventOrder;

    #[derive(Default)]
    struct Inner {
        users: Vec<User>,
        events: Vec<Event>,
        credentials: HashMap<String, Credential>,
        activities: Vec<Activity>,
    }

    /// 장애 주입 지점 (부분 실패 시나리오)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum FailPoint {
        StatWrites,
        UserInserts,
        ActivityWrites,
        EventReads,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        inner: RwLock<Inner>,
        failing: Mutex<HashSet<FailPoint>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        #[cfg(test)]
        pub fn fail(&self, point: FailPoint, fail: bool) {
            let mut failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
            if fail {
                failing.insert(point);
            } else {
                failing.remove(&point);
            }
        }

        fn check(&self, point: FailPoint) -> Result<()> {
            let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
            if failing.contains(&point) {
                bail!("memory store rejected {:?}", point);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn insert_user(&self, user: &User) -> Result<()> {
            self.check(FailPoint::UserInserts)?;
            let mut inner = self.inner.write().await;
            if inner.users.iter().any(|u| u.uid == user.uid) {
                bail!("user {} already exists", user.uid);
            }
            inner.users.push(user.clone());
            Ok(())
        }

        async fn find_user(&self, uid: &str) -> Result<Option<User>> {
            let inner = self.inner.read().await;
            Ok(inner.users.iter().find(|u| u.uid == uid).cloned())
        }

        async fn update_profile(&self, uid: &str, patch: &ProfilePatch, now: DateTime<Utc>) -> Result<()> {
            let mut inner = self.inner.write().await;
            let Some(user) = inner.users.iter_mut().find(|u| u.uid == uid) else {
                bail!("user {} not found", uid);
            };
            patch.apply_to(user);
            user.updated_at = now;
            Ok(())
        }

        async fn record_login(&self, uid: &str, now: DateTime<Utc>) -> Result<()> {
            let mut inner = self.inner.write().await;
            if let Some(user) = inner.users.iter_mut().find(|u| u.uid == uid) {
                user.last_login = Some(now);
                user.updated_at = now;
            }
            Ok(())
        }

        async fn set_active(&self, uid: &str, is_active: bool, now: DateTime<Utc>) -> Result<bool> {
            let mut inner = self.inner.write().await;
            match inner.users.iter_mut().find(|u| u.uid == uid) {
                Some(user) => {
                    user.is_active = is_active;
                    user.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn save_stats(&self, uid: &str, stats: &UserStats, now: DateTime<Utc>) -> Result<()> {
            self.check(FailPoint::StatWrites)?;
            let mut inner = self.inner.write().await;
            if let Some(user) = inner.users.iter_mut().find(|u| u.uid == uid) {
                user.stats = stats.clone();
                user.updated_at = now;
            }
            Ok(())
        }

        async fn list_users(&self) -> Result<Vec<User>> {
            let inner = self.inner.read().await;
            let mut users: Vec<User> = inner.users.iter().rev().cloned().collect();
            users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(users)
        }

        async fn count_users(&self) -> Result<u64> {
            Ok(self.inner.read().await.users.len() as u64)
        }
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn insert_event(&self, event: &Event) -> Result<()> {
            let mut inner = self.inner.write().await;
            if inner.events.iter().any(|e| e.id == event.id) {
                bail!("event {} already exists", event.id);
            }
            inner.events.push(event.clone());
            Ok(())
        }

        async fn find_event(&self, id: &str) -> Result<Option<Event>> {
            self.check(FailPoint::EventReads)?;
            let inner = self.inner.read().await;
            Ok(inner.events.iter().find(|e| e.id == id).cloned())
        }

        async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
            self.check(FailPoint::EventReads)?;
            let inner = self.inner.read().await;
            let mut events: Vec<Event> = match query.order {
                // 같은 시각이면 나중에 넣은 것이 먼저
                EventOrder::CreatedDesc => inner.events.iter().rev().filter(|e| query.matches(e)).cloned().collect(),
                EventOrder::DateAsc => inner.events.iter().filter(|e| query.matches(e)).cloned().collect(),
            };
            match query.order {
                EventOrder::CreatedDesc => events.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
                EventOrder::DateAsc => events.sort_by_key(Event::starts_at),
            }
            if let Some(limit) = query.limit {
                events.truncate(limit as usize);
            }
            Ok(events)
        }

        async fn update_event(&self, id: &str, patch: &EventPatch, now: DateTime<Utc>) -> Result<()> {
            let mut inner = self.inner.write().await;
            let Some(event) = inner.events.iter_mut().find(|e| e.id == id) else {
                bail!("event {} not found", id);
            };
            patch.apply_to(event);
            event.updated_at = now;
            Ok(())
        }

        async fn set_roster(&self, id: &str, participants: &[String], now: DateTime<Utc>) -> Result<()> {
            let mut inner = self.inner.write().await;
            let Some(event) = inner.events.iter_mut().find(|e| e.id == id) else {
                bail!("event {} not found", id);
            };
            event.participants = participants.to_vec();
            event.participant_count = participants.len() as u32;
            event.updated_at = now;
            Ok(())
        }

        async fn delete_event(&self, id: &str) -> Result<bool> {
            let mut inner = self.inner.write().await;
            let before = inner.events.len();
            inner.events.retain(|e| e.id != id);
            Ok(inner.events.len() != before)
        }

        async fn count_events(&self) -> Result<u64> {
            Ok(self.inner.read().await.events.len() as u64)
        }
    }

    #[async_trait]
    impl ActivityStore for MemoryStore {
        async fn append_activity(&self, activity: &Activity) -> Result<()> {
            self.check(FailPoint::ActivityWrites)?;
            self.inner.write().await.activities.push(activity.clone());
            Ok(())
        }

        async fn recent_activities(&self, limit: u32) -> Result<Vec<Activity>> {
            let inner = self.inner.read().await;
            Ok(inner.activities.iter().rev().take(limit as usize).cloned().collect())
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn insert_credential(&self, credential: &Credential) -> Result<bool> {
            let mut inner = self.inner.write().await;
            if inner.credentials.contains_key(&credential.email) {
                return Ok(false);
            }
            inner.credentials.insert(credential.email.clone(), credential.clone());
            Ok(true)
        }

        async fn find_credential(&self, email: &str) -> Result<Option<Credential>> {
            let inner = self.inner.read().await;
            Ok(inner.credentials.get(email).cloned())
        }

        async fn set_display_name(&self, uid: &str, display_name: &str) -> Result<()> {
            let mut inner = self.inner.write().await;
            if let Some(credential) = inner.credentials.values_mut().find(|c| c.uid == uid) {
                credential.display_name = Some(display_name.to_string());
            }
            Ok(())
        }

        async fn delete_credential(&self, uid: &str) -> Result<()> {
            self.inner.write().await.credentials.retain(|_, c| c.uid != uid);
            Ok(())
        }
    }
}
