//! Event Repository
//!
//! Event CRUD, participant rosters and the per-user counters that follow
//! them. Roster and counter live in different documents and are written
//! separately: the roster write comes first and is authoritative, a failed
//! counter write is logged under `CONSISTENCY` and repaired by
//! [`EventRepository::reconcile_stats`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::db::{
    Activity, ActivityStore, Event, EventFilters, EventOrder, EventQuery, EventStore, StatKind, User,
    UserStats, UserStore,
};
use crate::error::ApiError;
use crate::services::diagnostics::{category, DiagnosticsSink};
use crate::types::EventStatus;
use crate::validation::{self, EventForm, EventPatchForm};

/// 이벤트 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    /// "June 2024" 형식
    pub by_month: BTreeMap<String, u64>,
    pub by_sport: BTreeMap<String, u64>,
    pub by_city: BTreeMap<String, u64>,
}

pub struct EventRepository {
    events: Arc<dyn EventStore>,
    users: Arc<dyn UserStore>,
    activities: Arc<dyn ActivityStore>,
    log: Arc<DiagnosticsSink>,
}

impl EventRepository {
    pub fn new(
        events: Arc<dyn EventStore>,
        users: Arc<dyn UserStore>,
        activities: Arc<dyn ActivityStore>,
        log: Arc<DiagnosticsSink>,
    ) -> Self {
        Self {
            events,
            users,
            activities,
            log,
        }
    }

    // ============ CRUD ============

    /// 이벤트 생성, 새 ID 반환
    ///
    /// 생성자는 첫 번째 참가자로 자동 등록됨
    pub async fn create(&self, actor: &User, form: &EventForm) -> Result<String, ApiError> {
        let now = Utc::now();
        let new_event = validation::validate_event_form(form, now.date_naive())?;

        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            title: new_event.title,
            sport: new_event.sport,
            description: new_event.description,
            date: new_event.date,
            time: new_event.time,
            city: new_event.city,
            area: new_event.area,
            skill_level: new_event.skill_level,
            max_participants: new_event.max_participants,
            creator_id: actor.uid.clone(),
            creator_name: actor.display_name(),
            status: EventStatus::Upcoming,
            participants: vec![actor.uid.clone()],
            participant_count: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.events.insert_event(&event).await?;
        self.adjust_stat(&actor.uid, StatKind::EventsCreated, 1).await;
        self.record_activity("Event Created", &event.title, "calendar-plus", &actor.uid)
            .await;

        self.log.user_action(
            &actor.uid,
            "Created event",
            json!({ "eventId": event.id, "title": event.title }),
        );
        Ok(event.id)
    }

    pub async fn get(&self, id: &str) -> Result<Event, ApiError> {
        self.events
            .find_event(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Event".to_string()))
    }

    /// 활성 이벤트, 최신 생성순
    pub async fn list(&self, filters: &EventFilters) -> Result<Vec<Event>, ApiError> {
        Ok(self.events.query_events(&EventQuery::from(filters)).await?)
    }

    pub async fn update(&self, actor: &User, id: &str, form: &EventPatchForm) -> Result<Event, ApiError> {
        let mut event = self.get(id).await?;
        self.authorize_mutation(actor, &event)?;

        let now = Utc::now();
        let patch = validation::validate_event_patch(
            form,
            now.date_naive(),
            &event.city,
            &event.area,
            event.participant_count,
        )?;

        self.events.update_event(id, &patch, now).await?;
        patch.apply_to(&mut event);
        event.updated_at = now;

        self.log.user_action(
            &actor.uid,
            "Updated event",
            json!({ "eventId": id, "fields": patch.field_names() }),
        );
        Ok(event)
    }

    pub async fn delete(&self, actor: &User, id: &str) -> Result<(), ApiError> {
        let event = self.get(id).await?;
        self.authorize_mutation(actor, &event)?;

        if !self.events.delete_event(id).await? {
            return Err(ApiError::NotFound("Event".to_string()));
        }
        if actor.uid == event.creator_id {
            self.adjust_stat(&actor.uid, StatKind::EventsCreated, -1).await;
        }
        self.record_activity("Event Deleted", &event.title, "calendar-times", &actor.uid)
            .await;

        self.log.user_action(
            &actor.uid,
            "Deleted event",
            json!({ "eventId": id, "title": event.title }),
        );
        Ok(())
    }

    // ============ Roster ============

    pub async fn join(&self, actor: &User, id: &str) -> Result<Event, ApiError> {
        let mut event = self.get(id).await?;

        if event.has_participant(&actor.uid) {
            return Err(ApiError::AlreadyJoined);
        }
        if event.is_full() {
            return Err(ApiError::EventFull);
        }

        let now = Utc::now();
        event.participants.push(actor.uid.clone());
        self.write_roster(&mut event, now).await?;
        self.adjust_stat(&actor.uid, StatKind::EventsJoined, 1).await;

        self.log.user_action(
            &actor.uid,
            "Joined event",
            json!({ "eventId": id, "title": event.title }),
        );
        Ok(event)
    }

    pub async fn leave(&self, actor: &User, id: &str) -> Result<Event, ApiError> {
        let mut event = self.get(id).await?;

        if !event.has_participant(&actor.uid) {
            return Err(ApiError::NotParticipant);
        }

        let now = Utc::now();
        event.participants.retain(|uid| *uid != actor.uid);
        self.write_roster(&mut event, now).await?;
        self.adjust_stat(&actor.uid, StatKind::EventsJoined, -1).await;

        self.log.user_action(
            &actor.uid,
            "Left event",
            json!({ "eventId": id, "title": event.title }),
        );
        Ok(event)
    }

    async fn write_roster(&self, event: &mut Event, now: DateTime<Utc>) -> Result<(), ApiError> {
        self.events.set_roster(&event.id, &event.participants, now).await?;
        event.participant_count = event.participants.len() as u32;
        event.updated_at = now;
        Ok(())
    }

    // ============ Per-user views ============

    /// 사용자가 만든 이벤트, 최신 생성순
    pub async fn user_events(&self, user_id: &str) -> Result<Vec<Event>, ApiError> {
        let query = EventQuery {
            creator_id: Some(user_id.to_string()),
            ..EventQuery::default()
        };
        Ok(self.events.query_events(&query).await?)
    }

    /// 참가 중인 예정 이벤트, 가까운 날짜순
    ///
    /// 날짜+시간을 UTC로 보고 `now` 이후인 것만
    pub async fn upcoming_for(
        &self,
        user_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, ApiError> {
        let query = EventQuery {
            active_only: true,
            status: Some(EventStatus::Upcoming),
            participant: Some(user_id.to_string()),
            order: EventOrder::DateAsc,
            ..EventQuery::default()
        };
        let now = now.naive_utc();
        Ok(self
            .events
            .query_events(&query)
            .await?
            .into_iter()
            .filter(|event| event.starts_at() > now)
            .take(limit)
            .collect())
    }

    // ============ Statistics ============

    pub async fn event_stats(&self) -> Result<EventStats, ApiError> {
        let events = self.events.query_events(&EventQuery::default()).await?;

        let mut stats = EventStats {
            total: events.len() as u64,
            ..EventStats::default()
        };
        for event in &events {
            *stats.by_status.entry(event.status.to_string()).or_default() += 1;
            *stats
                .by_month
                .entry(event.created_at.format("%B %Y").to_string())
                .or_default() += 1;
            *stats.by_sport.entry(event.sport.clone()).or_default() += 1;
            *stats.by_city.entry(event.city.clone()).or_default() += 1;
        }
        Ok(stats)
    }

    /// 이벤트 저장소 기준으로 사용자 카운터 재계산
    ///
    /// joined = 본인이 만들지 않은 이벤트 중 참가 중인 것
    pub async fn reconcile_stats(&self, user_id: &str) -> Result<UserStats, ApiError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        let created = self.user_events(user_id).await?.len();
        let joined = self
            .events
            .query_events(&EventQuery {
                participant: Some(user_id.to_string()),
                ..EventQuery::default()
            })
            .await?
            .into_iter()
            .filter(|event| event.creator_id != user_id)
            .count();

        let mut stats = user.stats.clone();
        stats.events_created = created as u32;
        stats.events_joined = joined as u32;
        self.users.save_stats(user_id, &stats, Utc::now()).await?;

        self.log.info(
            "User stats reconciled",
            json!({
                "userId": user_id,
                "before": user.stats,
                "after": stats,
            }),
        );
        Ok(stats)
    }

    // ============ Internal ============

    /// 생성자 또는 관리자만 수정/삭제 가능
    fn authorize_mutation(&self, actor: &User, event: &Event) -> Result<(), ApiError> {
        if actor.uid == event.creator_id || actor.is_admin() {
            return Ok(());
        }
        self.log.warn(
            category::USER_ACTION,
            Some(&actor.uid),
            "Unauthorized event mutation",
            json!({ "eventId": event.id, "creatorId": event.creator_id }),
        );
        Err(ApiError::Forbidden(
            "You are not authorized to modify this event".to_string(),
        ))
    }

    /// 카운터 쓰기 실패는 사용자 동작을 실패시키지 않음
    async fn adjust_stat(&self, user_id: &str, kind: StatKind, delta: i64) {
        let result: anyhow::Result<()> = async {
            let Some(user) = self.users.find_user(user_id).await? else {
                anyhow::bail!("user record not found");
            };
            let mut stats = user.stats;
            stats.adjust(kind, delta);
            self.users.save_stats(user_id, &stats, Utc::now()).await
        }
        .await;

        if let Err(err) = result {
            self.log.warn(
                category::CONSISTENCY,
                Some(user_id),
                "User stat update failed",
                json!({
                    "userId": user_id,
                    "stat": kind,
                    "delta": delta,
                    "error": format!("{:#}", err),
                }),
            );
        }
    }

    async fn record_activity(&self, action: &str, target: &str, icon: &str, actor_id: &str) {
        let activity = Activity::new(action, target, icon, Some(actor_id));
        if let Err(err) = self.activities.append_activity(&activity).await {
            self.log.error(
                Some(actor_id),
                "Failed to record activity",
                json!({ "action": action, "error": format!("{:#}", err) }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::{KeyValueCache, MemoryCache};
    use crate::db::memory::{FailPoint, MemoryStore};
    use crate::db::UserPreferences;
    use crate::services::diagnostics::{LogLevel, SinkConfig};
    use crate::types::Role;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        repo: EventRepository,
        store: Arc<MemoryStore>,
        log: Arc<DiagnosticsSink>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let log = Arc::new(DiagnosticsSink::new(SinkConfig::default(), cache));
        let repo = EventRepository::new(store.clone(), store.clone(), store.clone(), log.clone());
        Fixture { repo, store, log }
    }

    async fn user(store: &MemoryStore, uid: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            uid: uid.into(),
            email: format!("{uid}@example.com"),
            first_name: uid.to_uppercase(),
            last_name: "Tester".into(),
            phone: "+447700900123".into(),
            city: "london".into(),
            area: "central-london".into(),
            role,
            is_active: true,
            profile_complete: true,
            preferences: UserPreferences::default(),
            stats: UserStats::default(),
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        store.insert_user(&user).await.unwrap();
        user
    }

    fn form(max: u32) -> EventForm {
        EventForm {
            title: "Sunday five-a-side".into(),
            sport: "football".into(),
            description: "Friendly game, all welcome".into(),
            date: "2031-05-04".into(),
            time: "10:30".into(),
            city: "london".into(),
            area: "central-london".into(),
            skill_level: "intermediate".into(),
            max_participants: Some(max),
        }
    }

    async fn stats(store: &MemoryStore, uid: &str) -> UserStats {
        store.find_user(uid).await.unwrap().unwrap().stats
    }

    #[tokio::test]
    async fn test_create_enrolls_creator() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;

        let id = assert_ok!(fx.repo.create(&creator, &form(10)).await);
        let event = assert_ok!(fx.repo.get(&id).await);

        assert_eq!(event.participants, vec!["casey".to_string()]);
        assert_eq!(event.participant_count, 1);
        assert_eq!(event.status, EventStatus::Upcoming);
        assert_eq!(event.creator_name, "CASEY Tester");
        assert_eq!(stats(&fx.store, "casey").await.events_created, 1);

        let activity = fx.store.recent_activities(1).await.unwrap();
        assert_eq!(activity[0].action, "Event Created");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_form() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;

        let err = assert_err!(fx.repo.create(&creator, &form(1)).await);
        assert!(matches!(err, ApiError::ValidationError(ref f) if f.contains_key("maxParticipants")));
        assert_eq!(fx.store.count_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let fx = fixture();
        let err = assert_err!(fx.repo.get("nope").await);
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_capacity_scenario() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let second = user(&fx.store, "sam", Role::User).await;
        let third = user(&fx.store, "tia", Role::User).await;

        let id = fx.repo.create(&creator, &form(2)).await.unwrap();

        let event = assert_ok!(fx.repo.join(&second, &id).await);
        assert_eq!(event.participant_count, 2);
        assert_eq!(event.participants, vec!["casey".to_string(), "sam".to_string()]);
        assert_eq!(stats(&fx.store, "sam").await.events_joined, 1);

        let err = assert_err!(fx.repo.join(&third, &id).await);
        assert!(matches!(err, ApiError::EventFull));

        let stored = fx.repo.get(&id).await.unwrap();
        assert_eq!(stored.participants.len(), 2);
        assert_eq!(stored.participant_count, 2);
        assert_eq!(stats(&fx.store, "tia").await.events_joined, 0);
    }

    #[tokio::test]
    async fn test_join_twice_conflicts() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let member = user(&fx.store, "sam", Role::User).await;
        let id = fx.repo.create(&creator, &form(10)).await.unwrap();

        assert_ok!(fx.repo.join(&member, &id).await);
        let err = assert_err!(fx.repo.join(&member, &id).await);
        assert!(matches!(err, ApiError::AlreadyJoined));

        let stored = fx.repo.get(&id).await.unwrap();
        assert_eq!(stored.participants.iter().filter(|p| *p == "sam").count(), 1);
        assert_eq!(stored.participant_count as usize, stored.participants.len());
    }

    #[tokio::test]
    async fn test_leave() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let member = user(&fx.store, "sam", Role::User).await;
        let id = fx.repo.create(&creator, &form(10)).await.unwrap();

        let err = assert_err!(fx.repo.leave(&member, &id).await);
        assert!(matches!(err, ApiError::NotParticipant));

        fx.repo.join(&member, &id).await.unwrap();
        let event = assert_ok!(fx.repo.leave(&member, &id).await);
        assert_eq!(event.participants, vec!["casey".to_string()]);
        assert_eq!(event.participant_count, 1);
        assert_eq!(stats(&fx.store, "sam").await.events_joined, 0);
    }

    #[tokio::test]
    async fn test_mutation_requires_creator_or_admin() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let stranger = user(&fx.store, "sam", Role::User).await;
        let admin = user(&fx.store, "root", Role::Admin).await;
        let id = fx.repo.create(&creator, &form(10)).await.unwrap();
        let before = fx.repo.get(&id).await.unwrap();

        let patch = EventPatchForm {
            title: Some("Hijacked".into()),
            ..EventPatchForm::default()
        };
        let err = assert_err!(fx.repo.update(&stranger, &id, &patch).await);
        assert!(matches!(err, ApiError::Forbidden(_)));
        let err = assert_err!(fx.repo.delete(&stranger, &id).await);
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(fx.repo.get(&id).await.unwrap(), before);

        let updated = assert_ok!(fx.repo.update(&admin, &id, &patch).await);
        assert_eq!(updated.title, "Hijacked");
        assert_eq!(fx.repo.get(&id).await.unwrap().title, "Hijacked");

        // 관리자가 삭제하면 생성자 카운터는 그대로
        assert_ok!(fx.repo.delete(&admin, &id).await);
        assert!(fx.store.find_event(&id).await.unwrap().is_none());
        assert_eq!(stats(&fx.store, "casey").await.events_created, 1);
    }

    #[tokio::test]
    async fn test_creator_delete_decrements() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let id = fx.repo.create(&creator, &form(10)).await.unwrap();

        assert_ok!(fx.repo.delete(&creator, &id).await);
        assert_eq!(stats(&fx.store, "casey").await.events_created, 0);

        let activity = fx.store.recent_activities(1).await.unwrap();
        assert_eq!(activity[0].action, "Event Deleted");
    }

    #[tokio::test]
    async fn test_update_cannot_shrink_below_roster() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let id = fx.repo.create(&creator, &form(3)).await.unwrap();
        for uid in ["sam", "tia"] {
            let member = user(&fx.store, uid, Role::User).await;
            fx.repo.join(&member, &id).await.unwrap();
        }

        let patch = EventPatchForm {
            max_participants: Some(2),
            ..EventPatchForm::default()
        };
        let err = assert_err!(fx.repo.update(&creator, &id, &patch).await);
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_list_and_user_views() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let member = user(&fx.store, "sam", Role::User).await;

        let first = fx.repo.create(&creator, &form(10)).await.unwrap();
        let mut tennis = form(4);
        tennis.sport = "tennis".into();
        tennis.date = "2031-05-01".into();
        let second = fx.repo.create(&creator, &tennis).await.unwrap();

        let all = fx.repo.list(&EventFilters::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        let filtered = fx
            .repo
            .list(&EventFilters {
                sport: Some("tennis".into()),
                ..EventFilters::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        assert_eq!(fx.repo.user_events("casey").await.unwrap().len(), 2);
        assert!(fx.repo.user_events("sam").await.unwrap().is_empty());

        fx.repo.join(&member, &first).await.unwrap();
        fx.repo.join(&member, &second).await.unwrap();
        let upcoming = fx.repo.upcoming_for("sam", 5, Utc::now()).await.unwrap();
        let ids: Vec<_> = upcoming.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![second.clone(), first.clone()]);

        assert_eq!(fx.repo.upcoming_for("sam", 1, Utc::now()).await.unwrap().len(), 1);

        let far_future = Utc::now() + Duration::days(365 * 20);
        assert!(fx.repo.upcoming_for("sam", 5, far_future).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_stat_write_keeps_roster() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        let member = user(&fx.store, "sam", Role::User).await;
        let id = fx.repo.create(&creator, &form(10)).await.unwrap();

        fx.store.fail(FailPoint::StatWrites, true);
        let event = assert_ok!(fx.repo.join(&member, &id).await);
        assert!(event.has_participant("sam"));
        assert_eq!(stats(&fx.store, "sam").await.events_joined, 0);

        let warnings = fx.log.by_category(category::CONSISTENCY);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, LogLevel::Warn);
        assert_eq!(warnings[0].data["delta"], 1);

        fx.store.fail(FailPoint::StatWrites, false);
        let repaired = assert_ok!(fx.repo.reconcile_stats("sam").await);
        assert_eq!(repaired.events_joined, 1);
        assert_eq!(repaired.events_created, 0);
        assert_eq!(stats(&fx.store, "sam").await.events_joined, 1);
    }

    #[tokio::test]
    async fn test_event_stats() {
        let fx = fixture();
        let creator = user(&fx.store, "casey", Role::User).await;
        fx.repo.create(&creator, &form(10)).await.unwrap();
        let mut toronto = form(10);
        toronto.city = "toronto".into();
        toronto.area = "york".into();
        fx.repo.create(&creator, &toronto).await.unwrap();

        let stats = fx.repo.event_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get("upcoming"), Some(&2));
        assert_eq!(stats.by_sport.get("football"), Some(&2));
        assert_eq!(stats.by_city.get("toronto"), Some(&1));
        let month = Utc::now().format("%B %Y").to_string();
        assert_eq!(stats.by_month.get(&month), Some(&2));
    }
}
