//! Matching Engine
//!
//! Suggests events a user has neither created nor joined, ranked by how
//! close they are to the user's home location.

use std::sync::Arc;

use serde_json::json;

use crate::db::{Event, EventQuery, EventStore, UserStore};
use crate::error::ApiError;
use crate::services::diagnostics::DiagnosticsSink;
use crate::types::EventStatus;

/// 추천 최대 개수
pub const SUGGESTION_LIMIT: usize = 10;

const SAME_AREA_POINTS: u32 = 3;
const SAME_CITY_POINTS: u32 = 2;

/// 지역 점수: 같은 지역 +3, 같은 도시 +2 (누적)
pub fn locality_score(city: &str, area: &str, event: &Event) -> u32 {
    let mut score = 0;
    if event.area == area {
        score += SAME_AREA_POINTS;
    }
    if event.city == city {
        score += SAME_CITY_POINTS;
    }
    score
}

/// 점수 내림차순 안정 정렬 후 상위 [`SUGGESTION_LIMIT`]개
///
/// 동점이면 입력 순서 유지
pub fn rank(city: &str, area: &str, mut candidates: Vec<Event>) -> Vec<Event> {
    candidates.sort_by_cached_key(|event| std::cmp::Reverse(locality_score(city, area, event)));
    candidates.truncate(SUGGESTION_LIMIT);
    candidates
}

pub struct MatchingEngine {
    users: Arc<dyn UserStore>,
    events: Arc<dyn EventStore>,
    log: Arc<DiagnosticsSink>,
}

impl MatchingEngine {
    pub fn new(users: Arc<dyn UserStore>, events: Arc<dyn EventStore>, log: Arc<DiagnosticsSink>) -> Self {
        Self { users, events, log }
    }

    pub async fn suggest_for(&self, user_id: &str) -> Result<Vec<Event>, ApiError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        let query = EventQuery {
            active_only: true,
            status: Some(EventStatus::Upcoming),
            ..EventQuery::default()
        };
        let candidates: Vec<Event> = self
            .events
            .query_events(&query)
            .await?
            .into_iter()
            .filter(|event| event.creator_id != user_id && !event.has_participant(user_id))
            .collect();

        let suggestions = rank(&user.city, &user.area, candidates);
        self.log.debug(
            "Matching events found",
            json!({ "userId": user_id, "count": suggestions.len() }),
        );
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::{KeyValueCache, MemoryCache};
    use crate::db::memory::MemoryStore;
    use crate::db::{User, UserPreferences, UserStats};
    use crate::services::diagnostics::SinkConfig;
    use crate::types::{Role, SkillLevel};
    use chrono::{Duration, NaiveDate, NaiveTime, Utc};

    fn event(id: &str, city: &str, area: &str, creator: &str, age_secs: i64) -> Event {
        let created = Utc::now() - Duration::seconds(age_secs);
        Event {
            id: id.into(),
            title: format!("Event {id}"),
            sport: "tennis".into(),
            description: "Doubles".into(),
            date: NaiveDate::from_ymd_opt(2031, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            city: city.into(),
            area: area.into(),
            skill_level: SkillLevel::Advanced,
            max_participants: 4,
            creator_id: creator.into(),
            creator_name: "Someone Else".into(),
            status: EventStatus::Upcoming,
            participants: vec![creator.into()],
            participant_count: 1,
            is_active: true,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_score_monotonic() {
        let both = event("a", "london", "central-london", "x", 0);
        let city_only = event("b", "london", "north-london", "x", 0);
        let neither = event("c", "toronto", "york", "x", 0);

        let score = |e: &Event| locality_score("london", "central-london", e);
        assert_eq!(score(&both), 5);
        assert_eq!(score(&city_only), 2);
        assert_eq!(score(&neither), 0);
    }

    #[test]
    fn test_rank_is_stable_and_capped() {
        let candidates: Vec<Event> = (0..15)
            .map(|i| event(&format!("e{i}"), "toronto", "york", "x", 0))
            .collect();
        let ranked = rank("london", "central-london", candidates);
        let ids: Vec<_> = ranked.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["e0", "e1", "e2", "e3", "e4", "e5", "e6", "e7", "e8", "e9"]);
    }

    async fn engine_with(events: Vec<Event>) -> (MatchingEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .insert_user(&User {
                uid: "u".into(),
                email: "u@example.com".into(),
                first_name: "Uma".into(),
                last_name: "Reed".into(),
                phone: "+447700900123".into(),
                city: "london".into(),
                area: "central-london".into(),
                role: Role::User,
                is_active: true,
                profile_complete: true,
                preferences: UserPreferences::default(),
                stats: UserStats::default(),
                created_at: now,
                updated_at: now,
                last_login: None,
            })
            .await
            .unwrap();
        for event in &events {
            store.insert_event(event).await.unwrap();
        }
        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let log = Arc::new(DiagnosticsSink::new(SinkConfig::default(), cache));
        (MatchingEngine::new(store.clone(), store.clone(), log), store)
    }

    #[tokio::test]
    async fn test_locality_scenario() {
        // 저장소 순서(최신순)는 C, B, A
        let (engine, _) = engine_with(vec![
            event("A", "london", "central-london", "x", 30),
            event("B", "london", "north-london", "x", 20),
            event("C", "toronto", "york", "x", 10),
        ])
        .await;

        let ids: Vec<_> = engine
            .suggest_for("u")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_excludes_created_and_joined() {
        let mut joined = event("joined", "london", "central-london", "x", 30);
        joined.participants.push("u".into());
        joined.participant_count = 2;
        let mut inactive = event("inactive", "london", "central-london", "x", 25);
        inactive.is_active = false;

        let (engine, _) = engine_with(vec![
            joined,
            inactive,
            event("mine", "london", "central-london", "u", 20),
            event("open", "london", "south-london", "x", 10),
        ])
        .await;

        let ids: Vec<_> = engine
            .suggest_for("u")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["open"]);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (engine, _) = engine_with(vec![]).await;
        assert!(matches!(engine.suggest_for("ghost").await, Err(ApiError::NotFound(_))));
    }
}
