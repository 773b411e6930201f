//! Database Models
//!
//! Domain records for the `users` and `events` collections plus the
//! activity feed, and the flat `FromRow` shapes they are stored as.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{EventStatus, Role, SkillLevel};

// ============ Users ============

/// 사용자 통계 (users.stats)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub events_created: u32,
    pub events_joined: u32,
    pub matches_found: u32,
    pub rating: f64,
    pub total_ratings: u32,
}

/// 이벤트 참여로 변하는 카운터
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatKind {
    EventsCreated,
    EventsJoined,
}

impl UserStats {
    pub fn get(&self, kind: StatKind) -> u32 {
        match kind {
            StatKind::EventsCreated => self.events_created,
            StatKind::EventsJoined => self.events_joined,
        }
    }

    /// 카운터 증감, 0 미만으로 내려가지 않음
    pub fn adjust(&mut self, kind: StatKind, delta: i64) -> u32 {
        let next = (i64::from(self.get(kind)) + delta).clamp(0, i64::from(u32::MAX)) as u32;
        match kind {
            StatKind::EventsCreated => self.events_created = next,
            StatKind::EventsJoined => self.events_joined = next,
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub notifications: bool,
    pub email_updates: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            notifications: true,
            email_updates: true,
        }
    }
}

/// 사용자 레코드
///
/// 자격 증명(비밀번호 해시)은 별도 `credentials` 컬렉션에만 존재함
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub area: String,
    pub role: Role,
    pub is_active: bool,
    pub profile_complete: bool,
    pub preferences: UserPreferences,
    pub stats: UserStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// 프로필 수정 요청 (모든 필드 선택)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub preferences: Option<UserPreferences>,
}

impl ProfilePatch {
    /// 변경된 필드 이름 (로그용)
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.first_name.is_some() {
            names.push("firstName");
        }
        if self.last_name.is_some() {
            names.push("lastName");
        }
        if self.phone.is_some() {
            names.push("phone");
        }
        if self.city.is_some() {
            names.push("city");
        }
        if self.area.is_some() {
            names.push("area");
        }
        if self.preferences.is_some() {
            names.push("preferences");
        }
        names
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(first_name) = &self.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(phone) = &self.phone {
            user.phone = phone.clone();
        }
        if let Some(city) = &self.city {
            user.city = city.clone();
        }
        if let Some(area) = &self.area {
            user.area = area.clone();
        }
        if let Some(preferences) = self.preferences {
            user.preferences = preferences;
        }
    }
}

/// 로그인 자격 증명
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub uid: String,
    /// lowercase
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============ Events ============

/// 이벤트 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub sport: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub city: String,
    pub area: String,
    pub skill_level: SkillLevel,
    pub max_participants: u32,
    pub creator_id: String,
    pub creator_name: String,
    pub status: EventStatus,
    /// 참가 순서대로
    pub participants: Vec<String>,
    /// 항상 participants.len()
    pub participant_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }

    pub fn is_full(&self) -> bool {
        self.participant_count >= self.max_participants
    }

    /// 시작 시각 (UTC 기준)
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// 검증을 통과한 이벤트 생성 입력
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub sport: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub city: String,
    pub area: String,
    pub skill_level: SkillLevel,
    pub max_participants: u32,
}

/// 검증을 통과한 이벤트 수정 입력
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub sport: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub skill_level: Option<SkillLevel>,
    pub max_participants: Option<u32>,
    pub status: Option<EventStatus>,
    pub is_active: Option<bool>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        let fields: [(&'static str, bool); 11] = [
            ("title", self.title.is_some()),
            ("sport", self.sport.is_some()),
            ("description", self.description.is_some()),
            ("date", self.date.is_some()),
            ("time", self.time.is_some()),
            ("city", self.city.is_some()),
            ("area", self.area.is_some()),
            ("skillLevel", self.skill_level.is_some()),
            ("maxParticipants", self.max_participants.is_some()),
            ("status", self.status.is_some()),
            ("isActive", self.is_active.is_some()),
        ];
        fields.into_iter().filter(|(_, set)| *set).map(|(name, _)| name).collect()
    }

    pub fn apply_to(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(sport) = &self.sport {
            event.sport = sport.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(time) = self.time {
            event.time = time;
        }
        if let Some(city) = &self.city {
            event.city = city.clone();
        }
        if let Some(area) = &self.area {
            event.area = area.clone();
        }
        if let Some(skill_level) = self.skill_level {
            event.skill_level = skill_level;
        }
        if let Some(max) = self.max_participants {
            event.max_participants = max;
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(is_active) = self.is_active {
            event.is_active = is_active;
        }
    }
}

/// 이벤트 목록 필터 (`GET /events` 쿼리)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventFilters {
    pub sport: Option<String>,
    pub city: Option<String>,
    pub skill_level: Option<SkillLevel>,
    pub status: Option<EventStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOrder {
    /// 최신 생성순
    #[default]
    CreatedDesc,
    /// 이벤트 날짜 오름차순
    DateAsc,
}

/// 저장소 수준 쿼리
///
/// 모든 조건은 AND. `participant`는 배열 포함 조건.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub active_only: bool,
    pub sport: Option<String>,
    pub city: Option<String>,
    pub skill_level: Option<SkillLevel>,
    pub status: Option<EventStatus>,
    pub creator_id: Option<String>,
    pub participant: Option<String>,
    pub order: EventOrder,
    pub limit: Option<u32>,
}

impl EventQuery {
    pub fn matches(&self, event: &Event) -> bool {
        (!self.active_only || event.is_active)
            && self.sport.as_ref().map_or(true, |s| *s == event.sport)
            && self.city.as_ref().map_or(true, |c| *c == event.city)
            && self.skill_level.map_or(true, |l| l == event.skill_level)
            && self.status.map_or(true, |s| s == event.status)
            && self.creator_id.as_ref().map_or(true, |c| *c == event.creator_id)
            && self.participant.as_ref().map_or(true, |p| event.has_participant(p))
    }
}

impl From<&EventFilters> for EventQuery {
    fn from(filters: &EventFilters) -> Self {
        Self {
            active_only: true,
            sport: filters.sport.clone(),
            city: filters.city.clone(),
            skill_level: filters.skill_level,
            status: filters.status,
            limit: filters.limit,
            ..Self::default()
        }
    }
}

// ============ Activity feed ============

/// 관리자 화면의 최근 활동 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub action: String,
    pub target: String,
    pub icon: String,
    pub actor_id: Option<String>,
    pub time: DateTime<Utc>,
}

impl Activity {
    pub fn new(action: &str, target: &str, icon: &str, actor_id: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            target: target.to_string(),
            icon: icon.to_string(),
            actor_id: actor_id.map(str::to_string),
            time: Utc::now(),
        }
    }
}

// ============ Rows ============

/// `users` 테이블 행
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub uid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub area: String,
    pub role: String,
    pub is_active: bool,
    pub profile_complete: bool,
    pub pref_notifications: bool,
    pub pref_email_updates: bool,
    pub events_created: i32,
    pub events_joined: i32,
    pub matches_found: i32,
    pub rating: f64,
    pub total_ratings: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            role: row.role.parse()?,
            uid: row.uid,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            city: row.city,
            area: row.area,
            is_active: row.is_active,
            profile_complete: row.profile_complete,
            preferences: UserPreferences {
                notifications: row.pref_notifications,
                email_updates: row.pref_email_updates,
            },
            stats: UserStats {
                events_created: non_negative(row.events_created),
                events_joined: non_negative(row.events_joined),
                matches_found: non_negative(row.matches_found),
                rating: row.rating,
                total_ratings: non_negative(row.total_ratings),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login: row.last_login,
        })
    }
}

/// `events` 테이블 행
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub title: String,
    pub sport: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub city: String,
    pub area: String,
    pub skill_level: String,
    pub max_participants: i32,
    pub creator_id: String,
    pub creator_name: String,
    pub status: String,
    pub participants: Vec<String>,
    pub participant_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            skill_level: row.skill_level.parse()?,
            status: row.status.parse()?,
            id: row.id,
            title: row.title,
            sport: row.sport,
            description: row.description,
            date: row.date,
            time: row.time,
            city: row.city,
            area: row.area,
            max_participants: non_negative(row.max_participants),
            creator_id: row.creator_id,
            creator_name: row.creator_name,
            participants: row.participants,
            participant_count: non_negative(row.participant_count),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `credentials` 테이블 행
#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    pub uid: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CredentialRow> for Credential {
    fn from(row: CredentialRow) -> Self {
        Credential {
            uid: row.uid,
            email: row.email,
            password_hash: row.password_hash,
            salt: row.salt,
            display_name: row.display_name,
            created_at: row.created_at,
        }
    }
}

/// `activities` 테이블 행
#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: String,
    pub action: String,
    pub target: String,
    pub icon: String,
    pub actor_id: Option<String>,
    pub time: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Activity {
            id: row.id,
            action: row.action,
            target: row.target,
            icon: row.icon,
            actor_id: row.actor_id,
            time: row.time,
        }
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
