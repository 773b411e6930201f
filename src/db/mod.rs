//! Database Module
//!
//! PostgreSQL 구현 (sqlx). 문서 저장소 계약을 테이블 4개로 표현함:
//!
//! - `users`: 사용자 레코드 (stats, preferences는 평탄화된 컬럼)
//! - `credentials`: 아이덴티티 프로바이더 계정
//! - `events`: 이벤트 (participants는 `TEXT[]`)
//! - `activities`: 관리자 최근 활동
//!
//! 커넥션 풀:
//! - max_connections: 10
//! - min_connections: 1
//! - acquire_timeout: 3초

pub mod cache;
mod models;
mod repository;

pub use models::*;
pub use repository::{memory, ActivityStore, CredentialStore, EventStore, UserStore};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};

const USER_COLUMNS: &str = r#"
    uid, email, first_name, last_name, phone, city, area, role,
    is_active, profile_complete, pref_notifications, pref_email_updates,
    events_created, events_joined, matches_found, rating, total_ratings,
    created_at, updated_at, last_login
"#;

const EVENT_COLUMNS: &str = r#"
    id, title, sport, description, date, time, city, area, skill_level,
    max_participants, creator_id, creator_name, status, participants,
    participant_count, is_active, created_at, updated_at
"#;

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for Database {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                uid, email, first_name, last_name, phone, city, area, role,
                is_active, profile_complete, pref_notifications, pref_email_updates,
                events_created, events_joined, matches_found, rating, total_ratings,
                created_at, updated_at, last_login
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#
        )
        .bind(&user.uid)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.city)
        .bind(&user.area)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.profile_complete)
        .bind(user.preferences.notifications)
        .bind(user.preferences.email_updates)
        .bind(user.stats.events_created as i32)
        .bind(user.stats.events_joined as i32)
        .bind(user.stats.matches_found as i32)
        .bind(user.stats.rating)
        .bind(user.stats.total_ratings as i32)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user(&self, uid: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                city = COALESCE($5, city),
                area = COALESCE($6, area),
                pref_notifications = COALESCE($7, pref_notifications),
                pref_email_updates = COALESCE($8, pref_email_updates),
                updated_at = $9
            WHERE uid = $1
            "#
        )
        .bind(uid)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.phone)
        .bind(&patch.city)
        .bind(&patch.area)
        .bind(patch.preferences.map(|p| p.notifications))
        .bind(patch.preferences.map(|p| p.email_updates))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_login(&self, uid: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $2, updated_at = $2 WHERE uid = $1")
            .bind(uid)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, uid: &str, is_active: bool, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = $3 WHERE uid = $1")
            .bind(uid)
            .bind(is_active)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_stats(&self, uid: &str, stats: &UserStats, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                events_created = $2,
                events_joined = $3,
                matches_found = $4,
                rating = $5,
                total_ratings = $6,
                updated_at = $7
            WHERE uid = $1
            "#
        )
        .bind(uid)
        .bind(stats.events_created as i32)
        .bind(stats.events_joined as i32)
        .bind(stats.matches_found as i32)
        .bind(stats.rating)
        .bind(stats.total_ratings as i32)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }
}

#[async_trait]
impl EventStore for Database {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (
                id, title, sport, description, date, time, city, area, skill_level,
                max_participants, creator_id, creator_name, status, participants,
                participant_count, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.sport)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.city)
        .bind(&event.area)
        .bind(event.skill_level.as_str())
        .bind(event.max_participants as i32)
        .bind(&event.creator_id)
        .bind(&event.creator_name)
        .bind(event.status.as_str())
        .bind(&event.participants)
        .bind(event.participant_count as i32)
        .bind(event.is_active)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_event(&self, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Event::try_from).transpose()
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"));

        if query.active_only {
            builder.push(" AND is_active = TRUE");
        }
        if let Some(sport) = &query.sport {
            builder.push(" AND sport = ").push_bind(sport.clone());
        }
        if let Some(city) = &query.city {
            builder.push(" AND city = ").push_bind(city.clone());
        }
        if let Some(level) = query.skill_level {
            builder.push(" AND skill_level = ").push_bind(level.as_str());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(creator_id) = &query.creator_id {
            builder.push(" AND creator_id = ").push_bind(creator_id.clone());
        }
        if let Some(participant) = &query.participant {
            // array-contains
            builder.push(" AND ").push_bind(participant.clone()).push(" = ANY(participants)");
        }

        match query.order {
            EventOrder::CreatedDesc => builder.push(" ORDER BY created_at DESC"),
            EventOrder::DateAsc => builder.push(" ORDER BY date ASC, time ASC"),
        };

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn update_event(&self, id: &str, patch: &EventPatch, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE events SET
                title = COALESCE($2, title),
                sport = COALESCE($3, sport),
                description = COALESCE($4, description),
                date = COALESCE($5, date),
                time = COALESCE($6, time),
                city = COALESCE($7, city),
                area = COALESCE($8, area),
                skill_level = COALESCE($9, skill_level),
                max_participants = COALESCE($10, max_participants),
                status = COALESCE($11, status),
                is_active = COALESCE($12, is_active),
                updated_at = $13
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.sport)
        .bind(&patch.description)
        .bind(patch.date)
        .bind(patch.time)
        .bind(&patch.city)
        .bind(&patch.area)
        .bind(patch.skill_level.map(|l| l.as_str()))
        .bind(patch.max_participants.map(|m| m as i32))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_roster(&self, id: &str, participants: &[String], now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET participants = $2, participant_count = $3, updated_at = $4
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(participants)
        .bind(participants.len() as i32)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_event(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_events(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as u64)
    }
}

#[async_trait]
impl ActivityStore for Database {
    async fn append_activity(&self, activity: &Activity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, action, target, icon, actor_id, time)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#
        )
        .bind(&activity.id)
        .bind(&activity.action)
        .bind(&activity.target)
        .bind(&activity.icon)
        .bind(&activity.actor_id)
        .bind(activity.time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_activities(&self, limit: u32) -> Result<Vec<Activity>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, action, target, icon, actor_id, time
            FROM activities
            ORDER BY time DESC
            LIMIT $1
            "#
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Activity::from).collect())
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn insert_credential(&self, credential: &Credential) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO credentials (uid, email, password_hash, salt, display_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            "#
        )
        .bind(&credential.uid)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(&credential.salt)
        .bind(&credential.display_name)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT uid, email, password_hash, salt, display_name, created_at
            FROM credentials
            WHERE email = $1
            "#
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credential::from))
    }

    async fn set_display_name(&self, uid: &str, display_name: &str) -> Result<()> {
        sqlx::query("UPDATE credentials SET display_name = $2 WHERE uid = $1")
            .bind(uid)
            .bind(display_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_credential(&self, uid: &str) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
