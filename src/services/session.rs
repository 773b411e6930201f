//! Session / Identity Gateway
//!
//! Registration, sign-in, sign-out and role checks on top of the
//! [`IdentityProvider`]. A session is an opaque bearer token; the signed-in
//! user is mirrored into the persistent cache under that token together with
//! its issue time. Every authenticated request re-reads the user record, so
//! deactivation ends existing sessions. Tokens expire after the session TTL
//! and expired entries are pruned whenever a new session is opened.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::cache::{CacheKey, KeyValueCache, SESSION_KEY_PREFIX};
use crate::db::{Activity, ActivityStore, ProfilePatch, User, UserPreferences, UserStats, UserStore};
use crate::error::{ApiError, AuthError};
use crate::services::diagnostics::{category, DiagnosticsSink};
use crate::services::identity::{Account, IdentityProvider, ProviderError};
use crate::types::Role;
use crate::validation::{self, RegistrationForm};

/// 발급된 세션
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// 토큰별 캐시 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSession {
    user: User,
    issued_at: DateTime<Utc>,
}

/// 부트스트랩 관리자 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminBootstrap {
    Created,
    Present,
    /// 같은 이메일/비밀번호의 일반 사용자 계정이 이미 있음
    NotAdmin,
}

/// 로그인 요청
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// 관리자 로그인 화면은 `admin`을 요구함
    #[serde(default)]
    pub expected_role: Option<Role>,
    #[serde(default)]
    pub remember: bool,
    #[serde(default)]
    pub device_id: Option<String>,
}

pub struct SessionGateway {
    identity: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
    activities: Arc<dyn ActivityStore>,
    cache: Arc<dyn KeyValueCache>,
    log: Arc<DiagnosticsSink>,
    session_ttl: Duration,
}

impl SessionGateway {
    pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;

    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        activities: Arc<dyn ActivityStore>,
        cache: Arc<dyn KeyValueCache>,
        log: Arc<DiagnosticsSink>,
    ) -> Self {
        Self {
            identity,
            users,
            activities,
            cache,
            log,
            session_ttl: Duration::hours(Self::DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    /// 회원가입 후 바로 로그인된 세션 반환
    ///
    /// 공개 가입 경로는 항상 `Role::User`로 호출함
    pub async fn register(&self, form: &RegistrationForm, role: Role) -> Result<Session, ApiError> {
        validation::validate_registration(form)?;

        let account = match self.identity.create_account(&form.email, &form.password).await {
            Ok(account) => account,
            Err(err) => return Err(self.auth_failure("Registration failed", &form.email, err)),
        };

        let now = Utc::now();
        let user = User {
            uid: account.uid.clone(),
            email: account.email.clone(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            phone: form.phone.trim().to_string(),
            city: form.city.trim().to_string(),
            area: form.area.trim().to_string(),
            role,
            is_active: true,
            profile_complete: true,
            preferences: UserPreferences::default(),
            stats: UserStats::default(),
            created_at: now,
            updated_at: now,
            last_login: Some(now),
        };

        if let Err(err) = self.users.insert_user(&user).await {
            self.discard_account(&account, &err).await;
            return Err(err.into());
        }

        // 여기부터는 가입이 이미 성립함. 부가 쓰기 실패는 기록만.
        if let Err(err) = self
            .identity
            .update_display_name(&account.uid, &user.display_name())
            .await
        {
            self.log.warn(
                category::CONSISTENCY,
                Some(&user.uid),
                "Display name update failed",
                json!({ "displayName": user.display_name(), "error": err.to_string() }),
            );
        }
        self.record_activity(Activity::new(
            "User Registration",
            &user.display_name(),
            "user-plus",
            Some(&user.uid),
        ))
        .await;

        let session = self.open_session(user)?;
        self.log.auth(
            Some(&session.user.uid),
            "User registered",
            json!({ "email": session.user.email, "role": session.user.role }),
        );
        Ok(session)
    }

    pub async fn sign_in(&self, request: &SignInRequest) -> Result<Session, ApiError> {
        let account = match self.identity.sign_in(&request.email, &request.password).await {
            Ok(account) => account,
            Err(err) => return Err(self.auth_failure("Sign in failed", &request.email, err)),
        };

        let Some(mut user) = self.users.find_user(&account.uid).await? else {
            self.identity.sign_out(&account.uid).await?;
            self.log.error(
                Some(&account.uid),
                "User record missing for authenticated account",
                json!({ "email": account.email }),
            );
            return Err(ApiError::NotFound("User profile".to_string()));
        };

        if let Some(expected) = request.expected_role {
            if user.role != expected {
                self.identity.sign_out(&account.uid).await?;
                self.log.auth(
                    Some(&user.uid),
                    "Role mismatch",
                    json!({ "expected": expected, "actual": user.role }),
                );
                return Err(AuthError::RoleMismatch { expected }.into());
            }
        }

        if !user.is_active {
            self.identity.sign_out(&account.uid).await?;
            self.log.auth(Some(&user.uid), "Disabled account sign in refused", Value::Null);
            return Err(AuthError::AccountDisabled.into());
        }

        let now = Utc::now();
        self.users.record_login(&user.uid, now).await?;
        user.last_login = Some(now);
        user.updated_at = now;

        if let Some(device_id) = request.device_id.as_deref() {
            let key = CacheKey::RememberedEmail(device_id);
            if request.remember {
                self.cache.set_json(&key, &user.email)?;
            } else {
                self.cache.remove_key(&key)?;
            }
        }

        let session = self.open_session(user)?;
        self.log.auth(
            Some(&session.user.uid),
            "User signed in",
            json!({ "email": session.user.email, "role": session.user.role }),
        );
        Ok(session)
    }

    /// 세션이 이미 없으면 아무것도 하지 않음
    pub async fn sign_out(&self, token: &str) -> Result<(), ApiError> {
        let Some(user) = self.current_user(token)? else {
            return Ok(());
        };
        self.identity.sign_out(&user.uid).await?;
        self.cache.remove_key(&CacheKey::CurrentUser(token))?;
        self.log.auth(Some(&user.uid), "User signed out", Value::Null);
        Ok(())
    }

    /// 캐시된 로그인 사용자 (만료된 세션은 `None`)
    pub fn current_user(&self, token: &str) -> Result<Option<User>, ApiError> {
        Ok(self.load_session(token, Utc::now())?.map(|session| session.user))
    }

    /// 로그인 필수
    ///
    /// 저장소의 사용자 레코드를 다시 읽음. 사라졌거나 비활성화된 계정의
    /// 세션은 여기서 끝남.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        Ok(self.authenticate_session(token).await?.user)
    }

    pub fn is_admin(&self, token: &str) -> Result<bool, ApiError> {
        Ok(self.current_user(token)?.is_some_and(|user| user.is_admin()))
    }

    /// 역할 검사
    ///
    /// 세션 없음 → 401, 역할 불일치 → 403
    pub async fn require_role(&self, token: &str, role: Role) -> Result<User, ApiError> {
        let user = self.authenticate(token).await?;
        if user.role != role {
            self.log.warn(
                category::AUTHENTICATION,
                Some(&user.uid),
                "Access denied",
                json!({ "required": role, "actual": user.role }),
            );
            return Err(ApiError::Forbidden(format!("Access denied. {} role required.", role)));
        }
        Ok(user)
    }

    pub async fn update_profile(&self, token: &str, patch: &ProfilePatch) -> Result<User, ApiError> {
        let mut session = self.authenticate_session(token).await?;
        validation::validate_profile_patch(patch, &session.user.city)?;

        let fields = patch.field_names();
        if fields.is_empty() {
            return Err(ApiError::BadRequest("Nothing to update".to_string()));
        }

        let now = Utc::now();
        let user = &mut session.user;
        self.users.update_profile(&user.uid, patch, now).await?;
        patch.apply_to(user);
        user.updated_at = now;

        if patch.first_name.is_some() || patch.last_name.is_some() {
            self.identity
                .update_display_name(&user.uid, &user.display_name())
                .await?;
        }

        self.cache.set_json(&CacheKey::CurrentUser(token), &session)?;
        self.log.user_action(&session.user.uid, "Profile updated", json!({ "fields": fields }));
        Ok(session.user)
    }

    pub fn remembered_email(&self, device_id: &str) -> Result<Option<String>, ApiError> {
        Ok(self.cache.get_json(&CacheKey::RememberedEmail(device_id))?)
    }

    /// 부트스트랩 관리자 계정
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<AdminBootstrap, ApiError> {
        match self.identity.sign_in(email, password).await {
            Ok(account) => {
                self.identity.sign_out(&account.uid).await?;
                match self.users.find_user(&account.uid).await? {
                    Some(user) if user.is_admin() => return Ok(AdminBootstrap::Present),
                    Some(user) => {
                        self.log.warn(
                            category::AUTHENTICATION,
                            Some(&user.uid),
                            "Bootstrap admin email belongs to a non-admin account",
                            json!({ "email": user.email, "role": user.role }),
                        );
                        return Ok(AdminBootstrap::NotAdmin);
                    }
                    None => {
                        // 프로필 없이 남은 계정: 지우고 새로 만듦
                        self.log.warn(
                            category::CONSISTENCY,
                            Some(&account.uid),
                            "Removing credential without user profile",
                            json!({ "email": account.email }),
                        );
                        self.identity.delete_account(&account.uid).await?;
                    }
                }
            }
            Err(ProviderError::Backend(err)) => return Err(err.into()),
            Err(ProviderError::Rejected(_)) => {}
        }

        let form = RegistrationForm {
            first_name: "Site".to_string(),
            last_name: "Admin".to_string(),
            email: email.to_string(),
            phone: "+10000000000".to_string(),
            password: password.to_string(),
            confirm_password: None,
            city: "london".to_string(),
            area: "central-london".to_string(),
        };
        let session = self.register(&form, Role::Admin).await?;
        self.cache.remove_key(&CacheKey::CurrentUser(&session.token))?;
        Ok(AdminBootstrap::Created)
    }

    fn open_session(&self, user: User) -> Result<Session, ApiError> {
        let now = Utc::now();
        self.prune_expired(now);

        let token = uuid::Uuid::new_v4().to_string();
        let cached = CachedSession { user, issued_at: now };
        self.cache.set_json(&CacheKey::CurrentUser(&token), &cached)?;
        Ok(Session { token, user: cached.user })
    }

    /// 만료된 세션은 읽는 즉시 제거
    fn load_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<CachedSession>, ApiError> {
        let key = CacheKey::CurrentUser(token);
        let Some(session) = self.cache.get_json::<CachedSession>(&key)? else {
            return Ok(None);
        };
        if self.is_expired(&session, now) {
            self.cache.remove_key(&key)?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn authenticate_session(&self, token: &str) -> Result<CachedSession, ApiError> {
        let mut session = self
            .load_session(token, Utc::now())?
            .ok_or(AuthError::NotAuthenticated)?;
        let key = CacheKey::CurrentUser(token);

        let Some(user) = self.users.find_user(&session.user.uid).await? else {
            self.cache.remove_key(&key)?;
            self.log.auth(
                Some(&session.user.uid),
                "Session ended for missing user record",
                Value::Null,
            );
            return Err(AuthError::NotAuthenticated.into());
        };
        if !user.is_active {
            self.cache.remove_key(&key)?;
            self.log.auth(Some(&user.uid), "Session ended for disabled account", Value::Null);
            return Err(AuthError::AccountDisabled.into());
        }

        if user != session.user {
            session.user = user;
            self.cache.set_json(&key, &session)?;
        }
        Ok(session)
    }

    fn is_expired(&self, session: &CachedSession, now: DateTime<Utc>) -> bool {
        session.issued_at + self.session_ttl <= now
    }

    /// 만료되었거나 읽을 수 없는 세션 항목 정리
    fn prune_expired(&self, now: DateTime<Utc>) {
        let keys = match self.cache.keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("failed to list cache keys: {:#}", err);
                return;
            }
        };

        let mut removed = 0usize;
        for token in keys.iter().filter_map(|key| key.strip_prefix(SESSION_KEY_PREFIX)) {
            let key = CacheKey::CurrentUser(token);
            let stale = match self.cache.get_json::<CachedSession>(&key) {
                Ok(Some(session)) => self.is_expired(&session, now),
                Ok(None) => true,
                Err(_) => false,
            };
            if stale && self.cache.remove_key(&key).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.log.debug("Expired sessions pruned", json!({ "count": removed }));
        }
    }

    /// 프로필 저장 실패 시 방금 만든 계정을 되돌림
    async fn discard_account(&self, account: &Account, err: &anyhow::Error) {
        self.log.error(
            Some(&account.uid),
            "User profile write failed",
            json!({ "email": account.email, "error": format!("{:#}", err) }),
        );
        if let Err(rollback) = self.identity.delete_account(&account.uid).await {
            self.log.warn(
                category::CONSISTENCY,
                Some(&account.uid),
                "Orphaned credential left behind",
                json!({ "email": account.email, "error": rollback.to_string() }),
            );
        }
    }

    async fn record_activity(&self, activity: Activity) {
        if let Err(err) = self.activities.append_activity(&activity).await {
            self.log.error(
                activity.actor_id.as_deref(),
                "Failed to record activity",
                json!({ "action": activity.action, "error": format!("{:#}", err) }),
            );
        }
    }

    fn auth_failure(&self, action: &str, email: &str, err: ProviderError) -> ApiError {
        let err = ApiError::from(err);
        self.log.auth(
            None,
            action,
            json!({ "email": email.trim().to_lowercase(), "error": err.to_string() }),
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::MemoryCache;
    use crate::db::memory::{FailPoint, MemoryStore};
    use crate::db::CredentialStore;
    use crate::services::diagnostics::SinkConfig;
    use crate::services::identity::StoreIdentityProvider;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        gateway: SessionGateway,
        store: Arc<MemoryStore>,
        cache: Arc<dyn KeyValueCache>,
        log: Arc<DiagnosticsSink>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let log = Arc::new(DiagnosticsSink::new(SinkConfig::default(), cache.clone()));
        let gateway = SessionGateway::new(
            Arc::new(StoreIdentityProvider::new(store.clone())),
            store.clone(),
            store.clone(),
            cache.clone(),
            log.clone(),
        )
        .with_session_ttl(Duration::hours(1));
        Fixture { gateway, store, cache, log }
    }

    /// 발급 시각을 과거로 돌린 세션 항목
    fn backdate(fx: &Fixture, token: &str, user: &User, hours: i64) {
        let stale = CachedSession {
            user: user.clone(),
            issued_at: Utc::now() - Duration::hours(hours),
        };
        fx.cache.set_json(&CacheKey::CurrentUser(token), &stale).unwrap();
    }

    fn form(email: &str) -> RegistrationForm {
        RegistrationForm {
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            email: email.into(),
            phone: "+44 7700 900123".into(),
            password: "Secret1!".into(),
            confirm_password: Some("Secret1!".into()),
            city: "london".into(),
            area: "central-london".into(),
        }
    }

    fn login(email: &str, expected_role: Option<Role>) -> SignInRequest {
        SignInRequest {
            email: email.into(),
            password: "Secret1!".into(),
            expected_role,
            ..SignInRequest::default()
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_and_session() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        assert_eq!(session.user.role, Role::User);
        assert_eq!(session.user.stats, UserStats::default());
        assert!(fx.store.find_user(&session.user.uid).await.unwrap().is_some());

        let cached = fx.gateway.current_user(&session.token).unwrap().unwrap();
        assert_eq!(cached.uid, session.user.uid);

        let activity = fx.store.recent_activities(1).await.unwrap();
        assert_eq!(activity[0].action, "User Registration");
        assert_eq!(activity[0].target, "Ana Lima");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let fx = fixture();
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let err = assert_err!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        assert!(matches!(err, ApiError::Auth(AuthError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_form() {
        let fx = fixture();
        let mut bad = form("ana@example.com");
        bad.area = "north-york".into();

        let err = assert_err!(fx.gateway.register(&bad, Role::User).await);
        assert!(matches!(err, ApiError::ValidationError(ref fields) if fields.contains_key("area")));
        assert_eq!(fx.store.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let fx = fixture();
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let session = assert_ok!(fx.gateway.sign_in(&login("ANA@example.com", None)).await);
        assert!(session.user.last_login.is_some());
        assert!(!fx.gateway.is_admin(&session.token).unwrap());

        assert_ok!(fx.gateway.sign_out(&session.token).await);
        assert!(fx.gateway.current_user(&session.token).unwrap().is_none());
        assert!(fx.cache.get(&CacheKey::CurrentUser(&session.token).name()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_role_mismatch_signs_out() {
        let fx = fixture();
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let err = assert_err!(fx.gateway.sign_in(&login("ana@example.com", Some(Role::Admin))).await);
        assert!(matches!(
            err,
            ApiError::Auth(AuthError::RoleMismatch { expected: Role::Admin })
        ));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let fx = fixture();
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let mut request = login("ana@example.com", None);
        request.password = "Wrong1!".into();
        let err = assert_err!(fx.gateway.sign_in(&request).await);
        assert!(matches!(err, ApiError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_disabled_account_refused() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        fx.store.set_active(&session.user.uid, false, Utc::now()).await.unwrap();

        let err = assert_err!(fx.gateway.sign_in(&login("ana@example.com", None)).await);
        assert!(matches!(err, ApiError::Auth(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn test_remember_email_per_device() {
        let fx = fixture();
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let mut request = login("ana@example.com", None);
        request.remember = true;
        request.device_id = Some("laptop".into());
        assert_ok!(fx.gateway.sign_in(&request).await);
        assert_eq!(
            fx.gateway.remembered_email("laptop").unwrap().as_deref(),
            Some("ana@example.com")
        );
        assert!(fx.gateway.remembered_email("phone").unwrap().is_none());

        request.remember = false;
        assert_ok!(fx.gateway.sign_in(&request).await);
        assert!(fx.gateway.remembered_email("laptop").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_require_role() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        assert_ok!(fx.gateway.require_role(&session.token, Role::User).await);
        let err = assert_err!(fx.gateway.require_role(&session.token, Role::Admin).await);
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = assert_err!(fx.gateway.require_role("no-such-token", Role::User).await);
        assert!(matches!(err, ApiError::Auth(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_update_profile_merges_cache() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let patch = ProfilePatch {
            city: Some("toronto".into()),
            area: Some("north-york".into()),
            ..ProfilePatch::default()
        };
        let user = assert_ok!(fx.gateway.update_profile(&session.token, &patch).await);
        assert_eq!(user.city, "toronto");

        let cached = fx.gateway.current_user(&session.token).unwrap().unwrap();
        assert_eq!(cached.area, "north-york");
        let stored = fx.store.find_user(&user.uid).await.unwrap().unwrap();
        assert_eq!(stored.city, "toronto");

        let bad_area = ProfilePatch {
            area: Some("central-london".into()),
            ..ProfilePatch::default()
        };
        assert_err!(fx.gateway.update_profile(&session.token, &bad_area).await);
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let fx = fixture();
        assert_eq!(
            assert_ok!(fx.gateway.ensure_admin("admin@example.com", "Admin123!").await),
            AdminBootstrap::Created
        );
        assert_eq!(
            assert_ok!(fx.gateway.ensure_admin("admin@example.com", "Admin123!").await),
            AdminBootstrap::Present
        );

        let mut request = login("admin@example.com", Some(Role::Admin));
        request.password = "Admin123!".into();
        let session = assert_ok!(fx.gateway.sign_in(&request).await);
        assert!(fx.gateway.is_admin(&session.token).unwrap());
    }

    #[tokio::test]
    async fn test_ensure_admin_reports_non_admin_owner() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("admin@example.com"), Role::User).await);

        let outcome = assert_ok!(fx.gateway.ensure_admin("admin@example.com", "Secret1!").await);
        assert_eq!(outcome, AdminBootstrap::NotAdmin);

        let stored = fx.store.find_user(&session.user.uid).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::User);
        assert!(fx
            .log
            .by_category(category::AUTHENTICATION)
            .iter()
            .any(|entry| entry.message.contains("non-admin account")));
    }

    #[tokio::test]
    async fn test_deactivation_ends_existing_session() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        assert_ok!(fx.gateway.authenticate(&session.token).await);

        fx.store.set_active(&session.user.uid, false, Utc::now()).await.unwrap();

        let err = assert_err!(fx.gateway.authenticate(&session.token).await);
        assert!(matches!(err, ApiError::Auth(AuthError::AccountDisabled)));
        assert!(fx.gateway.current_user(&session.token).unwrap().is_none());

        // 다시 활성화해도 끝난 세션은 돌아오지 않음
        fx.store.set_active(&session.user.uid, true, Utc::now()).await.unwrap();
        let err = assert_err!(fx.gateway.authenticate(&session.token).await);
        assert!(matches!(err, ApiError::Auth(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_cached_user() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);

        let patch = ProfilePatch {
            first_name: Some("Anabel".into()),
            ..ProfilePatch::default()
        };
        fx.store.update_profile(&session.user.uid, &patch, Utc::now()).await.unwrap();

        let user = assert_ok!(fx.gateway.authenticate(&session.token).await);
        assert_eq!(user.first_name, "Anabel");
        let cached = fx.gateway.current_user(&session.token).unwrap().unwrap();
        assert_eq!(cached.first_name, "Anabel");
    }

    #[tokio::test]
    async fn test_session_expires_after_ttl() {
        let fx = fixture();
        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        backdate(&fx, &session.token, &session.user, 2);

        assert!(fx.gateway.current_user(&session.token).unwrap().is_none());
        assert!(fx.cache.get(&CacheKey::CurrentUser(&session.token).name()).unwrap().is_none());

        let err = assert_err!(fx.gateway.authenticate(&session.token).await);
        assert!(matches!(err, ApiError::Auth(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_new_session_prunes_expired_entries() {
        let fx = fixture();
        let first = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        backdate(&fx, "forgotten-token", &first.user, 5);

        let second = assert_ok!(fx.gateway.sign_in(&login("ana@example.com", None)).await);

        let keys = fx.cache.keys().unwrap();
        assert!(!keys.contains(&CacheKey::CurrentUser("forgotten-token").name()));
        assert!(keys.contains(&CacheKey::CurrentUser(&first.token).name()));
        assert!(keys.contains(&CacheKey::CurrentUser(&second.token).name()));
    }

    #[tokio::test]
    async fn test_failed_profile_write_releases_email() {
        let fx = fixture();
        fx.store.fail(FailPoint::UserInserts, true);

        let err = assert_err!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        assert!(matches!(err, ApiError::RemoteError(_)));
        assert!(fx.store.find_credential("ana@example.com").await.unwrap().is_none());
        assert!(fx
            .log
            .by_category(category::ERROR)
            .iter()
            .any(|entry| entry.message == "User profile write failed"));

        fx.store.fail(FailPoint::UserInserts, false);
        assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
    }

    #[tokio::test]
    async fn test_registration_survives_activity_failure() {
        let fx = fixture();
        fx.store.fail(FailPoint::ActivityWrites, true);

        let session = assert_ok!(fx.gateway.register(&form("ana@example.com"), Role::User).await);
        assert!(fx.store.find_user(&session.user.uid).await.unwrap().is_some());
        assert!(fx
            .log
            .by_category(category::ERROR)
            .iter()
            .any(|entry| entry.message == "Failed to record activity"));
    }
}
