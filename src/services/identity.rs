//! Identity Provider
//!
//! Email/password accounts. The gateway only sees the [`IdentityProvider`]
//! contract; provider failures carry a provider error code that maps onto a
//! fixed user-facing message table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use sha3::{Digest, Keccak256};

use crate::db::{Credential, CredentialStore};
use crate::validation;

/// 프로바이더 에러 코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorCode {
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    TooManyRequests,
    NetworkRequestFailed,
    OperationNotAllowed,
    RequiresRecentLogin,
    UserDisabled,
    Other(String),
}

impl ProviderErrorCode {
    const TABLE: [(ProviderErrorCode, &'static str); 11] = [
        (ProviderErrorCode::EmailAlreadyInUse, "auth/email-already-in-use"),
        (ProviderErrorCode::WeakPassword, "auth/weak-password"),
        (ProviderErrorCode::InvalidEmail, "auth/invalid-email"),
        (ProviderErrorCode::UserNotFound, "auth/user-not-found"),
        (ProviderErrorCode::WrongPassword, "auth/wrong-password"),
        (ProviderErrorCode::InvalidCredential, "auth/invalid-credential"),
        (ProviderErrorCode::TooManyRequests, "auth/too-many-requests"),
        (ProviderErrorCode::NetworkRequestFailed, "auth/network-request-failed"),
        (ProviderErrorCode::OperationNotAllowed, "auth/operation-not-allowed"),
        (ProviderErrorCode::RequiresRecentLogin, "auth/requires-recent-login"),
        (ProviderErrorCode::UserDisabled, "auth/user-disabled"),
    ];

    /// 코드 문자열 파싱 (모르는 코드는 `Other`)
    pub fn from_code(code: &str) -> Self {
        Self::TABLE
            .into_iter()
            .find(|(_, known)| *known == code)
            .map(|(variant, _)| variant)
            .unwrap_or_else(|| ProviderErrorCode::Other(code.to_string()))
    }

    pub fn code(&self) -> &str {
        match self {
            ProviderErrorCode::Other(code) => code,
            known => Self::TABLE
                .iter()
                .find(|(variant, _)| variant == known)
                .map(|(_, code)| *code)
                .unwrap_or("auth/unknown"),
        }
    }

    /// 사용자에게 보여줄 메시지
    pub fn message(&self) -> &'static str {
        match self {
            ProviderErrorCode::EmailAlreadyInUse => {
                "This email is already registered. Please use a different email or sign in."
            }
            ProviderErrorCode::WeakPassword => "Password is too weak. Please choose a stronger password.",
            ProviderErrorCode::InvalidEmail => "Please enter a valid email address.",
            ProviderErrorCode::UserNotFound => "No account found with this email address.",
            ProviderErrorCode::WrongPassword => "Incorrect password. Please try again.",
            ProviderErrorCode::InvalidCredential => {
                "Invalid email or password. Please check your credentials."
            }
            ProviderErrorCode::TooManyRequests => "Too many failed attempts. Please try again later.",
            ProviderErrorCode::NetworkRequestFailed => {
                "Network error. Please check your internet connection."
            }
            ProviderErrorCode::OperationNotAllowed => {
                "This operation is not allowed. Please contact support."
            }
            ProviderErrorCode::RequiresRecentLogin => "Please sign in again to complete this action.",
            ProviderErrorCode::UserDisabled => "This account has been disabled. Please contact support.",
            ProviderErrorCode::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 프로바이더가 요청을 거절함
    #[error("provider rejected request: {}", .0.code())]
    Rejected(ProviderErrorCode),

    /// 프로바이더 자체 장애
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// 인증된 계정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Account, ProviderError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, ProviderError>;
    async fn sign_out(&self, uid: &str) -> Result<(), ProviderError>;
    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), ProviderError>;
    async fn delete_account(&self, uid: &str) -> Result<(), ProviderError>;
}

/// 자체 계정 저장소를 쓰는 프로바이더
///
/// 비밀번호는 `Keccak256(salt || password)`로 저장 (salt: 16바이트 랜덤, hex)
pub struct StoreIdentityProvider {
    credentials: Arc<dyn CredentialStore>,
}

impl StoreIdentityProvider {
    /// 프로바이더가 허용하는 최소 비밀번호 길이
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    fn hash_password(salt: &str, password: &str) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn new_salt() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[async_trait]
impl IdentityProvider for StoreIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Account, ProviderError> {
        let email = email.trim().to_lowercase();
        if !validation::is_valid_email(&email) {
            return Err(ProviderError::Rejected(ProviderErrorCode::InvalidEmail));
        }
        if password.chars().count() < Self::MIN_PASSWORD_LEN {
            return Err(ProviderError::Rejected(ProviderErrorCode::WeakPassword));
        }

        let salt = Self::new_salt();
        let credential = Credential {
            uid: uuid::Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash: Self::hash_password(&salt, password),
            salt,
            display_name: None,
            created_at: Utc::now(),
        };

        if !self.credentials.insert_credential(&credential).await? {
            return Err(ProviderError::Rejected(ProviderErrorCode::EmailAlreadyInUse));
        }

        Ok(Account {
            uid: credential.uid,
            email,
            display_name: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, ProviderError> {
        let email = email.trim().to_lowercase();

        // 계정 존재 여부를 드러내지 않도록 같은 코드로 응답
        let Some(credential) = self.credentials.find_credential(&email).await? else {
            return Err(ProviderError::Rejected(ProviderErrorCode::InvalidCredential));
        };
        if Self::hash_password(&credential.salt, password) != credential.password_hash {
            return Err(ProviderError::Rejected(ProviderErrorCode::InvalidCredential));
        }

        Ok(Account {
            uid: credential.uid,
            email: credential.email,
            display_name: credential.display_name,
        })
    }

    async fn sign_out(&self, uid: &str) -> Result<(), ProviderError> {
        // 서버 측 세션 상태 없음. 캐시 정리는 게이트웨이 몫.
        tracing::debug!(uid, "provider sign-out");
        Ok(())
    }

    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), ProviderError> {
        self.credentials.set_display_name(uid, display_name).await?;
        Ok(())
    }

    async fn delete_account(&self, uid: &str) -> Result<(), ProviderError> {
        self.credentials.delete_credential(uid).await?;
        Ok(())
    }
}
