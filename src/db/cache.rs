//! Persistent Key-Value Cache
//!
//! Fixed-name keys, JSON text values. Holds the cached identity per session,
//! remembered emails and the persisted diagnostics history.
//!
//! Reads and writes only touch memory. [`FileCache`] writes the map to disk
//! from a background task, so request handlers never wait on file I/O.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Notify;

/// 캐시 키
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// 세션 토큰별 로그인 사용자
    CurrentUser(&'a str),
    /// 기기별 "이메일 기억하기"
    RememberedEmail(&'a str),
    LogHistory,
}

impl CacheKey<'_> {
    pub fn name(&self) -> String {
        match self {
            CacheKey::CurrentUser(token) => format!("{SESSION_KEY_PREFIX}{token}"),
            CacheKey::RememberedEmail(device) => format!("rememberedEmail:{device}"),
            CacheKey::LogHistory => "sports_buddy_logs".to_string(),
        }
    }
}

/// 세션 키 접두사 (`CacheKey::CurrentUser`)
pub const SESSION_KEY_PREFIX: &str = "sports_buddy_user:";

pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

impl dyn KeyValueCache {
    /// 값이 깨져 있으면 없는 것으로 취급
    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey<'_>) -> Result<Option<T>> {
        let Some(raw) = self.get(&key.name())? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key = %key.name(), "discarding unreadable cache entry: {}", err);
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &CacheKey<'_>, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(&key.name(), &raw)
    }

    pub fn remove_key(&self, key: &CacheKey<'_>) -> Result<()> {
        self.remove(&key.name())
    }
}

/// 프로세스 메모리 캐시
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

/// JSON 파일 캐시
///
/// 전체 맵을 메모리에 두고, 변경이 생기면 [`spawn_flusher`](Self::spawn_flusher)
/// 태스크가 잠시 모았다가 임시 파일에 쓴 뒤 rename.
pub struct FileCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    dirty: Notify,
}

impl FileCache {
    /// 연속된 변경을 한 번의 쓰기로 묶는 대기 시간
    const FLUSH_DELAY: Duration = Duration::from_millis(250);

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read cache file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("cache file {} is not a JSON object", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            dirty: Notify::new(),
        })
    }

    /// 변경분을 blocking 스레드에서 파일로 기록하는 백그라운드 태스크
    pub fn spawn_flusher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.dirty.notified().await;
                tokio::time::sleep(Self::FLUSH_DELAY).await;

                let cache = self.clone();
                match tokio::task::spawn_blocking(move || cache.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!("failed to flush cache file: {:#}", err),
                    Err(err) => tracing::warn!("cache flush task failed: {}", err),
                }
            }
        })
    }

    /// 현재 맵을 즉시 파일에 기록 (종료 시)
    pub fn flush(&self) -> Result<()> {
        let bytes = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec(&*entries)?
        };
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.dirty.notify_one();
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.dirty.notify_one();
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(CacheKey::CurrentUser("t1").name(), "sports_buddy_user:t1");
        assert_eq!(CacheKey::LogHistory.name(), "sports_buddy_logs");
    }

    #[test]
    fn test_json_helpers() {
        let cache: Box<dyn KeyValueCache> = Box::new(MemoryCache::new());
        let key = CacheKey::RememberedEmail("laptop");

        cache.set_json(&key, &"ana@example.com").unwrap();
        let email: Option<String> = cache.get_json(&key).unwrap();
        assert_eq!(email.as_deref(), Some("ana@example.com"));

        cache.remove_key(&key).unwrap();
        assert_eq!(cache.get_json::<String>(&key).unwrap(), None);
    }

    #[test]
    fn test_corrupt_entry_reads_as_missing() {
        let cache: Box<dyn KeyValueCache> = Box::new(MemoryCache::new());
        cache.set("sports_buddy_logs", "{not json").unwrap();
        let logs: Option<Vec<String>> = cache.get_json(&CacheKey::LogHistory).unwrap();
        assert!(logs.is_none());
    }

    fn temp_cache_path() -> PathBuf {
        std::env::temp_dir().join(format!("sports-buddy-cache-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let path = temp_cache_path();

        let cache = FileCache::open(&path).unwrap();
        cache.set("sports_buddy_user:abc", "{\"uid\":\"u1\"}").unwrap();
        // 쓰기는 메모리에만 반영됨
        assert!(!path.exists());
        cache.flush().unwrap();
        drop(cache);

        let reopened = FileCache::open(&path).unwrap();
        assert_eq!(
            reopened.get("sports_buddy_user:abc").unwrap().as_deref(),
            Some("{\"uid\":\"u1\"}")
        );
        assert_eq!(reopened.keys().unwrap(), ["sports_buddy_user:abc"]);
        reopened.remove("sports_buddy_user:abc").unwrap();
        reopened.flush().unwrap();
        assert!(FileCache::open(&path).unwrap().get("sports_buddy_user:abc").unwrap().is_none());

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_flusher_writes_in_background() {
        let path = temp_cache_path();
        let cache = Arc::new(FileCache::open(&path).unwrap());
        let flusher = cache.clone().spawn_flusher();

        cache.set("rememberedEmail:laptop", "\"ana@example.com\"").unwrap();
        cache.set("rememberedEmail:phone", "\"bo@example.com\"").unwrap();

        let mut written = None;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(raw) = fs::read_to_string(&path) {
                let map: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
                if map.len() == 2 {
                    written = Some(map);
                    break;
                }
            }
        }
        flusher.abort();

        let written = written.expect("cache file was not flushed");
        assert_eq!(written["rememberedEmail:phone"], "\"bo@example.com\"");

        let _ = fs::remove_file(&path);
    }
}
