//! Diagnostics Sink
//!
//! Queryable application log. Newest entries first, bounded in memory and
//! (with a smaller bound) in the persistent cache. Every recorded entry is
//! mirrored to `tracing`.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::cache::{CacheKey, KeyValueCache};

/// 로그 레벨 (DEBUG < INFO < WARN < ERROR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 카테고리 이름
pub mod category {
    pub const GENERAL: &str = "GENERAL";
    pub const ERROR: &str = "ERROR";
    pub const USER_ACTION: &str = "USER_ACTION";
    pub const AUTHENTICATION: &str = "AUTHENTICATION";
    pub const API: &str = "API";
    pub const CONSISTENCY: &str = "CONSISTENCY";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub data: Value,
    /// 로그인 사용자가 없으면 "anonymous"
    pub user_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub min_level: LogLevel,
    pub memory_cap: usize,
    pub persist_cap: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            memory_cap: 1000,
            persist_cap: 100,
        }
    }
}

struct SinkState {
    min_level: LogLevel,
    entries: VecDeque<LogEntry>,
}

pub struct DiagnosticsSink {
    state: Mutex<SinkState>,
    cache: Arc<dyn KeyValueCache>,
    memory_cap: usize,
    persist_cap: usize,
}

impl DiagnosticsSink {
    /// 저장된 히스토리를 읽어 들이고 바로 사용 가능한 상태로 생성
    pub fn new(config: SinkConfig, cache: Arc<dyn KeyValueCache>) -> Self {
        let mut entries: VecDeque<LogEntry> = match cache.get_json::<Vec<LogEntry>>(&CacheKey::LogHistory) {
            Ok(saved) => saved.unwrap_or_default().into(),
            Err(err) => {
                tracing::warn!("failed to load log history: {:#}", err);
                VecDeque::new()
            }
        };
        entries.truncate(config.memory_cap);

        let sink = Self {
            state: Mutex::new(SinkState {
                min_level: config.min_level,
                entries,
            }),
            cache,
            memory_cap: config.memory_cap,
            persist_cap: config.persist_cap.min(config.memory_cap),
        };
        sink.info("Logger initialized", json!({ "timestamp": Utc::now() }));
        sink
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn level(&self) -> LogLevel {
        self.lock().min_level
    }

    pub fn set_level(&self, level: LogLevel) {
        self.lock().min_level = level;
        self.info(&format!("Log level set to: {level}"), Value::Null);
    }

    /// 최소 레벨 미만이면 기록하지 않고 `None`
    pub fn record(
        &self,
        level: LogLevel,
        category: &str,
        message: &str,
        data: Value,
        user_id: Option<&str>,
    ) -> Option<LogEntry> {
        let mut state = self.lock();
        if level < state.min_level {
            return None;
        }

        let entry = LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            category: category.to_uppercase(),
            message: message.to_string(),
            data,
            user_id: user_id.unwrap_or("anonymous").to_string(),
        };
        mirror(&entry);

        state.entries.push_front(entry.clone());
        state.entries.truncate(self.memory_cap);
        self.persist(&state.entries);

        Some(entry)
    }

    fn persist(&self, entries: &VecDeque<LogEntry>) {
        let newest: Vec<&LogEntry> = entries.iter().take(self.persist_cap).collect();
        if let Err(err) = self.cache.set_json(&CacheKey::LogHistory, &newest) {
            // 싱크 자신에게 기록하면 재귀
            tracing::warn!("failed to persist log history: {:#}", err);
        }
    }

    // ============ Helpers ============

    pub fn debug(&self, message: &str, data: Value) {
        self.record(LogLevel::Debug, category::GENERAL, message, data, None);
    }

    pub fn info(&self, message: &str, data: Value) {
        self.record(LogLevel::Info, category::GENERAL, message, data, None);
    }

    pub fn warn(&self, category: &str, user_id: Option<&str>, message: &str, data: Value) {
        self.record(LogLevel::Warn, category, message, data, user_id);
    }

    pub fn error(&self, user_id: Option<&str>, message: &str, data: Value) {
        self.record(LogLevel::Error, category::ERROR, message, data, user_id);
    }

    pub fn user_action(&self, user_id: &str, action: &str, data: Value) {
        self.record(
            LogLevel::Info,
            category::USER_ACTION,
            &format!("User action: {action}"),
            data,
            Some(user_id),
        );
    }

    pub fn auth(&self, user_id: Option<&str>, action: &str, data: Value) {
        self.record(
            LogLevel::Info,
            category::AUTHENTICATION,
            &format!("Auth: {action}"),
            data,
            user_id,
        );
    }

    /// 요청 단위라 DEBUG
    pub fn api(&self, user_id: Option<&str>, method: &str, endpoint: &str, data: Value) {
        self.record(
            LogLevel::Debug,
            category::API,
            &format!("API Call: {method} {endpoint}"),
            data,
            user_id,
        );
    }

    // ============ Queries ============

    /// 최신순 전체
    pub fn all(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.filtered(|entry| entry.level == level)
    }

    pub fn by_category(&self, category: &str) -> Vec<LogEntry> {
        let category = category.to_uppercase();
        self.filtered(|entry| entry.category == category)
    }

    /// 양 끝 포함
    pub fn by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<LogEntry> {
        self.filtered(|entry| entry.timestamp >= start && entry.timestamp <= end)
    }

    fn filtered(&self, keep: impl Fn(&LogEntry) -> bool) -> Vec<LogEntry> {
        self.lock().entries.iter().filter(|entry| keep(entry)).cloned().collect()
    }

    /// `{ exported_at, total_logs, logs }`
    pub fn export(&self) -> Value {
        let logs = self.all();
        json!({
            "exported_at": Utc::now(),
            "total_logs": logs.len(),
            "logs": logs,
        })
    }

    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.entries.clear();
            if let Err(err) = self.cache.remove_key(&CacheKey::LogHistory) {
                tracing::warn!("failed to clear persisted log history: {:#}", err);
            }
        }
        self.info("All logs cleared", Value::Null);
    }
}

fn mirror(entry: &LogEntry) {
    let category = entry.category.as_str();
    let user_id = entry.user_id.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(category, user_id, data = %entry.data, "{}", entry.message),
        LogLevel::Info => tracing::info!(category, user_id, data = %entry.data, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(category, user_id, data = %entry.data, "{}", entry.message),
        LogLevel::Error => tracing::error!(category, user_id, data = %entry.data, "{}", entry.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cache::MemoryCache;

    fn sink(memory_cap: usize, persist_cap: usize) -> (DiagnosticsSink, Arc<dyn KeyValueCache>) {
        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let config = SinkConfig {
            min_level: LogLevel::Debug,
            memory_cap,
            persist_cap,
        };
        (DiagnosticsSink::new(config, cache.clone()), cache)
    }

    fn persisted(cache: &Arc<dyn KeyValueCache>) -> Vec<LogEntry> {
        cache.get_json(&CacheKey::LogHistory).unwrap().unwrap_or_default()
    }

    #[test]
    fn test_initialized_on_construction() {
        let (sink, _) = sink(10, 5);
        let entries = sink.all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Logger initialized");
        assert_eq!(entries[0].user_id, "anonymous");
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let (sink, cache) = sink(5, 3);
        for i in 0..8 {
            sink.info(&format!("entry {i}"), Value::Null);
        }

        let messages: Vec<_> = sink.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["entry 7", "entry 6", "entry 5", "entry 4", "entry 3"]);

        let saved: Vec<_> = persisted(&cache).into_iter().map(|e| e.message).collect();
        assert_eq!(saved, ["entry 7", "entry 6", "entry 5"]);
    }

    #[test]
    fn test_min_level_filters() {
        let (sink, _) = sink(10, 10);
        sink.set_level(LogLevel::Warn);
        sink.debug("noise", Value::Null);
        sink.info("still noise", Value::Null);
        sink.warn(category::CONSISTENCY, Some("u1"), "stats out of sync", json!({ "delta": 1 }));
        sink.error(Some("u1"), "boom", Value::Null);

        let levels: Vec<_> = sink.all().into_iter().map(|e| e.level).collect();
        // "Log level set to" 는 레벨 변경 후 INFO라 기록되지 않음
        assert_eq!(levels, [LogLevel::Error, LogLevel::Warn, LogLevel::Info]);
        assert_eq!(sink.by_level(LogLevel::Warn)[0].user_id, "u1");
    }

    #[test]
    fn test_queries() {
        let (sink, _) = sink(10, 10);
        let start = Utc::now();
        sink.user_action("u1", "Joined event", json!({ "eventId": "e1" }));
        sink.auth(Some("u1"), "User signed in", Value::Null);
        let end = Utc::now();

        assert_eq!(sink.by_category("user_action").len(), 1);
        assert_eq!(sink.by_category(category::AUTHENTICATION)[0].message, "Auth: User signed in");
        assert_eq!(sink.by_date_range(start, end).len(), 2);
    }

    #[test]
    fn test_history_reloaded() {
        let (sink, cache) = sink(10, 10);
        sink.info("before restart", Value::Null);
        drop(sink);

        let reloaded = DiagnosticsSink::new(SinkConfig::default(), cache);
        let messages: Vec<_> = reloaded.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages[0], "Logger initialized");
        assert!(messages.contains(&"before restart".to_string()));
    }

    #[test]
    fn test_export_and_clear() {
        let (sink, cache) = sink(10, 10);
        sink.info("one", Value::Null);

        let export = sink.export();
        assert_eq!(export["total_logs"], 2);
        assert_eq!(export["logs"][0]["message"], "one");

        sink.clear();
        let messages: Vec<_> = sink.all().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["All logs cleared"]);
        assert_eq!(persisted(&cache).len(), 1);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
