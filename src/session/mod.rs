//! Session context tracking
//!
//! Per-session rolling state used to personalise expansion and re-ranking:
//! bounded query history, bounded successful-query list, content-type and
//! topic counters, and a complexity estimate. Sessions live in a concurrent
//! map with idle-TTL and size-cap eviction.
use crate::config::SessionConfig;
use crate::documents::ContentType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Rolling estimate of how deep the user's questions go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    #[default]
    Medium,
    Advanced,
    Technical,
}

const SIMPLE_TRIGGERS: &[&str] = &["simple", "basic", "beginner", "easy", "quick"];
const ADVANCED_TRIGGERS: &[&str] = &["advanced", "complex", "optimize", "performance", "efficient"];
const TECHNICAL_TRIGGERS: &[&str] = &["api", "implementation", "bytecode", "mixin", "internals", "asm"];

impl ComplexityLevel {
    /// Detect an explicit complexity cue; technical beats advanced beats simple
    pub fn detect(query_text: &str) -> Option<Self> {
        let tokens = crate::text::tokenize(query_text);
        let has = |triggers: &[&str]| tokens.iter().any(|t| triggers.contains(&t.as_str()));

        if has(TECHNICAL_TRIGGERS) {
            Some(ComplexityLevel::Technical)
        } else if has(ADVANCED_TRIGGERS) {
            Some(ComplexityLevel::Advanced)
        } else if has(SIMPLE_TRIGGERS) {
            Some(ComplexityLevel::Simple)
        } else {
            None
        }
    }

    /// Vocabulary the contextual expander adds for this level
    pub fn vocabulary(&self) -> &'static [&'static str] {
        match self {
            ComplexityLevel::Simple => &["beginner", "basics"],
            ComplexityLevel::Medium => &["guide"],
            ComplexityLevel::Advanced => &["advanced", "optimization"],
            ComplexityLevel::Technical => &["implementation", "api reference"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::Advanced => "advanced",
            ComplexityLevel::Technical => "technical",
        }
    }
}

/// One answered query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    pub result_count: usize,
    /// Content types of the returned sources
    pub content_types: Vec<ContentType>,
    /// Domain topics the query touched
    pub topics: Vec<String>,
}

impl QueryRecord {
    pub fn new(query: impl Into<String>, confidence: f32) -> Self {
        Self {
            query: query.into(),
            timestamp: Utc::now(),
            confidence,
            result_count: 0,
            content_types: Vec::new(),
            topics: Vec::new(),
        }
    }
}

/// Per-session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Most recent last
    pub queries: Vec<QueryRecord>,
    pub successful_queries: Vec<QueryRecord>,
    pub content_type_preferences: BTreeMap<ContentType, u32>,
    pub topic_interests: BTreeMap<String, u32>,
    pub complexity_level: ComplexityLevel,
    pub total_queries: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_activity: now,
            queries: Vec::new(),
            successful_queries: Vec::new(),
            content_type_preferences: BTreeMap::new(),
            topic_interests: BTreeMap::new(),
            complexity_level: ComplexityLevel::default(),
            total_queries: 0,
        }
    }

    /// Append a query, update counters and trim both lists to their caps
    pub fn record(
        &mut self,
        record: QueryRecord,
        successful: bool,
        max_history: usize,
        max_successful: usize,
    ) {
        for content_type in &record.content_types {
            *self.content_type_preferences.entry(*content_type).or_insert(0) += 1;
        }
        for topic in &record.topics {
            *self.topic_interests.entry(topic.clone()).or_insert(0) += 1;
        }
        if let Some(level) = ComplexityLevel::detect(&record.query) {
            self.complexity_level = level;
        }

        self.last_activity = record.timestamp.max(self.last_activity);
        self.total_queries += 1;

        if successful {
            self.successful_queries.push(record.clone());
            trim_front(&mut self.successful_queries, max_successful);
        }
        self.queries.push(record);
        trim_front(&mut self.queries, max_history);
    }

    /// Up to `n` most frequent topics, ties broken alphabetically
    pub fn favorite_topics(&self, n: usize) -> Vec<String> {
        let mut topics: Vec<(&String, &u32)> = self.topic_interests.iter().collect();
        topics.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        topics.into_iter().take(n).map(|(t, _)| t.clone()).collect()
    }

    /// Share of past sources with this content type, in [0,1]
    pub fn content_type_share(&self, content_type: ContentType) -> f32 {
        let total: u32 = self.content_type_preferences.values().sum();
        if total == 0 {
            return 0.0;
        }
        self.content_type_preferences
            .get(&content_type)
            .copied()
            .unwrap_or(0) as f32
            / total as f32
    }
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

/// Concurrent session map with trimming and eviction
pub struct SessionStore {
    sessions: DashMap<String, SessionContext>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Snapshot of a session
    pub fn get(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Snapshot of a session, creating it if missing
    pub fn get_or_create(&self, session_id: &str) -> SessionContext {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id))
            .clone()
    }

    /// Record a finished query, then run eviction
    ///
    /// Returns the ids of the sessions eviction removed.
    pub fn record(&self, session_id: &str, record: QueryRecord, successful: bool) -> Vec<String> {
        {
            let mut entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionContext::new(session_id));
            entry.record(
                record,
                successful,
                self.config.max_history,
                self.config.max_successful,
            );
        }
        self.evict(Utc::now())
    }

    /// Remove a session; returns whether it existed
    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    /// Drop idle sessions, then the least recently active ones above the cap
    ///
    /// Returns the ids of the removed sessions.
    pub fn evict(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut evicted = Vec::new();

        if self.config.idle_ttl_secs > 0 {
            let ttl = i64::try_from(self.config.idle_ttl_secs).unwrap_or(i64::MAX);
            let idle: Vec<String> = self
                .sessions
                .iter()
                .filter(|r| (now - r.last_activity).num_seconds() > ttl)
                .map(|r| r.key().clone())
                .collect();
            for id in idle {
                if self.sessions.remove(&id).is_some() {
                    evicted.push(id);
                }
            }
        }

        let over = self.sessions.len().saturating_sub(self.config.max_sessions);
        if over > 0 {
            let mut by_activity: Vec<(String, DateTime<Utc>)> = self
                .sessions
                .iter()
                .map(|r| (r.key().clone(), r.last_activity))
                .collect();
            by_activity.sort_by(|a, b| a.1.cmp(&b.1));
            for (id, _) in by_activity.into_iter().take(over) {
                if self.sessions.remove(&id).is_some() {
                    evicted.push(id);
                }
            }
        }

        if !evicted.is_empty() {
            debug!(
                removed = evicted.len(),
                remaining = self.sessions.len(),
                "Evicted sessions"
            );
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(query: &str, confidence: f32) -> QueryRecord {
        QueryRecord {
            content_types: vec![ContentType::Documentation],
            topics: vec!["blocks".to_string()],
            ..QueryRecord::new(query, confidence)
        }
    }

    #[test]
    fn test_history_trimmed_to_caps() {
        let store = SessionStore::default();
        for i in 0..25 {
            store.record("s1", record(&format!("query {}", i), 0.9), true);
        }

        let ctx = store.get("s1").unwrap();
        assert_eq!(ctx.queries.len(), 20);
        assert_eq!(ctx.successful_queries.len(), 10);
        assert_eq!(ctx.total_queries, 25);
        assert_eq!(ctx.queries[0].query, "query 5");
        assert_eq!(ctx.successful_queries.last().unwrap().query, "query 24");
    }

    #[test]
    fn test_counters_and_complexity() {
        let mut ctx = SessionContext::new("s1");
        ctx.record(record("a basic block", 0.2), false, 20, 10);
        assert_eq!(ctx.complexity_level, ComplexityLevel::Simple);
        assert!(ctx.successful_queries.is_empty());

        ctx.record(record("block tips", 0.2), false, 20, 10);
        assert_eq!(ctx.complexity_level, ComplexityLevel::Simple);
        assert_eq!(ctx.topic_interests["blocks"], 2);
        assert_eq!(ctx.content_type_share(ContentType::Documentation), 1.0);
        assert_eq!(ctx.content_type_share(ContentType::Code), 0.0);

        ctx.record(record("mixin internals", 0.2), false, 20, 10);
        assert_eq!(ctx.complexity_level, ComplexityLevel::Technical);
    }

    #[test]
    fn test_favorite_topics() {
        let mut ctx = SessionContext::new("s1");
        ctx.topic_interests.insert("redstone".to_string(), 1);
        ctx.topic_interests.insert("blocks".to_string(), 3);
        ctx.topic_interests.insert("items".to_string(), 1);
        assert_eq!(ctx.favorite_topics(2), vec!["blocks", "items"]);
    }

    #[test]
    fn test_clear_and_get_or_create() {
        let store = SessionStore::default();
        assert!(store.get("s1").is_none());
        let ctx = store.get_or_create("s1");
        assert_eq!(ctx.session_id, "s1");
        assert_eq!(store.len(), 1);
        assert!(store.clear("s1"));
        assert!(!store.clear("s1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_eviction_by_ttl_and_cap() {
        let store = SessionStore::new(SessionConfig {
            idle_ttl_secs: 60,
            max_sessions: 2,
            ..SessionConfig::default()
        });
        let now = Utc::now();
        let insert = |id: &str, idle_secs: i64| {
            let mut ctx = SessionContext::new(id);
            ctx.last_activity = now - Duration::seconds(idle_secs);
            store.sessions.insert(id.to_string(), ctx);
        };

        insert("stale", 600);
        insert("a", 30);
        insert("b", 20);
        insert("c", 10);

        let mut evicted = store.evict(now);
        evicted.sort();
        assert_eq!(evicted, vec!["a", "stale"]);
        assert!(store.get("stale").is_none());
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_record_evicts_idle_sessions() {
        let store = SessionStore::new(SessionConfig {
            idle_ttl_secs: 60,
            ..SessionConfig::default()
        });
        let mut stale = SessionContext::new("stale");
        stale.last_activity = Utc::now() - Duration::seconds(600);
        store.sessions.insert("stale".to_string(), stale);

        let evicted = store.record("fresh", record("fresh", 0.9), true);
        assert_eq!(evicted, vec!["stale"]);
        assert!(store.get("stale").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_detect_complexity() {
        assert_eq!(ComplexityLevel::detect("an easy recipe"), Some(ComplexityLevel::Simple));
        assert_eq!(
            ComplexityLevel::detect("optimize the api"),
            Some(ComplexityLevel::Technical)
        );
        assert_eq!(ComplexityLevel::detect("custom block"), None);
    }
}
