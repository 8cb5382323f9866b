//! Session store
//!
//! Abstraction over a time-expiring key/value cache holding
//! session-id -> account-record mappings. No business logic lives here;
//! the manager decides when entries are created, superseded, or deleted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;

use crate::error::AppError;
use crate::provider::AccountRecord;

/// Time-to-live for a store write.
///
/// An explicit enum instead of an overloaded zero value, so "use the
/// store default" can never be confused with "expire immediately".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the store's configured default TTL.
    Default,
    /// Pin an explicit TTL for this write.
    For(std::time::Duration),
}

impl Ttl {
    /// Resolve against the store's configured default.
    pub fn resolve(self, default: std::time::Duration) -> std::time::Duration {
        match self {
            Ttl::Default => default,
            Ttl::For(duration) => duration,
        }
    }
}

/// The stored mapping unit: one entry per logical browser session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionEntry {
    /// Opaque session identifier the entry is stored under.
    pub session_id: String,
    /// Provider credential bundle (1:1 with the entry).
    pub account: AccountRecord,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// When the store will stop returning the entry.
    ///
    /// Stamped by the store at write time from the resolved TTL.
    pub expires_at: DateTime<Utc>,
}

impl SessionEntry {
    /// Check if the entry is past its store expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Time-expiring key/value store for session entries.
///
/// Every write replaces a full entry atomically; deleting an absent key
/// is success. TTL is measured from write time.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up an entry. Expired entries read as absent.
    async fn get(&self, session_id: &str) -> Result<Option<SessionEntry>, AppError>;

    /// Write a full entry under `session_id`, stamping its expiry from
    /// `ttl`. Returns the written entry so callers observe the
    /// effective expiry.
    async fn set(
        &self,
        session_id: &str,
        account: AccountRecord,
        ttl: Ttl,
    ) -> Result<SessionEntry, AppError>;

    /// Delete an entry. Deleting an absent key is not an error.
    async fn delete(&self, session_id: &str) -> Result<(), AppError>;
}

/// In-memory session store (volatile, cleared on restart).
///
/// Uses Moka for high-performance concurrent caching. Expiry is checked
/// lazily on read; capacity bounds memory.
pub struct MemorySessionStore {
    entries: Cache<String, SessionEntry>,
    /// Default TTL applied to `Ttl::Default` writes.
    default_ttl: std::time::Duration,
}

impl MemorySessionStore {
    /// Create a new session store.
    ///
    /// # Arguments
    /// * `default_ttl` - TTL applied when a write does not pin its own
    /// * `max_entries` - Maximum number of entries to keep (LRU eviction)
    pub fn new(default_ttl: std::time::Duration, max_entries: u64) -> Self {
        let entries = Cache::builder().max_capacity(max_entries).build();

        Self {
            entries,
            default_ttl,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionEntry>, AppError> {
        let result = self.entries.get(session_id).await;

        // Lazy expiry: a past-TTL entry reads as a miss and is reclaimed.
        let result = match result {
            Some(entry) if entry.is_expired() => {
                self.entries.invalidate(session_id).await;
                None
            }
            other => other,
        };

        // Record cache hit/miss
        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if result.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&["session"]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&["session"]).inc();
        }

        Ok(result)
    }

    async fn set(
        &self,
        session_id: &str,
        account: AccountRecord,
        ttl: Ttl,
    ) -> Result<SessionEntry, AppError> {
        let now = Utc::now();
        let effective_ttl = ttl.resolve(self.default_ttl);
        let expires_at = now
            + Duration::from_std(effective_ttl).map_err(|e| {
                AppError::StoreUnavailable(format!("session TTL out of range: {e}"))
            })?;

        let entry = SessionEntry {
            session_id: session_id.to_string(),
            account,
            created_at: now,
            expires_at,
        };

        self.entries
            .insert(session_id.to_string(), entry.clone())
            .await;

        // Update cache size metric
        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE
            .with_label_values(&["session"])
            .set(self.entries.entry_count() as i64);

        Ok(entry)
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.entries.invalidate(session_id).await;
        Ok(())
    }
}
