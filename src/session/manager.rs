//! Session lifecycle manager
//!
//! The core state machine. Per session identifier a session is ABSENT
//! (no entry), ACTIVE (entry present, token presumed valid), STALE
//! (entry present, access token past its expiry but refresh token still
//! usable), or REVOKED (logout or terminal refresh failure; entry
//! deleted). Orchestrates the provider client and the session store;
//! never retries, never holds locks across I/O.

use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::{SESSION_LOGINS_TOTAL, SESSION_LOGOUTS_TOTAL, SESSION_REFRESHES_TOTAL,
    SESSION_VALIDATIONS_TOTAL};
use crate::provider::{AccountRecord, ProviderClient};
use crate::session::store::{SessionStore, Ttl};

/// A session minted by `login` or `refresh`.
///
/// The caller is responsible for handing `session_id` back to the
/// client (cookie or header) — the manager only stores it.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    /// Opaque identifier the client presents on subsequent requests.
    pub session_id: String,
    /// The provider credential bundle bound to the identifier.
    pub account: AccountRecord,
    /// When the store entry expires.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a read-only session validation.
#[derive(Debug, Clone)]
pub enum Validation {
    /// Entry present, access token still fresh.
    Active(AccountRecord),
    /// Entry present, access token past its recorded expiry; the
    /// refresh token may still be usable.
    Stale(AccountRecord),
    /// No entry (store miss, expired entry, or store failure).
    Absent,
}

impl Validation {
    /// The account, when the session resolved to one.
    pub fn account(&self) -> Option<&AccountRecord> {
        match self {
            Validation::Active(account) | Validation::Stale(account) => Some(account),
            Validation::Absent => None,
        }
    }
}

/// Orchestrates login, validation, refresh, and logout.
///
/// Both collaborators are injected; the manager never reaches a
/// process-wide global.
pub struct SessionManager {
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn ProviderClient>, store: Arc<dyn SessionStore>) -> Self {
        Self { provider, store }
    }

    /// ABSENT -> ACTIVE: exchange an authorization code for tokens and
    /// persist the result under a fresh session identifier.
    ///
    /// The identifier is the new access-token value, as in the original
    /// deployment this server fronts. The exchange completes before the
    /// store write; a failure at either step leaves the session ABSENT.
    pub async fn login(&self, code: &str) -> Result<EstablishedSession, AppError> {
        let account = match self.provider.exchange_code(code).await {
            Ok(account) => account,
            Err(error) => {
                SESSION_LOGINS_TOTAL.with_label_values(&["failure"]).inc();
                tracing::warn!(error = %error, "Authorization code exchange failed");
                return Err(error);
            }
        };

        let session_id = account.access_token.clone();
        let entry = self
            .store
            .set(&session_id, account.clone(), Ttl::Default)
            .await?;

        SESSION_LOGINS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(expires_at = %entry.expires_at, "Session established");

        Ok(EstablishedSession {
            session_id,
            account,
            expires_at: entry.expires_at,
        })
    }

    /// Read-only check of ACTIVE/STALE/ABSENT.
    ///
    /// Safe to call on every request: never refreshes, never errors.
    /// A store failure fails closed to ABSENT so a cache outage reads
    /// as unauthenticated rather than becoming a site-wide error.
    pub async fn validate(&self, session_id: &str) -> Validation {
        let entry = match self.store.get(session_id).await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(error = %error, "Session store unavailable; failing closed");
                SESSION_VALIDATIONS_TOTAL
                    .with_label_values(&["store_failure"])
                    .inc();
                return Validation::Absent;
            }
        };

        let validation = match entry {
            None => Validation::Absent,
            Some(entry) if entry.account.is_expired() => Validation::Stale(entry.account),
            Some(entry) => Validation::Active(entry.account),
        };

        let result = match &validation {
            Validation::Active(_) => "active",
            Validation::Stale(_) => "stale",
            Validation::Absent => "absent",
        };
        SESSION_VALIDATIONS_TOTAL.with_label_values(&[result]).inc();

        validation
    }

    /// ACTIVE|STALE -> ACTIVE under a brand-new identifier, or ->
    /// REVOKED on terminal failure.
    ///
    /// The old entry is deliberately not deleted: in-flight requests
    /// still holding the previous identifier keep working until its
    /// original TTL elapses. A provider-reported dead refresh token
    /// deletes the entry and surfaces `SessionExpired`; any other
    /// failure leaves the entry (and its refresh token) untouched.
    ///
    /// Not synchronized: concurrent refreshes of one session each write
    /// a distinct key, and whichever the provider turns away gets its
    /// rejection back unmodified.
    pub async fn refresh(&self, session_id: &str) -> Result<EstablishedSession, AppError> {
        let entry = match self.store.get(session_id).await? {
            Some(entry) => entry,
            None => {
                SESSION_REFRESHES_TOTAL.with_label_values(&["absent"]).inc();
                return Err(AppError::SessionExpired);
            }
        };

        let Some(refresh_token) = entry.account.refresh_token.clone() else {
            // Nothing to refresh with; the caller must restart login.
            SESSION_REFRESHES_TOTAL
                .with_label_values(&["no_refresh_token"])
                .inc();
            return Err(AppError::SessionExpired);
        };

        let mut account = match self.provider.refresh(&refresh_token).await {
            Ok(account) => account,
            Err(AppError::RefreshTokenExpired) => {
                self.store.delete(session_id).await?;
                SESSION_REFRESHES_TOTAL.with_label_values(&["expired"]).inc();
                tracing::info!("Refresh token expired; session revoked");
                return Err(AppError::SessionExpired);
            }
            Err(error) => {
                SESSION_REFRESHES_TOTAL.with_label_values(&["failure"]).inc();
                tracing::warn!(error = %error, "Token refresh failed");
                return Err(error);
            }
        };

        // Keep the previous refresh token until the provider confirms a
        // replacement.
        if account.refresh_token.is_none() {
            account.refresh_token = Some(refresh_token);
        }

        let new_session_id = account.access_token.clone();
        let new_entry = self
            .store
            .set(&new_session_id, account.clone(), Ttl::Default)
            .await?;

        SESSION_REFRESHES_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(expires_at = %new_entry.expires_at, "Session refreshed");

        Ok(EstablishedSession {
            session_id: new_session_id,
            account,
            expires_at: new_entry.expires_at,
        })
    }

    /// ACTIVE|STALE -> REVOKED. Idempotent: deleting an absent key is
    /// success.
    pub async fn logout(&self, session_id: &str) -> Result<(), AppError> {
        self.store.delete(session_id).await?;
        SESSION_LOGOUTS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!("Session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProviderClient;
    use crate::session::store::MemorySessionStore;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn account(access_token: &str, refresh_token: Option<&str>) -> AccountRecord {
        AccountRecord {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(ToString::to_string),
            expires_at: Some(Utc::now() + Duration::seconds(3600)),
            raw: json!({ "access_token": access_token }),
        }
    }

    fn memory_store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::new(
            std::time::Duration::from_secs(259_200),
            100,
        ))
    }

    fn manager_with(provider: MockProviderClient) -> (SessionManager, Arc<MemorySessionStore>) {
        let store = memory_store();
        (
            SessionManager::new(Arc::new(provider), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn login_then_validate_returns_exchanged_account() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .withf(|code| code == "abc123")
            .returning(|_| Ok(account("tok1", Some("ref1"))));

        let (manager, _) = manager_with(provider);

        let session = manager.login("abc123").await.unwrap();
        assert_eq!(session.session_id, "tok1");

        match manager.validate("tok1").await {
            Validation::Active(validated) => {
                assert_eq!(validated.access_token, "tok1");
                assert_eq!(validated.refresh_token.as_deref(), Some("ref1"));
            }
            other => panic!("expected active session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_failure_leaves_session_absent() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Err(AppError::ProviderRejected("invalid_grant".to_string())));

        let (manager, _) = manager_with(provider);

        let error = manager.login("bad").await.expect_err("exchange must fail");
        assert!(matches!(error, AppError::ProviderRejected(_)));
        assert!(matches!(manager.validate("bad").await, Validation::Absent));
    }

    #[tokio::test]
    async fn validate_unknown_session_is_absent_not_error() {
        let provider = MockProviderClient::new();
        let (manager, _) = manager_with(provider);

        assert!(matches!(
            manager.validate("never-issued").await,
            Validation::Absent
        ));
    }

    #[tokio::test]
    async fn validate_reports_stale_for_expired_access_token() {
        let mut provider = MockProviderClient::new();
        provider.expect_exchange_code().returning(|_| {
            let mut account = account("tok1", Some("ref1"));
            account.expires_at = Some(Utc::now() - Duration::seconds(10));
            Ok(account)
        });

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        match manager.validate("tok1").await {
            Validation::Stale(stale) => assert_eq!(stale.access_token, "tok1"),
            other => panic!("expected stale session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_fails_closed_when_store_is_down() {
        struct DownStore;

        #[async_trait::async_trait]
        impl SessionStore for DownStore {
            async fn get(
                &self,
                _session_id: &str,
            ) -> Result<Option<crate::session::store::SessionEntry>, AppError> {
                Err(AppError::StoreUnavailable("connection refused".to_string()))
            }

            async fn set(
                &self,
                _session_id: &str,
                _account: AccountRecord,
                _ttl: Ttl,
            ) -> Result<crate::session::store::SessionEntry, AppError> {
                Err(AppError::StoreUnavailable("connection refused".to_string()))
            }

            async fn delete(&self, _session_id: &str) -> Result<(), AppError> {
                Err(AppError::StoreUnavailable("connection refused".to_string()))
            }
        }

        let manager = SessionManager::new(
            Arc::new(MockProviderClient::new()),
            Arc::new(DownStore),
        );

        assert!(matches!(manager.validate("tok1").await, Validation::Absent));
    }

    #[tokio::test]
    async fn refresh_rotates_identifier_and_keeps_old_entry_valid() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", Some("ref1"))));
        provider
            .expect_refresh()
            .withf(|refresh_token| refresh_token == "ref1")
            .returning(|_| Ok(account("tok2", Some("ref2"))));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        let refreshed = manager.refresh("tok1").await.unwrap();
        assert_eq!(refreshed.session_id, "tok2");
        assert_ne!(refreshed.session_id, "tok1");

        // Grace period: the superseded identifier stays valid until its
        // original TTL elapses.
        assert!(manager.validate("tok1").await.account().is_some());
        match manager.validate("tok2").await {
            Validation::Active(validated) => {
                assert_eq!(validated.access_token, "tok2");
                assert_eq!(validated.refresh_token.as_deref(), Some("ref2"));
            }
            other => panic!("expected active session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_carries_forward_refresh_token_when_response_omits_it() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", Some("ref1"))));
        provider
            .expect_refresh()
            .returning(|_| Ok(account("tok2", None)));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        let refreshed = manager.refresh("tok1").await.unwrap();
        assert_eq!(refreshed.account.refresh_token.as_deref(), Some("ref1"));
    }

    #[tokio::test]
    async fn terminal_refresh_rejection_revokes_the_session() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", Some("ref1"))));
        provider
            .expect_refresh()
            .returning(|_| Err(AppError::RefreshTokenExpired));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        let error = manager.refresh("tok1").await.expect_err("refresh must fail");
        assert!(matches!(error, AppError::SessionExpired));

        // The entry is deleted; the old identifier now validates absent.
        assert!(matches!(manager.validate("tok1").await, Validation::Absent));
    }

    #[tokio::test]
    async fn transient_refresh_failure_leaves_entry_untouched() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", Some("ref1"))));
        provider
            .expect_refresh()
            .returning(|_| Err(AppError::ProviderRejected("server_error".to_string())));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        let error = manager.refresh("tok1").await.expect_err("refresh must fail");
        assert!(matches!(error, AppError::ProviderRejected(_)));

        // The losing caller gets a clean error; the stored account (and
        // its refresh token) survives.
        match manager.validate("tok1").await {
            Validation::Active(validated) => {
                assert_eq!(validated.refresh_token.as_deref(), Some("ref1"));
            }
            other => panic!("expected active session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_of_unknown_session_is_session_expired() {
        let provider = MockProviderClient::new();
        let (manager, _) = manager_with(provider);

        let error = manager
            .refresh("never-issued")
            .await
            .expect_err("refresh of absent session must fail");
        assert!(matches!(error, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_session_expired() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", None)));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        let error = manager.refresh("tok1").await.expect_err("refresh must fail");
        assert!(matches!(error, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .returning(|_| Ok(account("tok1", Some("ref1"))));

        let (manager, _) = manager_with(provider);
        manager.login("abc123").await.unwrap();

        manager.logout("tok1").await.unwrap();
        assert!(matches!(manager.validate("tok1").await, Validation::Absent));

        // Second logout observes the same success.
        manager.logout("tok1").await.unwrap();
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let mut provider = MockProviderClient::new();
        provider
            .expect_exchange_code()
            .withf(|code| code == "abc123")
            .returning(|_| Ok(account("tok1", Some("ref1"))));
        provider
            .expect_refresh()
            .withf(|refresh_token| refresh_token == "ref1")
            .returning(|_| Ok(account("tok2", Some("ref2"))));

        let (manager, _) = manager_with(provider);

        let session = manager.login("abc123").await.unwrap();
        assert_eq!(session.session_id, "tok1");

        let validated = manager.validate("tok1").await;
        assert_eq!(validated.account().unwrap().access_token, "tok1");

        let refreshed = manager.refresh("tok1").await.unwrap();
        assert_eq!(refreshed.session_id, "tok2");

        // Both identifiers resolve while the old TTL has not elapsed.
        assert_eq!(
            manager.validate("tok1").await.account().unwrap().access_token,
            "tok1"
        );
        assert_eq!(
            manager.validate("tok2").await.account().unwrap().access_token,
            "tok2"
        );
    }
}
