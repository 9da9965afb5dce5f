//! Authenticator collaborator.
//!
//! Wallet connect flow: a TTL-bounded nonce challenge, a signature check
//! behind the `SignatureVerifier` seam (the cryptography itself lives
//! outside this crate), and opaque session tokens resolving to user ids.
//!
//! Nonce and session state live behind the `ExpiringStore` trait so the
//! backing cache is injected and swappable rather than process-wide state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Request a nonce first")]
    NonceNotFound,

    #[error("Nonce has expired")]
    NonceExpired,

    #[error("Nonce does not match")]
    NonceMismatch,

    #[error("Signature verification failed")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// Expiring key-value store
// ---------------------------------------------------------------------------

/// Key-value cache where every entry carries a deadline.
///
/// `get` returns the stored value together with its deadline; expiry policy
/// stays with the caller so expired and missing entries can be told apart.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration);
    async fn get(&self, key: &str) -> Option<(String, DateTime<Utc>)>;
    async fn remove(&self, key: &str);
}

/// In-memory `ExpiringStore`. Expired entries are swept on insert.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
    }

    async fn get(&self, key: &str) -> Option<(String, DateTime<Utc>)> {
        self.entries.read().await.get(key).cloned()
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

// ---------------------------------------------------------------------------
// Signature verification seam
// ---------------------------------------------------------------------------

/// Verifies that `signature` over `message` belongs to `wallet_address`.
///
/// The core never performs the cryptography itself; implementations wrap
/// whatever wallet scheme the deployment uses.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, wallet_address: &str, message: &str, signature: &str) -> bool;
}

/// Development verifier: any non-empty signature passes. Production wires a
/// real wallet-signature implementation into the seam instead.
pub struct AcceptNonEmptyVerifier;

impl SignatureVerifier for AcceptNonEmptyVerifier {
    fn verify(&self, _wallet_address: &str, _message: &str, signature: &str) -> bool {
        !signature.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

pub struct Authenticator {
    nonces: Arc<dyn ExpiringStore>,
    sessions: Arc<dyn ExpiringStore>,
    verifier: Arc<dyn SignatureVerifier>,
    nonce_ttl: Duration,
    session_ttl: Duration,
}

impl Authenticator {
    pub fn new(
        nonces: Arc<dyn ExpiringStore>,
        sessions: Arc<dyn ExpiringStore>,
        verifier: Arc<dyn SignatureVerifier>,
        nonce_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            nonces,
            sessions,
            verifier,
            nonce_ttl,
            session_ttl,
        }
    }

    /// Memory-backed authenticator with the given TTLs.
    pub fn in_memory(
        verifier: Arc<dyn SignatureVerifier>,
        nonce_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            verifier,
            nonce_ttl,
            session_ttl,
        )
    }

    /// Issue a signing challenge for a wallet.
    pub async fn issue_nonce(&self, wallet_address: &str) -> (String, DateTime<Utc>) {
        let nonce = format!(
            "Sign this message to authenticate with Vector Markets: {}",
            Uuid::new_v4()
        );
        let expires_at = Utc::now() + self.nonce_ttl;
        self.nonces.put(wallet_address, &nonce, self.nonce_ttl).await;
        debug!(wallet_address, "Nonce issued");
        (nonce, expires_at)
    }

    /// Validate a connect attempt: stored nonce, expiry, echo, signature.
    /// Consumes the nonce on success.
    pub async fn verify_connect(
        &self,
        wallet_address: &str,
        signature: &str,
        nonce: &str,
    ) -> Result<(), AuthError> {
        let (stored, expires_at) = self
            .nonces
            .get(wallet_address)
            .await
            .ok_or(AuthError::NonceNotFound)?;

        if Utc::now() > expires_at {
            self.nonces.remove(wallet_address).await;
            return Err(AuthError::NonceExpired);
        }

        if stored != nonce {
            return Err(AuthError::NonceMismatch);
        }

        if !self.verifier.verify(wallet_address, nonce, signature) {
            return Err(AuthError::InvalidSignature);
        }

        self.nonces.remove(wallet_address).await;
        Ok(())
    }

    /// Issue an opaque session token for a resolved user.
    pub async fn issue_session(&self, user_id: &str) -> (String, DateTime<Utc>) {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.session_ttl;
        self.sessions.put(&token, user_id, self.session_ttl).await;
        (token, expires_at)
    }

    /// Resolve a bearer token to a user id. Expired tokens are dropped.
    pub async fn resolve(&self, token: &str) -> Option<String> {
        let (user_id, expires_at) = self.sessions.get(token).await?;
        if Utc::now() > expires_at {
            self.sessions.remove(token).await;
            return None;
        }
        Some(user_id)
    }

    /// Invalidate a session token.
    pub async fn revoke(&self, token: &str) {
        self.sessions.remove(token).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::in_memory(
            Arc::new(AcceptNonEmptyVerifier),
            Duration::minutes(5),
            Duration::hours(24),
        )
    }

    #[test]
    fn test_memory_store_put_get_remove() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.put("k", "v", Duration::minutes(1)).await;

            let (value, deadline) = store.get("k").await.unwrap();
            assert_eq!(value, "v");
            assert!(deadline > Utc::now());

            store.remove("k").await;
            assert!(store.get("k").await.is_none());
        });
    }

    #[tokio::test]
    async fn test_memory_store_sweeps_expired_on_put() {
        let store = MemoryStore::new();
        store.put("old", "v", Duration::seconds(-1)).await;
        store.put("fresh", "v", Duration::minutes(1)).await;

        // The expired entry was swept by the second insert.
        assert!(store.get("old").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_connect_happy_path() {
        let auth = authenticator();
        let (nonce, expires_at) = auth.issue_nonce("wallet-1").await;
        assert!(nonce.contains("Vector Markets"));
        assert!(expires_at > Utc::now());

        auth.verify_connect("wallet-1", "sig-bytes", &nonce)
            .await
            .unwrap();

        // The nonce is consumed; replaying fails.
        let err = auth
            .verify_connect("wallet-1", "sig-bytes", &nonce)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceNotFound);
    }

    #[tokio::test]
    async fn test_connect_without_nonce() {
        let auth = authenticator();
        let err = auth
            .verify_connect("wallet-1", "sig", "whatever")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceNotFound);
    }

    #[tokio::test]
    async fn test_connect_expired_nonce() {
        let auth = Authenticator::in_memory(
            Arc::new(AcceptNonEmptyVerifier),
            Duration::seconds(-1),
            Duration::hours(24),
        );
        let (nonce, _) = auth.issue_nonce("wallet-1").await;
        let err = auth
            .verify_connect("wallet-1", "sig", &nonce)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceExpired);
    }

    #[tokio::test]
    async fn test_connect_nonce_mismatch() {
        let auth = authenticator();
        auth.issue_nonce("wallet-1").await;
        let err = auth
            .verify_connect("wallet-1", "sig", "a different message")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceMismatch);
    }

    #[tokio::test]
    async fn test_connect_bad_signature() {
        let mut verifier = MockSignatureVerifier::new();
        verifier.expect_verify().return_const(false);

        let auth = Authenticator::in_memory(
            Arc::new(verifier),
            Duration::minutes(5),
            Duration::hours(24),
        );
        let (nonce, _) = auth.issue_nonce("wallet-1").await;
        let err = auth
            .verify_connect("wallet-1", "sig", &nonce)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[tokio::test]
    async fn test_empty_signature_rejected_by_default_verifier() {
        let auth = authenticator();
        let (nonce, _) = auth.issue_nonce("wallet-1").await;
        let err = auth
            .verify_connect("wallet-1", "   ", &nonce)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[tokio::test]
    async fn test_session_resolve_and_revoke() {
        let auth = authenticator();
        let (token, _) = auth.issue_session("user-1").await;

        assert_eq!(auth.resolve(&token).await.as_deref(), Some("user-1"));

        auth.revoke(&token).await;
        assert!(auth.resolve(&token).await.is_none());
        assert!(auth.resolve("garbage-token").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_dropped() {
        let auth = Authenticator::in_memory(
            Arc::new(AcceptNonEmptyVerifier),
            Duration::minutes(5),
            Duration::seconds(-1),
        );
        let (token, _) = auth.issue_session("user-1").await;
        assert!(auth.resolve(&token).await.is_none());
    }
}
