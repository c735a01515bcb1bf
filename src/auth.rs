//! Access token acquisition and caching for the recognition service

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::CredentialError;

/// Lead time before expiry at which a cached token is no longer handed out
pub const SAFETY_MARGIN_SECS: i64 = 60;

/// Time-limited access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    /// Valid iff `now < expires_at - SAFETY_MARGIN_SECS`; an expiry too
    /// early to subtract the margin from is never valid
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(Duration::seconds(SAFETY_MARGIN_SECS))
            .is_some_and(|deadline| now < deadline)
    }
}

/// Remote source of fresh credentials
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<Credential, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch milliseconds
    expires_at: i64,
}

/// OAuth client-credentials token endpoint
pub struct OAuthTokenSource {
    client: reqwest::Client,
    url: String,
    client_key: String,
    scope: String,
}

impl OAuthTokenSource {
    pub fn new(config: &AuthConfig) -> Result<Self, CredentialError> {
        let client_key = config
            .client_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(CredentialError::MissingClientKey)?;

        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            url: config.oauth_url.clone(),
            client_key,
            scope: config.scope.clone(),
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn fetch_token(&self) -> Result<Credential, CredentialError> {
        let request_id = Uuid::new_v4();
        debug!("Requesting access token from {} (RqUID {})", self.url, request_id);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Basic {}", self.client_key))
            .header("Accept", "application/json")
            .header("RqUID", request_id.to_string())
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status { status, body });
        }

        let body = response.text().await?;
        parse_token_response(&body)
    }
}

fn parse_token_response(body: &str) -> Result<Credential, CredentialError> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|e| CredentialError::Malformed(e.to_string()))?;

    let expires_at = DateTime::from_timestamp_millis(parsed.expires_at).ok_or_else(|| {
        CredentialError::Malformed(format!("expires_at out of range: {}", parsed.expires_at))
    })?;

    Ok(Credential::new(parsed.access_token, expires_at))
}

/// Shared credential cache with lazy refresh.
///
/// The lock is held across a refresh, so concurrent callers wait for the
/// in-flight request instead of issuing their own.
pub struct CredentialManager {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<Credential>>,
}

impl CredentialManager {
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cached: Mutex::new(None),
        }
    }

    /// Build a manager backed by the configured OAuth endpoint
    pub fn from_config(config: &AuthConfig) -> Result<Self, CredentialError> {
        Ok(Self::new(OAuthTokenSource::new(config)?))
    }

    pub async fn get_token(&self) -> Result<Credential, CredentialError> {
        self.get_token_at(Utc::now()).await
    }

    /// Same as [`get_token`](Self::get_token) with an explicit clock reading
    pub async fn get_token_at(&self, now: DateTime<Utc>) -> Result<Credential, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_valid_at(now) {
                return Ok(credential.clone());
            }
            debug!("Cached token expires at {}, refreshing", credential.expires_at);
        }

        match self.source.fetch_token().await {
            Ok(fresh) => {
                info!("🔑 Obtained access token, valid until {}", fresh.expires_at);
                *cached = Some(fresh.clone());
                Ok(fresh)
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Snapshot of the cached credential, if any
    pub async fn cached(&self) -> Option<Credential> {
        self.cached.lock().await.clone()
    }

    /// Drop the cached credential so the next call refreshes
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedSource {
        calls: Arc<AtomicUsize>,
        responses: std::sync::Mutex<VecDeque<Result<Credential, CredentialError>>>,
    }

    impl ScriptedSource {
        fn new(calls: Arc<AtomicUsize>, responses: Vec<Result<Credential, CredentialError>>) -> Self {
            Self {
                calls,
                responses: std::sync::Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn fetch_token(&self) -> Result<Credential, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CredentialError::Malformed("script exhausted".into())))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_validity_respects_safety_margin() {
        let credential = Credential::new("t".into(), at(1800));
        assert!(credential.is_valid_at(at(0)));
        assert!(credential.is_valid_at(at(1739)));
        assert!(!credential.is_valid_at(at(1740)));
        assert!(!credential.is_valid_at(at(1800)));
    }

    #[test]
    fn test_parse_token_response() {
        let credential =
            parse_token_response(r#"{"access_token":"abc","expires_at":1700000000000}"#).unwrap();
        assert_eq!(credential.token, "abc");
        assert_eq!(credential.expires_at, at(0));

        assert!(matches!(
            parse_token_response(r#"{"token":"abc"}"#),
            Err(CredentialError::Malformed(_))
        ));
    }

    #[test]
    fn test_expiry_at_earliest_date_is_invalid() {
        let earliest = DateTime::<Utc>::MIN_UTC.timestamp_millis();
        let body = format!(r#"{{"access_token":"abc","expires_at":{}}}"#, earliest);

        let credential = parse_token_response(&body).unwrap();
        assert!(!credential.is_valid_at(Utc::now()));
        assert!(!credential.is_valid_at(DateTime::<Utc>::MIN_UTC));
    }

    #[tokio::test]
    async fn test_token_reused_within_validity_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CredentialManager::new(ScriptedSource::new(
            calls.clone(),
            vec![
                Ok(Credential::new("first".into(), at(1800))),
                Ok(Credential::new("second".into(), at(3600))),
            ],
        ));

        assert_eq!(manager.get_token_at(at(0)).await.unwrap().token, "first");
        assert_eq!(manager.get_token_at(at(600)).await.unwrap().token, "first");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // inside the safety margin
        assert_eq!(manager.get_token_at(at(1750)).await.unwrap().token, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.cached().await.unwrap().token, "second");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CredentialManager::new(ScriptedSource::new(
            calls.clone(),
            vec![
                Ok(Credential::new("first".into(), at(100))),
                Err(CredentialError::Status { status: 401, body: "denied".into() }),
            ],
        ));

        manager.get_token_at(at(0)).await.unwrap();
        assert!(manager.get_token_at(at(90)).await.is_err());
        assert_eq!(manager.cached().await.unwrap().token, "first");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(CredentialManager::new(ScriptedSource::new(
            calls.clone(),
            vec![Ok(Credential::new("shared".into(), Utc::now() + Duration::hours(1)))],
        )));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().token, "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CredentialManager::new(ScriptedSource::new(
            calls.clone(),
            vec![
                Ok(Credential::new("first".into(), at(1800))),
                Ok(Credential::new("second".into(), at(1800))),
            ],
        ));

        manager.get_token_at(at(0)).await.unwrap();
        manager.invalidate().await;
        assert!(manager.cached().await.is_none());
        assert_eq!(manager.get_token_at(at(1)).await.unwrap().token, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_client_key_rejected() {
        let config = AuthConfig::default();
        assert!(matches!(
            OAuthTokenSource::new(&config),
            Err(CredentialError::MissingClientKey)
        ));
    }
}
