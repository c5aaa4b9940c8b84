//! Credential storage and bearer-token resolution
//!
//! Providers authenticate with either a static secret or an OAuth record.
//! OAuth access tokens are refreshed proactively when they expire within a
//! short safety margin, and the refreshed record is persisted back to the
//! store. Secrets are never logged; `Debug` output is redacted.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Safety margin before expiry that triggers a refresh
const REFRESH_MARGIN_SECS: i64 = 30;

/// Errors raised while resolving or refreshing credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No credential found for provider '{provider_id}'")]
    Missing { provider_id: String },

    #[error("Token refresh failed for provider '{provider_id}': {message}")]
    Refresh { provider_id: String, message: String },

    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A stored credential for one provider id
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    /// Static API key
    Secret { value: String },

    /// OAuth record refreshed against a vendor token endpoint
    OAuth {
        access_token: String,
        refresh_token: String,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
        token_url: String,
        #[serde(default)]
        client_id: Option<String>,
    },
}

impl Credential {
    /// True when this is an OAuth record expiring within the safety margin
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self {
            Credential::Secret { .. } => false,
            Credential::OAuth { expires_at, .. } => match expires_at {
                Some(at) => *at <= now + Duration::seconds(REFRESH_MARGIN_SECS),
                None => false,
            },
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Secret { .. } => f.debug_struct("Secret").field("value", &"<redacted>").finish(),
            Credential::OAuth { expires_at, token_url, .. } => f
                .debug_struct("OAuth")
                .field("access_token", &"<redacted>")
                .field("refresh_token", &"<redacted>")
                .field("expires_at", expires_at)
                .field("token_url", token_url)
                .finish(),
        }
    }
}

/// Backing store for credentials, keyed by provider id
pub trait CredentialStore: Send + Sync {
    fn get(&self, provider_id: &str) -> Result<Option<Credential>, CredentialError>;
    fn set(&self, provider_id: &str, credential: Credential) -> Result<(), CredentialError>;
}

/// JSON file store, one map of provider id to credential
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, Credential>, CredentialError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, map: &HashMap<String, Credential>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider_id: &str) -> Result<Option<Credential>, CredentialError> {
        debug!(%provider_id, "FileCredentialStore::get: called");
        Ok(self.load()?.remove(provider_id))
    }

    fn set(&self, provider_id: &str, credential: Credential) -> Result<(), CredentialError> {
        debug!(%provider_id, "FileCredentialStore::set: called");
        let mut map = self.load()?;
        map.insert(provider_id.to_string(), credential);
        self.save(&map)
    }
}

/// In-memory store for embedding and tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    map: Mutex<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider_id: &str) -> Result<Option<Credential>, CredentialError> {
        Ok(self.map.lock().unwrap_or_else(|e| e.into_inner()).get(provider_id).cloned())
    }

    fn set(&self, provider_id: &str, credential: Credential) -> Result<(), CredentialError> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider_id.to_string(), credential);
        Ok(())
    }
}

/// Wire shape of a token-endpoint refresh response
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Resolves usable bearer credentials, refreshing OAuth records on demand
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Check that a usable credential exists without refreshing anything
    ///
    /// Resolution order: the named environment variable (if any), then the
    /// store. Used by adapter constructors to fail fast.
    pub fn require(&self, provider_id: &str, api_key_env: Option<&str>) -> Result<(), CredentialError> {
        debug!(%provider_id, ?api_key_env, "CredentialManager::require: called");
        if let Some(var) = api_key_env
            && let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            return Ok(());
        }
        match self.store.get(provider_id)? {
            Some(_) => Ok(()),
            None => Err(CredentialError::Missing {
                provider_id: provider_id.to_string(),
            }),
        }
    }

    /// Resolve a bearer token for a provider id
    ///
    /// Static secrets return directly. OAuth records return the stored
    /// access token unless it expires within the safety margin, in which
    /// case the record is refreshed and persisted first. Refresh failure is
    /// a hard failure of the calling operation.
    pub async fn bearer(&self, provider_id: &str, api_key_env: Option<&str>) -> Result<String, CredentialError> {
        debug!(%provider_id, ?api_key_env, "CredentialManager::bearer: called");
        if let Some(var) = api_key_env
            && let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            debug!(%provider_id, env_var = %var, "CredentialManager::bearer: using environment key");
            return Ok(value);
        }

        let credential = self.store.get(provider_id)?.ok_or_else(|| CredentialError::Missing {
            provider_id: provider_id.to_string(),
        })?;

        match credential {
            Credential::Secret { value } => Ok(value),
            cred @ Credential::OAuth { .. } => {
                if cred.needs_refresh(Utc::now()) {
                    debug!(%provider_id, "CredentialManager::bearer: token within refresh margin");
                    let refreshed = self.refresh(provider_id, &cred).await?;
                    self.store.set(provider_id, refreshed.clone())?;
                    info!(%provider_id, "CredentialManager::bearer: token refreshed and persisted");
                    match refreshed {
                        Credential::OAuth { access_token, .. } => Ok(access_token),
                        Credential::Secret { value } => Ok(value),
                    }
                } else {
                    match cred {
                        Credential::OAuth { access_token, .. } => Ok(access_token),
                        Credential::Secret { value } => Ok(value),
                    }
                }
            }
        }
    }

    /// Store or replace a credential
    pub fn set(&self, provider_id: &str, credential: Credential) -> Result<(), CredentialError> {
        self.store.set(provider_id, credential)
    }

    async fn refresh(&self, provider_id: &str, credential: &Credential) -> Result<Credential, CredentialError> {
        let Credential::OAuth {
            refresh_token,
            token_url,
            client_id,
            ..
        } = credential
        else {
            return Ok(credential.clone());
        };

        debug!(%provider_id, %token_url, "CredentialManager::refresh: requesting new token");

        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];
        if let Some(id) = client_id {
            params.push(("client_id", id.clone()));
        }

        let response = self
            .http
            .post(token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::Refresh {
                provider_id: provider_id.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%provider_id, %status, "CredentialManager::refresh: token endpoint rejected refresh");
            return Err(CredentialError::Refresh {
                provider_id: provider_id.to_string(),
                message: format!("{}: {}", status, body),
            });
        }

        let parsed: RefreshResponse = response.json().await.map_err(|e| CredentialError::Refresh {
            provider_id: provider_id.to_string(),
            message: e.to_string(),
        })?;

        let expires_at = parsed.expires_in.map(|secs| Utc::now() + Duration::seconds(secs as i64));

        Ok(Credential::OAuth {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token.unwrap_or_else(|| refresh_token.clone()),
            expires_at,
            token_url: token_url.clone(),
            client_id: client_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn oauth(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential::OAuth {
            access_token: "access-123".to_string(),
            refresh_token: "refresh-456".to_string(),
            expires_at,
            token_url: "https://example.com/oauth/token".to_string(),
            client_id: None,
        }
    }

    #[test]
    fn test_secret_never_needs_refresh() {
        let cred = Credential::Secret {
            value: "sk-test".to_string(),
        };
        assert!(!cred.needs_refresh(Utc::now()));
    }

    #[test]
    fn test_oauth_refresh_margin() {
        let now = Utc::now();

        // Expires in an hour: fine
        assert!(!oauth(Some(now + Duration::seconds(3600))).needs_refresh(now));

        // Expires in 10s: inside the 30s margin
        assert!(oauth(Some(now + Duration::seconds(10))).needs_refresh(now));

        // Already expired
        assert!(oauth(Some(now - Duration::seconds(5))).needs_refresh(now));

        // No expiry recorded: never refresh proactively
        assert!(!oauth(None).needs_refresh(now));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        assert!(store.get("anthropic").unwrap().is_none());

        store
            .set(
                "anthropic",
                Credential::Secret {
                    value: "sk-roundtrip".to_string(),
                },
            )
            .unwrap();

        match store.get("anthropic").unwrap() {
            Some(Credential::Secret { value }) => assert_eq!(value, "sk-roundtrip"),
            other => panic!("unexpected credential: {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", oauth(None));
        assert!(!rendered.contains("access-123"));
        assert!(!rendered.contains("refresh-456"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_bearer_returns_secret() {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .set(
                "openai",
                Credential::Secret {
                    value: "sk-plain".to_string(),
                },
            )
            .unwrap();

        let manager = CredentialManager::new(store);
        let bearer = manager.bearer("openai", None).await.unwrap();
        assert_eq!(bearer, "sk-plain");
    }

    #[tokio::test]
    async fn test_bearer_missing_provider() {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        let err = manager.bearer("nope", None).await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_bearer_fresh_oauth_skips_refresh() {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .set("anthropic", oauth(Some(Utc::now() + Duration::seconds(3600))))
            .unwrap();

        let manager = CredentialManager::new(store);
        let bearer = manager.bearer("anthropic", None).await.unwrap();
        assert_eq!(bearer, "access-123");
    }

    #[test]
    fn test_require_env_override() {
        // SAFETY: test-local variable name, no other test reads it
        unsafe { std::env::set_var("AGENTCORE_TEST_KEY", "from-env") };
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        assert!(manager.require("anthropic", Some("AGENTCORE_TEST_KEY")).is_ok());
        assert!(manager.require("anthropic", Some("AGENTCORE_TEST_KEY_UNSET")).is_err());
        unsafe { std::env::remove_var("AGENTCORE_TEST_KEY") };
    }
}
