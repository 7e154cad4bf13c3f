use crate::adapters::http::{handle_api_response, HttpRetry};
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Service principal credentials. Stored in Key Vault as a JSON secret
/// with the upper-case keys below.
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureCredentials {
    #[serde(rename = "AZURE_TENANT_ID")]
    pub tenant_id: String,
    #[serde(rename = "AZURE_CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "AZURE_CLIENT_SECRET")]
    pub client_secret: String,
    #[serde(rename = "ACCOUNT_NAME", default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("account_name", &self.account_name)
            .finish()
    }
}

impl AzureCredentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| EtlError::credential(format!("{} is not set", key)))
        };
        Ok(Self {
            tenant_id: required("AZURE_TENANT_ID")?,
            client_id: required("AZURE_CLIENT_ID")?,
            client_secret: required("AZURE_CLIENT_SECRET")?,
            account_name: lookup("ACCOUNT_NAME").filter(|v| !v.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token source with a per-scope cache.
#[derive(Clone)]
pub struct AzureTokenProvider {
    client: Client,
    credentials: AzureCredentials,
    authority_host: String,
    retry: HttpRetry,
    cache: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl AzureTokenProvider {
    pub fn new(client: Client, credentials: AzureCredentials) -> Self {
        Self {
            client,
            credentials,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            retry: HttpRetry::default(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn credentials(&self) -> &AzureCredentials {
        &self.credentials
    }

    pub async fn token(&self, scope: &str) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope) {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.credentials.tenant_id
        );
        tracing::debug!("Requesting Azure AD token for scope {}", scope);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", scope),
        ];
        let response = handle_api_response(self.client.post(&url).form(&form), &self.retry)
            .await
            .map_err(|e| match e {
                EtlError::ApiError {
                    status, message, ..
                } if status == 400 || status == 401 => EtlError::credential(format!(
                    "Azure AD rejected the service principal: {}",
                    message
                )),
                other => other,
            })?;
        let token: TokenResponse = response.json().await?;

        cache.insert(
            scope.to_string(),
            CachedToken {
                value: token.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(token.expires_in),
            },
        );
        Ok(token.access_token)
    }
}
