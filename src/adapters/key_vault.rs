use crate::adapters::azure_auth::{AzureTokenProvider, KEY_VAULT_SCOPE};
use crate::adapters::http::{handle_api_response, HttpRetry};
use crate::domain::ports::SecretStore;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::validate_secret_name;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const API_VERSION: &str = "7.4";

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(default)]
    id: Option<String>,
}

/// Azure Key Vault secrets client.
#[derive(Clone)]
pub struct KeyVaultClient {
    client: Client,
    vault_url: String,
    tokens: AzureTokenProvider,
    retry: HttpRetry,
}

impl KeyVaultClient {
    pub fn new(client: Client, vault_url: impl Into<String>, tokens: AzureTokenProvider) -> Self {
        Self {
            client,
            vault_url: vault_url.into().trim_end_matches('/').to_string(),
            tokens,
            retry: HttpRetry::default(),
        }
    }

    /// `https://{vault_name}.vault.azure.net`
    pub fn for_vault_name(client: Client, vault_name: &str, tokens: AzureTokenProvider) -> Self {
        Self::new(
            client,
            format!("https://{}.vault.azure.net", vault_name),
            tokens,
        )
    }

    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={}",
            self.vault_url, name, API_VERSION
        )
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;
        let token = self.tokens.token(KEY_VAULT_SCOPE).await?;

        tracing::debug!("🔑 Reading secret '{}' from {}", name, self.vault_url);
        let request = self.client.get(self.secret_url(name)).bearer_auth(token);
        let response = handle_api_response(request, &self.retry)
            .await
            .map_err(|e| match e {
                EtlError::ApiError { status: 404, .. } => EtlError::SecretNotFound {
                    name: name.to_string(),
                    vault: self.vault_url.clone(),
                },
                other => other,
            })?;

        let bundle: SecretBundle = response.json().await?;
        Ok(bundle.value)
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<String> {
        validate_secret_name(name)?;
        let token = self.tokens.token(KEY_VAULT_SCOPE).await?;

        tracing::info!("🔑 Writing secret '{}' to {}", name, self.vault_url);
        let request = self
            .client
            .put(self.secret_url(name))
            .bearer_auth(token)
            .json(&serde_json::json!({ "value": value }));
        let response = handle_api_response(request, &self.retry).await?;

        let bundle: SecretBundle = response.json().await?;
        Ok(bundle
            .id
            .unwrap_or_else(|| format!("{}/secrets/{}", self.vault_url, name)))
    }
}

/// Reads a JSON secret and deserializes it into a credentials struct.
pub async fn resolve_credentials<T, S>(store: &S, secret_name: &str) -> Result<T>
where
    T: DeserializeOwned,
    S: SecretStore + ?Sized,
{
    let raw = store.get_secret(secret_name).await?;
    serde_json::from_str(&raw).map_err(|e| {
        EtlError::credential(format!(
            "Secret '{}' does not hold valid credentials JSON: {}",
            secret_name, e
        ))
    })
}
