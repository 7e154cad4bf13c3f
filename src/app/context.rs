//! Wires adapters from configuration: Azure clients, credential lookup and
//! the Vid Club to data lake pipeline.

use crate::adapters::adls::{split_adls_path, AdlsClient};
use crate::adapters::azure_auth::{AzureCredentials, AzureTokenProvider};
use crate::adapters::http::build_client;
use crate::adapters::key_vault::{resolve_credentials, KeyVaultClient};
use crate::adapters::storage::{AdlsStorage, LocalStorage};
use crate::adapters::vidclub::{VidClub, VidClubCredentials};
use crate::app::pipelines::vidclub_to_adls::{LoadOptions, VidClubToAdls};
use crate::app::tasks::VidClubToDf;
use crate::config::toml_config::{AzureConfig, EtlConfig};
use crate::domain::ports::SecretStore;
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AzureContext {
    client: Client,
    config: AzureConfig,
}

impl AzureContext {
    pub fn new(client: Client, config: AzureConfig) -> Self {
        Self { client, config }
    }

    fn token_provider(&self, credentials: AzureCredentials) -> AzureTokenProvider {
        let tokens = AzureTokenProvider::new(self.client.clone(), credentials);
        match &self.config.authority_host {
            Some(host) => tokens.with_authority_host(host),
            None => tokens,
        }
    }

    /// Key Vault client authenticated with the `AZURE_*` environment
    /// variables. `None` when no vault is configured.
    pub fn key_vault(&self) -> Result<Option<KeyVaultClient>> {
        let vault = match (&self.config.vault_url, &self.config.vault_name) {
            (None, None) => return Ok(None),
            (Some(url), _) => KeyVaultClient::new(
                self.client.clone(),
                url,
                self.token_provider(AzureCredentials::from_env()?),
            ),
            (None, Some(name)) => KeyVaultClient::for_vault_name(
                self.client.clone(),
                name,
                self.token_provider(AzureCredentials::from_env()?),
            ),
        };
        Ok(Some(vault))
    }

    pub fn require_key_vault(&self) -> Result<KeyVaultClient> {
        self.key_vault()?.ok_or_else(|| EtlError::MissingConfigError {
            field: "azure.vault_name or azure.vault_url".to_string(),
        })
    }

    /// Service principal used for the data lake: read from Key Vault when
    /// `sp_credentials_secret` is set, otherwise from the environment.
    pub async fn storage_credentials(&self) -> Result<AzureCredentials> {
        match &self.config.sp_credentials_secret {
            Some(secret) => {
                let vault = self.require_key_vault()?;
                tracing::debug!("Reading service principal from secret '{}'", secret);
                resolve_credentials(&vault, secret).await
            }
            None => AzureCredentials::from_env(),
        }
    }

    pub async fn adls_client(&self, filesystem: &str) -> Result<AdlsClient> {
        let tokens = self.token_provider(self.storage_credentials().await?);
        match &self.config.adls_endpoint {
            Some(endpoint) => Ok(AdlsClient::new(
                self.client.clone(),
                endpoint,
                filesystem,
                tokens,
            )),
            None => AdlsClient::for_account(self.client.clone(), filesystem, tokens),
        }
    }
}

/// Looks up Vid Club credentials: the Key Vault secret named by
/// `source.credentials_secret` first, then `[credentials.<config_key>]`.
pub async fn resolve_vidclub_credentials(
    config: &EtlConfig,
    store: Option<&dyn SecretStore>,
) -> Result<VidClubCredentials> {
    if let Some(secret) = &config.source.credentials_secret {
        let store = store.ok_or_else(|| EtlError::MissingConfigError {
            field: "azure.vault_name or azure.vault_url".to_string(),
        })?;
        return resolve_credentials(store, secret).await;
    }
    if let Some(key) = &config.source.config_key {
        if let Some(credentials) = config.credentials_for(key)? {
            return Ok(credentials);
        }
    }
    Err(EtlError::credential("Missing credentials."))
}

pub async fn build_vidclub_to_adls(
    config: &EtlConfig,
) -> Result<VidClubToAdls<LocalStorage, AdlsStorage>> {
    let client = build_client(REQUEST_TIMEOUT)?;
    let azure = AzureContext::new(client.clone(), config.azure.clone());

    let vault = azure.key_vault()?;
    let credentials =
        resolve_vidclub_credentials(config, vault.as_ref().map(|v| v as &dyn SecretStore))
            .await?;
    let vidclub = VidClub::new(client, credentials)?;
    let extract_task = VidClubToDf::new(vidclub, config.vidclub_query()?, config.task_policy());

    let (filesystem, remote_path) = split_adls_path(&config.load.adls_file_path)?;
    let remote = AdlsStorage::new(
        azure.adls_client(&filesystem).await?,
        "",
        config.adls_overwrite(),
    );

    let options = LoadOptions {
        local_file_path: config.load.local_file_path.clone(),
        file_sep: config.file_sep()?,
        remote_path,
        zip_path: config
            .load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.clone()),
    };

    Ok(VidClubToAdls::new(
        extract_task,
        LocalStorage::new("."),
        remote,
        options,
    ))
}
