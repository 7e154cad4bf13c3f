use crate::adapters::adls::split_adls_path;
use crate::adapters::vidclub::{
    VidClubQuery, VidClubSource, DEFAULT_DAYS_INTERVAL, DEFAULT_ITEMS_PER_PAGE, OLDEST_DATE,
};
use crate::app::tasks::TaskPolicy;
use crate::domain::model::IfEmpty;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    parse_date, validate_path, validate_positive_number, validate_range, validate_secret_name,
    validate_url, Validate,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    pub load: LoadConfig,
    #[serde(default)]
    pub task: TaskConfig,
    pub monitoring: Option<MonitoringConfig>,
    /// Named credential tables, looked up by `source.config_key`.
    #[serde(default)]
    pub credentials: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Endpoint of the Vid Club API: jobs, product, company or survey.
    pub name: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub items_per_page: Option<usize>,
    pub days_interval: Option<u32>,
    pub cols_to_drop: Option<Vec<String>>,
    pub if_empty: Option<IfEmpty>,
    pub config_key: Option<String>,
    /// Key Vault secret holding `{"url": ..., "token": ...}`.
    pub credentials_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    pub vault_name: Option<String>,
    pub vault_url: Option<String>,
    pub authority_host: Option<String>,
    /// Key Vault secret holding the service principal JSON.
    pub sp_credentials_secret: Option<String>,
    /// Overrides `https://{account}.dfs.core.windows.net`.
    pub adls_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub local_file_path: String,
    pub file_sep: Option<String>,
    /// `filesystem/path/to/file` in the data lake.
    pub adls_file_path: String,
    pub adls_overwrite: Option<bool>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    pub max_retries: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl EtlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn vidclub_source(&self) -> Result<VidClubSource> {
        self.source.name.parse()
    }

    pub fn vidclub_query(&self) -> Result<VidClubQuery> {
        Ok(VidClubQuery {
            source: self.vidclub_source()?,
            from_date: self
                .source
                .from_date
                .clone()
                .unwrap_or_else(|| OLDEST_DATE.to_string()),
            to_date: self.source.to_date.clone(),
            items_per_page: self.source.items_per_page.unwrap_or(DEFAULT_ITEMS_PER_PAGE),
            days_interval: self.source.days_interval.unwrap_or(DEFAULT_DAYS_INTERVAL),
            cols_to_drop: self.source.cols_to_drop.clone().unwrap_or_default(),
            if_empty: self.source.if_empty.unwrap_or_default(),
        })
    }

    pub fn task_policy(&self) -> TaskPolicy {
        let defaults = TaskPolicy::default();
        TaskPolicy {
            max_retries: self.task.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self
                .task
                .retry_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            timeout: self
                .task
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn file_sep(&self) -> Result<u8> {
        parse_separator(self.load.file_sep.as_deref().unwrap_or("\t"))
    }

    pub fn adls_overwrite(&self) -> bool {
        self.load.adls_overwrite.unwrap_or(true)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// Deserializes the `[credentials.<key>]` table, if present.
    pub fn credentials_for<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.credentials.get(key) {
            None => Ok(None),
            Some(value) => value.clone().try_into().map(Some).map_err(|e| {
                EtlError::credential(format!("Invalid credentials under '{}': {}", key, e))
            }),
        }
    }

    fn require_vault(&self) -> Result<()> {
        if self.azure.vault_name.is_none() && self.azure.vault_url.is_none() {
            return Err(EtlError::MissingConfigError {
                field: "azure.vault_name or azure.vault_url".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_config(&self) -> Result<()> {
        self.vidclub_source()?;
        if let Some(from) = &self.source.from_date {
            parse_date("source.from_date", from)?;
        }
        if let Some(to) = &self.source.to_date {
            parse_date("source.to_date", to)?;
        }
        if let Some(items) = self.source.items_per_page {
            validate_positive_number("source.items_per_page", items, 1)?;
        }
        if let Some(days) = self.source.days_interval {
            validate_positive_number("source.days_interval", days as usize, 1)?;
        }
        if let Some(secret) = &self.source.credentials_secret {
            validate_secret_name(secret)?;
            self.require_vault()?;
        }
        if self.source.config_key.is_none() && self.source.credentials_secret.is_none() {
            return Err(EtlError::MissingConfigError {
                field: "source.config_key or source.credentials_secret".to_string(),
            });
        }

        if let Some(url) = &self.azure.vault_url {
            validate_url("azure.vault_url", url)?;
        }
        if let Some(host) = &self.azure.authority_host {
            validate_url("azure.authority_host", host)?;
        }
        if let Some(endpoint) = &self.azure.adls_endpoint {
            validate_url("azure.adls_endpoint", endpoint)?;
        }
        if let Some(secret) = &self.azure.sp_credentials_secret {
            validate_secret_name(secret)?;
            self.require_vault()?;
        }

        if let Some(retries) = self.task.max_retries {
            validate_range("task.max_retries", retries, 0, 10)?;
        }
        if let Some(timeout) = self.task.timeout_seconds {
            validate_range("task.timeout_seconds", timeout, 1, 86_400)?;
        }

        validate_path("load.local_file_path", &self.load.local_file_path)?;
        split_adls_path(&self.load.adls_file_path)?;
        self.file_sep()?;
        if let Some(compression) = &self.load.compression {
            if compression.enabled {
                validate_path("load.compression.filename", &compression.filename)?;
            }
        }

        Ok(())
    }
}

impl Validate for EtlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// Accepts a single ASCII character, or the escapes `\t` and `tab`.
pub fn parse_separator(sep: &str) -> Result<u8> {
    match sep {
        "\\t" | "tab" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(EtlError::InvalidConfigValueError {
            field: "file_sep".to_string(),
            value: other.to_string(),
            reason: "Separator must be a single ASCII character".to_string(),
        }),
    }
}
