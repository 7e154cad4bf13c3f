//! Named units of work with a retry and timeout policy.
//!
//! Each task wraps one adapter call. [`run_task`] applies the policy: the
//! whole `run` is bounded by `timeout`, and retryable failures (network,
//! throttling, 5xx, timeouts) are retried after `retry_delay`.

use crate::adapters::adls::AdlsClient;
use crate::adapters::github::GitHubClient;
use crate::adapters::sqlite::{IfExists, SqliteLoader};
use crate::adapters::vidclub::{VidClub, VidClubQuery};
use crate::domain::model::{Frame, IfEmpty};
use crate::domain::ports::SecretStore;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(3600),
        }
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    type Output: Send;

    fn name(&self) -> &str;
    fn policy(&self) -> &TaskPolicy;
    async fn run(&self) -> Result<Self::Output>;
}

pub async fn run_task<T: Task + ?Sized>(task: &T) -> Result<T::Output> {
    let policy = task.policy();
    let mut attempt = 0;
    loop {
        tracing::debug!("▶️ Task '{}' attempt {}", task.name(), attempt + 1);
        let outcome = match tokio::time::timeout(policy.timeout, task.run()).await {
            Ok(result) => result,
            Err(_) => Err(EtlError::Timeout {
                task: task.name().to_string(),
                seconds: policy.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(output) => return Ok(output),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "⚠️ Task '{}' failed: {}. Retry {}/{} in {:?}",
                    task.name(),
                    e,
                    attempt,
                    policy.max_retries,
                    policy.retry_delay
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => {
                tracing::error!("❌ Task '{}' failed: {}", task.name(), e);
                return Err(e);
            }
        }
    }
}

pub struct VidClubToDf {
    vidclub: VidClub,
    query: VidClubQuery,
    policy: TaskPolicy,
}

impl VidClubToDf {
    pub fn new(vidclub: VidClub, query: VidClubQuery, policy: TaskPolicy) -> Self {
        Self {
            vidclub,
            query,
            policy,
        }
    }
}

#[async_trait]
impl Task for VidClubToDf {
    type Output = Frame;

    fn name(&self) -> &str {
        "vidclub_to_df"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<Frame> {
        self.vidclub.to_frame(&self.query).await
    }
}

/// Uploads a local file to the data lake.
pub struct AzureDataLakeUpload {
    client: AdlsClient,
    from_path: PathBuf,
    to_path: String,
    overwrite: bool,
    policy: TaskPolicy,
}

impl AzureDataLakeUpload {
    pub fn new(
        client: AdlsClient,
        from_path: impl Into<PathBuf>,
        to_path: impl Into<String>,
        overwrite: bool,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            client,
            from_path: from_path.into(),
            to_path: to_path.into(),
            overwrite,
            policy,
        }
    }
}

#[async_trait]
impl Task for AzureDataLakeUpload {
    type Output = String;

    fn name(&self) -> &str {
        "azure_data_lake_upload"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<String> {
        let data = tokio::fs::read(&self.from_path).await?;
        self.client
            .upload(&self.to_path, data, self.overwrite)
            .await?;
        Ok(self.client.url_for(&self.to_path))
    }
}

/// Downloads a data lake file to a local path.
pub struct AzureDataLakeDownload {
    client: AdlsClient,
    from_path: String,
    to_path: PathBuf,
    overwrite: bool,
    policy: TaskPolicy,
}

impl AzureDataLakeDownload {
    pub fn new(
        client: AdlsClient,
        from_path: impl Into<String>,
        to_path: impl Into<PathBuf>,
        overwrite: bool,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            client,
            from_path: from_path.into(),
            to_path: to_path.into(),
            overwrite,
            policy,
        }
    }
}

#[async_trait]
impl Task for AzureDataLakeDownload {
    type Output = PathBuf;

    fn name(&self) -> &str {
        "azure_data_lake_download"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<PathBuf> {
        if !self.overwrite && tokio::fs::try_exists(&self.to_path).await? {
            return Err(EtlError::AlreadyExists {
                resource: self.to_path.display().to_string(),
            });
        }
        let data = self.client.download(&self.from_path).await?;
        write_local(&self.to_path, &data).await?;
        Ok(self.to_path.clone())
    }
}

/// Reads a CSV, TSV or JSON file in the data lake into a frame.
pub struct AzureDataLakeToDf {
    client: AdlsClient,
    path: String,
    sep: Option<u8>,
    if_empty: IfEmpty,
    policy: TaskPolicy,
}

impl AzureDataLakeToDf {
    pub fn new(client: AdlsClient, path: impl Into<String>, policy: TaskPolicy) -> Self {
        Self {
            client,
            path: path.into(),
            sep: None,
            if_empty: IfEmpty::Warn,
            policy,
        }
    }

    pub fn with_sep(mut self, sep: u8) -> Self {
        self.sep = Some(sep);
        self
    }

    pub fn with_if_empty(mut self, if_empty: IfEmpty) -> Self {
        self.if_empty = if_empty;
        self
    }
}

#[async_trait]
impl Task for AzureDataLakeToDf {
    type Output = Frame;

    fn name(&self) -> &str {
        "azure_data_lake_to_df"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<Frame> {
        let format = FileFormat::from_path(&self.path)?;
        let data = self.client.download(&self.path).await?;
        let frame = format.parse(&data, self.sep)?;
        if frame.is_empty() {
            self.if_empty.handle(&format!("Data lake file '{}'", self.path))?;
        }
        tracing::info!("📄 Read {} rows from {}", frame.len(), self.path);
        Ok(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited(u8),
    Json,
}

impl FileFormat {
    pub fn from_path(path: &str) -> Result<Self> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(FileFormat::Delimited(b',')),
            Some("tsv") | Some("txt") => Ok(FileFormat::Delimited(b'\t')),
            Some("json") | Some("jsonl") | Some("ndjson") => Ok(FileFormat::Json),
            _ => Err(EtlError::validation(format!(
                "Unsupported file type for '{}'. Supported: csv, tsv, txt, json, jsonl, ndjson",
                path
            ))),
        }
    }

    /// `sep` overrides the separator implied by the extension.
    pub fn parse(self, data: &[u8], sep: Option<u8>) -> Result<Frame> {
        match self {
            FileFormat::Json => Frame::from_json_bytes(data),
            FileFormat::Delimited(default_sep) => {
                Frame::from_delimited(data, sep.unwrap_or(default_sep))
            }
        }
    }
}

pub struct ReadAzureKeyVaultSecret {
    store: Arc<dyn SecretStore>,
    secret: String,
    policy: TaskPolicy,
}

impl ReadAzureKeyVaultSecret {
    pub fn new(store: Arc<dyn SecretStore>, secret: impl Into<String>, policy: TaskPolicy) -> Self {
        Self {
            store,
            secret: secret.into(),
            policy,
        }
    }
}

#[async_trait]
impl Task for ReadAzureKeyVaultSecret {
    type Output = String;

    fn name(&self) -> &str {
        "read_azure_key_vault_secret"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<String> {
        self.store.get_secret(&self.secret).await
    }
}

pub struct CreateAzureKeyVaultSecret {
    store: Arc<dyn SecretStore>,
    secret: String,
    value: String,
    policy: TaskPolicy,
}

impl CreateAzureKeyVaultSecret {
    pub fn new(
        store: Arc<dyn SecretStore>,
        secret: impl Into<String>,
        value: impl Into<String>,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            store,
            secret: secret.into(),
            value: value.into(),
            policy,
        }
    }
}

#[async_trait]
impl Task for CreateAzureKeyVaultSecret {
    type Output = String;

    fn name(&self) -> &str {
        "create_azure_key_vault_secret"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<String> {
        if self.value.is_empty() {
            return Err(EtlError::validation("Secret value cannot be empty"));
        }
        self.store.set_secret(&self.secret, &self.value).await
    }
}

pub struct DownloadGitHubFile {
    client: GitHubClient,
    repo: String,
    from_path: String,
    branch: String,
    to_path: PathBuf,
    policy: TaskPolicy,
}

impl DownloadGitHubFile {
    pub fn new(
        client: GitHubClient,
        repo: impl Into<String>,
        from_path: impl Into<String>,
        branch: impl Into<String>,
        to_path: impl Into<PathBuf>,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            client,
            repo: repo.into(),
            from_path: from_path.into(),
            branch: branch.into(),
            to_path: to_path.into(),
            policy,
        }
    }
}

#[async_trait]
impl Task for DownloadGitHubFile {
    type Output = PathBuf;

    fn name(&self) -> &str {
        "download_github_file"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<PathBuf> {
        let data = self
            .client
            .download_file(&self.repo, &self.from_path, &self.branch)
            .await?;
        write_local(&self.to_path, &data).await?;
        tracing::info!("💾 Saved {} bytes to {}", data.len(), self.to_path.display());
        Ok(self.to_path.clone())
    }
}

pub struct SqliteInsert {
    database: String,
    table: String,
    frame: Frame,
    if_exists: IfExists,
    if_empty: IfEmpty,
    policy: TaskPolicy,
}

impl SqliteInsert {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        frame: Frame,
        if_exists: IfExists,
        if_empty: IfEmpty,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            frame,
            if_exists,
            if_empty,
            policy,
        }
    }
}

#[async_trait]
impl Task for SqliteInsert {
    type Output = u64;

    fn name(&self) -> &str {
        "sqlite_insert"
    }

    fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    async fn run(&self) -> Result<u64> {
        let loader = SqliteLoader::connect(&self.database).await?;
        loader
            .load_frame(&self.table, &self.frame, self.if_exists, self.if_empty)
            .await
    }
}

async fn write_local(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn fast_policy(max_retries: u32) -> TaskPolicy {
        TaskPolicy {
            max_retries,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    struct FlakyTask {
        failures: u32,
        calls: AtomicU32,
        error_status: u16,
        policy: TaskPolicy,
    }

    #[async_trait]
    impl Task for FlakyTask {
        type Output = u32;

        fn name(&self) -> &str {
            "flaky"
        }

        fn policy(&self) -> &TaskPolicy {
            &self.policy
        }

        async fn run(&self) -> Result<u32> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(EtlError::ApiError {
                    url: "http://test".to_string(),
                    status: self.error_status,
                    message: "boom".to_string(),
                });
            }
            Ok(call)
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let task = FlakyTask {
            failures: 2,
            calls: AtomicU32::new(0),
            error_status: 503,
            policy: fast_policy(3),
        };

        assert_eq!(run_task(&task).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let task = FlakyTask {
            failures: 10,
            calls: AtomicU32::new(0),
            error_status: 500,
            policy: fast_policy(2),
        };

        assert!(run_task(&task).await.is_err());
        assert_eq!(task.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let task = FlakyTask {
            failures: 1,
            calls: AtomicU32::new(0),
            error_status: 400,
            policy: fast_policy(3),
        };

        assert!(run_task(&task).await.is_err());
        assert_eq!(task.calls.load(Ordering::SeqCst), 1);
    }

    struct SlowTask {
        policy: TaskPolicy,
    }

    #[async_trait]
    impl Task for SlowTask {
        type Output = ();

        fn name(&self) -> &str {
            "slow"
        }

        fn policy(&self) -> &TaskPolicy {
            &self.policy
        }

        async fn run(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let task = SlowTask {
            policy: TaskPolicy {
                max_retries: 0,
                retry_delay: Duration::ZERO,
                timeout: Duration::from_millis(20),
            },
        };

        let err = run_task(&task).await.unwrap_err();
        assert!(matches!(err, EtlError::Timeout { ref task, .. } if task == "slow"));
    }

    #[derive(Default)]
    struct MemorySecrets {
        values: Mutex<std::collections::HashMap<String, String>>,
    }

    #[async_trait]
    impl SecretStore for MemorySecrets {
        async fn get_secret(&self, name: &str) -> Result<String> {
            self.values
                .lock()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| EtlError::SecretNotFound {
                    name: name.to_string(),
                    vault: "memory".to_string(),
                })
        }

        async fn set_secret(&self, name: &str, value: &str) -> Result<String> {
            self.values
                .lock()
                .await
                .insert(name.to_string(), value.to_string());
            Ok(format!("memory/{}", name))
        }
    }

    #[tokio::test]
    async fn test_secret_tasks_share_a_store() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecrets::default());

        let create =
            CreateAzureKeyVaultSecret::new(store.clone(), "api-key", "v4lue", fast_policy(0));
        assert_eq!(run_task(&create).await.unwrap(), "memory/api-key");

        let read = ReadAzureKeyVaultSecret::new(store.clone(), "api-key", fast_policy(0));
        assert_eq!(run_task(&read).await.unwrap(), "v4lue");

        let missing = ReadAzureKeyVaultSecret::new(store, "other", fast_policy(3));
        assert!(matches!(
            run_task(&missing).await,
            Err(EtlError::SecretNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_secret_value_is_rejected() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecrets::default());
        let create = CreateAzureKeyVaultSecret::new(store, "api-key", "", fast_policy(0));
        assert!(matches!(
            run_task(&create).await,
            Err(EtlError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_file_format_from_path() {
        assert_eq!(
            FileFormat::from_path("raw/a.csv").unwrap(),
            FileFormat::Delimited(b',')
        );
        assert_eq!(
            FileFormat::from_path("raw/a.TSV").unwrap(),
            FileFormat::Delimited(b'\t')
        );
        assert_eq!(FileFormat::from_path("raw/a.jsonl").unwrap(), FileFormat::Json);
        assert!(FileFormat::from_path("raw/a.parquet").is_err());
    }

    #[test]
    fn test_separator_override() {
        let frame = FileFormat::from_path("raw/a.csv")
            .unwrap()
            .parse(b"a;b\n1;2\n", Some(b';'))
            .unwrap();
        assert_eq!(frame.columns, vec!["a", "b"]);
        assert_eq!(frame.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_insert_task() {
        let dir = tempfile::TempDir::new().unwrap();
        let database = dir.path().join("etl.db");
        let frame = Frame::from_json_rows(vec![serde_json::json!({"id": 1})]);

        let task = SqliteInsert::new(
            database.to_string_lossy(),
            "items",
            frame,
            IfExists::Replace,
            IfEmpty::Fail,
            fast_policy(0),
        );

        assert_eq!(run_task(&task).await.unwrap(), 1);
        let loader = SqliteLoader::connect(&database.to_string_lossy()).await.unwrap();
        assert!(loader.table_exists("items").await.unwrap());
    }
}
