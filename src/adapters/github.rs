use crate::adapters::http::{handle_api_response, HttpRetry};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::validate_github_repo;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";

/// Reads single files from GitHub repositories through the contents API.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    retry: HttpRetry,
}

impl GitHubClient {
    pub fn new(client: Client, token: Option<String>) -> Self {
        Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            token,
            retry: HttpRetry::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    pub async fn download_file(&self, repo: &str, path: &str, branch: &str) -> Result<Vec<u8>> {
        validate_github_repo(repo)?;
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(EtlError::validation("GitHub file path cannot be empty"));
        }

        let url = format!("{}/repos/{}/contents/{}", self.api_url, repo, path);
        tracing::info!("📥 Downloading {}@{}:{}", repo, branch, path);

        let mut request = self
            .client
            .get(&url)
            .query(&[("ref", branch)])
            .header(ACCEPT, "application/vnd.github.raw")
            .header(USER_AGENT, concat!("datalake-etl/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = handle_api_response(request, &self.retry)
            .await
            .map_err(|e| match e {
                EtlError::ApiError { status: 404, .. } => EtlError::NotFound {
                    resource: format!("{}@{}:{}", repo, branch, path),
                },
                other => other,
            })?;

        Ok(response.bytes().await?.to_vec())
    }
}
