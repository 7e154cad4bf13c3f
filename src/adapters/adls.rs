use crate::adapters::azure_auth::{AzureTokenProvider, STORAGE_SCOPE};
use crate::adapters::http::{handle_api_response, HttpRetry};
use crate::utils::error::{EtlError, Result};
use reqwest::header::{HeaderMap, HeaderValue, IF_NONE_MATCH};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

pub const STORAGE_API_VERSION: &str = "2021-06-08";
const CONTINUATION_HEADER: &str = "x-ms-continuation";

#[derive(Debug, Deserialize)]
struct PathList {
    #[serde(default)]
    paths: Vec<PathEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathEntry {
    pub name: String,
    #[serde(rename = "isDirectory", default)]
    is_directory: Option<String>,
    #[serde(rename = "contentLength", default)]
    pub content_length: Option<String>,
}

impl PathEntry {
    pub fn is_directory(&self) -> bool {
        self.is_directory.as_deref() == Some("true")
    }
}

/// Azure Data Lake Storage Gen2 client for one filesystem (container).
#[derive(Clone)]
pub struct AdlsClient {
    client: Client,
    endpoint: String,
    filesystem: String,
    tokens: AzureTokenProvider,
    retry: HttpRetry,
}

impl AdlsClient {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        filesystem: impl Into<String>,
        tokens: AzureTokenProvider,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            filesystem: filesystem.into().trim_matches('/').to_string(),
            tokens,
            retry: HttpRetry::default(),
        }
    }

    /// `https://{account_name}.dfs.core.windows.net`, account taken from the
    /// service principal credentials.
    pub fn for_account(
        client: Client,
        filesystem: impl Into<String>,
        tokens: AzureTokenProvider,
    ) -> Result<Self> {
        let account = tokens
            .credentials()
            .account_name
            .clone()
            .ok_or_else(|| {
                EtlError::credential("ACCOUNT_NAME is required to address the data lake")
            })?;
        Ok(Self::new(
            client,
            format!("https://{}.dfs.core.windows.net", account),
            filesystem,
            tokens,
        ))
    }

    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.filesystem,
            path.trim_start_matches('/')
        )
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.token(STORAGE_SCOPE).await?;
        Ok(request
            .bearer_auth(token)
            .header("x-ms-version", STORAGE_API_VERSION))
    }

    fn map_not_found(&self, path: &str) -> impl Fn(EtlError) -> EtlError + '_ {
        let resource = self.url_for(path);
        move |e| match e {
            EtlError::ApiError { status: 404, .. } => EtlError::NotFound {
                resource: resource.clone(),
            },
            other => other,
        }
    }

    /// Creates (or replaces) a file and writes `data` to it in one
    /// append + flush. A file this call created is deleted again when the
    /// append or flush fails, so a later attempt starts from a clean slate.
    pub async fn upload(&self, path: &str, data: Vec<u8>, overwrite: bool) -> Result<()> {
        let url = self.url_for(path);
        tracing::info!("⬆️ Uploading {} bytes to {}", data.len(), url);

        let mut headers = HeaderMap::new();
        if !overwrite {
            headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        }
        let create = self
            .authorized(
                self.client
                    .put(&url)
                    .query(&[("resource", "file")])
                    .headers(headers),
            )
            .await?;
        handle_api_response(create, &self.retry)
            .await
            .map_err(|e| match e {
                EtlError::ApiError { status: 409, .. } | EtlError::ApiError { status: 412, .. } => {
                    EtlError::AlreadyExists {
                        resource: url.clone(),
                    }
                }
                other => other,
            })?;

        if let Err(e) = self.write_content(&url, data).await {
            tracing::warn!("⚠️ Upload to {} failed, removing the partial file", url);
            if let Err(cleanup) = self.delete(path).await {
                tracing::warn!("⚠️ Could not remove partial file {}: {}", url, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write_content(&self, url: &str, data: Vec<u8>) -> Result<()> {
        let length = data.len();
        if length > 0 {
            let append = self
                .authorized(
                    self.client
                        .patch(url)
                        .query(&[("action", "append"), ("position", "0")])
                        .body(data),
                )
                .await?;
            handle_api_response(append, &self.retry).await?;
        }

        let position = length.to_string();
        let flush = self
            .authorized(
                self.client
                    .patch(url)
                    .query(&[("action", "flush"), ("position", position.as_str())])
                    .body(Vec::<u8>::new()),
            )
            .await?;
        handle_api_response(flush, &self.retry).await?;

        tracing::debug!("Upload to {} flushed at position {}", url, length);
        Ok(())
    }

    /// Deletes a file. A missing file is not an error.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let request = self
            .authorized(self.client.delete(self.url_for(path)))
            .await?;
        match handle_api_response(request, &self.retry).await {
            Ok(_) | Err(EtlError::ApiError { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        tracing::info!("⬇️ Downloading {}", url);

        let request = self.authorized(self.client.get(&url)).await?;
        let response = handle_api_response(request, &self.retry)
            .await
            .map_err(self.map_not_found(path))?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let request = self.authorized(self.client.head(self.url_for(path))).await?;
        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(EtlError::ApiError {
                url: self.url_for(path),
                status: status.as_u16(),
                message: "HEAD request failed".to_string(),
            }),
        }
    }

    /// Lists the direct children of `directory`, following
    /// `x-ms-continuation` until every page is read.
    pub async fn list(&self, directory: &str) -> Result<Vec<PathEntry>> {
        let url = format!("{}/{}", self.endpoint, self.filesystem);
        let directory = directory.trim_matches('/');
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("resource", "filesystem"), ("recursive", "false")];
            if !directory.is_empty() {
                query.push(("directory", directory));
            }
            if let Some(token) = continuation.as_deref() {
                query.push(("continuation", token));
            }

            let request = self.authorized(self.client.get(&url).query(&query)).await?;
            let response = handle_api_response(request, &self.retry)
                .await
                .map_err(self.map_not_found(directory))?;
            let next = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let listing: PathList = response.json().await?;
            entries.extend(listing.paths);

            match next {
                Some(token) => {
                    tracing::debug!("Listing {} continues, {} entries so far", url, entries.len());
                    continuation = Some(token);
                }
                None => return Ok(entries),
            }
        }
    }
}

/// Splits `filesystem/dir/file` into the filesystem and the path inside it.
pub fn split_adls_path(path: &str) -> Result<(String, String)> {
    let trimmed = path.trim_matches('/');
    match trimmed.split_once('/') {
        Some((fs, rest)) if !fs.is_empty() && !rest.is_empty() => {
            Ok((fs.to_string(), rest.to_string()))
        }
        _ => Err(EtlError::validation(format!(
            "ADLS path '{}' must look like 'filesystem/path/to/file'",
            path
        ))),
    }
}
