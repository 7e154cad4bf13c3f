use crate::utils::error::{EtlError, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

const MAX_ERROR_BODY: usize = 500;

/// Request-level retries for transient HTTP failures (connection errors,
/// 429 and 5xx). Delay doubles on each attempt.
#[derive(Debug, Clone)]
pub struct HttpRetry {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl HttpRetry {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for HttpRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Sends the request and returns the response if it is a success,
/// retrying transient failures per `retry`. Non-success responses become
/// `EtlError::ApiError` carrying the status and a truncated body.
pub async fn handle_api_response(request: RequestBuilder, retry: &HttpRetry) -> Result<Response> {
    let mut attempt = 0;
    loop {
        let current = request.try_clone().ok_or_else(|| EtlError::ProcessingError {
            message: "Streaming request bodies cannot be retried".to_string(),
        })?;

        let error = match current.send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => api_error(response).await,
            Err(e) => EtlError::from(e),
        };

        if !error.is_retryable() || attempt >= retry.max_retries {
            return Err(error);
        }

        let delay = retry.delay_for(attempt);
        attempt += 1;
        tracing::warn!(
            "⚠️ Request failed ({}), retry {}/{} in {:?}",
            error,
            attempt,
            retry.max_retries,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

pub async fn api_error(response: Response) -> EtlError {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    EtlError::ApiError {
        url,
        status,
        message,
    }
}
