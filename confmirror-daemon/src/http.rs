//! HTTP client with capped exponential backoff.
//!
//! Transport failures and 5xx/429 responses are retried; any other error
//! status fails immediately. Both the URL poller and the file-side push
//! share one client.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry, doubling from the base up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

pub struct RetryingClient {
    inner: reqwest::Client,
    policy: RetryPolicy,
}

impl Default for RetryingClient {
    fn default() -> Self {
        RetryingClient::new(RetryPolicy::default())
    }
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy) -> Self {
        RetryingClient {
            inner: reqwest::Client::new(),
            policy,
        }
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.execute(url, || self.inner.get(url)).await
    }

    pub async fn post_bytes(&self, url: &str, body: Vec<u8>) -> Result<(), HttpError> {
        self.execute(url, move || self.inner.post(url).body(body.clone()))
            .await?;
        Ok(())
    }

    async fn execute<F>(&self, url: &str, build: F) -> Result<Vec<u8>, HttpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let failure = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.bytes().await.map(|b| b.to_vec()).map_err(|source| {
                            HttpError::Transport {
                                url: url.to_string(),
                                source,
                            }
                        });
                    }
                    let err = HttpError::Status {
                        url: url.to_string(),
                        status,
                    };
                    if !retryable_status(status) {
                        return Err(err);
                    }
                    err
                }
                Err(source) => HttpError::Transport {
                    url: url.to_string(),
                    source,
                },
            };
            attempt += 1;
            if attempt >= self.policy.max_attempts {
                return Err(failure);
            }
            let delay = self.policy.backoff(attempt - 1);
            warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %failure, "retrying request");
            tokio::time::sleep(delay).await;
        }
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
