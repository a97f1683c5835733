use std::future::Future;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Anything that can hand back the HTML body of a page.
pub trait PageSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Browser-like HTTP client with connect/read timeouts and bounded retries.
pub struct HttpClient {
    client: reqwest::Client,
    max_attempts: u32,
    retry_base: Duration,
}

impl HttpClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        // The bulletin host serves an incomplete certificate chain.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(cfg.connect_timeout)
            .read_timeout(cfg.read_timeout)
            .gzip(true)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            max_attempts: cfg.max_attempts.max(1),
            retry_base: cfg.retry_base,
        })
    }

    async fn get_with_retry(&self, url: Url) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            let err = match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    match resp.text().await {
                        Ok(body) => {
                            debug!("Fetched {} ({} bytes)", url, body.len());
                            return Ok(body);
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if !is_transient(&err) {
                return Err(FetchError::Request {
                    url: url.to_string(),
                    source: err,
                });
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                warn!("All {} attempts failed for {}", attempt, url);
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }

            let backoff = backoff_after(self.retry_base, attempt);
            warn!(
                "Request to {} failed (attempt {}/{}): {}, retrying in {:.1}s",
                url,
                attempt,
                self.max_attempts,
                err,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

impl PageSource for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::Url {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.get_with_retry(parsed).await
    }
}

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
fn backoff_after(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Connection failures and timeouts are worth another try; everything
/// else is final.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}
