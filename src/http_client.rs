/*
 * SejmBot - Rust Edition
 * Copyright (c) 2024 SejmBot Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::config::HttpConfig;
use crate::types::FetchResult;

/// How a given HTTP status should be handled by the fetcher's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    Permanent,
    Transient,
    RateLimited,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Ok
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::RateLimited
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
        StatusClass::Permanent
    } else if status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

/// `min(max, min * 2^attempt) + U[0,1)`.
pub fn backoff_duration(attempt: u32, min_secs: f64, max_secs: f64) -> Duration {
    let exp = min_secs * 2f64.powi(attempt as i32);
    let bounded = exp.min(max_secs);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64((bounded + jitter).max(0.0))
}

/// Single-key object shape the upstream API uses to report a handled-but-failed
/// request, e.g. `{"supportID": "..."}`.
fn is_error_sentinel(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Object(map) if map.len() == 1 && map.contains_key("supportID"))
}

/// Rate-limited, retrying, cache-aware HTTP GET client with content-type dispatch.
pub struct HttpFetcher {
    client: Client,
    cfg: HttpConfig,
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<Option<Instant>>>,
    cache: Arc<ResponseCache>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Json,
    Html,
    Binary,
}

impl HttpFetcher {
    pub fn new(cfg: HttpConfig, cache: Arc<ResponseCache>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        let semaphore = Arc::new(Semaphore::new(cfg.concurrent_downloads));
        Ok(Self {
            client,
            cfg,
            semaphore,
            last_request: Arc::new(Mutex::new(None)),
            cache: cache.clone(),
        })
    }

    async fn pace(&self) {
        let delay = Duration::from_secs_f64(self.cfg.request_delay_secs);
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Fetches `url` with `params`, retrying transient failures and honoring the
    /// configured rate limit and cache TTL. Returns `None` on exhausted retries or
    /// a permanent (403/404) failure.
    pub async fn fetch(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        expected: ExpectedType,
        cache_ttl: Duration,
    ) -> Option<FetchResult> {
        let cache_key = ResponseCache::key(url, params);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Some(cached);
        }

        let _permit = self.semaphore.acquire().await.ok()?;

        let mut attempt = 0u32;
        loop {
            self.pace().await;

            let request = self
                .client
                .get(url)
                .query(params)
                .header("User-Agent", &self.cfg.user_agent)
                .header("Accept", "application/json, text/html, */*")
                .header("Accept-Language", "pl,en;q=0.9");

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(%url, error = %e, attempt, "transport error");
                    if attempt >= self.cfg.max_retries {
                        return None;
                    }
                    tokio::time::sleep(backoff_duration(
                        attempt,
                        self.cfg.min_backoff_secs,
                        self.cfg.max_backoff_secs,
                    ))
                    .await;
                    attempt += 1;
                    continue;
                }
            };

            match classify_status(response.status()) {
                StatusClass::Permanent => {
                    tracing::debug!(%url, status = %response.status(), "permanent failure");
                    return None;
                }
                StatusClass::RateLimited => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| {
                            backoff_duration(attempt, self.cfg.min_backoff_secs, self.cfg.max_backoff_secs)
                        });
                    if attempt >= self.cfg.max_retries {
                        return None;
                    }
                    tokio::time::sleep(retry_after).await;
                    attempt += 1;
                    continue;
                }
                StatusClass::Transient => {
                    if attempt >= self.cfg.max_retries {
                        return None;
                    }
                    tokio::time::sleep(backoff_duration(
                        attempt,
                        self.cfg.min_backoff_secs,
                        self.cfg.max_backoff_secs,
                    ))
                    .await;
                    attempt += 1;
                    continue;
                }
                StatusClass::Ok => {
                    let result = self.dispatch_body(response, expected).await?;
                    self.cache.set(&cache_key, result.clone(), cache_ttl).await;
                    return Some(result);
                }
            }
        }
    }

    async fn dispatch_body(
        &self,
        response: reqwest::Response,
        expected: ExpectedType,
    ) -> Option<FetchResult> {
        match expected {
            ExpectedType::Json => {
                let value: serde_json::Value = response.json().await.ok()?;
                if is_error_sentinel(&value) {
                    return None;
                }
                Some(FetchResult::Json(value))
            }
            ExpectedType::Html => {
                let text = response.text().await.ok()?;
                if text.len() < 50 || text.contains("supportID") {
                    return None;
                }
                Some(FetchResult::Html(text))
            }
            ExpectedType::Binary => {
                let bytes = response.bytes().await.ok()?;
                Some(FetchResult::Binary(bytes.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_buckets_correctly() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Ok);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Permanent);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Permanent);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Transient
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), StatusClass::Permanent);
    }

    #[test]
    fn backoff_duration_is_bounded() {
        for attempt in 0..10 {
            let d = backoff_duration(attempt, 0.5, 30.0);
            assert!(d.as_secs_f64() <= 31.0);
        }
    }

    #[test]
    fn error_sentinel_detected() {
        let v = serde_json::json!({"supportID": "abc123"});
        assert!(is_error_sentinel(&v));
        let v2 = serde_json::json!({"supportID": "abc", "extra": 1});
        assert!(!is_error_sentinel(&v2));
    }
}
