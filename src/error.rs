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

use thiserror::Error;

/// Transport-level failure from the HTTP fetcher.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0} retries")]
    Timeout(u32),
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error("permanent failure, status {0}")]
    Permanent(u16),
}

/// Malformed or unexpected response body.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("response body too short ({0} bytes)")]
    TooShort(usize),
    #[error("response contains an upstream error sentinel: {0}")]
    ErrorSentinel(String),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transcript parsing issue. Never fatal; the parser degrades to an empty result.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("no speaker cues found in source text")]
    NoSpeakers,
}

/// Configuration loading/validation failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),
    #[error("value out of range for {field}: {value} (expected {bounds})")]
    OutOfRange {
        field: String,
        value: String,
        bounds: String,
    },
}

/// AI provider adapter failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("rate limited")]
    RateLimited,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("provider not configured (missing API key)")]
    NotConfigured,
}

/// Response-cache failure. Generally recoverable by resetting the affected tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk persistence failure. Reported per-operation; does not abort the pipeline.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename temp file into place: {0}")]
    Rename(std::io::Error),
}
