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

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub request_delay_secs: f64,
    pub max_retries: u32,
    pub user_agent: String,
    pub concurrent_downloads: usize,
    pub min_backoff_secs: f64,
    pub max_backoff_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapingMode {
    Normal,
    ForceRefresh,
    CacheOnly,
    Incremental,
}

impl std::str::FromStr for ScrapingMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "force_refresh" => Ok(ScrapingMode::ForceRefresh),
            "cache_only" => Ok(ScrapingMode::CacheOnly),
            "incremental" => Ok(ScrapingMode::Incremental),
            _ => Ok(ScrapingMode::Normal),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub mode: ScrapingMode,
    pub fetch_full_statements: bool,
    pub default_term: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub memory_ttl_hours: u64,
    pub file_ttl_hours: u64,
    pub max_memory_entries: usize,
    pub enable_cleanup: bool,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub to_file: bool,
    pub dir: PathBuf,
    pub max_file_size_mb: u64,
    pub backup_count: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub calls_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub primary: String,
    pub provider_order: Vec<String>,
    pub providers: HashMap<String, ProviderConfig>,
    pub cache_dir: PathBuf,
    pub max_retries: u32,
    pub ollama_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub scraping: ScrapingConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub ai: AiConfig,
    pub data_dir: PathBuf,
    pub roster_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let http = HttpConfig {
            base_url: env_or_string("API_BASE_URL", "https://api.sejm.gov.pl"),
            request_timeout_secs: env_or("REQUEST_TIMEOUT", 30),
            request_delay_secs: env_or("REQUEST_DELAY", 0.2),
            max_retries: env_or("MAX_RETRIES", 3),
            user_agent: env_or_string("USER_AGENT", "sejmbot-rs/0.1.0"),
            concurrent_downloads: env_or("CONCURRENT_DOWNLOADS", 3),
            min_backoff_secs: 0.5,
            max_backoff_secs: 30.0,
        };

        let default_term: u32 = env_or("DEFAULT_TERM", 10);
        if !(1..=20).contains(&default_term) {
            return Err(ConfigError::OutOfRange {
                field: "DEFAULT_TERM".to_string(),
                value: default_term.to_string(),
                bounds: "1..=20".to_string(),
            }
            .into());
        }

        let scraping = ScrapingConfig {
            mode: env_or_string("SCRAPING_MODE", "normal").parse().unwrap_or(ScrapingMode::Normal),
            fetch_full_statements: env_flag("FETCH_FULL_STATEMENTS", true),
            default_term,
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let cache = CacheConfig {
            memory_ttl_hours: env_or("CACHE_MEMORY_TTL_HOURS", 12),
            file_ttl_hours: env_or("CACHE_FILE_TTL_HOURS", 24),
            max_memory_entries: env_or("CACHE_MAX_MEMORY_ENTRIES", 10_000),
            enable_cleanup: env_flag("CACHE_ENABLE_CLEANUP", true),
            dir: data_dir.join("cache"),
        };

        let logging = LoggingConfig {
            level: env_or_string("LOG_LEVEL", "info"),
            to_file: env_flag("LOG_TO_FILE", false),
            dir: std::env::var("LOG_DIR").map(PathBuf::from).unwrap_or_else(|_| data_dir.join("logs")),
            max_file_size_mb: env_or("LOG_MAX_FILE_SIZE_MB", 10),
            backup_count: env_or("LOG_BACKUP_COUNT", 5),
        };

        let ai = Self::load_ai_config(&data_dir)?;

        std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;
        std::fs::create_dir_all(&cache.dir).context("failed to create cache directory")?;

        let roster_path = std::env::var("ROSTER_PATH").ok().map(PathBuf::from);

        Ok(Config {
            http,
            scraping,
            cache,
            logging,
            ai,
            data_dir,
            roster_path,
        })
    }

    fn load_ai_config(data_dir: &std::path::Path) -> Result<AiConfig> {
        let primary = env_or_string("PRIMARY_AI_API", "free_remote");
        let provider_order = vec![
            primary.clone(),
            "local".to_string(),
            "paid_a".to_string(),
            "paid_b".to_string(),
        ];

        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                api_key: None,
                model: env_or_string("LOCAL_MODEL", "llama2:7b"),
                calls_per_minute: env_or("LOCAL_CALLS_PER_MINUTE", 60),
            },
        );
        providers.insert(
            "free_remote".to_string(),
            ProviderConfig {
                api_key: std::env::var("FREE_REMOTE_API_KEY").ok(),
                model: env_or_string("FREE_REMOTE_MODEL", "gemini-1.5-flash"),
                calls_per_minute: env_or("FREE_REMOTE_CALLS_PER_MINUTE", 60),
            },
        );
        providers.insert(
            "paid_a".to_string(),
            ProviderConfig {
                api_key: std::env::var("PAID_A_API_KEY").ok(),
                model: env_or_string("PAID_A_MODEL", "gpt-4o-mini"),
                calls_per_minute: env_or("PAID_A_CALLS_PER_MINUTE", 50),
            },
        );
        providers.insert(
            "paid_b".to_string(),
            ProviderConfig {
                api_key: std::env::var("PAID_B_API_KEY").ok(),
                model: env_or_string("PAID_B_MODEL", "claude-3-haiku-20240307"),
                calls_per_minute: env_or("PAID_B_CALLS_PER_MINUTE", 40),
            },
        );

        Ok(AiConfig {
            primary,
            provider_order,
            providers,
            cache_dir: std::env::var("AI_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("ai-cache")),
            max_retries: env_or("AI_MAX_RETRIES", 2),
            ollama_base_url: env_or_string("OLLAMA_BASE_URL", "http://localhost:11434"),
        })
    }
}
