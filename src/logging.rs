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

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initializes the global tracing subscriber. Must be called once, before any
/// other component logs. Returns the file-appender guard when file logging is
/// enabled; the caller must keep it alive for the process lifetime.
pub fn init(cfg: &LoggingConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.to_file {
        std::fs::create_dir_all(&cfg.dir)?;
        let file_appender = tracing_appender::rolling::daily(&cfg.dir, "sejmbot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        fmt().with_env_filter(filter).init();
        Ok(None)
    }
}

/// Truncates a value before it is attached to a log record, matching the
/// "never log full HTML bodies / long prompts" policy.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_for_log_leaves_short_strings_untouched() {
        assert_eq!(truncate_for_log("short", 200), "short");
    }

    #[test]
    fn truncate_for_log_caps_long_strings() {
        let long = "a".repeat(500);
        let truncated = truncate_for_log(&long, 200);
        assert_eq!(truncated.chars().count(), 203);
        assert!(truncated.ends_with("..."));
    }
}
