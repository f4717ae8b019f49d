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

pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::sha256_hex;
use crate::config::{AiConfig, ProviderConfig};
use crate::error::{CacheError, ProviderError};
use crate::types::{clamp_confidence, Evaluation, Fragment, Provider};

/// Speaker/keyword hints passed alongside the fragment text to an adapter's prompt.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub speaker: Option<String>,
    pub club: Option<String>,
    pub matched_keywords: Vec<String>,
}

/// The bare classification an adapter produces, before the orchestrator stamps
/// provenance (`provider`, `cached`, `evaluated_at`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawVerdict {
    pub is_funny: bool,
    pub confidence: f32,
    pub reason: String,
}

/// Capability interface shared by all four humor-classification backends.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &'static str;
    async fn evaluate_humor(
        &self,
        text: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<RawVerdict, ProviderError>;
}

/// Shared system prompt used by every adapter's request. The user message is
/// the fragment text plus, when available, speaker/club/keyword hints.
pub const SYSTEM_PROMPT: &str = "Jesteś ekspertem od wykrywania humoru w transkryptach \
obrad Sejmu. Oceniasz, czy fragment wypowiedzi jest zamierzenie zabawny: ironia, absurd, \
riposta, gafa, lub reakcja sali. Nie licz neutralnych zasług ani standardowych procedur \
za zabawne. Odpowiedz WYŁĄCZNIE obiektem JSON: {\"is_funny\": bool, \"confidence\": 0..1, \
\"reason\": krótkie uzasadnienie}.";

pub fn build_user_message(text: &str, context: Option<&EvaluationContext>) -> String {
    let mut message = text.to_string();
    if let Some(ctx) = context {
        message.push_str("\n\n---\n");
        if let Some(speaker) = &ctx.speaker {
            message.push_str("Mówca: ");
            message.push_str(speaker);
            if let Some(club) = &ctx.club {
                message.push_str(" (");
                message.push_str(club);
                message.push(')');
            }
            message.push('\n');
        }
        if !ctx.matched_keywords.is_empty() {
            message.push_str("Wykryte słowa kluczowe: ");
            message.push_str(&ctx.matched_keywords.join(", "));
            message.push('\n');
        }
    }
    message
}

/// Models sometimes prepend prose before the JSON object; take the first `{`
/// through the last `}` and parse that slice.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

pub fn parse_verdict(raw: &str) -> Result<RawVerdict, ProviderError> {
    let object = extract_json_object(raw)
        .ok_or_else(|| ProviderError::MalformedResponse("no JSON object in response".to_string()))?;
    serde_json::from_str(object).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

fn cache_key(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    sha256_hex(normalized.as_bytes())
}

fn provider_enum(id: &str) -> Provider {
    match id {
        "local" => Provider::Local,
        "free_remote" => Provider::FreeRemote,
        "paid_a" => Provider::PaidA,
        "paid_b" => Provider::PaidB,
        _ => Provider::None,
    }
}

/// Per-provider token bucket, reset every `window` (60s in production).
struct RateLimiter {
    capacity: u32,
    used: u32,
    window: Duration,
    window_start: Instant,
}

impl RateLimiter {
    fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            used: 0,
            window,
            window_start: Instant::now(),
        }
    }

    async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.used = 0;
            self.window_start = Instant::now();
        }
        if self.used >= self.capacity {
            tokio::time::sleep(self.window.saturating_sub(elapsed)).await;
            self.used = 0;
            self.window_start = Instant::now();
        }
        self.used += 1;
    }
}

/// Content-addressed evaluation cache, checkpointed to disk every 10 writes
/// via the same same-directory-tempfile-then-rename idiom the persistence
/// layer uses for transcripts and results.
struct EvalCache {
    dir: PathBuf,
    path: PathBuf,
    entries: Mutex<HashMap<String, Evaluation>>,
    pending_writes: Mutex<u32>,
}

impl EvalCache {
    fn load(cache_dir: &Path) -> Self {
        let _ = std::fs::create_dir_all(cache_dir);
        let path = cache_dir.join("evaluations.json");
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<HashMap<String, Evaluation>>(&raw).ok())
            .unwrap_or_default();
        Self {
            dir: cache_dir.to_path_buf(),
            path,
            entries: Mutex::new(entries),
            pending_writes: Mutex::new(0),
        }
    }

    async fn get(&self, key: &str) -> Option<Evaluation> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    async fn set(&self, key: String, evaluation: Evaluation) {
        {
            let mut entries = self.entries.lock().await;
            entries.insert(key, evaluation);
        }
        let should_flush = {
            let mut pending = self.pending_writes.lock().await;
            *pending += 1;
            if *pending >= 10 {
                *pending = 0;
                true
            } else {
                false
            }
        };
        if should_flush {
            let _ = self.flush().await;
        }
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let json = {
            let entries = self.entries.lock().await;
            serde_json::to_string_pretty(&*entries).map_err(|e| CacheError::Corrupt(e.to_string()))?
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchReport {
    pub total: u32,
    pub funny_count: u32,
    pub cached_count: u32,
    pub errors: u32,
}

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const BATCH_MIN_CHARS: usize = 20;
const BATCH_PACING: Duration = Duration::from_millis(500);

/// Holds the provider-order cascade, per-provider rate limits, and the
/// evaluation cache. `evaluate` never returns an error: an all-providers-
/// failed outcome is reported as a `Provider::None` evaluation.
pub struct Evaluator {
    providers: HashMap<String, Box<dyn ProviderAdapter>>,
    order: Vec<String>,
    provider_cfg: HashMap<String, ProviderConfig>,
    limiters: Mutex<HashMap<String, RateLimiter>>,
    cache: EvalCache,
    max_retries: u32,
}

impl Evaluator {
    pub fn new(cfg: &AiConfig, providers: HashMap<String, Box<dyn ProviderAdapter>>) -> Self {
        Self {
            providers,
            order: cfg.provider_order.clone(),
            provider_cfg: cfg.providers.clone(),
            limiters: Mutex::new(HashMap::new()),
            cache: EvalCache::load(&cfg.cache_dir),
            max_retries: cfg.max_retries,
        }
    }

    pub async fn evaluate(&self, fragment_text: &str, context: Option<&EvaluationContext>) -> Evaluation {
        let key = cache_key(fragment_text);
        if let Some(mut cached) = self.cache.get(&key).await {
            cached.cached = true;
            return cached;
        }

        for provider_id in &self.order {
            let Some(adapter) = self.providers.get(provider_id) else {
                continue;
            };
            let Some(provider_cfg) = self.provider_cfg.get(provider_id) else {
                continue;
            };
            if provider_id != "local" && provider_cfg.api_key.is_none() {
                tracing::debug!(provider = %provider_id, "skipping unconfigured provider");
                continue;
            }

            self.acquire_rate_limit(provider_id, provider_cfg.calls_per_minute).await;

            match self.evaluate_with_retry(adapter.as_ref(), fragment_text, context).await {
                Ok(verdict) => {
                    let evaluation = Evaluation {
                        is_funny: verdict.is_funny,
                        confidence: clamp_confidence(verdict.confidence),
                        reason: verdict.reason,
                        provider: provider_enum(provider_id),
                        cached: false,
                        evaluated_at: Utc::now(),
                    };
                    self.cache.set(key, evaluation.clone()).await;
                    return evaluation;
                }
                Err(e) => {
                    tracing::warn!(provider = %provider_id, error = %e, "provider failed, advancing to next");
                    continue;
                }
            }
        }

        Evaluation {
            is_funny: false,
            confidence: 0.0,
            reason: "all providers failed".to_string(),
            provider: Provider::None,
            cached: false,
            evaluated_at: Utc::now(),
        }
    }

    async fn evaluate_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        text: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<RawVerdict, ProviderError> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match adapter.evaluate_humor(text, context).await {
                Ok(verdict) => return Ok(verdict),
                Err(ProviderError::NotConfigured) => return Err(ProviderError::NotConfigured),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs((attempt as u64 + 1) * 2)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(ProviderError::RateLimited))
    }

    async fn acquire_rate_limit(&self, provider_id: &str, capacity: u32) {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(provider_id.to_string())
            .or_insert_with(|| RateLimiter::new(capacity, RATE_LIMIT_WINDOW))
            .acquire()
            .await;
    }

    /// Evaluates every fragment in place, skipping short text and pacing
    /// uncached calls. Persists the cache once at the end of the batch.
    pub async fn evaluate_batch(&self, fragments: &mut [Fragment]) -> BatchReport {
        let mut report = BatchReport::default();
        for fragment in fragments.iter_mut() {
            report.total += 1;
            if fragment.text.len() < BATCH_MIN_CHARS {
                continue;
            }

            let context = EvaluationContext {
                speaker: Some(fragment.speaker.clone()),
                club: fragment.club.clone(),
                matched_keywords: fragment.matched_keywords.clone(),
            };
            let was_cached = self.cache.contains(&cache_key(&fragment.text)).await;
            let evaluation = self.evaluate(&fragment.text, Some(&context)).await;

            if evaluation.provider == Provider::None {
                report.errors += 1;
            }
            if evaluation.is_funny {
                report.funny_count += 1;
            }
            if evaluation.cached || was_cached {
                report.cached_count += 1;
            } else {
                tokio::time::sleep(BATCH_PACING).await;
            }
            fragment.evaluation = Some(evaluation);
        }
        let _ = self.cache.flush().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAdapter {
        id: &'static str,
        fail_times: AtomicU32,
        verdict: RawVerdict,
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn evaluate_humor(
            &self,
            _text: &str,
            _context: Option<&EvaluationContext>,
        ) -> Result<RawVerdict, ProviderError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::MalformedResponse("boom".to_string()));
            }
            Ok(self.verdict.clone())
        }
    }

    struct AlwaysFailsAdapter;

    #[async_trait]
    impl ProviderAdapter for AlwaysFailsAdapter {
        fn id(&self) -> &'static str {
            "fails"
        }

        async fn evaluate_humor(
            &self,
            _text: &str,
            _context: Option<&EvaluationContext>,
        ) -> Result<RawVerdict, ProviderError> {
            Err(ProviderError::MalformedResponse("always fails".to_string()))
        }
    }

    fn test_ai_config(cache_dir: PathBuf) -> AiConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "free_remote".to_string(),
            ProviderConfig {
                api_key: Some("key".to_string()),
                model: "m".to_string(),
                calls_per_minute: 1000,
            },
        );
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                api_key: None,
                model: "m".to_string(),
                calls_per_minute: 1000,
            },
        );
        AiConfig {
            primary: "free_remote".to_string(),
            provider_order: vec!["free_remote".to_string(), "local".to_string()],
            providers,
            cache_dir,
            max_retries: 1,
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }

    #[test]
    fn extract_json_object_skips_leading_prose() {
        let raw = "Oto odpowiedź: {\"is_funny\": true, \"confidence\": 0.5, \"reason\": \"x\"} dziękuję";
        let parsed = parse_verdict(raw).unwrap();
        assert!(parsed.is_funny);
        assert_eq!(parsed.confidence, 0.5);
    }

    #[test]
    fn cache_key_ignores_whitespace_and_case_differences() {
        let a = cache_key("Hello   World");
        let b = cache_key("hello world");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn evaluate_falls_back_to_next_provider_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_ai_config(tmp.path().to_path_buf());
        let mut providers: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();
        providers.insert("free_remote".to_string(), Box::new(AlwaysFailsAdapter));
        providers.insert(
            "local".to_string(),
            Box::new(FlakyAdapter {
                id: "local",
                fail_times: AtomicU32::new(0),
                verdict: RawVerdict {
                    is_funny: true,
                    confidence: 0.8,
                    reason: "gafa".to_string(),
                },
            }),
        );
        let evaluator = Evaluator::new(&cfg, providers);

        let eval = evaluator.evaluate("to jest naprawdę zabawny fragment", None).await;
        assert_eq!(eval.provider, Provider::Local);
        assert!(eval.is_funny);
        assert!(!eval.cached);
    }

    #[tokio::test]
    async fn evaluate_returns_none_provider_when_everything_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_ai_config(tmp.path().to_path_buf());
        let mut providers: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();
        providers.insert("free_remote".to_string(), Box::new(AlwaysFailsAdapter));
        providers.insert("local".to_string(), Box::new(AlwaysFailsAdapter));
        let evaluator = Evaluator::new(&cfg, providers);

        let eval = evaluator.evaluate("cokolwiek", None).await;
        assert_eq!(eval.provider, Provider::None);
        assert!(!eval.is_funny);
        assert_eq!(eval.confidence, 0.0);
    }

    #[tokio::test]
    async fn evaluate_result_is_cached_on_second_call() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_ai_config(tmp.path().to_path_buf());
        let mut providers: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();
        providers.insert(
            "free_remote".to_string(),
            Box::new(FlakyAdapter {
                id: "free_remote",
                fail_times: AtomicU32::new(0),
                verdict: RawVerdict {
                    is_funny: false,
                    confidence: 0.2,
                    reason: "nic".to_string(),
                },
            }),
        );
        providers.insert("local".to_string(), Box::new(AlwaysFailsAdapter));
        let evaluator = Evaluator::new(&cfg, providers);

        let first = evaluator.evaluate("powtarzalny fragment tekstu", None).await;
        assert!(!first.cached);
        let second = evaluator.evaluate("powtarzalny fragment tekstu", None).await;
        assert!(second.cached);
    }

    #[tokio::test]
    async fn batch_skips_short_fragments_and_counts_funny() {
        use crate::types::{HumorCategory, ScoreBreakdown};

        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_ai_config(tmp.path().to_path_buf());
        let mut providers: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();
        providers.insert(
            "free_remote".to_string(),
            Box::new(FlakyAdapter {
                id: "free_remote",
                fail_times: AtomicU32::new(0),
                verdict: RawVerdict {
                    is_funny: true,
                    confidence: 0.9,
                    reason: "absurd".to_string(),
                },
            }),
        );
        providers.insert("local".to_string(), Box::new(AlwaysFailsAdapter));
        let evaluator = Evaluator::new(&cfg, providers);

        let make_fragment = |text: &str| Fragment {
            id: "f".to_string(),
            statement_num: 1,
            speaker: "Jan Kowalski".to_string(),
            club: Some("KO".to_string()),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            context_before: None,
            context_after: None,
            matched_keywords: vec![],
            scores: ScoreBreakdown {
                keyword_score: 0.0,
                context_score: 0.0,
                length_bonus: 0.0,
            },
            confidence: 0.5,
            category: HumorCategory::Other,
            too_short: false,
            evaluation: None,
        };

        let mut fragments = vec![make_fragment("za krótko"), make_fragment("wystarczająco długi fragment tekstu, by przejść próg")];
        let report = evaluator.evaluate_batch(&mut fragments).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.funny_count, 1);
        assert!(fragments[0].evaluation.is_none());
        assert!(fragments[1].evaluation.is_some());
    }
}
