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

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

use super::{build_user_message, parse_verdict, EvaluationContext, ProviderAdapter, RawVerdict, SYSTEM_PROMPT};

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: i32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

static CATEGORY_MAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)KATEGORIA\s*:\s*(absurd|joke|irony|gaffe|exaggeration|none|\S+)").unwrap());
static FUNNY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ŚMIESZNE\s*:\s*(TAK|NIE)").unwrap());
static CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PEWNO[SŚ][CĆ]\s*:\s*(\d+)\s*%?").unwrap());
static REASON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)POW[OÓ]D\s*:\s*(.+)").unwrap());

/// Local LLM adapter, HTTP to an Ollama instance. Falls back to a
/// line-oriented format (`ŚMIESZNE: TAK/NIE`, `PEWNOŚĆ: N%`, `KATEGORIA: …`,
/// `POWÓD: …`) when the model doesn't return a JSON object.
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaAdapter {
    pub fn new(base_url: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build Ollama HTTP client");
        Self { client, base_url, model }
    }

    /// Confirms `self.model` (or one of a small set of preferred fallbacks)
    /// is installed on the target Ollama instance.
    pub async fn health_check(&self, preferred_models: &[String]) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let installed = tags.models.iter().any(|m| m.name == self.model);
        if installed {
            return Ok(true);
        }
        Ok(preferred_models.iter().any(|preferred| tags.models.iter().any(|m| &m.name == preferred)))
    }

    fn parse_line_oriented(raw: &str) -> Option<RawVerdict> {
        let is_funny = FUNNY_RE
            .captures(raw)
            .map(|c| c[1].eq_ignore_ascii_case("TAK"))?;
        let confidence = CONFIDENCE_RE
            .captures(raw)
            .and_then(|c| c[1].parse::<f32>().ok())
            .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        let reason = REASON_RE
            .captures(raw)
            .map(|c| c[1].trim().to_string())
            .or_else(|| CATEGORY_MAP.captures(raw).map(|c| c[1].to_string()))
            .unwrap_or_else(|| "brak uzasadnienia".to_string());

        Some(RawVerdict { is_funny, confidence, reason })
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> &'static str {
        "local"
    }

    async fn evaluate_humor(
        &self,
        text: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<RawVerdict, ProviderError> {
        let prompt = build_user_message(text, context);
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system: SYSTEM_PROMPT.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                top_p: 0.9,
                num_predict: 200,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Transport(crate::error::TransportError::Permanent(
                response.status().as_u16(),
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        match parse_verdict(&body.response) {
            Ok(verdict) => Ok(verdict),
            Err(_) => Self::parse_line_oriented(&body.response)
                .ok_or_else(|| ProviderError::MalformedResponse("unrecognized response format".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_oriented_fallback_format() {
        let raw = "ŚMIESZNE: TAK\nPEWNOŚĆ: 80%\nKATEGORIA: absurd\nPOWÓD: sala wybuchła śmiechem";
        let verdict = OllamaAdapter::parse_line_oriented(raw).unwrap();
        assert!(verdict.is_funny);
        assert!((verdict.confidence - 0.8).abs() < 1e-6);
        assert_eq!(verdict.reason, "sala wybuchła śmiechem");
    }

    #[test]
    fn parses_negative_line_oriented_response() {
        let raw = "ŚMIESZNE: NIE\nPEWNOŚĆ: 30%\nKATEGORIA: none\nPOWÓD: zwykła procedura";
        let verdict = OllamaAdapter::parse_line_oriented(raw).unwrap();
        assert!(!verdict.is_funny);
    }

    #[test]
    fn line_oriented_parse_fails_without_funny_marker() {
        assert!(OllamaAdapter::parse_line_oriented("losowy tekst bez struktury").is_none());
    }
}
