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
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;

use super::{build_user_message, parse_verdict, EvaluationContext, ProviderAdapter, RawVerdict, SYSTEM_PROMPT};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

/// Free remote adapter: POST JSON to a generative-language endpoint, API key
/// passed as a query parameter.
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build Gemini HTTP client");
        Self { client, api_key, model }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &'static str {
        "free_remote"
    }

    async fn evaluate_humor(
        &self,
        text: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<RawVerdict, ProviderError> {
        let prompt = format!("{}\n\n{}", SYSTEM_PROMPT, build_user_message(text, context));
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": 150,
                "topP": 0.8,
                "topK": 10
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.into()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Transport(crate::error::TransportError::Permanent(
                response.status().as_u16(),
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let raw_text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse("no candidates in response".to_string()))?;

        parse_verdict(raw_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_reply_text_from_nested_candidate_shape() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "{\"is_funny\": true, \"confidence\": 0.7, \"reason\": \"riposta\"}"}]}}]
        });
        let parsed: GenerateResponse = serde_json::from_value(json).unwrap();
        let verdict = parse_verdict(&parsed.candidates[0].content.parts[0].text).unwrap();
        assert!(verdict.is_funny);
        assert_eq!(verdict.reason, "riposta");
    }
}
