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

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

/// Paid provider #2: `x-api-key` + API-version header, messages API with a
/// top-level `system` field.
pub struct ClaudeAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeAdapter {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, "https://api.anthropic.com/v1".to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build Claude HTTP client");
        Self { client, api_key, model, base_url }
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn id(&self) -> &'static str {
        "paid_b"
    }

    async fn evaluate_humor(
        &self,
        text: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<RawVerdict, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": 200,
            "temperature": 0.3,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": build_user_message(text, context)},
            ],
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .content
            .first()
            .map(|block| block.text.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse("no content blocks in response".to_string()))?;

        parse_verdict(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_messages_content_blocks() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "{\"is_funny\": true, \"confidence\": 0.65, \"reason\": \"gafa\"}"}]
        });
        let parsed: MessagesResponse = serde_json::from_value(json).unwrap();
        let verdict = parse_verdict(&parsed.content[0].text).unwrap();
        assert!(verdict.is_funny);
        assert_eq!(verdict.reason, "gafa");
    }
}
