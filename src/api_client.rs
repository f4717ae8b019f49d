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

use once_cell::sync::Lazy;
use regex::Regex;

use crate::http_client::{ExpectedType, HttpFetcher};
use crate::types::{Club, FetchResult, Member, RawStatement, Sitting, Term};

const TTL_MEMBERS: Duration = Duration::from_secs(12 * 3600);
const TTL_TRANSCRIPT: Duration = Duration::from_secs(24 * 3600);
const TTL_SITTING_LIST: Duration = Duration::from_secs(6 * 3600);
const TTL_SITTINGS: Duration = Duration::from_secs(3600);
const TTL_DEFAULT: Duration = Duration::from_secs(30 * 60);

/// Typed wrapper over [`HttpFetcher`] exposing one operation per upstream
/// endpoint named in the external-interfaces contract.
pub struct ApiClient {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
}

impl ApiClient {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: String) -> Self {
        Self { fetcher, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn terms(&self) -> Option<Vec<Term>> {
        let result = self
            .fetcher
            .fetch(&self.url("/sejm/term"), &HashMap::new(), ExpectedType::Json, TTL_SITTING_LIST)
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn term(&self, num: u32) -> Option<Term> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!("/sejm/term{}", num)),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_SITTING_LIST,
            )
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn sittings(&self, term: u32) -> Option<Vec<Sitting>> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!("/sejm/term{}/proceedings", term)),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_SITTINGS,
            )
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn sitting(&self, term: u32, id: u32) -> Option<Sitting> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!("/sejm/term{}/proceedings/{}", term, id)),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_SITTINGS,
            )
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn statements_day(&self, term: u32, sitting: u32, date: &str) -> Option<Vec<RawStatement>> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!(
                    "/sejm/term{}/proceedings/{}/{}/transcripts",
                    term, sitting, date
                )),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_DEFAULT,
            )
            .await?;
        let value = as_json(result)?;
        let statements = value.get("statements")?.clone();
        serde_json::from_value(statements).ok()
    }

    pub async fn statement_html(&self, term: u32, sitting: u32, date: &str, num: u32) -> Option<String> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!(
                    "/sejm/term{}/proceedings/{}/{}/transcripts/{}",
                    term, sitting, date, num
                )),
                &HashMap::new(),
                ExpectedType::Html,
                TTL_TRANSCRIPT,
            )
            .await?;
        match result {
            FetchResult::Html(html) => Some(html),
            _ => None,
        }
    }

    /// Converts a statement's HTML body to plain text: strips scripts/styles and
    /// comments, turns `<br>` into newlines and closing block tags into blank
    /// lines, strips the remaining tags, decodes a fixed entity table, and
    /// collapses whitespace.
    pub async fn statement_text(&self, term: u32, sitting: u32, date: &str, num: u32) -> Option<String> {
        let html = self.statement_html(term, sitting, date, num).await?;
        Some(html_to_text(&html))
    }

    pub async fn members(&self, term: u32) -> Option<Vec<Member>> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!("/sejm/term{}/MP", term)),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_MEMBERS,
            )
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn clubs(&self, term: u32) -> Option<Vec<Club>> {
        let result = self
            .fetcher
            .fetch(
                &self.url(&format!("/sejm/term{}/clubs", term)),
                &HashMap::new(),
                ExpectedType::Json,
                TTL_MEMBERS,
            )
            .await?;
        as_json(result).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Runs five checks — terms, sittings, one historical day's statements, one
    /// statement's HTML body, and the member roster — and scores 0-5 (+1 per
    /// successful check).
    pub async fn health_check(&self, term: u32) -> (u8, Vec<String>) {
        let mut score = 0u8;
        let mut errors = Vec::new();

        if self.terms().await.is_some() {
            score += 1;
        } else {
            errors.push("terms() failed".to_string());
        }

        let sittings = self.sittings(term).await;
        if sittings.is_some() {
            score += 1;
        } else {
            errors.push("sittings() failed".to_string());
        }

        let past_sitting = sittings
            .as_ref()
            .into_iter()
            .flatten()
            .find(|s| !s.dates.is_empty());

        if let Some(sitting) = past_sitting {
            let date_str = sitting.dates[0].format("%Y-%m-%d").to_string();
            let statements = self.statements_day(term, sitting.number, &date_str).await;
            match statements {
                Some(statements) if !statements.is_empty() => {
                    score += 1;
                    if self
                        .statement_html(term, sitting.number, &date_str, statements[0].num)
                        .await
                        .is_some()
                    {
                        score += 1;
                    } else {
                        errors.push("statement_html() failed".to_string());
                    }
                }
                _ => errors.push("statements_day() failed".to_string()),
            }
        } else {
            errors.push("no sitting with dates available to probe".to_string());
        }

        if self.members(term).await.is_some() {
            score += 1;
        } else {
            errors.push("members() failed".to_string());
        }

        (score, errors)
    }
}

fn as_json(result: FetchResult) -> Option<serde_json::Value> {
    match result {
        FetchResult::Json(v) => Some(v),
        _ => None,
    }
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static SCRIPT_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(p|div|li|tr|h[1-6])>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE_RE.replace_all(html, "");
    let text = COMMENT_RE.replace_all(&text, "");
    let text = BR_RE.replace_all(&text, "\n");
    let text = BLOCK_CLOSE_RE.replace_all(&text, "\n\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags_and_decodes_entities() {
        let html = "<p>Pose&#39;&nbsp;mówi</p><script>evil()</script><br>dalej";
        let text = html_to_text(html);
        assert!(text.contains("Pose' mówi"));
        assert!(!text.contains("evil"));
        assert!(text.contains("dalej"));
    }

    #[test]
    fn html_to_text_is_idempotent_on_clean_text() {
        let clean = "Już bez znaczników, tylko zwykły tekst.";
        assert_eq!(html_to_text(clean), html_to_text(&html_to_text(clean)));
    }
}
