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

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A numbered parliamentary term ("kadencja").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub num: u32,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub current: bool,
}

/// A numbered multi-day session within a term ("posiedzenie").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sitting {
    pub number: u32,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub current: bool,
}

/// A raw statement record as served by the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatement {
    pub num: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub club: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
}

/// Canonical parliamentarian identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    pub club: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub voivodeship: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A parliamentary caucus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members_count: Option<u32>,
}

/// A single contiguous speech by one speaker, produced by the transcript parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub index: usize,
    pub speaker_raw: String,
    pub speaker_name: String,
    pub club: Option<String>,
    pub text: String,
    pub word_count: usize,
    /// Byte offset of each word's start within `text`, monotonically increasing.
    pub word_positions: Vec<usize>,
    /// Best-effort byte offset of this utterance's text inside the original source.
    pub original_offset: usize,
}

impl Utterance {
    pub fn word_at(&self, word_index: usize) -> Option<&str> {
        let start = *self.word_positions.get(word_index)?;
        let end = self
            .word_positions
            .get(word_index + 1)
            .copied()
            .unwrap_or(self.text.len());
        self.text.get(start..end).map(|s| s.trim())
    }
}

/// Humor category tag assigned to a keyword match or fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HumorCategory {
    Joke,
    Sarcasm,
    PersonalAttack,
    Chaos,
    Other,
}

impl fmt::Display for HumorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HumorCategory::Joke => "joke",
            HumorCategory::Sarcasm => "sarcasm",
            HumorCategory::PersonalAttack => "personal_attack",
            HumorCategory::Chaos => "chaos",
            HumorCategory::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A single keyword hit within an utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub weight: u8,
    pub utterance_index: usize,
    pub word_position: usize,
    pub char_position: usize,
    pub category: HumorCategory,
    pub confidence_base: f32,
}

/// Sub-scores retained alongside a fragment's final confidence for diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword_score: f32,
    pub context_score: f32,
    pub length_bonus: f32,
}

/// A context window around one or more keyword hits, scored and annotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub statement_num: u32,
    pub speaker: String,
    pub club: Option<String>,
    pub text: String,
    /// Approximate byte offsets of `text` within the day's synthesized
    /// transcript blob, used to detect overlap against neighboring fragments.
    pub start_offset: usize,
    pub end_offset: usize,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    pub matched_keywords: Vec<String>,
    pub scores: ScoreBreakdown,
    pub confidence: f32,
    pub category: HumorCategory,
    pub too_short: bool,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

/// Which AI backend produced an [`Evaluation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Local,
    FreeRemote,
    PaidA,
    PaidB,
    None,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Local => "local",
            Provider::FreeRemote => "free_remote",
            Provider::PaidA => "paid_a",
            Provider::PaidB => "paid_b",
            Provider::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// An AI provider's humor classification of a fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_funny: bool,
    pub confidence: f32,
    pub reason: String,
    pub provider: Provider,
    pub cached: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Outcome of a single HTTP fetch, classified by content type.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Json(serde_json::Value),
    Html(String),
    Binary(Vec<u8>),
}

/// Clamp a confidence value into the valid range used throughout the scorer.
pub fn clamp_confidence(value: f32) -> f32 {
    value.clamp(0.1, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_full_name_joins_first_and_last() {
        let m = Member {
            id: 1,
            first_name: "Jan".into(),
            last_name: "Kowalski".into(),
            club: "KO".into(),
            district: None,
            voivodeship: None,
            profession: None,
            email: None,
        };
        assert_eq!(m.full_name(), "Jan Kowalski");
    }

    #[test]
    fn clamp_confidence_respects_bounds() {
        assert_eq!(clamp_confidence(0.0), 0.1);
        assert_eq!(clamp_confidence(5.0), 0.95);
        assert_eq!(clamp_confidence(0.5), 0.5);
    }

    #[test]
    fn humor_category_display_matches_wire_names() {
        assert_eq!(HumorCategory::PersonalAttack.to_string(), "personal_attack");
        assert_eq!(Provider::FreeRemote.to_string(), "free_remote");
    }
}
