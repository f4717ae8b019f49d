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

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{clamp_confidence, HumorCategory, KeywordMatch, Utterance};

/// `(keyword, weight)` pairs, weight in `1..=4`. Ported verbatim from the
/// upstream keyword configuration.
pub static FUNNY_KEYWORDS: &[(&str, u8)] = &[
    ("śmiech", 4), ("haha", 4), ("hihi", 4), ("lol", 4),
    ("śmieszny", 4), ("rozbawienie", 4),
    ("żart", 4), ("żartuje", 4), ("żarcik", 4),
    ("komiczny", 4), ("humorystyczny", 4), ("dowcip", 4), ("gag", 4),
    ("cyrk", 4), ("farsa", 4), ("kabaret", 4), ("opera mydlana", 4),
    ("bzdura", 4), ("nonsens", 4), ("brednie", 4), ("absurd", 4),
    ("gafa", 4), ("wpadka", 4), ("lapsus", 4), ("autokompromitacja", 4),

    ("absurdalny", 3), ("niedorzeczny", 3), ("groteskowy", 3),
    ("skandaliczny", 3), ("niewiarygodny", 3), ("szokujący", 3),
    ("zabawny", 3), ("rozśmieszać", 3), ("ubaw", 3), ("śmieszyć", 3),
    ("teatr", 3), ("spektakl", 3), ("przedstawienie", 3), ("szopka", 3),
    ("parodia", 3), ("kpina", 3), ("drwina", 3), ("ironia", 3),
    ("groteska", 3), ("skecz", 3),
    ("gwizdy", 3), ("buczenie", 3), ("wrzawa", 3), ("tumult", 3), ("chaĺturzenie", 3),

    ("chaos", 2), ("zamieszanie", 2), ("bałagan", 2), ("awantura", 2),
    ("nieporozumienie", 2), ("pomyłka", 2), ("błąd", 2), ("omyłka", 2),
    ("ironiczny", 2), ("sarkastyczny", 2), ("sarkazm", 2), ("kpić", 2), ("kpiarski", 2),
    ("dziwny", 2), ("osobliwy", 2), ("niezwykły", 2), ("nietypowy", 2),
    ("komentarze z sali", 2), ("docinki", 2), ("śmiesznostka", 2),

    ("ciekawy", 1), ("interesujący", 1), ("zaskakujący", 1),
    ("naprawdę", 1), ("serio", 1), ("poważnie", 1), ("tak sobie", 1),
    ("show", 1), ("występ", 1), ("reality", 1),
    ("reakcja", 1), ("odzew", 1), ("odpowiedź", 1),
    ("efektowny", 1), ("dziwactwo", 1),
];

pub static EXCLUDE_KEYWORDS: &[&str] = &[
    "spis", "treści", "porządek", "dzienny", "punkt", "ustawa", "projekt",
    "sprawozdanie", "stenograficzne", "posiedzenie", "kadencja", "strona",
    "warszawa", "dnia", "roku", "załącznik", "aneks",
    "pierwszy", "drugi", "trzeci", "czwarty", "piąty", "szósty",
    "siódmy", "ósmy", "dziewiąty", "dziesiąty",
    "art", "artykuł", "ustęp", "litera", "tiret",
    "procedura", "wniosek", "poprawka", "komisja", "podkomisja",
    "głosowanie", "protokół", "zaproszenie", "zawiadomienie",
    "styczeń", "luty", "marzec", "kwiecień", "maj", "czerwiec",
    "lipiec", "sierpień", "wrzesień", "październik", "listopad", "grudzień",
    "poniedziałek", "wtorek", "środa", "czwartek", "piątek", "sobota", "niedziela",
    "konstytucja", "kodeks", "rozporządzenie", "obwieszczenie",
    "dziennik", "ustaw", "monitor", "polski",
    "oklaski", "brawa", "aplauz", "dzwonek", "gwizdy", "buczenie", "wrzawa", "tumult",
];

static STENOGRAM_MARKERS: &[&str] = &["oklaski", "brawa", "aplauz", "dzwonek", "gwizdy", "buczenie", "wrzawa", "tumult", "cisza", "przerwa"];

fn humor_type_keywords() -> &'static HashMap<HumorCategory, Vec<&'static str>> {
    static TABLE: Lazy<HashMap<HumorCategory, Vec<&'static str>>> = Lazy::new(|| {
        HashMap::from([
            (
                HumorCategory::Joke,
                vec![
                    "żart", "żartuje", "żarcik", "haha", "hihi", "śmiech", "dowcip", "gag",
                    "komiczny", "humorystyczny", "zabawny", "rozbawienie", "śmieszny",
                ],
            ),
            (
                HumorCategory::Sarcasm,
                vec![
                    "ironiczny", "sarkastyczny", "sarkazm", "kpić", "kpina", "drwina",
                    "ironia", "kpiarski", "docinki",
                ],
            ),
            (
                HumorCategory::PersonalAttack,
                vec![
                    "kabaret", "cyrk", "farsa", "kpina", "spektakl", "teatr",
                    "szopka", "parodia", "opera",
                ],
            ),
            (
                HumorCategory::Chaos,
                vec![
                    "gwizdy", "buczenie", "wrzawa", "tumult", "chaos", "zamieszanie",
                    "bałagan", "awantura", "chaĺturzenie",
                ],
            ),
        ])
    });
    &TABLE
}

fn weight_table() -> &'static HashMap<&'static str, u8> {
    static TABLE: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| FUNNY_KEYWORDS.iter().copied().collect());
    &TABLE
}

pub fn keyword_weight(keyword: &str) -> u8 {
    weight_table().get(keyword.to_lowercase().trim()).copied().unwrap_or(0)
}

struct CompiledPattern {
    keyword: &'static str,
    weight: u8,
    regex: Regex,
}

static COMPILED_KEYWORDS: Lazy<Vec<CompiledPattern>> = Lazy::new(|| {
    FUNNY_KEYWORDS
        .iter()
        .map(|&(kw, weight)| CompiledPattern {
            keyword: kw,
            weight,
            regex: Regex::new(&format!(r"(?i)\b{}\w*\b", regex::escape(kw))).unwrap(),
        })
        .collect()
});

static EXCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    let escaped: Vec<String> = EXCLUDE_KEYWORDS.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|"))).unwrap()
});

static STENOGRAM_RE: Lazy<Regex> = Lazy::new(|| {
    let escaped: Vec<String> = STENOGRAM_MARKERS.iter().map(|w| regex::escape(w)).collect();
    let markers = escaped.join("|");
    Regex::new(&format!(
        r"(?i)\[(?:\s*(?:{m})\s*[,\s]*)+\]|\((?:\s*(?:{m})\s*[,\s]*)+\)",
        m = markers
    ))
    .unwrap()
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A single keyword hit, with its byte position in `text`.
#[derive(Debug, Clone, Copy)]
pub struct RawMatch {
    pub keyword: &'static str,
    pub weight: u8,
    pub char_position: usize,
}

/// Finds every keyword occurrence in `text`, sorted by position.
pub fn find_keywords(text: &str) -> Vec<RawMatch> {
    let lower = text.to_lowercase();
    let mut matches: Vec<RawMatch> = COMPILED_KEYWORDS
        .iter()
        .flat_map(|pattern| {
            pattern.regex.find_iter(&lower).map(move |m| RawMatch {
                keyword: pattern.keyword,
                weight: pattern.weight,
                char_position: lower[..m.start()].chars().count(),
            })
        })
        .collect();
    matches.sort_by_key(|m| m.char_position);
    matches
}

pub fn count_exclude(text: &str) -> usize {
    EXCLUDE_RE.find_iter(text).count()
}

/// Strips parenthetical/bracketed stenogram markers (`[oklaski]`, `(śmiech)`)
/// and collapses whitespace.
pub fn filter_stenogram_markers(text: &str) -> String {
    let filtered = STENOGRAM_RE.replace_all(text, "");
    WHITESPACE_RE.replace_all(filtered.trim(), " ").to_string()
}

/// Keeps only the keywords from `claimed` that actually occur (case-insensitive,
/// word-boundary) in `fragment_text`.
pub fn verify_keywords(fragment_text: &str, claimed: &[String]) -> Vec<String> {
    let lower = fragment_text.to_lowercase();
    claimed
        .iter()
        .filter(|kw| {
            Regex::new(&format!(r"(?i)\b{}\w*\b", regex::escape(kw)))
                .map(|re| re.is_match(&lower))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Sub-scores plus the final clamped confidence, computed from a fragment's
/// verified keyword weights and surrounding text.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceResult {
    pub confidence: f32,
    pub keyword_score: f32,
    pub context_score: f32,
    pub length_bonus: f32,
}

/// Implements the scoring formula: weighted keyword base capped at 0.7, a
/// variety bonus for distinct keywords, a penalty for exclude-list hits, and
/// a length modifier, clamped to `[0.1, 0.95]` (forced to 0.1 when more than
/// four exclude words are present).
pub fn score_confidence(fragment_text: &str, verified_keywords: &[(String, u8)]) -> ConfidenceResult {
    let total_weight: u32 = verified_keywords.iter().map(|(_, w)| *w as u32).sum();
    let unique_count = {
        let mut seen = std::collections::HashSet::new();
        verified_keywords.iter().filter(|(kw, _)| seen.insert(kw.clone())).count()
    };
    let exclude_count = count_exclude(fragment_text);
    let word_count = fragment_text.split_whitespace().count();

    let base = (total_weight as f32 * 0.15).min(0.7);
    let variety_bonus = (unique_count as f32 * 0.05).min(0.15);
    let exclude_penalty = exclude_count as f32 * 0.08;
    let length_modifier = if word_count < 8 {
        0.8
    } else if word_count > 50 {
        1.1
    } else {
        1.0
    };

    let raw = (base + variety_bonus - exclude_penalty) * length_modifier;
    let confidence = if exclude_count > 4 { 0.1 } else { clamp_confidence(raw) };

    ConfidenceResult {
        confidence,
        keyword_score: base,
        context_score: variety_bonus - exclude_penalty,
        length_bonus: length_modifier,
    }
}

/// Runs [`find_keywords`] over every utterance with at least `min_words`
/// words, converting each hit's char position to a word index within the
/// utterance.
pub fn scan_utterances(utterances: &[Utterance], min_words: usize) -> Vec<KeywordMatch> {
    let mut matches = Vec::new();
    for utterance in utterances {
        if utterance.word_count < min_words {
            continue;
        }
        for hit in find_keywords(&utterance.text) {
            let word_position = char_to_word_position(&utterance.text, hit.char_position);
            matches.push(KeywordMatch {
                keyword: hit.keyword.to_string(),
                weight: hit.weight,
                utterance_index: utterance.index,
                word_position,
                char_position: hit.char_position,
                category: select_category(&[hit.keyword.to_string()]),
                confidence_base: hit.weight as f32 * 0.15,
            });
        }
    }
    matches
}

fn char_to_word_position(text: &str, char_position: usize) -> usize {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0;
    }
    let mut char_count = 0usize;
    for (idx, word) in words.iter().enumerate() {
        let word_len = word.chars().count();
        if char_position < char_count + word_len {
            return idx;
        }
        char_count += word_len + 1;
    }
    words.len() - 1
}

/// Sums keyword weight per category and returns the highest-scoring one,
/// ties broken by insertion order; `Other` if no category scores above zero.
pub fn select_category(keywords: &[String]) -> HumorCategory {
    let order = [
        HumorCategory::Joke,
        HumorCategory::Sarcasm,
        HumorCategory::PersonalAttack,
        HumorCategory::Chaos,
    ];

    let lower_keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut best = HumorCategory::Other;
    let mut best_score: u32 = 0;

    for category in order {
        let type_keywords = &humor_type_keywords()[&category];
        let score: u32 = lower_keywords
            .iter()
            .filter(|kw| type_keywords.iter().any(|tk| tk.eq_ignore_ascii_case(kw)))
            .map(|kw| keyword_weight(kw) as u32)
            .sum();
        if score > best_score {
            best_score = score;
            best = category;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_keywords_sorted_by_position() {
        let matches = find_keywords("To był żart, po prostu śmiech na sali.");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].char_position < matches[1].char_position);
    }

    #[test]
    fn counts_exclude_words() {
        assert_eq!(count_exclude("Punkt pierwszy porządku dziennego."), 3);
    }

    #[test]
    fn filters_stenogram_brackets() {
        let text = "Poseł mówi [oklaski] dalej swoją wypowiedź.";
        let filtered = filter_stenogram_markers(text);
        assert!(!filtered.contains("oklaski"));
    }

    #[test]
    fn confidence_formula_matches_reference_arithmetic() {
        let result = score_confidence(
            "To był żart i śmiech na sali, niezwykle zabawna sytuacja dzisiaj.",
            &[("żart".to_string(), 4), ("śmiech".to_string(), 4)],
        );
        // base = min(0.7, 8*0.15) = 0.7 ; variety = min(0.15, 0.1) = 0.1
        assert!((result.keyword_score - 0.7).abs() < 1e-6);
        assert!(result.confidence >= 0.1 && result.confidence <= 0.95);
    }

    #[test]
    fn forces_minimum_confidence_above_exclude_threshold() {
        let text = "punkt pierwszy porządku dziennego ustawa projekt sprawozdanie posiedzenie kadencja";
        let result = score_confidence(text, &[("żart".to_string(), 4)]);
        assert_eq!(result.confidence, 0.1);
    }

    #[test]
    fn category_selection_prefers_highest_scoring_type() {
        let category = select_category(&["żart".to_string(), "haha".to_string()]);
        assert_eq!(category, HumorCategory::Joke);
    }

    #[test]
    fn category_defaults_to_other_with_no_match() {
        let category = select_category(&["nieistniejące".to_string()]);
        assert_eq!(category, HumorCategory::Other);
    }

    fn utterance(index: usize, text: &str) -> Utterance {
        Utterance {
            index,
            speaker_raw: "Poseł Jan Kowalski".to_string(),
            speaker_name: "Jan Kowalski".to_string(),
            club: Some("KO".to_string()),
            word_count: text.split_whitespace().count(),
            text: text.to_string(),
            word_positions: vec![],
            original_offset: 0,
        }
    }

    #[test]
    fn scan_utterances_finds_matches_and_word_positions() {
        let u = utterance(0, "To był naprawdę świetny żart na sali sejmowej dzisiaj.");
        let matches = scan_utterances(&[u], 5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "żart");
        assert_eq!(matches[0].utterance_index, 0);
        assert_eq!(matches[0].word_position, 4);
    }

    #[test]
    fn scan_utterances_skips_short_utterances() {
        let u = utterance(0, "Krótki żart.");
        let matches = scan_utterances(&[u], 5);
        assert!(matches.is_empty());
    }
}
