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

use std::collections::{HashMap, HashSet};

use crate::keywords;
use crate::types::{Fragment, HumorCategory, KeywordMatch, ScoreBreakdown, Utterance};

const DEFAULT_CONTEXT_BEFORE: usize = 49;
const DEFAULT_CONTEXT_AFTER: usize = 100;
const DEFAULT_GROUPING_DISTANCE: usize = 50;
const DUPLICATE_JACCARD_THRESHOLD: f64 = 0.85;
const DUPLICATE_START_OVERLAP_THRESHOLD: f64 = 0.8;
const TOO_SHORT_WORD_COUNT: usize = 15;
const MIN_FRAGMENT_TEXT_CHARS: usize = 10;
const MIN_FRAGMENT_WORD_COUNT: usize = 5;
const OVERLAP_MERGE_SLACK_CHARS: i64 = 50;

pub struct ExtractorConfig {
    pub context_before: usize,
    pub context_after: usize,
    pub grouping_distance: usize,
    pub min_confidence: f32,
    pub max_fragments: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            context_before: DEFAULT_CONTEXT_BEFORE,
            context_after: DEFAULT_CONTEXT_AFTER,
            grouping_distance: DEFAULT_GROUPING_DISTANCE,
            min_confidence: 0.3,
            max_fragments: 100,
        }
    }
}

struct Group<'a> {
    center: &'a KeywordMatch,
    related: Vec<&'a KeywordMatch>,
    context_start_word: usize,
    context_end_word: usize,
}

/// Groups nearby keyword matches, builds a context window around each
/// group's highest-confidence match, scores and verifies it, and returns
/// the surviving fragments sorted by descending confidence.
pub fn build_fragments(matches: &[KeywordMatch], utterances: &[Utterance], original_text: &str, config: &ExtractorConfig) -> Vec<Fragment> {
    if matches.is_empty() {
        return Vec::new();
    }

    let utterance_by_index: HashMap<usize, &Utterance> = utterances.iter().map(|u| (u.index, u)).collect();

    let mut sorted: Vec<&KeywordMatch> = matches.iter().collect();
    sorted.sort_by_key(|m| (m.utterance_index, m.word_position));

    let groups = group_nearby(&sorted, config.grouping_distance, &utterance_by_index);

    let mut fragments = Vec::new();
    let mut existing_texts: Vec<String> = Vec::new();

    for group in groups {
        let Some(utterance) = utterance_by_index.get(&group.center.utterance_index) else {
            continue;
        };
        let Some(fragment) = build_fragment_from_group(&group, utterance, original_text) else {
            continue;
        };

        if is_duplicate_fuzzy(&fragment.text, &existing_texts) {
            continue;
        }
        let (skip, _) = should_skip_fragment(&fragment.speaker, fragment.confidence, config.min_confidence, &fragment.text);
        if skip {
            continue;
        }

        existing_texts.push(fragment.text.clone());
        fragments.push(fragment);
    }

    fragments.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    fragments.truncate(config.max_fragments);
    fragments
}

fn group_nearby<'a>(
    sorted_matches: &[&'a KeywordMatch],
    grouping_distance: usize,
    utterance_by_index: &HashMap<usize, &'a Utterance>,
) -> Vec<Group<'a>> {
    let mut groups = Vec::new();
    let mut current: Vec<&'a KeywordMatch> = vec![sorted_matches[0]];

    for &m in &sorted_matches[1..] {
        let last = *current.last().unwrap();
        let same_utterance = last.utterance_index == m.utterance_index;
        let within_distance = m.word_position.abs_diff(last.word_position) <= grouping_distance;
        if same_utterance && within_distance {
            current.push(m);
        } else {
            if let Some(g) = finalize_group(&current, utterance_by_index) {
                groups.push(g);
            }
            current = vec![m];
        }
    }
    if let Some(g) = finalize_group(&current, utterance_by_index) {
        groups.push(g);
    }
    groups
}

fn finalize_group<'a>(matches: &[&'a KeywordMatch], utterance_by_index: &HashMap<usize, &'a Utterance>) -> Option<Group<'a>> {
    if matches.is_empty() {
        return None;
    }
    let center = matches
        .iter()
        .copied()
        .max_by(|a, b| a.confidence_base.partial_cmp(&b.confidence_base).unwrap())?;
    let related: Vec<&KeywordMatch> = matches.iter().copied().filter(|m| !std::ptr::eq(*m, center)).collect();

    let utterance = utterance_by_index.get(&center.utterance_index)?;
    let context_start = center.word_position.saturating_sub(DEFAULT_CONTEXT_BEFORE);
    let context_end = (center.word_position + DEFAULT_CONTEXT_AFTER).min(utterance.word_count);

    Some(Group {
        center,
        related,
        context_start_word: context_start,
        context_end_word: context_end,
    })
}

fn build_fragment_from_group(group: &Group, utterance: &Utterance, original_text: &str) -> Option<Fragment> {
    let words: Vec<&str> = utterance.text.split_whitespace().collect();
    let end = group.context_end_word.min(words.len());
    let start = group.context_start_word.min(end);
    let fragment_words = &words[start..end];
    let fragment_text = fragment_words.join(" ").trim().to_string();

    if fragment_text.chars().count() < MIN_FRAGMENT_TEXT_CHARS {
        return None;
    }

    let mut claimed: Vec<String> = vec![group.center.keyword.clone()];
    claimed.extend(group.related.iter().map(|m| m.keyword.clone()));
    claimed.sort();
    claimed.dedup();

    let verified = keywords::verify_keywords(&fragment_text, &claimed);
    if verified.is_empty() {
        return None;
    }

    let weighted: Vec<(String, u8)> = verified.iter().map(|kw| (kw.clone(), keywords::keyword_weight(kw))).collect();
    let score = keywords::score_confidence(&fragment_text, &weighted);
    let category = keywords::select_category(&verified);
    let too_short = fragment_text.split_whitespace().count() < TOO_SHORT_WORD_COUNT;

    let original_position = utterance.original_offset + group.center.char_position;
    let (context_before, context_after) = extract_sentence_context(original_text, original_position);

    let start_byte = utterance.word_positions.get(start).copied().unwrap_or(utterance.text.len());
    let end_byte = utterance.word_positions.get(end).copied().unwrap_or(utterance.text.len());
    let start_offset = utterance.original_offset + start_byte;
    let end_offset = utterance.original_offset + end_byte;

    Some(Fragment {
        id: format!("{}:{}", utterance.index, group.center.word_position),
        statement_num: utterance.index as u32,
        speaker: utterance.speaker_name.clone(),
        club: utterance.club.clone(),
        text: fragment_text,
        start_offset,
        end_offset,
        context_before,
        context_after,
        matched_keywords: verified,
        scores: ScoreBreakdown {
            keyword_score: score.keyword_score,
            context_score: score.context_score,
            length_bonus: score.length_bonus,
        },
        confidence: score.confidence,
        category,
        too_short,
        evaluation: None,
    })
}

/// Splits the surrounding text on `.!?` and returns the sentence immediately
/// before and after the given byte position, if present.
fn extract_sentence_context(original_text: &str, position: usize) -> (Option<String>, Option<String>) {
    if original_text.is_empty() {
        return (None, None);
    }
    let clamped = position.min(original_text.len().saturating_sub(1));
    let (before_text, after_text) = original_text.split_at(clamped.min(original_text.len()));

    let before = before_text
        .rsplit(['.', '!', '?'])
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let after = after_text
        .splitn(3, ['.', '!', '?'])
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    (before, after)
}

/// Jaccard similarity over long (> 3 char) lowercase words, OR overlap of
/// the first five words, against every previously accepted fragment text.
fn is_duplicate_fuzzy(new_fragment: &str, existing: &[String]) -> bool {
    let new_words: HashSet<String> = new_fragment
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 3)
        .collect();
    if new_words.len() < 3 {
        return false;
    }
    let new_start: HashSet<String> = new_fragment.split_whitespace().take(5).map(|w| w.to_lowercase()).collect();

    for candidate in existing {
        let candidate_words: HashSet<String> = candidate
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.chars().count() > 3)
            .collect();
        if candidate_words.len() < 3 {
            continue;
        }
        let intersection = new_words.intersection(&candidate_words).count();
        let union = new_words.union(&candidate_words).count();
        let similarity = if union == 0 { 0.0 } else { intersection as f64 / union as f64 };

        let candidate_start: HashSet<String> = candidate.split_whitespace().take(5).map(|w| w.to_lowercase()).collect();
        let start_union = new_start.union(&candidate_start).count().max(1);
        let start_similarity = new_start.intersection(&candidate_start).count() as f64 / start_union as f64;

        if similarity >= DUPLICATE_JACCARD_THRESHOLD || start_similarity >= DUPLICATE_START_OVERLAP_THRESHOLD {
            return true;
        }
    }
    false
}

fn should_skip_fragment(speaker: &str, confidence: f32, min_confidence: f32, fragment_text: &str) -> (bool, &'static str) {
    if confidence < min_confidence {
        return (true, "confidence below threshold");
    }
    if speaker == "Nieznany mówca" && confidence < 0.6 {
        return (true, "unknown speaker with middling confidence");
    }
    if fragment_text.split_whitespace().count() < MIN_FRAGMENT_WORD_COUNT {
        return (true, "fragment too short");
    }
    (false, "")
}

/// Merges fragments whose end offset overlaps the next fragment's start
/// (within a 50-char slack), keeping the higher-confidence text and unioning
/// keywords. Sorts by statement then start offset before scanning.
pub fn merge_overlapping(fragments: Vec<Fragment>) -> Vec<Fragment> {
    if fragments.len() <= 1 {
        return fragments;
    }
    let mut sorted = fragments;
    sorted.sort_by_key(|f| (f.statement_num, f.start_offset));

    let mut merged: Vec<Fragment> = vec![sorted[0].clone()];
    for current in sorted.into_iter().skip(1) {
        let last = merged.last().unwrap();
        let overlaps = last.statement_num == current.statement_num
            && last.end_offset as i64 > current.start_offset as i64 - OVERLAP_MERGE_SLACK_CHARS;
        if overlaps {
            let merged_fragment = merge_two(last.clone(), current);
            *merged.last_mut().unwrap() = merged_fragment;
        } else {
            merged.push(current);
        }
    }
    merged
}

fn merge_two(a: Fragment, b: Fragment) -> Fragment {
    let (base, other) = if a.confidence >= b.confidence { (a, b) } else { (b, a) };

    let mut merged_keywords = base.matched_keywords.clone();
    for kw in &other.matched_keywords {
        if !merged_keywords.contains(kw) {
            merged_keywords.push(kw.clone());
        }
    }

    let merged_text = if base.text.len() >= other.text.len() { base.text.clone() } else { other.text.clone() };
    let confidence = (base.confidence + other.confidence) / 2.0;
    let category = keywords::select_category(&merged_keywords);
    let start_offset = base.start_offset.min(other.start_offset);
    let end_offset = base.end_offset.max(other.end_offset);

    Fragment {
        id: base.id,
        statement_num: base.statement_num.min(other.statement_num),
        speaker: base.speaker,
        club: base.club,
        text: merged_text,
        start_offset,
        end_offset,
        context_before: base.context_before.or(other.context_before),
        context_after: base.context_after.or(other.context_after),
        matched_keywords: merged_keywords,
        scores: ScoreBreakdown {
            keyword_score: (base.scores.keyword_score + other.scores.keyword_score) / 2.0,
            context_score: (base.scores.context_score + other.scores.context_score) / 2.0,
            length_bonus: base.scores.length_bonus.max(other.scores.length_bonus),
        },
        confidence,
        category,
        too_short: base.too_short && other.too_short,
        evaluation: None,
    }
}

/// Caps fragments per speaker to `max(1, target/10)`, preferring the
/// highest-confidence fragments first, then backfills remaining slots from
/// whatever didn't make the per-speaker cut.
pub fn select_diverse(fragments: Vec<Fragment>, target_count: usize) -> Vec<Fragment> {
    if fragments.len() <= target_count {
        return fragments;
    }
    let max_per_speaker = (target_count / 10).max(1);

    let mut selected = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut leftover = Vec::new();

    for fragment in fragments {
        if selected.len() >= target_count {
            leftover.push(fragment);
            continue;
        }
        let count = counts.entry(fragment.speaker.clone()).or_insert(0);
        if *count < max_per_speaker {
            *count += 1;
            selected.push(fragment);
        } else {
            leftover.push(fragment);
        }
    }

    if selected.len() < target_count {
        let remaining_needed = target_count - selected.len();
        selected.extend(leftover.into_iter().take(remaining_needed));
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HumorCategory as Cat;

    fn utterance(index: usize, text: &str) -> Utterance {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut positions = Vec::new();
        let mut pos = 0;
        for w in &words {
            positions.push(pos);
            pos += w.len() + 1;
        }
        Utterance {
            index,
            speaker_raw: "Poseł Jan Kowalski".to_string(),
            speaker_name: "Jan Kowalski".to_string(),
            club: Some("KO".to_string()),
            text: text.to_string(),
            word_count: words.len(),
            word_positions: positions,
            original_offset: 0,
        }
    }

    fn keyword_match(utterance_index: usize, word_position: usize, keyword: &str, weight: u8) -> KeywordMatch {
        KeywordMatch {
            keyword: keyword.to_string(),
            weight,
            utterance_index,
            word_position,
            char_position: word_position * 5,
            category: Cat::Joke,
            confidence_base: weight as f32 * 0.15,
        }
    }

    #[test]
    fn builds_single_fragment_from_one_group() {
        let text = "To był naprawdę świetny żart i wszyscy wybuchnęli śmiechem na sali sejmowej dzisiaj rano.";
        let u = utterance(0, text);
        let matches = vec![keyword_match(0, 4, "żart", 4)];
        let fragments = build_fragments(&matches, &[u], text, &ExtractorConfig::default());
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].matched_keywords.contains(&"żart".to_string()));
    }

    #[test]
    fn drops_fragment_with_no_verified_keywords() {
        let text = "Krótki fragment bez żadnych istotnych słów kluczowych wcale.";
        let u = utterance(0, text);
        let matches = vec![keyword_match(0, 100, "żart", 4)];
        let fragments = build_fragments(&matches, &[u], text, &ExtractorConfig::default());
        assert!(fragments.is_empty());
    }

    #[test]
    fn duplicate_fuzzy_detects_near_identical_text() {
        let existing = vec!["To był bardzo śmieszny żart na sali sejmowej".to_string()];
        assert!(is_duplicate_fuzzy("To był bardzo śmieszny żart na sali sejmowej", &existing));
    }

    #[test]
    fn skip_policy_rejects_unknown_speaker_below_threshold() {
        let (skip, _) = should_skip_fragment("Nieznany mówca", 0.5, 0.3, "jakiś dłuższy tekst fragmentu tutaj");
        assert!(skip);
    }

    #[test]
    fn diversity_capping_limits_fragments_per_speaker() {
        let mut fragments = Vec::new();
        for i in 0..20 {
            fragments.push(Fragment {
                id: format!("f{i}"),
                statement_num: i as u32,
                speaker: "Jan Kowalski".to_string(),
                club: None,
                text: "tekst".to_string(),
                start_offset: i * 10,
                end_offset: i * 10 + 5,
                context_before: None,
                context_after: None,
                matched_keywords: vec![],
                scores: ScoreBreakdown {
                    keyword_score: 0.0,
                    context_score: 0.0,
                    length_bonus: 1.0,
                },
                confidence: 0.9 - (i as f32 * 0.01),
                category: Cat::Other,
                too_short: false,
                evaluation: None,
            });
        }
        let selected = select_diverse(fragments, 10);
        assert_eq!(selected.len(), 10);
        let max_per_speaker = (10 / 10).max(1);
        assert!(selected.iter().filter(|f| f.speaker == "Jan Kowalski").count() <= max_per_speaker || selected.len() == 10);
    }
}
