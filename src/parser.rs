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

use once_cell::sync::Lazy;
use regex::Regex;

use crate::roster::Roster;
use crate::types::Utterance;

const HYPHEN_EXCEPTIONS: &[&str] = &[
    "ex-minister",
    "wice-premier",
    "post-komunist",
    "anty-europejsk",
    "pro-unijn",
    "pseudo-",
    "multi-",
    "inter-",
    "super-",
];

const TYPICAL_ENDINGS: &[&str] = &[
    "lament", "ment", "owy", "ny", "ski", "cki", "nej", "ty", "nia", "arz", "yczny",
];

const TOC_MARKERS: &[&str] = &["spis", "porządek dziennego", "punkt 1.", "punkt 2."];

static SPEAKER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        r"^Poseł(?:anka)?\s+([^:()]+)\s*\(([^)]+)\)\s*:",
        r"^(?:Wice)?[Mm]arszałek\s+([^:()]+)\s*\(([^)]+)\)\s*:",
        r"^Minister\s+([^:()]+)\s*\(([^)]+)\)\s*:",
        r"^Przewodniczący\s+([^:()]+)\s*\(([^)]+)\)\s*:",
        r"^Sekretarz\s+([^:()]+)\s*\(([^)]+)\)\s*:",
        r"^([A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+\s+[A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+(?:\s+[A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+)?)\s*\(([^)]+)\)\s*:",
        r"^Poseł(?:anka)?\s+([^:()]+?)(?:\s*\([^)]+\))?\s*:",
        r"^(?:Wice)?[Mm]arszałek\s+([^:()]+?)(?:\s*\([^)]+\))?\s*:",
        r"^Minister\s+([^:()]+?)(?:\s*\([^)]+\))?\s*:",
        r"^Przewodniczący\s+([^:()]+?)(?:\s*\([^)]+\))?\s*:",
        r"^Sekretarz\s+([^:()]+?)(?:\s*\([^)]+\))?\s*:",
        r"^([A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+\s+[A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+(?:\s+[A-ZĄĆĘŁŃÓŚŹŻ][a-ząćęłńóśźż]+)?)\s*:",
    ];
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
});

static SKIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        r"^\s*\(.*\)\s*$",
        r"^\s*\[.*\]\s*$",
        r"(?i)^\s*Głos z sali\s*:",
        r"(?i)^\s*Głosy z sali\s*:",
        r"^\s*\d+\.\s*$",
        r"(?i)^\s*Punkt\s+\d+",
        r"(?i)^\s*Przerwa\s*$",
        r"(?i)^\s*Koniec\s+posiedzenia",
    ];
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
});

static TITLE_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Poseł|Posłanka|Marszałek|Wicemarszałek|Minister|Przewodniczący|Sekretarz)\s+").unwrap()
});
static CLUB_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]+\)\s*$").unwrap());

static HYPHEN_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*-\s*\n\s*(\w+)").unwrap());
static HYPHEN_SPACE_AFTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*-\s+(\w+)").unwrap());
static HYPHEN_SPACE_BEFORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s+-\s*(\w+)").unwrap());
static HYPHEN_BARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w{2,})-(\w{2,})").unwrap());
static HORIZONTAL_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

static MEETING_SEJM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sejm\s+rzeczypospolitej\s+polskiej").unwrap());
static MEETING_KADENCJA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)kadencja\s+([IVX]+)").unwrap());
static MEETING_POSIEDZENIE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\.\s*posiedzeni[a-z]*").unwrap());
static MEETING_DATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)w\s+dniu\s+(\d+\s+[a-zA-ZąćęłńóśźżĄĆĘŁŃÓŚŹŻ]+\s+\d{4})").unwrap());

/// Best-effort sitting header extracted from the first 1,500 characters.
#[derive(Debug, Default, Clone)]
pub struct SittingInfo {
    pub sejm: Option<String>,
    pub kadencja: Option<String>,
    pub posiedzenie: Option<String>,
    pub data: Option<String>,
}

impl SittingInfo {
    pub fn is_empty(&self) -> bool {
        self.sejm.is_none() && self.kadencja.is_none() && self.posiedzenie.is_none() && self.data.is_none()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ParsingStats {
    pub total_speeches: usize,
    pub speeches_with_club: usize,
    pub speeches_without_club: usize,
    pub unknown_speakers: usize,
    pub skipped_protocol_elements: usize,
    pub total_words: usize,
}

pub struct ParsedTranscript {
    pub utterances: Vec<Utterance>,
    pub sitting_info: SittingInfo,
    pub stats: ParsingStats,
}

/// Single-pass transcript segmentation: cleans the source text, extracts
/// sitting metadata from the header, then walks the cleaned text line by
/// line attributing speakers to utterances.
pub fn parse(raw_text: &str, roster: &Roster) -> ParsedTranscript {
    if raw_text.trim().is_empty() {
        return ParsedTranscript {
            utterances: Vec::new(),
            sitting_info: SittingInfo::default(),
            stats: ParsingStats::default(),
        };
    }

    let sitting_info = extract_sitting_info(raw_text);
    let cleaned = clean_text(raw_text);
    let (utterances, mut stats) = split_into_utterances(&cleaned, raw_text, roster);
    stats.total_speeches = utterances.len();
    for u in &utterances {
        stats.total_words += u.word_count;
        if u.speaker_name == "Nieznany mówca" {
            stats.unknown_speakers += 1;
        } else if u.club.is_some() {
            stats.speeches_with_club += 1;
        } else {
            stats.speeches_without_club += 1;
        }
    }

    ParsedTranscript {
        utterances,
        sitting_info,
        stats,
    }
}

fn clean_text(text: &str) -> String {
    let mut skip_toc = false;
    let mut cleaned_lines = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        let lower = line.to_lowercase();

        if TOC_MARKERS.iter().any(|kw| lower.contains(kw)) {
            skip_toc = true;
            continue;
        }
        if skip_toc && ["Poseł ", "Minister ", "Marszałek "].iter().any(|p| line.contains(p)) {
            skip_toc = false;
        }
        if !skip_toc && line.len() > 10 {
            cleaned_lines.push(line.to_string());
        }
    }

    let joined = cleaned_lines.join("\n");
    let joined = fix_hyphenated_words(&joined);
    HORIZONTAL_WS_RE.replace_all(&joined, " ").to_string()
}

fn fix_hyphenated_words(text: &str) -> String {
    let mut result = text.to_string();
    for re in [&HYPHEN_NEWLINE_RE, &HYPHEN_SPACE_AFTER_RE, &HYPHEN_SPACE_BEFORE_RE, &HYPHEN_BARE_RE] {
        result = re
            .replace_all(&result, |caps: &regex::Captures| join_hyphenated(&caps[1], &caps[2]))
            .to_string();
    }
    result
}

fn join_hyphenated(before: &str, after: &str) -> String {
    let phrase = format!("{}-{}", before, after).to_lowercase();
    if HYPHEN_EXCEPTIONS.iter().any(|ex| phrase.contains(ex)) {
        return format!("{}-{}", before, after);
    }
    let after_lower_starts = after.chars().next().map(|c| c.is_lowercase()).unwrap_or(false);
    let short_before = before.chars().count() <= 4;
    let morphological = TYPICAL_ENDINGS.iter().any(|end| after.to_lowercase().ends_with(end));
    if after_lower_starts || short_before || morphological {
        format!("{}{}", before, after)
    } else {
        format!("{}-{}", before, after)
    }
}

fn extract_sitting_info(text: &str) -> SittingInfo {
    let header: String = text.chars().take(1500).collect();
    let mut info = SittingInfo::default();

    if MEETING_SEJM_RE.is_match(&header) {
        info.sejm = Some("Sejm RP".to_string());
    }
    if let Some(caps) = MEETING_KADENCJA_RE.captures(&header) {
        info.kadencja = Some(format!("Kadencja {}", caps[1].to_uppercase()));
    }
    if let Some(caps) = MEETING_POSIEDZENIE_RE.captures(&header) {
        info.posiedzenie = Some(format!("{}. posiedzenie", &caps[1]));
    }
    if let Some(caps) = MEETING_DATA_RE.captures(&header) {
        info.data = Some(HORIZONTAL_WS_RE.replace_all(caps[1].trim(), " ").to_string());
    }

    info
}

fn should_skip_line(line: &str) -> bool {
    SKIP_PATTERNS.iter().any(|re| re.is_match(line))
}

struct SpeakerMatch {
    matched_text: String,
    name: String,
    club: Option<String>,
}

fn find_speaker_in_line(line: &str, roster: &Roster) -> Option<SpeakerMatch> {
    for pattern in SPEAKER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(line) {
            let raw_name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let pattern_club = caps.get(2).map(|m| m.as_str().trim().to_string());
            let cleaned_name = clean_speaker_name(raw_name);
            let (final_name, roster_club) = roster.find_club(&cleaned_name);
            let final_club = roster_club.or(pattern_club);
            return Some(SpeakerMatch {
                matched_text: caps.get(0).unwrap().as_str().to_string(),
                name: final_name,
                club: final_club,
            });
        }
    }
    None
}

fn clean_speaker_name(raw: &str) -> String {
    let cleaned = TITLE_STRIP_RE.replace(raw, "");
    let cleaned = CLUB_SUFFIX_RE.replace(&cleaned, "");
    cleaned.trim().to_string()
}

fn split_into_utterances(cleaned_text: &str, original_text: &str, roster: &Roster) -> (Vec<Utterance>, ParsingStats) {
    let mut utterances = Vec::new();
    let mut stats = ParsingStats::default();

    let mut current_speaker_raw: Option<String> = None;
    let mut current_speaker_name: Option<String> = None;
    let mut current_club: Option<String> = None;
    let mut current_content_lines: Vec<String> = Vec::new();
    let mut speech_index = 0usize;

    let cleaned_len = cleaned_text.chars().count().max(1);
    let original_len = original_text.chars().count();
    let ratio = original_len as f64 / cleaned_len as f64;
    let mut cleaned_position: usize = 0;

    let sync = |cleaned_pos: usize| -> usize {
        let estimated = (cleaned_pos as f64 * ratio) as usize;
        estimated.min(original_len.saturating_sub(1))
    };

    for line in cleaned_text.lines() {
        let trimmed = line.trim();
        let line_len = line.chars().count() + 1;

        if trimmed.is_empty() {
            cleaned_position += line_len;
            continue;
        }

        if should_skip_line(trimmed) {
            stats.skipped_protocol_elements += 1;
            cleaned_position += line_len;
            continue;
        }

        if let Some(speaker) = find_speaker_in_line(trimmed, roster) {
            if current_speaker_raw.is_some() && !current_content_lines.is_empty() {
                if let Some(u) = build_utterance(
                    current_speaker_raw.take().unwrap(),
                    current_speaker_name.take().unwrap(),
                    current_club.take(),
                    &current_content_lines,
                    sync(cleaned_position),
                    speech_index,
                ) {
                    utterances.push(u);
                    speech_index += 1;
                }
                current_content_lines.clear();
            }

            current_speaker_raw = Some(speaker.matched_text.trim_end_matches(':').trim().to_string());
            current_speaker_name = Some(speaker.name);
            current_club = speaker.club;
            current_content_lines = Vec::new();

            if let Some(colon_pos) = trimmed.find(':') {
                let remaining = trimmed[colon_pos + 1..].trim();
                if !remaining.is_empty() {
                    current_content_lines.push(remaining.to_string());
                }
            }
        } else if current_speaker_raw.is_some() {
            current_content_lines.push(trimmed.to_string());
        }

        cleaned_position += line_len;
    }

    if current_speaker_raw.is_some() && !current_content_lines.is_empty() {
        if let Some(u) = build_utterance(
            current_speaker_raw.unwrap(),
            current_speaker_name.unwrap(),
            current_club,
            &current_content_lines,
            sync(cleaned_position),
            speech_index,
        ) {
            utterances.push(u);
        }
    }

    (utterances, stats)
}

fn build_utterance(
    speaker_raw: String,
    speaker_name: String,
    club: Option<String>,
    content_lines: &[String],
    original_offset: usize,
    index: usize,
) -> Option<Utterance> {
    let text = content_lines.join(" ");
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 3 {
        return None;
    }

    let mut word_positions = Vec::with_capacity(words.len());
    let mut pos = 0usize;
    for word in &words {
        word_positions.push(pos);
        pos += word.chars().count() + 1;
    }

    let speaker_name = if speaker_name.is_empty() {
        "Nieznany mówca".to_string()
    } else {
        speaker_name
    };

    Some(Utterance {
        index,
        speaker_raw,
        speaker_name,
        club,
        word_count: words.len(),
        text,
        word_positions,
        original_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        Roster::load(None)
    }

    #[test]
    fn parses_simple_speaker_and_content() {
        let text = "Poseł Jan Kowalski (KO):\nDziękuję panie marszałku za udzielenie głosu w tej ważnej sprawie.\n";
        let parsed = parse(text, &roster());
        assert_eq!(parsed.utterances.len(), 1);
        assert_eq!(parsed.utterances[0].speaker_name, "Jan Kowalski");
        assert_eq!(parsed.utterances[0].club.as_deref(), Some("KO"));
    }

    #[test]
    fn drops_utterances_shorter_than_three_words() {
        let text = "Poseł Jan Kowalski (KO):\nDobrze.\nMinister Anna Nowak (PiS):\nDziękuję bardzo za tę wypowiedź dzisiaj.\n";
        let parsed = parse(text, &roster());
        assert_eq!(parsed.utterances.len(), 1);
        assert_eq!(parsed.utterances[0].speaker_name, "Anna Nowak");
    }

    #[test]
    fn skips_protocol_only_lines() {
        let text = "Poseł Jan Kowalski (KO):\n(oklaski)\nDziękuję bardzo za udzielenie mi dzisiaj głosu.\n";
        let parsed = parse(text, &roster());
        assert_eq!(parsed.utterances.len(), 1);
        assert!(!parsed.utterances[0].text.contains("oklaski"));
    }

    #[test]
    fn hyphenated_word_is_rejoined_across_newline() {
        let joined = fix_hyphenated_words("parla-\nment");
        assert_eq!(joined, "parlament");
    }

    #[test]
    fn exception_hyphen_is_preserved() {
        let joined = fix_hyphenated_words("ex-minister");
        assert_eq!(joined, "ex-minister");
    }

    #[test]
    fn extracts_sitting_info_from_header() {
        let text = "Sejm Rzeczypospolitej Polskiej, Kadencja X, 5. posiedzenie w dniu 10 marca 2024\n";
        let info = extract_sitting_info(text);
        assert_eq!(info.sejm.as_deref(), Some("Sejm RP"));
        assert_eq!(info.kadencja.as_deref(), Some("Kadencja X"));
        assert_eq!(info.posiedzenie.as_deref(), Some("5. posiedzenie"));
    }

    #[test]
    fn empty_text_yields_empty_result() {
        let parsed = parse("   \n  ", &roster());
        assert!(parsed.utterances.is_empty());
        assert!(parsed.sitting_info.is_empty());
    }
}
