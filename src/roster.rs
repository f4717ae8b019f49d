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
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

const BUNDLED_ROSTER: &str = include_str!("../assets/roster.json");
const TITLES: &[&str] = &["dr", "prof", "mgr", "inż", "ks", "gen"];
const FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    members: HashMap<String, String>,
    #[serde(default)]
    club_abbreviations: HashMap<String, Vec<String>>,
    #[serde(default)]
    functions: HashMap<String, String>,
}

static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(Poseł|Posłanka|Marszałek|Wicemarszałek|Minister|Przewodniczący|Sekretarz)\s+").unwrap());
static NO_CLUB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bbrak\s+klubu\b").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Resolves a raw speaker label to a canonical name and parliamentary club,
/// using exact lookup against normalized name variants, falling back to
/// fuzzy matching. Results are cached per raw input; `add_missing` accepts
/// runtime corrections.
pub struct Roster {
    members: HashMap<String, String>,
    #[allow(dead_code)]
    club_abbreviations: HashMap<String, Vec<String>>,
    #[allow(dead_code)]
    functions: HashMap<String, String>,
    name_cache: HashMap<String, String>,
    result_cache: RwLock<HashMap<String, (String, Option<String>)>>,
}

impl Roster {
    pub fn load_bundled() -> Self {
        Self::from_json(BUNDLED_ROSTER).unwrap_or_else(|_| Self::empty())
    }

    pub fn load_from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Loads from `override_path` if given, falling back to the bundled
    /// roster on any I/O or parse error.
    pub fn load(override_path: Option<&std::path::Path>) -> Self {
        match override_path {
            Some(path) => Self::load_from_path(path).unwrap_or_else(|_| Self::load_bundled()),
            None => Self::load_bundled(),
        }
    }

    fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: RosterFile = serde_json::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn empty() -> Self {
        Self::from_file(RosterFile {
            members: HashMap::new(),
            club_abbreviations: HashMap::new(),
            functions: HashMap::new(),
        })
    }

    fn from_file(file: RosterFile) -> Self {
        let mut name_cache = HashMap::new();
        for full_name in file.members.keys() {
            for variant in [
                normalize_name(full_name, false, false),
                normalize_name(full_name, true, false),
                normalize_name(full_name, true, true),
            ] {
                name_cache.entry(variant).or_insert_with(|| full_name.clone());
            }
        }
        Self {
            members: file.members,
            club_abbreviations: file.club_abbreviations,
            functions: file.functions,
            name_cache,
            result_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Strips titles/parenthetical suffixes from a raw speaker label, then
    /// resolves the remaining name to `(canonical_name, club)` via exact
    /// lookup, falling back to fuzzy matching above [`FUZZY_THRESHOLD`].
    pub fn find_club(&self, speaker_raw: &str) -> (String, Option<String>) {
        if speaker_raw.is_empty() || speaker_raw == "Nieznany mówca" {
            return ("Nieznany mówca".to_string(), None);
        }

        if let Some(cached) = self.result_cache.read().unwrap().get(speaker_raw) {
            return cached.clone();
        }

        let cleaned = extract_name(speaker_raw);
        let result = if cleaned.is_empty() || cleaned == "Nieznany mówca" {
            (speaker_raw.to_string(), None)
        } else if let Some(club) = self.find_exact(&cleaned) {
            (cleaned, Some(club))
        } else if let Some(club) = self.find_fuzzy(&cleaned) {
            (cleaned, Some(club))
        } else {
            (cleaned, None)
        };

        self.result_cache
            .write()
            .unwrap()
            .insert(speaker_raw.to_string(), result.clone());
        result
    }

    fn find_exact(&self, name: &str) -> Option<String> {
        for variant in [
            normalize_name(name, false, false),
            normalize_name(name, true, false),
            normalize_name(name, true, true),
        ] {
            if let Some(original) = self.name_cache.get(&variant) {
                return self.members.get(original).cloned();
            }
        }
        None
    }

    fn find_fuzzy(&self, name: &str) -> Option<String> {
        let normalized_input = normalize_name(name, true, false);
        if normalized_input.is_empty() {
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for db_name in self.members.keys() {
            let normalized_db = normalize_name(db_name, false, false);
            let score = strsim::jaro_winkler(&normalized_input, &normalized_db);
            if score >= FUZZY_THRESHOLD && best.map(|(_, b)| score > b).unwrap_or(true) {
                best = Some((db_name, score));
            }
        }
        best.and_then(|(name, _)| self.members.get(name).cloned())
    }

    /// Runtime-only roster addition; invalidates the fuzzy/exact result cache
    /// so subsequent lookups see it.
    pub fn add_missing(&mut self, name: String, club: String) {
        for variant in [
            normalize_name(&name, false, false),
            normalize_name(&name, true, false),
            normalize_name(&name, true, true),
        ] {
            self.name_cache.entry(variant).or_insert_with(|| name.clone());
        }
        self.members.insert(name, club);
        self.result_cache.write().unwrap().clear();
    }
}

fn extract_name(speaker_raw: &str) -> String {
    let name = PAREN_RE.replace_all(speaker_raw, "");
    let name = TITLE_RE.replace(&name, "");
    let name = NO_CLUB_RE.replace(&name, "");
    name.trim().to_string()
}

fn normalize_name(name: &str, remove_titles: bool, remove_hyphens: bool) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut normalized = name.trim().to_string();

    if remove_titles {
        for title in TITLES {
            let pattern = format!(r"(?i)\b{}\.?\s+", title);
            if let Ok(re) = Regex::new(&pattern) {
                normalized = re.replace_all(&normalized, "").to_string();
            }
        }
    }

    if remove_hyphens {
        let parts: Vec<&str> = normalized.split_whitespace().collect();
        if parts.len() >= 2 {
            let lastname = parts[parts.len() - 1].replace('-', "");
            let mut rebuilt = parts[..parts.len() - 1].join(" ");
            rebuilt.push(' ');
            rebuilt.push_str(&lastname);
            normalized = rebuilt;
        }
    }

    WHITESPACE_RE.replace_all(normalized.trim(), " ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_roster() -> Roster {
        let json = r#"{
            "members": {"Jan Kowalski": "KO", "Anna Nowak-Zielinska": "PiS"},
            "club_abbreviations": {},
            "functions": {}
        }"#;
        Roster::from_json(json).unwrap()
    }

    #[test]
    fn exact_match_strips_title_and_club_suffix() {
        let roster = test_roster();
        let (name, club) = roster.find_club("Poseł Jan Kowalski (KO)");
        assert_eq!(name, "Jan Kowalski");
        assert_eq!(club.as_deref(), Some("KO"));
    }

    #[test]
    fn fuzzy_match_tolerates_minor_typo() {
        let roster = test_roster();
        let (_, club) = roster.find_club("Jan Kowalsk");
        assert_eq!(club.as_deref(), Some("KO"));
    }

    #[test]
    fn hyphenated_surname_variant_matches() {
        let roster = test_roster();
        let (_, club) = roster.find_club("Anna Nowak Zielinska");
        assert_eq!(club.as_deref(), Some("PiS"));
    }

    #[test]
    fn unknown_speaker_short_circuits() {
        let roster = test_roster();
        let (name, club) = roster.find_club("Nieznany mówca");
        assert_eq!(name, "Nieznany mówca");
        assert!(club.is_none());
    }

    #[test]
    fn add_missing_is_found_on_next_lookup() {
        let mut roster = test_roster();
        assert!(roster.find_club("Piotr Wiśniewski").1.is_none());
        roster.add_missing("Piotr Wiśniewski".to_string(), "Lewica".to_string());
        assert_eq!(roster.find_club("Piotr Wiśniewski").1.as_deref(), Some("Lewica"));
    }
}
