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

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::PersistenceError;
use crate::types::Fragment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRecord {
    pub num: u32,
    pub speaker: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub original: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub term: u32,
    pub sitting_id: u32,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub sitting_info: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFile {
    pub metadata: TranscriptMetadata,
    pub statements: Vec<StatementRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsFile {
    pub generated_at: DateTime<Utc>,
    pub fragments: Vec<Fragment>,
}

/// Owns the output directory layout and performs atomic writes within it.
pub struct Persistence {
    base_dir: PathBuf,
}

impl Persistence {
    pub fn new(base_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn term_dir(&self, term: u32) -> PathBuf {
        let dir = self.base_dir.join(format!("kadencja_{:02}", term));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    pub fn sitting_dir(&self, term: u32, sitting: u32, first_date: Option<NaiveDate>) -> PathBuf {
        let mut name = format!("posiedzenie_{:03}", sitting);
        if let Some(date) = first_date {
            name.push('_');
            name.push_str(&date.format("%Y-%m-%d").to_string());
        }
        let dir = self.term_dir(term).join(name);
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    pub fn transcripts_dir(&self, term: u32, sitting: u32, first_date: Option<NaiveDate>) -> PathBuf {
        let dir = self.sitting_dir(term, sitting, first_date).join("transcripts");
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    pub fn detector_dir(&self) -> PathBuf {
        let dir = self.base_dir.join("detector");
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    /// Writes `transcript` atomically under `dir/transkrypty_<date>.json`, unless
    /// it carries no statement with non-empty text, in which case nothing is
    /// written and `Ok(None)` is returned.
    pub fn write_transcript(&self, dir: &Path, transcript: &TranscriptFile) -> Result<Option<PathBuf>, PersistenceError> {
        if !transcript.statements.iter().any(|s| !s.text.trim().is_empty()) {
            return Ok(None);
        }
        let mut statements = transcript.statements.clone();
        statements.sort_by_key(|s| s.num);
        let ordered = TranscriptFile {
            metadata: transcript.metadata.clone(),
            statements,
        };
        let filename = format!("transkrypty_{}.json", transcript.metadata.date.format("%Y-%m-%d"));
        let path = dir.join(filename);
        write_json_atomic(dir, &path, &ordered)?;
        Ok(Some(path))
    }

    pub fn write_results(&self, stamp: &str, results: &ResultsFile) -> Result<PathBuf, PersistenceError> {
        let dir = self.detector_dir();
        let path = dir.join(format!("results_{}.json", stamp));
        write_json_atomic(&dir, &path, results)?;
        Ok(path)
    }
}

/// Writes `value` as pretty JSON to `path` via a same-directory temp file and
/// atomic rename, so a crash mid-write never leaves a partial file in place.
fn write_json_atomic<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| PersistenceError::Write {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    tmp.write_all(json.as_bytes()).map_err(|e| PersistenceError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    tmp.flush().map_err(|e| PersistenceError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| PersistenceError::Rename(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transcript(text: &str) -> TranscriptFile {
        TranscriptFile {
            metadata: TranscriptMetadata {
                term: 10,
                sitting_id: 5,
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                generated_at: Utc::now(),
                sitting_info: serde_json::json!({}),
            },
            statements: vec![StatementRecord {
                num: 1,
                speaker: "Jan Kowalski".to_string(),
                text: text.to_string(),
                start_time: None,
                end_time: None,
                duration_seconds: None,
                original: serde_json::json!({}),
            }],
        }
    }

    #[test]
    fn write_transcript_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(tmp.path().to_path_buf()).unwrap();
        let dir = persistence.transcripts_dir(10, 5, None);
        let transcript = sample_transcript("Treść przemówienia.");

        let path = persistence.write_transcript(&dir, &transcript).unwrap().unwrap();
        let read_back: TranscriptFile = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read_back.statements[0].text, "Treść przemówienia.");
        assert_eq!(read_back.metadata.term, 10);
    }

    #[test]
    fn write_transcript_skips_empty_content() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(tmp.path().to_path_buf()).unwrap();
        let dir = persistence.transcripts_dir(10, 5, None);
        let transcript = sample_transcript("   ");

        let result = persistence.write_transcript(&dir, &transcript).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn statements_are_sorted_by_num_on_write() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(tmp.path().to_path_buf()).unwrap();
        let dir = persistence.transcripts_dir(10, 5, None);
        let mut transcript = sample_transcript("pierwsza");
        transcript.statements[0].num = 2;
        transcript.statements.push(StatementRecord {
            num: 1,
            speaker: "Anna Nowak".to_string(),
            text: "druga".to_string(),
            start_time: None,
            end_time: None,
            duration_seconds: None,
            original: serde_json::json!({}),
        });

        let path = persistence.write_transcript(&dir, &transcript).unwrap().unwrap();
        let read_back: TranscriptFile = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read_back.statements[0].num, 1);
        assert_eq!(read_back.statements[1].num, 2);
    }

    #[test]
    fn directory_layout_matches_design() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(tmp.path().to_path_buf()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dir = persistence.sitting_dir(10, 5, Some(date));
        assert!(dir.ends_with("kadencja_10/posiedzenie_005_2024-03-01"));
    }
}
