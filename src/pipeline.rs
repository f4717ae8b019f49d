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

use std::collections::HashSet;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::ai::{BatchReport, Evaluator};
use crate::api_client::ApiClient;
use crate::fragments::{self, ExtractorConfig};
use crate::keywords;
use crate::logging::truncate_for_log;
use crate::parser;
use crate::persistence::{Persistence, ResultsFile, StatementRecord, TranscriptFile, TranscriptMetadata};
use crate::roster::Roster;
use crate::types::{Fragment, Sitting};

const CONTENT_FETCH_PACING: Duration = Duration::from_millis(50);
const MIN_SPEECH_WORDS_FOR_KEYWORDS: usize = 5;

/// Knobs for a single pipeline run. `target_fragment_count` bounds how many
/// fragments survive [`fragments::select_diverse`] across the whole run, not
/// per day.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub term: u32,
    pub fetch_full_statements: bool,
    pub max_sittings: Option<usize>,
    pub max_dates_per_sitting: Option<usize>,
    pub run_ai_evaluation: bool,
    pub min_confidence: f32,
    pub target_fragment_count: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            term: 10,
            fetch_full_statements: true,
            max_sittings: None,
            max_dates_per_sitting: None,
            run_ai_evaluation: false,
            min_confidence: 0.3,
            target_fragment_count: 100,
        }
    }
}

/// Per-component counters accumulated over a pipeline run, reported at the end.
#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    pub sittings_processed: u32,
    pub sittings_skipped_future: u32,
    pub dates_processed: u32,
    pub statements_fetched: u32,
    pub statements_with_content: u32,
    pub transcripts_written: u32,
    pub utterances_parsed: u32,
    pub keyword_matches: u32,
    pub fragments_built: u32,
    pub fragments_selected: u32,
    pub ai_batch: Option<BatchReport>,
    pub errors: u32,
}

/// Scrapes every past sitting of `options.term`, runs keyword detection over
/// each day, and persists a single term-wide fragment report.
#[tracing::instrument(skip_all, fields(term = options.term))]
pub async fn run_term(
    api: &ApiClient,
    persistence: &Persistence,
    roster: &mut Roster,
    evaluator: Option<&Evaluator>,
    options: &PipelineOptions,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    preload_roster(api, roster, options.term).await;

    let Some(raw_sittings) = api.sittings(options.term).await else {
        report.errors += 1;
        return report;
    };

    let mut sittings = filter_unique_sittings(raw_sittings);
    if let Some(max) = options.max_sittings {
        sittings.truncate(max);
    }

    let today = Utc::now().date_naive();
    let mut all_fragments = Vec::new();

    for sitting in &sittings {
        if sitting.dates.is_empty() || sitting.dates.iter().all(|d| *d > today) {
            report.sittings_skipped_future += 1;
            continue;
        }
        report.sittings_processed += 1;
        let fragments = process_sitting(api, persistence, roster, options, sitting, today, &mut report).await;
        all_fragments.extend(fragments);
    }

    finalize(persistence, evaluator, options, all_fragments, &mut report).await;
    report
}

/// Scrapes one sitting of `options.term` (ignoring `max_sittings`).
#[tracing::instrument(skip_all, fields(term = options.term, sitting = sitting_number))]
pub async fn run_sitting(
    api: &ApiClient,
    persistence: &Persistence,
    roster: &mut Roster,
    evaluator: Option<&Evaluator>,
    options: &PipelineOptions,
    sitting_number: u32,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    preload_roster(api, roster, options.term).await;

    let Some(sitting) = api.sitting(options.term, sitting_number).await else {
        report.errors += 1;
        return report;
    };

    let today = Utc::now().date_naive();
    if sitting.dates.is_empty() || sitting.dates.iter().all(|d| *d > today) {
        report.sittings_skipped_future += 1;
        finalize(persistence, evaluator, options, Vec::new(), &mut report).await;
        return report;
    }
    report.sittings_processed += 1;

    let fragments = process_sitting(api, persistence, roster, options, &sitting, today, &mut report).await;
    finalize(persistence, evaluator, options, fragments, &mut report).await;
    report
}

/// Scrapes a single day of a single sitting.
#[tracing::instrument(skip_all, fields(term = options.term, sitting = sitting_number, date = %date))]
pub async fn run_date(
    api: &ApiClient,
    persistence: &Persistence,
    roster: &mut Roster,
    evaluator: Option<&Evaluator>,
    options: &PipelineOptions,
    sitting_number: u32,
    date: NaiveDate,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    preload_roster(api, roster, options.term).await;

    let first_date = api.sitting(options.term, sitting_number).await.and_then(|s| s.dates.into_iter().min());
    let dir = persistence.transcripts_dir(options.term, sitting_number, first_date);

    let fragments = match process_date(api, roster, options.term, sitting_number, date, options.fetch_full_statements, &mut report).await {
        Some((transcript, raw_text)) => {
            record_transcript_write(persistence, &dir, &transcript, &mut report);
            detect_fragments(&raw_text, roster, options.min_confidence, &mut report)
        }
        None => Vec::new(),
    };

    finalize(persistence, evaluator, options, fragments, &mut report).await;
    report
}

/// Processes every past date of `sitting`, writing one transcript file per
/// day and returning the fragments detected across all of them.
#[tracing::instrument(skip_all, fields(term = options.term, sitting = sitting.number))]
async fn process_sitting(
    api: &ApiClient,
    persistence: &Persistence,
    roster: &Roster,
    options: &PipelineOptions,
    sitting: &Sitting,
    today: NaiveDate,
    report: &mut PipelineReport,
) -> Vec<Fragment> {
    let mut past_dates: Vec<NaiveDate> = sitting.dates.iter().copied().filter(|d| *d <= today).collect();
    past_dates.sort();
    if let Some(max_dates) = options.max_dates_per_sitting {
        past_dates.truncate(max_dates);
    }

    let first_date = sitting.dates.iter().min().copied();
    let dir = persistence.transcripts_dir(options.term, sitting.number, first_date);

    let mut fragments = Vec::new();
    for date in past_dates {
        let Some((transcript, raw_text)) =
            process_date(api, roster, options.term, sitting.number, date, options.fetch_full_statements, report).await
        else {
            continue;
        };
        record_transcript_write(persistence, &dir, &transcript, report);
        fragments.extend(detect_fragments(&raw_text, roster, options.min_confidence, report));
    }
    fragments
}

/// Fetches one day's statements, enriches them with roster data, optionally
/// fetches full statement text, and returns both the persistable transcript
/// and the synthesized speaker-tagged blob C5 expects. Returns `None` if the
/// upstream has no statements for that day (future day, or nothing scraped yet).
#[tracing::instrument(skip_all, fields(term, sitting = sitting_number, date = %date))]
async fn process_date(
    api: &ApiClient,
    roster: &Roster,
    term: u32,
    sitting_number: u32,
    date: NaiveDate,
    fetch_full_statements: bool,
    report: &mut PipelineReport,
) -> Option<(TranscriptFile, String)> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let raw_statements = api.statements_day(term, sitting_number, &date_str).await?;
    if raw_statements.is_empty() {
        return None;
    }
    report.dates_processed += 1;

    let mut records = Vec::with_capacity(raw_statements.len());
    let mut blocks = Vec::new();

    for stmt in &raw_statements {
        report.statements_fetched += 1;
        let raw_name = stmt.name.clone().unwrap_or_else(|| "Nieznany mówca".to_string());
        let (resolved_name, roster_club) = roster.find_club(&raw_name);
        let club = roster_club.or_else(|| stmt.club.clone());

        let text = if fetch_full_statements {
            tokio::time::sleep(CONTENT_FETCH_PACING).await;
            api.statement_text(term, sitting_number, &date_str, stmt.num).await.unwrap_or_default()
        } else {
            String::new()
        };

        if !text.trim().is_empty() {
            report.statements_with_content += 1;
            blocks.push(build_speaker_block(&resolved_name, club.as_deref(), &text));
        }

        let duration_seconds = match (stmt.start_date_time, stmt.end_date_time) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        };

        records.push(StatementRecord {
            num: stmt.num,
            speaker: resolved_name,
            text,
            start_time: stmt.start_date_time,
            end_time: stmt.end_date_time,
            duration_seconds,
            original: serde_json::to_value(stmt).unwrap_or_default(),
        });
    }

    let transcript = TranscriptFile {
        metadata: TranscriptMetadata {
            term,
            sitting_id: sitting_number,
            date,
            generated_at: Utc::now(),
            sitting_info: serde_json::json!({}),
        },
        statements: records,
    };

    Some((transcript, blocks.concat()))
}

fn record_transcript_write(persistence: &Persistence, dir: &std::path::Path, transcript: &TranscriptFile, report: &mut PipelineReport) {
    match persistence.write_transcript(dir, transcript) {
        Ok(Some(_)) => report.transcripts_written += 1,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "failed to write transcript");
            report.errors += 1;
        }
    }
}

/// Runs C5→C7→C8 over one day's synthesized transcript blob.
fn detect_fragments(raw_text: &str, roster: &Roster, min_confidence: f32, report: &mut PipelineReport) -> Vec<Fragment> {
    if raw_text.trim().is_empty() {
        return Vec::new();
    }
    tracing::debug!(preview = %truncate_for_log(raw_text, 200), "parsing day's synthesized transcript");

    let parsed = parser::parse(raw_text, roster);
    report.utterances_parsed += parsed.utterances.len() as u32;

    let matches = keywords::scan_utterances(&parsed.utterances, MIN_SPEECH_WORDS_FOR_KEYWORDS);
    report.keyword_matches += matches.len() as u32;

    let config = ExtractorConfig {
        min_confidence,
        ..ExtractorConfig::default()
    };
    let built = fragments::build_fragments(&matches, &parsed.utterances, raw_text, &config);
    report.fragments_built += built.len() as u32;

    fragments::merge_overlapping(built)
}

/// Applies diversity capping, runs the optional AI evaluation batch, and
/// persists the final fragment report.
async fn finalize(
    persistence: &Persistence,
    evaluator: Option<&Evaluator>,
    options: &PipelineOptions,
    fragments: Vec<Fragment>,
    report: &mut PipelineReport,
) {
    let mut selected = fragments::select_diverse(fragments, options.target_fragment_count);
    report.fragments_selected = selected.len() as u32;

    if options.run_ai_evaluation {
        if let Some(evaluator) = evaluator {
            report.ai_batch = Some(evaluator.evaluate_batch(&mut selected).await);
        }
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let results = ResultsFile {
        generated_at: Utc::now(),
        fragments: selected,
    };
    if let Err(e) = persistence.write_results(&stamp, &results) {
        tracing::error!(error = %e, "failed to persist detection results");
        report.errors += 1;
    }
}

/// Drops sittings numbered 0 (the upstream's "not yet numbered" sentinel) and
/// deduplicates by number, keeping the lowest-numbered duplicate's position.
fn filter_unique_sittings(sittings: Vec<Sitting>) -> Vec<Sitting> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Sitting> = sittings.into_iter().filter(|s| s.number != 0 && seen.insert(s.number)).collect();
    unique.sort_by_key(|s| s.number);
    unique
}

async fn preload_roster(api: &ApiClient, roster: &mut Roster, term: u32) {
    if let Some(members) = api.members(term).await {
        for member in &members {
            roster.add_missing(member.full_name(), member.club.clone());
        }
    }
}

/// Synthesizes a speaker-tagged line the transcript parser's speaker
/// patterns recognize, from structured statement fields.
fn build_speaker_block(speaker_name: &str, club: Option<&str>, text: &str) -> String {
    match club {
        Some(club) => format!("{} ({}):\n{}\n\n", speaker_name, club, text),
        None => format!("{}:\n{}\n\n", speaker_name, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_unique_sittings_drops_zero_and_dedupes() {
        let sittings = vec![
            Sitting { number: 0, dates: vec![], title: None, current: false },
            Sitting { number: 5, dates: vec![], title: None, current: false },
            Sitting { number: 5, dates: vec![], title: None, current: false },
            Sitting { number: 2, dates: vec![], title: None, current: false },
        ];
        let unique = filter_unique_sittings(sittings);
        assert_eq!(unique.iter().map(|s| s.number).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn build_speaker_block_includes_club_when_present() {
        let block = build_speaker_block("Jan Kowalski", Some("KO"), "Dziękuję za głos.");
        assert!(block.starts_with("Jan Kowalski (KO):\n"));
        assert!(block.contains("Dziękuję za głos."));
    }

    #[test]
    fn build_speaker_block_omits_parens_without_club() {
        let block = build_speaker_block("Jan Kowalski", None, "Dziękuję za głos.");
        assert!(block.starts_with("Jan Kowalski:\n"));
        assert!(!block.contains('('));
    }

    #[test]
    fn detect_fragments_runs_full_parse_scan_build_chain() {
        let roster = Roster::load(None);
        let mut report = PipelineReport::default();
        let blocks = build_speaker_block(
            "Jan Kowalski",
            Some("KO"),
            "To był naprawdę świetny żart i wszyscy wybuchnęli śmiechem na sali sejmowej dzisiaj.",
        );
        let fragments = detect_fragments(&blocks, &roster, 0.1, &mut report);
        assert!(report.utterances_parsed >= 1);
        assert!(!fragments.is_empty());
    }

    #[test]
    fn detect_fragments_returns_empty_for_blank_text() {
        let roster = Roster::load(None);
        let mut report = PipelineReport::default();
        assert!(detect_fragments("   ", &roster, 0.1, &mut report).is_empty());
    }
}
