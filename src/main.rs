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

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod ai;
mod api_client;
mod cache;
mod config;
mod error;
mod fragments;
mod http_client;
mod keywords;
mod logging;
mod parser;
mod persistence;
mod pipeline;
mod roster;
mod types;

use ai::claude::ClaudeAdapter;
use ai::gemini::GeminiAdapter;
use ai::ollama::OllamaAdapter;
use ai::openai::OpenAiAdapter;
use ai::{Evaluator, ProviderAdapter};
use api_client::ApiClient;
use cache::ResponseCache;
use config::Config;
use http_client::HttpFetcher;
use persistence::Persistence;
use pipeline::{PipelineOptions, PipelineReport};
use roster::Roster;

#[derive(Parser)]
#[command(name = "sejmbot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scrapes Sejm plenary transcripts and detects funny fragments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape and analyze every past sitting of a term
    ScrapeTerm {
        term: u32,
        /// Run AI humor evaluation over the detected fragments
        #[arg(long)]
        evaluate: bool,
    },
    /// Scrape and analyze a single sitting (posiedzenie)
    ScrapeProceeding {
        term: u32,
        proceeding: u32,
        #[arg(long)]
        evaluate: bool,
    },
    /// Scrape and analyze a single day of a single sitting
    ScrapeDate {
        term: u32,
        proceeding: u32,
        /// Date in YYYY-MM-DD format
        date: String,
        #[arg(long)]
        evaluate: bool,
    },
    /// List known parliamentary terms
    ListTerms,
    /// List the sittings of a term
    ListProceedings { term: u32 },
    /// Print a reminder of where the last run's results were persisted
    ShowStats,
    /// Show in-memory response cache statistics
    CacheStats,
    /// Drop every entry from the in-memory response cache
    CacheClear,
    /// Evict expired entries from the in-memory response cache
    CacheCleanup,
    /// Load and print the resolved configuration, then exit
    ValidateConfig,
    /// Probe upstream API connectivity and report a health score
    HealthCheck {
        #[arg(default_value_t = 10)]
        term: u32,
    },
    /// Fetch the term list as a minimal end-to-end API connectivity check
    TestApi,
}

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = logging::init(&config.logging).context("failed to initialize logging")?;

    if let Commands::ValidateConfig = cli.command {
        println!("configuration OK");
        println!("  data dir:        {}", config.data_dir.display());
        println!("  api base url:    {}", config.http.base_url);
        println!("  default term:    {}", config.scraping.default_term);
        println!("  primary AI api:  {}", config.ai.primary);
        return Ok(());
    }

    let cache = Arc::new(ResponseCache::new(config.cache.max_memory_entries, config.cache.dir.clone()));
    let fetcher = Arc::new(HttpFetcher::new(config.http.clone(), cache.clone())?);
    let api = ApiClient::new(fetcher, config.http.base_url.clone());
    let persistence = Persistence::new(config.data_dir.clone()).context("failed to prepare data directory")?;

    match cli.command {
        Commands::ScrapeTerm { term, evaluate } => {
            let mut roster = Roster::load(config.roster_path.as_deref());
            let evaluator = evaluate.then(|| build_evaluator(&config));
            let options = scrape_options(&config, term, evaluate);
            let report = pipeline::run_term(&api, &persistence, &mut roster, evaluator.as_ref(), &options).await;
            print_report(&report);
        }
        Commands::ScrapeProceeding { term, proceeding, evaluate } => {
            let mut roster = Roster::load(config.roster_path.as_deref());
            let evaluator = evaluate.then(|| build_evaluator(&config));
            let options = scrape_options(&config, term, evaluate);
            let report =
                pipeline::run_sitting(&api, &persistence, &mut roster, evaluator.as_ref(), &options, proceeding).await;
            print_report(&report);
        }
        Commands::ScrapeDate { term, proceeding, date, evaluate } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").context("invalid date, expected YYYY-MM-DD")?;
            let mut roster = Roster::load(config.roster_path.as_deref());
            let evaluator = evaluate.then(|| build_evaluator(&config));
            let options = scrape_options(&config, term, evaluate);
            let report = pipeline::run_date(&api, &persistence, &mut roster, evaluator.as_ref(), &options, proceeding, date).await;
            print_report(&report);
        }
        Commands::ListTerms => {
            let terms = api.terms().await.context("failed to fetch terms")?;
            for term in terms {
                println!(
                    "term {:>2} current={} {} .. {}",
                    term.num,
                    term.current,
                    term.from.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string()),
                    term.to.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string()),
                );
            }
        }
        Commands::ListProceedings { term } => {
            let sittings = api.sittings(term).await.context("failed to fetch sittings")?;
            for sitting in sittings {
                println!(
                    "posiedzenie {:>3}  dates={:<3} {}",
                    sitting.number,
                    sitting.dates.len(),
                    sitting.title.unwrap_or_default(),
                );
            }
        }
        Commands::ShowStats => {
            println!("pipeline reports are printed after each scrape-* run and persisted under");
            println!("{}/detector/results_<timestamp>.json", config.data_dir.display());
        }
        Commands::CacheStats => {
            let stats = cache.stats().await;
            println!("{stats:?}");
        }
        Commands::CacheClear => {
            cache.clear().await;
            println!("cache cleared");
        }
        Commands::CacheCleanup => {
            let removed = cache.cleanup_expired().await;
            println!("removed {removed} expired entries");
        }
        Commands::ValidateConfig => unreachable!("handled above"),
        Commands::HealthCheck { term } => {
            let (score, errors) = api.health_check(term).await;
            println!("health score: {score}/5");
            for error in &errors {
                println!("  - {error}");
            }
            if !errors.is_empty() {
                anyhow::bail!("health check reported {} failing check(s)", errors.len());
            }
        }
        Commands::TestApi => match api.terms().await {
            Some(terms) => println!("API reachable: {} term(s) returned", terms.len()),
            None => anyhow::bail!("API unreachable or returned an unexpected response"),
        },
    }

    Ok(())
}

fn scrape_options(config: &Config, term: u32, evaluate: bool) -> PipelineOptions {
    PipelineOptions {
        term,
        fetch_full_statements: config.scraping.fetch_full_statements,
        run_ai_evaluation: evaluate,
        ..PipelineOptions::default()
    }
}

/// Wires all four humor-classification backends into one cascade. Adapters
/// for providers without a configured API key are still registered: the
/// evaluator itself skips them (by checking `ProviderConfig::api_key`)
/// rather than refusing to construct.
fn build_evaluator(config: &Config) -> Evaluator {
    let mut providers: HashMap<String, Box<dyn ProviderAdapter>> = HashMap::new();

    let local_model = config
        .ai
        .providers
        .get("local")
        .map(|p| p.model.clone())
        .unwrap_or_else(|| "llama2:7b".to_string());
    providers.insert(
        "local".to_string(),
        Box::new(OllamaAdapter::new(config.ai.ollama_base_url.clone(), local_model)),
    );

    if let Some(p) = config.ai.providers.get("free_remote") {
        providers.insert(
            "free_remote".to_string(),
            Box::new(GeminiAdapter::new(p.api_key.clone().unwrap_or_default(), p.model.clone())),
        );
    }
    if let Some(p) = config.ai.providers.get("paid_a") {
        providers.insert(
            "paid_a".to_string(),
            Box::new(OpenAiAdapter::new(p.api_key.clone().unwrap_or_default(), p.model.clone())),
        );
    }
    if let Some(p) = config.ai.providers.get("paid_b") {
        providers.insert(
            "paid_b".to_string(),
            Box::new(ClaudeAdapter::new(p.api_key.clone().unwrap_or_default(), p.model.clone())),
        );
    }

    Evaluator::new(&config.ai, providers)
}

fn print_report(report: &PipelineReport) {
    println!(
        "sittings: {} processed, {} skipped as future-dated",
        report.sittings_processed, report.sittings_skipped_future
    );
    println!("dates processed: {}", report.dates_processed);
    println!(
        "statements: {} fetched, {} carried transcript text",
        report.statements_fetched, report.statements_with_content
    );
    println!("transcripts written: {}", report.transcripts_written);
    println!("utterances parsed: {}", report.utterances_parsed);
    println!("keyword matches: {}", report.keyword_matches);
    println!(
        "fragments: {} built, {} selected for the results file",
        report.fragments_built, report.fragments_selected
    );
    if let Some(batch) = &report.ai_batch {
        println!(
            "ai evaluations: {} total, {} funny, {} served from cache, {} errors",
            batch.total, batch.funny_count, batch.cached_count, batch.errors
        );
    }
    if report.errors > 0 {
        println!("non-fatal errors encountered: {}", report.errors);
    }
}
