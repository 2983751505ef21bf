//! The `critic-panel run` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio::sync::watch;

use critic_core::engine::{PanelEngine, ProgressReporter, RunPhase};
use critic_core::error::TaskError;
use critic_core::report::PanelReport;
use critic_core::votes::{Vote, VoteStatus};
use critic_providers::config::{load_config_from, CriticConfig};
use critic_providers::create_provider;

pub struct RunArgs {
    pub catalog: Option<PathBuf>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub timeout: Option<u64>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub config: Option<PathBuf>,
}

/// Console progress reporter. Prints each persona's table as its vote lands.
struct ConsoleReporter {
    print_votes: bool,
}

impl ProgressReporter for ConsoleReporter {
    fn on_task_start(&self, persona: &str) {
        eprintln!("  Asking: {persona}");
    }

    fn on_vote(&self, vote: &Vote) {
        if !self.print_votes {
            return;
        }
        match &vote.status {
            VoteStatus::ExtractionFailed { reason } => {
                println!("\n=== {} ===", vote.persona);
                println!("Could not read the response: {reason}");
            }
            _ => print_vote(vote),
        }
    }

    fn on_task_error(&self, persona: &str, error: &TaskError) {
        eprintln!("  ERROR: {persona}: {error}");
    }

    fn on_run_complete(&self, total: usize, voted: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {voted}/{total} personas answered, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;

    let temperature = args.temperature.unwrap_or(config.temperature);
    anyhow::ensure!(
        (0.0..=2.0).contains(&temperature),
        "temperature must be between 0.0 and 2.0"
    );
    let timeout_secs = args.timeout.unwrap_or(config.request_timeout_secs);
    anyhow::ensure!(timeout_secs >= 1, "timeout must be at least 1 second");

    let catalog_path = args.catalog.or_else(|| config.catalog.clone());
    let catalog = super::load_catalog(catalog_path.as_deref())?;

    let (provider_name, model) = parse_model(args.model.as_deref(), &config);
    let provider_config = config.providers.get(&provider_name).with_context(|| {
        let mut available: Vec<_> = config.providers.keys().collect();
        available.sort();
        format!("provider '{provider_name}' not found in config. Available: {available:?}")
    })?;
    let provider = create_provider(&provider_name, provider_config)?;

    let mut engine_config = config.engine_config(&model);
    engine_config.temperature = temperature;
    engine_config.request_timeout = Duration::from_secs(timeout_secs);

    eprintln!(
        "critic-panel v{} — {} personas x {} {}s on {provider_name}/{model}",
        env!("CARGO_PKG_VERSION"),
        catalog.personas.len(),
        catalog.subjects.len(),
        catalog.subject_label,
    );
    eprintln!();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling panel run");
            eprintln!("\nCancelling; finished votes will still be reported.");
            let _ = cancel_tx.send(true);
        }
    });

    let engine = PanelEngine::new(Arc::from(provider), engine_config);
    let reporter = ConsoleReporter {
        print_votes: !args.json,
    };
    let report = engine.run_until(&catalog, &reporter, cancel_rx).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        print_summary(&report);
    }

    let output = args.output.unwrap_or(config.output_dir);
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("panel-{timestamp}-{}.json", report.id.simple()));
    report.save_json(&path)?;
    tracing::info!(run_id = %report.id, path = %path.display(), "report saved");
    eprintln!("Results saved to: {}", path.display());

    if report.phase == RunPhase::Cancelled {
        tracing::warn!(
            missing = ?report.missing_personas(),
            "run cancelled before every persona answered"
        );
        eprintln!(
            "Run cancelled: {} persona(s) did not answer.",
            report.missing_personas().len()
        );
    }

    Ok(())
}

/// Provider kinds accepted as a `provider/` prefix even when unconfigured.
const PROVIDER_KINDS: &[&str] = &["gemini", "ollama", "mock"];

/// Split `provider/model`. The prefix only counts as a provider when it is
/// configured or a known kind, so model names containing `/` still work.
fn parse_model(spec: Option<&str>, config: &CriticConfig) -> (String, String) {
    let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) else {
        return (config.default_provider.clone(), config.default_model.clone());
    };
    match spec.split_once('/') {
        Some((provider, model))
            if config.providers.contains_key(provider) || PROVIDER_KINDS.contains(&provider) =>
        {
            (provider.to_string(), model.to_string())
        }
        _ => (config.default_provider.clone(), spec.to_string()),
    }
}

fn print_vote(vote: &Vote) {
    println!("\n=== {} ===", vote.persona);

    if vote.ratings.is_empty() {
        if let VoteStatus::InvocationFailed { reason, .. } = &vote.status {
            println!("No answer: {reason}");
        } else {
            println!("(no ratings)");
        }
    } else {
        let mut table = Table::new();
        table.set_header(vote.ratings.columns.iter().map(Cell::new));
        for row in &vote.ratings.rows {
            let mut cells = vec![Cell::new(&row.subject)];
            cells.extend(row.scores.iter().map(Cell::new));
            table.add_row(cells);
        }
        println!("{table}");
    }

    if !vote.justification.is_empty() {
        println!("\n{}", vote.justification);
    }
    if !vote.ranking.is_empty() {
        println!("Ranking: {}", vote.ranking.join(" > "));
    }
}

fn print_summary(report: &PanelReport) {
    let mut table = Table::new();
    table.set_header(vec!["Persona", "Status", "Rated", "Latency"]);

    for vote in &report.votes {
        let status = match &vote.status {
            VoteStatus::Complete => "ok".to_string(),
            VoteStatus::ExtractionFailed { .. } => "unreadable".to_string(),
            VoteStatus::InvocationFailed { kind, .. } => format!("failed ({kind})"),
        };
        table.add_row(vec![
            Cell::new(&vote.persona),
            Cell::new(status),
            Cell::new(format!(
                "{}/{}",
                vote.ratings.rows.len(),
                report.catalog.subjects.len()
            )),
            Cell::new(format!("{}ms", vote.latency_ms)),
        ]);
    }
    for persona in report.missing_personas() {
        table.add_row(vec![
            Cell::new(persona),
            Cell::new("cancelled"),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }

    let tally = report.tally();
    eprintln!("\n{table}");
    eprintln!(
        "{} clean, {} unreadable, {} failed, {} cancelled",
        tally.complete, tally.extraction_failed, tally.invocation_failed, tally.missing
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use critic_providers::ProviderConfig;

    fn config_with(providers: &[&str]) -> CriticConfig {
        let mut config = CriticConfig::default();
        for name in providers {
            config.providers.insert(
                name.to_string(),
                ProviderConfig::Ollama {
                    base_url: String::new(),
                },
            );
        }
        config
    }

    #[test]
    fn parse_model_defaults() {
        let config = config_with(&[]);
        assert_eq!(
            parse_model(None, &config),
            ("gemini".to_string(), "gemini-2.5-flash".to_string())
        );
        assert_eq!(
            parse_model(Some("  "), &config),
            ("gemini".to_string(), "gemini-2.5-flash".to_string())
        );
    }

    #[test]
    fn parse_model_with_known_provider() {
        let config = config_with(&["ollama"]);
        assert_eq!(
            parse_model(Some("ollama/llama3.1:70b"), &config),
            ("ollama".to_string(), "llama3.1:70b".to_string())
        );
    }

    #[test]
    fn parse_model_keeps_slash_in_unknown_prefix() {
        let config = config_with(&["ollama"]);
        assert_eq!(
            parse_model(Some("gemini/gemini-2.5-pro"), &config),
            ("gemini".to_string(), "gemini-2.5-pro".to_string())
        );
        assert_eq!(
            parse_model(Some("library/qwen"), &config),
            ("gemini".to_string(), "library/qwen".to_string())
        );
        assert_eq!(
            parse_model(Some("gemini-2.5-pro"), &config),
            ("gemini".to_string(), "gemini-2.5-pro".to_string())
        );
    }
}
