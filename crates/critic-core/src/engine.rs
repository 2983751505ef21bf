//! Central panel engine orchestrator.
//!
//! Fans out one evaluation task per persona, all scheduled at once, and fans
//! their votes back into a single [`VoteCollection`]. Tasks are multiplexed
//! on the caller's task; nothing is spawned, so the only concurrency is the
//! interleaving of in-flight model calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::TaskError;
use crate::model::RubricCatalog;
use crate::parser::check_catalog;
use crate::report::{CatalogSummary, PanelReport};
use crate::task::EvaluationTask;
use crate::traits::LlmProvider;
use crate::votes::{Vote, VoteCollection};

/// Configuration for the panel engine.
#[derive(Debug, Clone)]
pub struct PanelEngineConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Max tokens for generation.
    pub max_tokens: u32,
    /// Upper bound on a single model call.
    pub request_timeout: Duration,
    /// Optional system prompt override.
    pub system_prompt_override: Option<String>,
}

impl Default for PanelEngineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            request_timeout: Duration::from_secs(120),
            system_prompt_override: None,
        }
    }
}

/// Lifecycle of a panel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Nothing scheduled yet.
    Start,
    /// Every task is scheduled and at least one is in flight.
    Running,
    /// Every task reached a terminal state.
    Complete,
    /// The run was cancelled; unfinished tasks contributed nothing.
    Cancelled,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_task_start(&self, persona: &str);
    /// Called for every merged vote, marked invocation failures included.
    fn on_vote(&self, vote: &Vote);
    fn on_task_error(&self, persona: &str, error: &TaskError);
    fn on_run_complete(&self, total: usize, voted: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_task_start(&self, _: &str) {}
    fn on_vote(&self, _: &Vote) {}
    fn on_task_error(&self, _: &str, _: &TaskError) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The central panel engine.
pub struct PanelEngine {
    provider: Arc<dyn LlmProvider>,
    config: PanelEngineConfig,
}

impl PanelEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PanelEngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PanelEngineConfig {
        &self.config
    }

    /// Run every persona in the catalog to completion.
    pub async fn run(
        &self,
        catalog: &RubricCatalog,
        progress: &dyn ProgressReporter,
    ) -> Result<PanelReport> {
        let (_never_cancelled, cancel) = watch::channel(false);
        self.run_until(catalog, progress, cancel).await
    }

    /// Run every persona in the catalog until done or until `cancel` flips to
    /// `true`.
    ///
    /// On cancellation in-flight model calls are dropped and only the votes
    /// already merged are reported.
    pub async fn run_until(
        &self,
        catalog: &RubricCatalog,
        progress: &dyn ProgressReporter,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<PanelReport> {
        check_catalog(catalog)?;

        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let mut phase = RunPhase::Start;
        let mut votes = VoteCollection::new();
        let mut voted = 0usize;
        let mut failed = 0usize;

        tracing::info!(
            %run_id,
            ?phase,
            provider = self.provider.name(),
            model = %self.config.model,
            personas = catalog.personas.len(),
            subjects = catalog.subjects.len(),
            "starting panel run"
        );

        if *cancel.borrow() {
            phase = RunPhase::Cancelled;
        } else {
            let task = EvaluationTask::new(self.provider.as_ref(), catalog, &self.config);
            let task = &task;
            let mut pending = FuturesUnordered::new();

            for (ordinal, persona) in catalog.personas.iter().enumerate() {
                progress.on_task_start(&persona.id);
                pending.push(async move { (ordinal, task.run(persona, ordinal).await) });
            }
            phase = RunPhase::Running;
            tracing::debug!(?phase, scheduled = pending.len(), "all tasks scheduled");

            let mut cancel_armed = true;
            loop {
                tokio::select! {
                    biased;

                    next = pending.next() => {
                        let Some((ordinal, outcome)) = next else {
                            phase = RunPhase::Complete;
                            break;
                        };
                        let vote = match outcome {
                            Ok(vote) => {
                                voted += 1;
                                vote
                            }
                            Err(e) => {
                                tracing::error!("{e}");
                                progress.on_task_error(e.persona(), &e);
                                failed += 1;
                                Vote::invocation_failed(ordinal, &e)
                            }
                        };
                        progress.on_vote(&vote);
                        if let Err(e) = votes.insert(vote) {
                            tracing::warn!("{e}");
                        }
                    }

                    changed = cancel.changed(), if cancel_armed => {
                        match changed {
                            Ok(()) if *cancel.borrow() => {
                                tracing::warn!(
                                    abandoned = pending.len(),
                                    "panel run cancelled"
                                );
                                phase = RunPhase::Cancelled;
                                break;
                            }
                            Ok(()) => {}
                            // Sender gone: nobody can cancel any more
                            Err(_) => cancel_armed = false,
                        }
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_run_complete(catalog.personas.len(), voted, failed, elapsed);
        tracing::info!(
            %run_id,
            ?phase,
            votes = votes.len(),
            clean = votes.complete_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "panel run finished"
        );

        Ok(PanelReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            catalog: CatalogSummary::from(catalog),
            provider: self.provider.name().to_string(),
            model: self.config.model.clone(),
            phase,
            votes,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ProviderError;
    use crate::model::{Criterion, Persona};
    use crate::traits::{CompletionRequest, CompletionResponse, TokenUsage};
    use crate::votes::VoteStatus;

    const GOOD: &str =
        r#"{"ratings":[{"item":"A","X":3},{"item":"B","X":5}],"justification":"ok","ranking":["B","A"]}"#;

    /// Replies per persona description, after a per-persona delay.
    struct ByPersona {
        replies: HashMap<&'static str, (Duration, Result<&'static str, &'static str>)>,
    }

    #[async_trait]
    impl LlmProvider for ByPersona {
        fn name(&self) -> &str {
            "by-persona"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
            let (delay, reply) = self
                .replies
                .iter()
                .find(|(needle, _)| request.prompt.contains(*needle))
                .map(|(_, v)| v.clone())
                .unwrap_or((Duration::ZERO, Ok(GOOD)));
            tokio::time::sleep(delay).await;
            match reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: delay.as_millis() as u64,
                }),
                Err(msg) => Err(ProviderError::ApiError {
                    status: 503,
                    message: msg.to_string(),
                }
                .into()),
            }
        }
    }

    fn catalog(personas: &[&str]) -> RubricCatalog {
        RubricCatalog {
            subject_label: "band".into(),
            persona_role: "critic".into(),
            instruction: String::new(),
            subjects: vec!["A".into(), "B".into()],
            criteria: vec![Criterion::new("X", "desc")],
            personas: personas
                .iter()
                .map(|p| Persona::new(*p, format!("persona-{p}")))
                .collect(),
        }
    }

    fn engine(replies: Vec<(&'static str, Duration, Result<&'static str, &'static str>)>) -> PanelEngine {
        let replies = replies
            .into_iter()
            .map(|(needle, delay, reply)| (needle, (delay, reply)))
            .collect();
        PanelEngine::new(Arc::new(ByPersona { replies }), PanelEngineConfig::default())
    }

    #[tokio::test]
    async fn two_personas_two_votes() {
        let engine = engine(vec![]);
        let report = engine.run(&catalog(&["p1", "p2"]), &NoopReporter).await.unwrap();

        assert_eq!(report.phase, RunPhase::Complete);
        assert_eq!(report.votes.len(), 2);
        for (vote, persona) in report.votes.iter().zip(["p1", "p2"]) {
            assert_eq!(vote.persona, persona);
            assert_eq!(vote.ratings.score("A", "X"), Some(3));
            assert_eq!(vote.ratings.score("B", "X"), Some(5));
            assert_eq!(vote.justification, "ok");
        }
    }

    #[tokio::test]
    async fn unparseable_reply_only_degrades_its_own_vote() {
        let engine = engine(vec![("persona-p1", Duration::ZERO, Ok("not json at all"))]);
        let report = engine.run(&catalog(&["p1", "p2"]), &NoopReporter).await.unwrap();

        assert_eq!(report.votes.len(), 2);
        let p1 = report.votes.get("p1").unwrap();
        assert!(p1.ratings.is_empty());
        assert!(p1.justification.is_empty());
        assert!(matches!(p1.status, VoteStatus::ExtractionFailed { .. }));

        let p2 = report.votes.get("p2").unwrap();
        assert!(p2.is_complete());
        assert_eq!(p2.justification, "ok");
    }

    #[tokio::test]
    async fn invocation_failure_is_a_marked_vote() {
        let engine = engine(vec![("persona-p2", Duration::ZERO, Err("overloaded"))]);
        let report = engine
            .run(&catalog(&["p1", "p2", "p3"]), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.votes.len(), 3);
        let p2 = report.votes.get("p2").unwrap();
        assert!(matches!(
            &p2.status,
            VoteStatus::InvocationFailed { kind, .. } if kind == "api"
        ));
        assert_eq!(report.votes.complete_count(), 2);
    }

    #[derive(Default)]
    struct Recording {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recording {
        fn on_task_start(&self, _: &str) {}
        fn on_vote(&self, vote: &Vote) {
            let state = match &vote.status {
                VoteStatus::Complete => "complete",
                VoteStatus::ExtractionFailed { .. } => "unreadable",
                VoteStatus::InvocationFailed { .. } => "failed",
            };
            self.events
                .lock()
                .unwrap()
                .push(format!("vote {} {state}", vote.persona));
        }
        fn on_task_error(&self, persona: &str, _: &TaskError) {
            self.events.lock().unwrap().push(format!("error {persona}"));
        }
        fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
    }

    #[tokio::test]
    async fn reporter_sees_marked_votes() {
        let engine = engine(vec![("persona-p2", Duration::ZERO, Err("overloaded"))]);
        let reporter = Recording::default();
        engine
            .run(&catalog(&["p1", "p2"]), &reporter)
            .await
            .unwrap();

        let mut events = reporter.events.into_inner().unwrap();
        events.sort();
        assert_eq!(
            events,
            vec!["error p2", "vote p1 complete", "vote p2 failed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn merge_order_ignores_completion_order() {
        let personas = ["p1", "p2", "p3"];
        let slow_first = engine(vec![
            ("persona-p1", Duration::from_secs(3), Ok(GOOD)),
            ("persona-p2", Duration::from_secs(2), Ok(GOOD)),
            ("persona-p3", Duration::from_secs(1), Ok(GOOD)),
        ]);
        let fast_first = engine(vec![
            ("persona-p1", Duration::from_secs(1), Ok(GOOD)),
            ("persona-p2", Duration::from_secs(2), Ok(GOOD)),
            ("persona-p3", Duration::from_secs(3), Ok(GOOD)),
        ]);

        let a = slow_first.run(&catalog(&personas), &NoopReporter).await.unwrap();
        let b = fast_first.run(&catalog(&personas), &NoopReporter).await.unwrap();

        let order = |r: &PanelReport| r.votes.iter().map(|v| v.persona.clone()).collect::<Vec<_>>();
        assert_eq!(order(&a), personas);
        assert_eq!(order(&a), order(&b));
        let payloads = |r: &PanelReport| {
            r.votes
                .iter()
                .map(|v| (v.ratings.clone(), v.justification.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(payloads(&a), payloads(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_run_concurrently() {
        let engine = engine(vec![
            ("persona-p1", Duration::from_secs(10), Ok(GOOD)),
            ("persona-p2", Duration::from_secs(10), Ok(GOOD)),
            ("persona-p3", Duration::from_secs(10), Ok(GOOD)),
        ]);
        let started = tokio::time::Instant::now();
        let report = engine
            .run(&catalog(&["p1", "p2", "p3"]), &NoopReporter)
            .await
            .unwrap();
        assert_eq!(report.votes.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_without_blocking_siblings() {
        let mut engine = engine(vec![("persona-p1", Duration::from_secs(600), Ok(GOOD))]);
        engine.config.request_timeout = Duration::from_secs(30);

        let report = engine.run(&catalog(&["p1", "p2"]), &NoopReporter).await.unwrap();
        assert_eq!(report.phase, RunPhase::Complete);
        assert!(matches!(
            &report.votes.get("p1").unwrap().status,
            VoteStatus::InvocationFailed { kind, .. } if kind == "timeout"
        ));
        assert!(report.votes.get("p2").unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_unfinished_tasks() {
        let engine = engine(vec![
            ("persona-p1", Duration::from_secs(1), Ok(GOOD)),
            ("persona-p2", Duration::from_secs(60), Ok(GOOD)),
        ]);
        let catalog = catalog(&["p1", "p2"]);
        let (tx, rx) = watch::channel(false);

        let run = engine.run_until(&catalog, &NoopReporter, rx);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(run, cancel);
        let report = report.unwrap();

        assert_eq!(report.phase, RunPhase::Cancelled);
        assert_eq!(report.votes.len(), 1);
        assert!(report.votes.get("p1").is_some());
        assert!(report.votes.get("p2").is_none());
    }

    #[tokio::test]
    async fn already_cancelled_run_schedules_nothing() {
        let engine = engine(vec![]);
        let (_tx, rx) = watch::channel(true);
        let report = engine
            .run_until(&catalog(&["p1"]), &NoopReporter, rx)
            .await
            .unwrap();
        assert_eq!(report.phase, RunPhase::Cancelled);
        assert!(report.votes.is_empty());
    }

    #[tokio::test]
    async fn invalid_catalog_is_rejected() {
        let engine = engine(vec![]);
        let err = engine.run(&catalog(&[]), &NoopReporter).await.unwrap_err();
        assert!(err.to_string().contains("no personas"));
    }
}
