//! Panel report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::RunPhase;
use crate::model::RubricCatalog;
use crate::votes::{VoteCollection, VoteStatus};

/// The outcome of one panel run, as handed to downstream aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelReport {
    /// Unique run identifier.
    pub id: Uuid,
    /// When the run finished.
    pub created_at: DateTime<Utc>,
    /// What was evaluated.
    pub catalog: CatalogSummary,
    /// Provider that served the run.
    pub provider: String,
    /// Model requested from the provider.
    pub model: String,
    /// Terminal phase: `complete` or `cancelled`.
    pub phase: RunPhase,
    /// One vote per persona, in catalog order.
    pub votes: VoteCollection,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of the catalog a report was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub subject_label: String,
    pub subjects: Vec<String>,
    pub criteria: Vec<String>,
    pub personas: Vec<String>,
}

impl From<&RubricCatalog> for CatalogSummary {
    fn from(catalog: &RubricCatalog) -> Self {
        Self {
            subject_label: catalog.subject_label.clone(),
            subjects: catalog.subjects.clone(),
            criteria: catalog.criterion_names().map(String::from).collect(),
            personas: catalog.personas.iter().map(|p| p.id.clone()).collect(),
        }
    }
}

/// Vote counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub complete: usize,
    pub extraction_failed: usize,
    pub invocation_failed: usize,
    /// Personas with no vote at all (only after cancellation).
    pub missing: usize,
}

impl PanelReport {
    /// Count votes by outcome.
    pub fn tally(&self) -> VoteTally {
        let mut tally = VoteTally::default();
        for vote in &self.votes {
            match vote.status {
                VoteStatus::Complete => tally.complete += 1,
                VoteStatus::ExtractionFailed { .. } => tally.extraction_failed += 1,
                VoteStatus::InvocationFailed { .. } => tally.invocation_failed += 1,
            }
        }
        tally.missing = self.missing_personas().len();
        tally
    }

    /// Personas from the catalog that contributed no vote.
    pub fn missing_personas(&self) -> Vec<&str> {
        self.catalog
            .personas
            .iter()
            .filter(|p| self.votes.get(p).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: PanelReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::extract::VotePayload;
    use crate::votes::Vote;

    fn report() -> PanelReport {
        let catalog = RubricCatalog::builtin();
        let mut votes = VoteCollection::new();
        votes
            .insert(Vote::from_payload("metalhead", 0, VotePayload::default(), None))
            .unwrap();
        votes
            .insert(Vote::from_payload(
                "popstar",
                1,
                VotePayload::default(),
                Some(ExtractionError::NoJsonObject),
            ))
            .unwrap();

        PanelReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            catalog: CatalogSummary::from(&catalog),
            provider: "mock".into(),
            model: "mock-model".into(),
            phase: RunPhase::Cancelled,
            votes,
            duration_ms: 42,
        }
    }

    #[test]
    fn tally_counts_outcomes_and_missing_personas() {
        let report = report();
        let tally = report.tally();
        assert_eq!(tally.complete, 1);
        assert_eq!(tally.extraction_failed, 1);
        assert_eq!(tally.invocation_failed, 0);
        assert_eq!(tally.missing, 3);
        assert_eq!(report.missing_personas(), vec!["boomer", "genz", "indie"]);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = report();
        report.save_json(&path).unwrap();

        let loaded = PanelReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.phase, RunPhase::Cancelled);
        assert_eq!(loaded.votes, report.votes);
        assert_eq!(loaded.catalog.criteria.len(), 6);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = PanelReport::load_json(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read report"));
    }
}
