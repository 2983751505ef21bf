//! TOML rubric catalog parser.
//!
//! Loads catalogs from TOML files, enforces their structural invariants, and
//! reports softer issues as warnings.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::extract::SUBJECT_KEY;
use crate::model::{Criterion, Persona, RubricCatalog};

/// Intermediate TOML structure for parsing catalog files.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    catalog: TomlCatalogHeader,
    #[serde(default)]
    criteria: Vec<TomlCriterion>,
    #[serde(default)]
    personas: Vec<TomlPersona>,
}

#[derive(Debug, Deserialize)]
struct TomlCatalogHeader {
    #[serde(default = "default_subject_label")]
    subject_label: String,
    #[serde(default = "default_persona_role")]
    persona_role: String,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    subjects: Vec<String>,
}

fn default_subject_label() -> String {
    "item".to_string()
}

fn default_persona_role() -> String {
    "critic".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlCriterion {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlPersona {
    id: String,
    description: String,
}

/// Parse a single TOML file into a `RubricCatalog`.
pub fn parse_catalog(path: &Path) -> Result<RubricCatalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a TOML string into a `RubricCatalog` (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<RubricCatalog> {
    let parsed: TomlCatalogFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let catalog = RubricCatalog {
        subject_label: parsed.catalog.subject_label.trim().to_string(),
        persona_role: parsed.catalog.persona_role.trim().to_string(),
        instruction: parsed.catalog.instruction.trim().to_string(),
        subjects: parsed
            .catalog
            .subjects
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect(),
        criteria: parsed
            .criteria
            .into_iter()
            .map(|c| Criterion::new(c.name.trim(), c.description.trim()))
            .collect(),
        personas: parsed
            .personas
            .into_iter()
            .map(|p| Persona::new(p.id.trim(), p.description.trim()))
            .collect(),
    };

    check_catalog(&catalog)
        .with_context(|| format!("invalid catalog: {}", source_path.display()))?;

    Ok(catalog)
}

/// Enforce the invariants every panel run depends on.
///
/// Subjects, criteria and personas must be non-empty and unique, and no
/// criterion may shadow the subject key of the response contract.
pub fn check_catalog(catalog: &RubricCatalog) -> Result<()> {
    anyhow::ensure!(!catalog.subjects.is_empty(), "catalog has no subjects");
    anyhow::ensure!(!catalog.criteria.is_empty(), "catalog has no criteria");
    anyhow::ensure!(!catalog.personas.is_empty(), "catalog has no personas");

    ensure_unique("subject", catalog.subjects.iter().map(String::as_str))?;
    ensure_unique("criterion", catalog.criterion_names())?;
    ensure_unique("persona", catalog.personas.iter().map(|p| p.id.as_str()))?;

    for name in catalog
        .subjects
        .iter()
        .map(String::as_str)
        .chain(catalog.criterion_names())
        .chain(catalog.personas.iter().map(|p| p.id.as_str()))
    {
        anyhow::ensure!(!name.is_empty(), "catalog contains an empty name");
    }

    if let Some(c) = catalog.criteria.iter().find(|c| c.name == SUBJECT_KEY) {
        anyhow::bail!(
            "criterion '{}' collides with the reserved subject key",
            c.name
        );
    }

    Ok(())
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            anyhow::bail!("duplicate {kind}: {name}");
        }
    }
    Ok(())
}

/// A warning from catalog validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The persona, subject or criterion the warning is about (if any).
    pub subject: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a catalog for issues that do not prevent a run.
pub fn validate_catalog(catalog: &RubricCatalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if catalog.instruction.trim().is_empty() {
        warnings.push(ValidationWarning {
            subject: None,
            message: "instruction is empty".into(),
        });
    }

    for criterion in &catalog.criteria {
        if criterion.description.trim().is_empty() {
            warnings.push(ValidationWarning {
                subject: Some(criterion.name.clone()),
                message: "criterion has no description".into(),
            });
        }
    }

    for persona in &catalog.personas {
        if persona.description.trim().is_empty() {
            warnings.push(ValidationWarning {
                subject: Some(persona.id.clone()),
                message: "persona has no description".into(),
            });
        }
    }

    // Response matching folds case, so these would be indistinguishable
    let mut folded = HashSet::new();
    for subject in &catalog.subjects {
        if !folded.insert(subject.to_ascii_lowercase()) {
            warnings.push(ValidationWarning {
                subject: Some(subject.clone()),
                message: "subject differs from another subject only by case".into(),
            });
        }
    }

    for criterion in &catalog.criteria {
        if criterion.name.eq_ignore_ascii_case(&catalog.subject_label) {
            warnings.push(ValidationWarning {
                subject: Some(criterion.name.clone()),
                message: "criterion name matches the subject label".into(),
            });
        }
    }

    warnings
}
