//! Persona prompt rendering.

use std::fmt::Write;

use crate::extract::SUBJECT_KEY;
use crate::model::{Persona, RubricCatalog};

/// Lowest score on the rubric scale.
pub const MIN_SCORE: i64 = 1;
/// Highest score on the rubric scale.
pub const MAX_SCORE: i64 = 5;

/// Render the instruction text for one persona.
///
/// The output contract asks for a JSON object with `ratings`, `justification`
/// and `ranking`; [`crate::extract::extract_vote`] parses exactly that shape.
pub fn build_prompt(persona: &Persona, catalog: &RubricCatalog) -> String {
    let label = &catalog.subject_label;
    let subject_count = catalog.subjects.len();
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(
        out,
        "You are a {} with the following worldview:\n",
        catalog.persona_role
    );
    let _ = writeln!(out, "{}\n", persona.description);
    if !catalog.instruction.is_empty() {
        let _ = writeln!(out, "{}\n", catalog.instruction);
    }

    let _ = writeln!(
        out,
        "Evaluate each {label} based on the following {} criteria, scoring from {MIN_SCORE} (low) to {MAX_SCORE} (high):\n",
        catalog.criteria.len()
    );
    for criterion in &catalog.criteria {
        let _ = writeln!(out, "{}: {}", criterion.name, criterion.description);
    }

    let _ = writeln!(out, "\nHere are the {label}s to evaluate:");
    for subject in &catalog.subjects {
        let _ = writeln!(out, "- {subject}");
    }

    out.push_str("\nPlease respond ONLY in the following strict JSON format:\n\n");
    out.push_str("{\n  \"ratings\": [\n    {\n");
    let _ = write!(
        out,
        "      \"{SUBJECT_KEY}\": \"the corresponding {label} name here\""
    );
    for criterion in &catalog.criteria {
        let _ = write!(out, ",\n      \"{}\": int", criterion.name);
    }
    out.push_str("\n    },\n    ...\n  ],\n");
    out.push_str("  \"justification\": \"Your paragraph explaining the ratings here.\",\n");
    let _ = writeln!(
        out,
        "  \"ranking\": [\"{label}1\", \"{label}2\", ..., \"{label}{subject_count}\"]\n}}\n"
    );

    let _ = writeln!(
        out,
        "- The ratings list must include all {subject_count} {label}s, using the names exactly as listed."
    );
    let _ = writeln!(
        out,
        "- Every score must be a whole number from {MIN_SCORE} to {MAX_SCORE}."
    );
    let _ = writeln!(
        out,
        "- The ranking list must contain every {label} once, in your personal order from best to worst."
    );
    out.push_str(
        "- Do not include markdown formatting, code blocks, or commentary outside the JSON block.\n",
    );

    out
}
