//! The `critic-panel validate` command.

use std::path::PathBuf;

use anyhow::Result;

use critic_core::parser::validate_catalog;

pub fn execute(catalog_path: Option<PathBuf>) -> Result<()> {
    let catalog = super::load_catalog(catalog_path.as_deref())?;

    let source = catalog_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in".to_string());
    println!(
        "Catalog: {source} ({} subjects, {} criteria, {} personas)",
        catalog.subjects.len(),
        catalog.criteria.len(),
        catalog.personas.len()
    );

    let warnings = validate_catalog(&catalog);
    for w in &warnings {
        let prefix = w
            .subject
            .as_ref()
            .map(|s| format!("  [{s}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
