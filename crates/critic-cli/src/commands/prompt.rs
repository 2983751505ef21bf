//! The `critic-panel prompt` command.

use std::path::PathBuf;

use anyhow::Result;

use critic_core::prompt::build_prompt;

pub fn execute(catalog_path: Option<PathBuf>, persona_id: String) -> Result<()> {
    let catalog = super::load_catalog(catalog_path.as_deref())?;

    let Some(persona) = catalog.persona(&persona_id) else {
        let known: Vec<&str> = catalog.personas.iter().map(|p| p.id.as_str()).collect();
        anyhow::bail!("unknown persona '{persona_id}'. Available: {known:?}");
    };

    print!("{}", build_prompt(persona, &catalog));
    Ok(())
}
