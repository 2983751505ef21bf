//! The `critic-panel init` command.

use std::path::Path;

use anyhow::{Context, Result};

const BAND_CATALOG: &str = include_str!("../../../../catalogs/bands.toml");

pub fn execute() -> Result<()> {
    write_if_absent(Path::new("critic-panel.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("catalogs").context("failed to create catalogs/")?;
    write_if_absent(Path::new("catalogs/bands.toml"), BAND_CATALOG)?;

    println!("\nNext steps:");
    println!("  1. Export GOOGLE_API_KEY (or edit critic-panel.toml)");
    println!("  2. Run: critic-panel validate --catalog catalogs/bands.toml");
    println!("  3. Run: critic-panel run --catalog catalogs/bands.toml");

    Ok(())
}

fn write_if_absent(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# critic-panel configuration

default_provider = "gemini"
default_model = "gemini-2.5-flash"
temperature = 0.7
max_tokens = 8192
request_timeout_secs = 120
output_dir = "./critic-results"
catalog = "catalogs/bands.toml"

[providers.gemini]
type = "gemini"
api_key = "${GOOGLE_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[providers.mock]
type = "mock"
response = "{}"
"#;
