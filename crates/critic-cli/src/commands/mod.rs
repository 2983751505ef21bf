pub mod init;
pub mod prompt;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::Result;
use critic_core::model::RubricCatalog;
use critic_core::parser;

/// Load the catalog at `path`, or the built-in band panel when none is given.
pub fn load_catalog(path: Option<&Path>) -> Result<RubricCatalog> {
    match path {
        Some(p) => parser::parse_catalog(p),
        None => Ok(RubricCatalog::builtin()),
    }
}
