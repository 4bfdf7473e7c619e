//! Rule definitions file.
//!
//! A missing file means no rules and a file that is not valid TOML stops
//! startup. Each `[[rule]]` entry is decoded on its own: an entry with the
//! wrong shape is logged and skipped while its siblings still load. Semantic
//! checks (schedules, device identities) happen later, one rule at a time, in
//! the trigger registry.

use std::path::Path;

use homebus_domain::rule::RuleDefinition;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<toml::Value>,
}

/// Errors reading the rules file.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Read every `[[rule]]` definition of `path`.
///
/// # Errors
///
/// Returns [`RulesError`] when the file exists but cannot be read or parsed.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<RuleDefinition>, RulesError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "rules file not found, running without rules");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(RulesError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    parse(&content).map_err(|source| RulesError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse(content: &str) -> Result<Vec<RuleDefinition>, toml::de::Error> {
    let file: RulesFile = toml::from_str(content)?;
    let definitions = file
        .rules
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let name = entry
                .get("name")
                .and_then(toml::Value::as_str)
                .unwrap_or_default()
                .to_string();
            match RuleDefinition::deserialize(entry) {
                Ok(definition) => Some(definition),
                Err(err) => {
                    tracing::error!(index, rule = %name, error = %err, "rule rejected");
                    None
                }
            }
        })
        .collect();
    Ok(definitions)
}
