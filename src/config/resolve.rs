//! Dynamic value resolution for configuration strings.
//!
//! Dependency fields (`url`, `http`, `host`, port entries) accept three
//! source forms:
//! - `@env:NAME` is replaced with the value of the environment variable
//! - `@file:PATH` is replaced with the trimmed contents of the file
//! - anything else is taken literally, with `$VAR` / `${VAR}` references
//!   expanded from the environment
//!
//! Env and file sources are logged by reference only, so secrets routed
//! through them never end up in the log stream.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Regex for `${VAR}` and `$VAR` references in literal values.
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

const ENV_PREFIX: &str = "@env:";
const FILE_PREFIX: &str = "@file:";

/// Errors raised while resolving a configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{label}: environment variable '{name}' is not set")]
    MissingEnv { label: String, name: String },

    #[error("{label}: cannot read '{path}': {source}")]
    UnreadableFile {
        label: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve a single configuration value.
///
/// `label` identifies the value in diagnostics and logs, e.g. `"db.host"`.
/// Empty strings pass through untouched.
pub fn resolve(value: &str, label: &str) -> Result<String, ResolveError> {
    if value.is_empty() {
        return Ok(value.to_string());
    }

    if let Some(name) = value.strip_prefix(ENV_PREFIX) {
        let resolved = std::env::var(name).map_err(|_| ResolveError::MissingEnv {
            label: label.to_string(),
            name: name.to_string(),
        })?;
        log::debug!("{}: resolved from @env:{}", label, name);
        return Ok(resolved);
    }

    if let Some(path) = value.strip_prefix(FILE_PREFIX) {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ResolveError::UnreadableFile {
                label: label.to_string(),
                path: path.to_string(),
                source: e,
            })?;
        log::debug!("{}: resolved from @file:{}", label, path);
        return Ok(contents.trim().to_string());
    }

    let expanded = expand_vars(value);
    if expanded != value {
        log::debug!("{}: '{}' -> '{}'", label, value, expanded);
    }
    Ok(expanded)
}

/// Expand `$VAR` and `${VAR}` references against the process environment.
/// Undefined references are left as written.
fn expand_vars(input: &str) -> String {
    VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
