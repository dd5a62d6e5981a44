//! Document loading from file, stdin, or the environment.

use std::io::Read;
use std::path::Path;

use crate::config::document::Document;

/// Environment variable consulted when no file argument is given. Its value
/// is a file path when it names an existing regular file, otherwise it is
/// taken as the document text itself.
pub const DEPENDENCIES_ENV: &str = "INIT_DEPENDENCIES";

/// Errors raised while locating or decoding the document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("no configuration: pass a file argument or set {DEPENDENCIES_ENV}")]
    NoSource,

    #[error("cannot parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load the document named by the CLI argument, or fall back to
/// `INIT_DEPENDENCIES`. `-` means standard input.
pub fn load(arg: Option<&str>) -> Result<Document, ConfigError> {
    match arg {
        Some("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(ConfigError::Stdin)?;
            parse(&text, "stdin")
        }
        Some(path) => load_file(path),
        None => {
            let value =
                std::env::var(DEPENDENCIES_ENV).map_err(|_| ConfigError::NoSource)?;
            if Path::new(&value).is_file() {
                load_file(&value)
            } else {
                // Inline document text: decode it but keep it out of the logs.
                log::debug!("loading inline document from {}", DEPENDENCIES_ENV);
                parse(&value, DEPENDENCIES_ENV)
            }
        }
    }
}

fn load_file(path: &str) -> Result<Document, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string(),
        source: e,
    })?;
    log::debug!("loaded {} ({} bytes)", path, text.len());
    parse(&text, path)
}

/// Decode the document text: YAML first, then strict JSON when YAML fails or
/// yields a null document. The YAML diagnostic wins when both fail.
pub fn parse(text: &str, origin: &str) -> Result<Document, ConfigError> {
    let yaml_err = match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(serde_yaml::Value::Null) => None,
        Ok(value) => match serde_yaml::from_value::<Document>(value) {
            Ok(doc) => return Ok(doc),
            Err(e) => Some(e),
        },
        Err(e) => Some(e),
    };

    match serde_json::from_str::<Document>(text) {
        Ok(doc) => Ok(doc),
        Err(json_err) => Err(ConfigError::Parse {
            origin: origin.to_string(),
            source: yaml_err.unwrap_or_else(|| serde::de::Error::custom(json_err)),
        }),
    }
}
