//! Check settings resolved from the environment.
//!
//! Every setting is looked up as `<NAME>_<SETTING>` first, then as the bare
//! global (`TIMEOUT`, `RETRY_COUNT`, ...). A value that is missing, empty,
//! or fails its validation pattern falls through to the next candidate and
//! finally to the hard default.

use std::sync::LazyLock;

use regex::Regex;

static NON_NEGATIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static POSITIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*$").unwrap());
static BOOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(true|false)$").unwrap());

/// Effective settings of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSettings {
    /// Per-attempt timeout in seconds; 0 disables the timeout.
    pub timeout: u64,
    pub retry_count: u32,
    pub retry_wait: u64,
    pub disable: bool,
    pub debug: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            timeout: 0,
            retry_count: 5,
            retry_wait: 5,
            disable: false,
            debug: false,
        }
    }
}

impl CheckSettings {
    /// Resolve the settings for the named check from the environment.
    pub fn for_check(name: &str) -> Self {
        let defaults = Self::default();
        Self {
            timeout: lookup(name, "TIMEOUT", &NON_NEGATIVE_PATTERN)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout),
            retry_count: lookup(name, "RETRY_COUNT", &POSITIVE_PATTERN)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_count),
            retry_wait: lookup(name, "RETRY_WAIT", &POSITIVE_PATTERN)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_wait),
            disable: lookup(name, "DISABLE", &BOOL_PATTERN)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.disable),
            debug: lookup(name, "DEBUG", &BOOL_PATTERN)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug),
        }
    }
}

/// First valid candidate among `<NAME>_<KEY>` and `<KEY>`.
fn lookup(name: &str, key: &str, pattern: &Regex) -> Option<String> {
    [format!("{}_{}", name, key), key.to_string()]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty() && pattern.is_match(value))
}
