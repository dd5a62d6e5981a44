//! Configuration document schema definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

/// Root configuration document.
///
/// ```yaml
/// mode: all
/// template:
///   timeout: 10
/// dependencies:
///   db:
///     ports: [5432]
///   api:
///     http: "http://api.internal:8080/health"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// When false, the run exits success without probing anything.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Quorum mode across dependencies.
    #[serde(default)]
    pub mode: QuorumMode,

    /// Probe option defaults merged into every dependency.
    #[serde(default)]
    pub template: ProbeOptions,

    /// Dependency definitions, keyed by dependency name.
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencySpec>,
}

fn default_enabled() -> bool {
    true
}

/// Quorum mode, used both across dependencies and across the probes of a
/// single dependency. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuorumMode {
    /// Every member must succeed.
    #[default]
    All,
    /// The first success decides.
    Any,
}

impl std::str::FromStr for QuorumMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(QuorumMode::All)
        } else if s.eq_ignore_ascii_case("any") {
            Ok(QuorumMode::Any)
        } else {
            Err(format!("invalid mode '{}', expected 'all' or 'any'", s))
        }
    }
}

impl std::fmt::Display for QuorumMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumMode::All => write!(f, "all"),
            QuorumMode::Any => write!(f, "any"),
        }
    }
}

impl<'de> Deserialize<'de> for QuorumMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-dependency probe options as written in the document. All fields are
/// optional; [`ProbeOptions::merged_with`] applies the template and the hard
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeOptions {
    /// Quorum mode across the probes of one dependency.
    #[serde(default)]
    pub mode: Option<QuorumMode>,

    /// Seconds to wait before the first probe attempt.
    #[serde(default, rename = "initialDelay")]
    pub initial_delay: Option<i64>,

    /// Seconds between attempts.
    #[serde(default)]
    pub delay: Option<i64>,

    /// Per-attempt timeout in seconds.
    #[serde(default)]
    pub timeout: Option<i64>,

    /// Attempts per probe.
    #[serde(default)]
    pub attempts: Option<i64>,
}

/// Effective probe settings after merging, with out-of-range values clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub mode: QuorumMode,
    pub initial_delay: u64,
    pub delay: u64,
    pub timeout: u64,
    pub attempts: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            mode: QuorumMode::All,
            initial_delay: 0,
            delay: 5,
            timeout: 15,
            attempts: 3,
        }
    }
}

impl ProbeOptions {
    /// Merge these options over `template`, falling back to the hard
    /// defaults for anything neither sets. Merging is idempotent.
    pub fn merged_with(&self, template: &ProbeOptions) -> ProbeSettings {
        let defaults = ProbeSettings::default();
        ProbeSettings {
            mode: self.mode.or(template.mode).unwrap_or(defaults.mode),
            initial_delay: clamp_min(
                self.initial_delay.or(template.initial_delay),
                defaults.initial_delay as i64,
                0,
            ),
            delay: clamp_min(self.delay.or(template.delay), defaults.delay as i64, 1),
            timeout: clamp_min(self.timeout.or(template.timeout), defaults.timeout as i64, 1),
            attempts: clamp_min(self.attempts.or(template.attempts), defaults.attempts as i64, 1)
                as u32,
        }
    }
}

fn clamp_min(value: Option<i64>, default: i64, min: i64) -> u64 {
    value.unwrap_or(default).max(min) as u64
}

/// One dependency definition: probe options plus exactly one target form
/// (`url`, `http`, or `host` + `port`/`ports`).
#[derive(Debug, Clone, Deserialize)]
pub struct DependencySpec {
    /// TCP probe against the host and port of an arbitrary-scheme URL.
    #[serde(default)]
    pub url: Option<String>,

    /// HTTP probe against a full `http://` or `https://` URL.
    #[serde(default)]
    pub http: Option<String>,

    /// TCP probe host; defaults to the dependency name when no target form
    /// is given.
    #[serde(default)]
    pub host: Option<String>,

    /// Single port, numeric or an `/etc/services` name. Superseded by
    /// `ports`.
    #[serde(default)]
    pub port: Option<PortValue>,

    /// Port list, numeric or `/etc/services` names.
    #[serde(default)]
    pub ports: Option<Vec<PortValue>>,

    /// Probe option overrides for this dependency.
    #[serde(flatten)]
    pub options: ProbeOptions,
}

/// A port entry: a decimal number or a service name to look up.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Name(String),
}
