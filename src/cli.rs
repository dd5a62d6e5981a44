//! Command-line interfaces for the two binaries.

use argh::FromArgs;

/// Wait for declared network dependencies to become reachable
#[derive(FromArgs, Debug)]
pub struct WaitArgs {
    /// configuration file, '-' for stdin (default: read INIT_DEPENDENCIES)
    #[argh(positional)]
    pub config: Option<String>,

    /// compile the configuration and print the probe plan without probing
    #[argh(switch)]
    pub dry_run: bool,

    /// validate the configuration and exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Run retrying shell checks from environment variables
#[derive(FromArgs, Debug)]
pub struct CheckArgs {
    /// names of environment variables holding check script bodies
    #[argh(positional)]
    pub checks: Vec<String>,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Map a `--log-level` value onto an env_logger filter, defaulting unknown
/// values to `info`.
pub fn log_filter(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_known_levels() {
        assert_eq!(log_filter("DEBUG"), "debug");
        assert_eq!(log_filter("warn"), "warn");
    }

    #[test]
    fn test_log_filter_unknown_defaults_to_info() {
        assert_eq!(log_filter("verbose"), "info");
    }
}
