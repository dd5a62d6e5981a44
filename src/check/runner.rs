//! Retrying execution of shell-script checks.
//!
//! Each check is the body of a shell script carried in an environment
//! variable. The body runs in a fresh subshell under the configured
//! timeout; a timed-out attempt is killed hard and accounted as status 124,
//! which is retried like any other failure. Checks run sequentially and the
//! first one to exhaust its retry budget stops the run.

use std::process::ExitStatus;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::{sleep, timeout};

use crate::check::settings::CheckSettings;

/// Exit status a timed-out attempt is accounted as.
pub const EXIT_TIMEOUT: i32 = 124;

/// Check names must be plausible environment variable names.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9_]*$").unwrap());

/// Errors terminating a runner invocation.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("invalid check name '{0}'")]
    InvalidName(String),

    #[error("check '{0}' names an undefined environment variable")]
    Undefined(String),

    #[error("check '{name}' failed with status {status}")]
    Failed { name: String, status: i32 },
}

impl CheckError {
    /// The process exit status this error maps to: usage and configuration
    /// errors exit 1, a failed check propagates its own status.
    pub fn exit_status(&self) -> i32 {
        match self {
            CheckError::InvalidName(_) | CheckError::Undefined(_) => 1,
            CheckError::Failed { status, .. } => *status,
        }
    }
}

/// Run every named check in order, stopping at the first failure.
pub async fn run_checks(names: &[String]) -> Result<(), CheckError> {
    for name in names {
        run_check(name).await?;
    }
    Ok(())
}

/// Run a single named check under its resolved settings.
pub async fn run_check(name: &str) -> Result<(), CheckError> {
    if !NAME_PATTERN.is_match(name) {
        return Err(CheckError::InvalidName(name.to_string()));
    }
    let body =
        std::env::var(name).map_err(|_| CheckError::Undefined(name.to_string()))?;

    let settings = CheckSettings::for_check(name);
    if settings.disable {
        log::info!("[{}] disabled, skipping", name);
        return Ok(());
    }

    let mut last_status = 1;
    for attempt in 1..=settings.retry_count {
        if attempt > 1 {
            sleep(Duration::from_secs(settings.retry_wait)).await;
        }

        let status = match run_attempt(&body, &settings).await {
            Ok(status) => status,
            Err(e) => {
                log::error!("[{}] cannot spawn shell: {}", name, e);
                last_status = 1;
                continue;
            }
        };

        match status {
            0 => {
                log::info!("[{}] passed (attempt {}/{})", name, attempt, settings.retry_count);
                return Ok(());
            }
            EXIT_TIMEOUT => {
                log::warn!(
                    "[{}] timed out after {}s (attempt {}/{})",
                    name,
                    settings.timeout,
                    attempt,
                    settings.retry_count
                );
            }
            status => {
                log::warn!(
                    "[{}] failed with status {} (attempt {}/{})",
                    name,
                    status,
                    attempt,
                    settings.retry_count
                );
            }
        }
        last_status = status;
    }

    Err(CheckError::Failed {
        name: name.to_string(),
        status: last_status,
    })
}

/// One attempt: the body in a fresh subshell, killed on timeout expiry.
async fn run_attempt(body: &str, settings: &CheckSettings) -> std::io::Result<i32> {
    let mut command = Command::new("sh");
    command.arg(if settings.debug { "-xc" } else { "-c" }).arg(body);

    let mut child = command.spawn()?;

    if settings.timeout == 0 {
        return Ok(exit_code(child.wait().await?));
    }

    match timeout(Duration::from_secs(settings.timeout), child.wait()).await {
        Ok(status) => Ok(exit_code(status?)),
        Err(_) => {
            kill_hard(&child);
            let _ = child.wait().await;
            Ok(EXIT_TIMEOUT)
        }
    }
}

fn kill_hard(child: &tokio::process::Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
