//! TCP and HTTP probe execution.
//!
//! Both probe kinds run the same attempt loop: check the owning
//! dependency's result cell, apply the one-shot initial delay, execute the
//! reachability test under the per-attempt timeout, and sleep between
//! attempts. The loop bails out the moment the dependency decides, whether
//! it notices via the cell or via the cancel channel.

use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

use crate::config::ProbeSettings;
use crate::runtime::compile::ProbeTarget;
use crate::runtime::quorum::{DependencyState, Outcome};

/// How a failed attempt is logged. Silent failures are expected churn while
/// a target comes up (unreachable host, transient resolution failure);
/// quiet failures are ordinary connect errors and gateway 5xx churn;
/// anything else is loud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Silent,
    Quiet,
    Loud,
}

/// One failed probe attempt.
#[derive(Debug)]
pub struct AttemptError {
    pub message: String,
    pub class: FailureClass,
}

impl AttemptError {
    fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Run one probe to completion, reporting its terminal result to the
/// dependency. The winning report is forwarded to `outcome_tx` for the
/// run-level arbiter.
pub async fn run_probe(
    target: ProbeTarget,
    settings: ProbeSettings,
    dep: Arc<DependencyState>,
    outcome_tx: mpsc::UnboundedSender<(String, Outcome)>,
    client: reqwest::Client,
) {
    let mut cancel = dep.subscribe_cancel();
    let mut errors: Vec<String> = Vec::new();

    for attempt in 1..=settings.attempts {
        if dep.outcome() != Outcome::Unknown {
            return;
        }

        if attempt == 1 && settings.initial_delay > 0 {
            if wait_or_cancelled(settings.initial_delay, &mut cancel).await {
                return;
            }
        }

        let result = tokio::select! {
            r = execute_attempt(&target, &client, settings.timeout) => r,
            _ = cancel.changed() => return,
        };

        match result {
            Ok(()) => {
                log::info!("[{}] {} is reachable", dep.name(), target);
                report(&dep, true, &outcome_tx);
                return;
            }
            Err(err) => {
                match err.class {
                    FailureClass::Loud => log::warn!(
                        "[{}] {} attempt {}/{} failed: {}",
                        dep.name(),
                        target,
                        attempt,
                        settings.attempts,
                        err.message
                    ),
                    _ => log::debug!(
                        "[{}] {} attempt {}/{} failed: {}",
                        dep.name(),
                        target,
                        attempt,
                        settings.attempts,
                        err.message
                    ),
                }
                errors.push(err.message);
            }
        }

        if dep.outcome() != Outcome::Unknown {
            return;
        }
        if attempt != settings.attempts {
            if wait_or_cancelled(settings.delay, &mut cancel).await {
                return;
            }
        }
    }

    log::warn!(
        "[{}] {} failed after {} attempts: {}",
        dep.name(),
        target,
        settings.attempts,
        errors.join("; ")
    );
    report(&dep, false, &outcome_tx);
}

fn report(
    dep: &DependencyState,
    success: bool,
    outcome_tx: &mpsc::UnboundedSender<(String, Outcome)>,
) {
    if let Some(outcome) = dep.report(success) {
        log::info!("[{}] dependency {}", dep.name(), outcome);
        let _ = outcome_tx.send((dep.name().to_string(), outcome));
    }
}

/// Sleep for `secs`, returning true when cancelled first.
async fn wait_or_cancelled(secs: u64, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_secs(secs)) => false,
        _ = cancel.changed() => true,
    }
}

async fn execute_attempt(
    target: &ProbeTarget,
    client: &reqwest::Client,
    timeout_secs: u64,
) -> Result<(), AttemptError> {
    match target {
        ProbeTarget::Tcp { host, port } => tcp_attempt(host, *port, timeout_secs).await,
        ProbeTarget::Http { url } => http_attempt(client, url, timeout_secs).await,
    }
}

/// TCP reachability: resolve to an IPv4 address and connect. The stream is
/// dropped (closed) as soon as the connect returns.
async fn tcp_attempt(host: &str, port: u16, timeout_secs: u64) -> Result<(), AttemptError> {
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| {
            AttemptError::new(
                classify_resolve_error(&e),
                format!("cannot resolve '{}': {}", host, e),
            )
        })?
        .collect();
    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            AttemptError::new(FailureClass::Silent, format!("no addresses for '{}'", host))
        })?;

    match timeout(Duration::from_secs(timeout_secs), TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(AttemptError::new(
            classify_io_error(&e),
            format!("connect {}: {}", addr, e),
        )),
        Err(_) => Err(AttemptError::new(
            FailureClass::Quiet,
            format!("connect {}: timed out after {}s", addr, timeout_secs),
        )),
    }
}

/// HTTP reachability: GET the URL; any status below 400 passes, provided
/// the body arrives intact. The per-attempt timeout spans the whole
/// exchange, body included.
async fn http_attempt(
    client: &reqwest::Client,
    url: &url::Url,
    timeout_secs: u64,
) -> Result<(), AttemptError> {
    let response = client
        .get(url.clone())
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| AttemptError::new(classify_http_error(&e), format!("GET {}: {}", url, e)))?;

    let status = response.status();
    if status.as_u16() >= 400 {
        // Gateway churn while the backend comes up is expected; everything
        // else deserves attention.
        let class = match status.as_u16() {
            502 | 503 | 504 => FailureClass::Quiet,
            _ => FailureClass::Loud,
        };
        return Err(AttemptError::new(
            class,
            format!("GET {}: status {}", url, status),
        ));
    }

    // Drain the body within the attempt's scope; a response that dies
    // mid-body is a failed attempt, not a success.
    match response.bytes().await {
        Ok(_) => Ok(()),
        Err(e) => Err(AttemptError::new(
            classify_http_error(&e),
            format!("GET {}: {}", url, e),
        )),
    }
}

/// Connection-level failures (broken pipe, aborted, refused, reset,
/// timeout) are quiet whichever phase they strike in: connecting, writing
/// the request, or reading the body. Protocol-level surprises stay loud.
fn classify_http_error(err: &reqwest::Error) -> FailureClass {
    if err.is_timeout() || err.is_connect() || err.is_body() || err.is_decode() {
        return FailureClass::Quiet;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match classify_io_error(io) {
                FailureClass::Loud => FailureClass::Loud,
                _ => FailureClass::Quiet,
            };
        }
        source = cause.source();
    }
    FailureClass::Loud
}

/// Resolution failures are silent only for the transient getaddrinfo
/// classes (EAI_AGAIN, EAI_NODATA); a name the resolver definitively
/// rejects is worth a look.
fn classify_resolve_error(err: &std::io::Error) -> FailureClass {
    if let Some(errno) = err.raw_os_error().map(Errno::from_raw) {
        return match errno {
            Errno::EAGAIN => FailureClass::Silent,
            _ => FailureClass::Loud,
        };
    }
    // getaddrinfo failures carry no errno; the gai_strerror text is the
    // only portable discriminator.
    let message = err.to_string();
    if message.contains("Temporary failure in name resolution")
        || message.contains("No address associated with hostname")
    {
        FailureClass::Silent
    } else {
        FailureClass::Loud
    }
}

fn classify_io_error(err: &std::io::Error) -> FailureClass {
    if let Some(errno) = err.raw_os_error().map(Errno::from_raw) {
        if matches!(errno, Errno::EHOSTUNREACH | Errno::EHOSTDOWN) {
            return FailureClass::Silent;
        }
    }
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::TimedOut => FailureClass::Quiet,
        _ => FailureClass::Loud,
    }
}
