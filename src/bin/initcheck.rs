//! Initcheck - retrying shell-check runner
//!
//! Usage:
//!   initcheck MIGRATIONS SEED_DATA
//!
//! Each argument names an environment variable whose value is a shell
//! script body. Per-check overrides: <NAME>_TIMEOUT, <NAME>_RETRY_COUNT,
//! <NAME>_RETRY_WAIT, <NAME>_DISABLE, <NAME>_DEBUG.

use initwait::cli::{log_filter, CheckArgs};

#[tokio::main]
async fn main() {
    let args: CheckArgs = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(log_filter(&args.log_level));
    env_logger::init_from_env(env);

    if args.checks.is_empty() {
        log::error!("no checks given; pass at least one environment variable name");
        std::process::exit(1);
    }

    if let Err(e) = initwait::run_checks(&args.checks).await {
        log::error!("{}", e);
        std::process::exit(e.exit_status());
    }
}
