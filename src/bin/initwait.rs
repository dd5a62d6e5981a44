//! Initwait - dependency waiter
//!
//! Usage:
//!   initwait deps.yaml
//!   initwait -                 # read the document from stdin
//!   initwait                   # read INIT_DEPENDENCIES (path or inline)
//!   initwait deps.yaml --dry-run

use initwait::cli::{log_filter, WaitArgs};
use initwait::{Executor, EXIT_FAILED, EXIT_READY};

#[tokio::main]
async fn main() {
    let args: WaitArgs = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(log_filter(&args.log_level));
    env_logger::init_from_env(env);

    let doc = match initwait::load(args.config.as_deref()) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(EXIT_FAILED);
        }
    };

    if !doc.enabled {
        log::info!("dependency waiting is disabled");
        std::process::exit(EXIT_READY);
    }

    let executor = match Executor::new(&doc) {
        Ok(executor) => executor,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(EXIT_FAILED);
        }
    };

    if args.validate {
        let probes: usize = executor.dependencies().iter().map(|d| d.probes.len()).sum();
        println!(
            "configuration is valid: {} dependencies, {} probes",
            executor.dependencies().len(),
            probes
        );
        return;
    }

    if args.dry_run {
        print!("{}", executor.plan());
        return;
    }

    executor.preflight().await;
    std::process::exit(executor.run().await);
}
