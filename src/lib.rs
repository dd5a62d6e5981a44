//! Initwait - readiness barrier for containerized workloads
//!
//! # Overview
//!
//! Two cooperating binaries built from this library:
//! - `initwait` blocks until a declared set of network dependencies is
//!   reachable, probing TCP ports and HTTP endpoints concurrently with
//!   two-level quorum semantics, then exits 0 (or 1 when the retry budget
//!   runs out).
//! - `initcheck` runs named shell checks (script bodies carried in
//!   environment variables) with per-check timeout and retry overrides.
//!
//! # Example Configuration
//!
//! ```yaml
//! mode: all
//! template:
//!   timeout: 10
//!   attempts: 5
//!
//! dependencies:
//!   db:
//!     host: "@env:DB_HOST"
//!     ports: [5432]
//!
//!   api:
//!     http: "http://api.internal:8080/health"
//!
//!   cluster:
//!     mode: any
//!     ports: [9200, 9300]
//! ```

pub mod check;
pub mod cli;
pub mod config;
pub mod runtime;

pub use check::{run_checks, CheckError, CheckSettings};
pub use config::{load, ConfigError, Document, QuorumMode};
pub use runtime::{CompileError, Executor, Outcome, EXIT_FAILED, EXIT_READY};
