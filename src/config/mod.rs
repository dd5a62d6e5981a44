//! Configuration: document schema, loading, and dynamic value resolution.

pub mod document;
pub mod loader;
pub mod resolve;

pub use document::{Document, DependencySpec, PortValue, ProbeOptions, ProbeSettings, QuorumMode};
pub use loader::{load, ConfigError, DEPENDENCIES_ENV};
pub use resolve::{resolve, ResolveError};
