//! stackup - a compose-style stack runner for the standup deployment
//!
//! stackup holds a declarative topology of named services, resolves startup
//! order across link edges, materializes environment profiles into process
//! environments, and launches declared commands. It also provides the test
//! bootstrap: a fail-fast lint-then-test pipeline run under a fixed,
//! isolated environment profile.
//!
//! - Topology and startup resolution ([`stack`])
//! - Process launching with port/mount preflight ([`launch`])
//! - Lint-then-test bootstrap ([`bootstrap`])

pub mod bootstrap;
pub mod error;
pub mod launch;
pub mod stack;

pub use error::{Result, StackError};
