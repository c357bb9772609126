//! Service topology
//!
//! This module holds the declarative side of stackup: environment profiles,
//! service declarations, the topology with its link-aware startup resolver,
//! and the stack file loader.

pub mod file;
pub mod profile;
pub mod service;
pub mod topology;

pub use file::{StackParser, DEFAULT_STACK_FILES};
pub use profile::EnvProfile;
pub use service::{PortMapping, ServiceKind, ServiceSpec, VolumeMount};
pub use topology::{Resolution, Topology};
