//! Service launching
//!
//! This module materializes resolved service declarations into running
//! processes and tracks the resulting instances.

pub mod instance;
pub mod launcher;
pub mod store;

pub use instance::{ServiceInstance, ServiceStatus};
pub use launcher::Launcher;
pub use store::StateStore;
