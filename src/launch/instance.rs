//! Launched service instances

use crate::stack::ServiceSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Instance is created but not running
    Created,
    /// Instance is running
    Running,
    /// Instance was stopped by the operator
    Stopped,
    /// Instance's process exited on its own
    Exited,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Created => write!(f, "created"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Exited => write!(f, "exited"),
        }
    }
}

/// One materialized service: the declaration snapshot plus runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Short unique instance ID
    pub id: String,
    /// The declaration this instance was launched from
    pub spec: ServiceSpec,
    /// Current status
    pub status: ServiceStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// Exit time
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit code, if the process has exited
    pub exit_code: Option<i32>,
    /// Process ID, if a command was spawned
    pub pid: Option<u32>,
}

impl ServiceInstance {
    /// Create a new instance record for a declaration
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string().replace('-', "")[..12].to_string(),
            spec,
            status: ServiceStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            pid: None,
        }
    }

    /// Service name this instance belongs to
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Whether the instance is running
    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }

    /// Mark the instance as running
    pub fn mark_started(&mut self, pid: Option<u32>) {
        self.status = ServiceStatus::Running;
        self.started_at = Some(Utc::now());
        self.pid = pid;
    }

    /// Mark the instance as exited with the given code
    pub fn mark_exited(&mut self, code: i32) {
        self.status = ServiceStatus::Exited;
        self.finished_at = Some(Utc::now());
        self.exit_code = Some(code);
    }

    /// Mark the instance as stopped by the operator
    pub fn mark_stopped(&mut self) {
        self.status = ServiceStatus::Stopped;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_is_created_with_short_id() {
        let instance = ServiceInstance::new(ServiceSpec::new("db", "postgres:9.4"));
        assert_eq!(instance.status, ServiceStatus::Created);
        assert_eq!(instance.id.len(), 12);
        assert_eq!(instance.name(), "db");
        assert!(instance.pid.is_none());
    }

    #[test]
    fn lifecycle_marks_update_timestamps() {
        let mut instance = ServiceInstance::new(ServiceSpec::new("db", "postgres:9.4"));

        instance.mark_started(Some(42));
        assert!(instance.is_running());
        assert!(instance.started_at.is_some());
        assert_eq!(instance.pid, Some(42));

        instance.mark_exited(0);
        assert_eq!(instance.status, ServiceStatus::Exited);
        assert_eq!(instance.exit_code, Some(0));
        assert!(instance.finished_at.is_some());
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ServiceStatus::Running.to_string(), "running");
        assert_eq!(ServiceStatus::Stopped.to_string(), "stopped");
    }
}
