//! Service declarations

use super::profile::EnvProfile;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};

/// How a service is expected to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// A server process that runs until stopped
    LongRunning,
    /// A job that runs to completion and exits (e.g. a test invocation)
    OneShot,
}

/// A host-port to container-port binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortMapping {
    /// Parse short syntax: `"8000:8000"`
    pub fn parse(s: &str) -> Result<Self> {
        let (host, container) = s
            .split_once(':')
            .ok_or_else(|| StackError::InvalidConfig(format!("invalid port mapping: {s}")))?;
        let host_port = host
            .parse()
            .map_err(|_| StackError::InvalidConfig(format!("invalid host port: {host}")))?;
        let container_port = container
            .parse()
            .map_err(|_| StackError::InvalidConfig(format!("invalid container port: {container}")))?;
        Ok(Self {
            host_port,
            container_port,
        })
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host_port, self.container_port)
    }
}

/// A host-path to container-path bind mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Parse short syntax: `"host:container"` or `"host:container:ro"`
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [host, container] => Ok(Self {
                host_path: host.to_string(),
                container_path: container.to_string(),
                read_only: false,
            }),
            [host, container, mode] => Ok(Self {
                host_path: host.to_string(),
                container_path: container.to_string(),
                read_only: *mode == "ro",
            }),
            _ => Err(StackError::InvalidConfig(format!(
                "invalid volume mount: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host_path, self.container_path)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// A named, statically declared unit of deployment.
///
/// Declares which image the service uses, which environment profile it
/// binds, which ports it exposes, which paths it mounts, which services it
/// links to, and which command it runs at startup. An empty command defers
/// to the image's default entrypoint, which is outside this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, unique within a topology
    pub name: String,
    /// Image reference, consumed by name only
    pub image: String,
    /// Host:container port bindings, in declaration order
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Bind mounts, in declaration order
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Linked services, started before this one
    #[serde(default)]
    pub links: Vec<String>,
    /// Environment profile materialized into the process environment
    #[serde(default)]
    pub env: EnvProfile,
    /// Startup command argv; empty means the image default
    #[serde(default)]
    pub command: Vec<String>,
    /// Long-running server or one-shot job
    pub kind: ServiceKind,
}

impl ServiceSpec {
    /// Create a long-running service declaration
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            ports: Vec::new(),
            volumes: Vec::new(),
            links: Vec::new(),
            env: EnvProfile::new(),
            command: Vec::new(),
            kind: ServiceKind::LongRunning,
        }
    }

    /// Add a port binding
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.ports.push(PortMapping {
            host_port,
            container_port,
        });
        self
    }

    /// Add a read-write bind mount
    pub fn volume(mut self, host_path: &str, container_path: &str) -> Self {
        self.volumes.push(VolumeMount {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            read_only: false,
        });
        self
    }

    /// Add a link to another service
    pub fn link(mut self, service: &str) -> Self {
        self.links.push(service.to_string());
        self
    }

    /// Bind an environment profile
    pub fn env(mut self, env: EnvProfile) -> Self {
        self.env = env;
        self
    }

    /// Set the startup command
    pub fn command(mut self, argv: &[&str]) -> Self {
        self.command = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Mark the service as a one-shot job
    pub fn one_shot(mut self) -> Self {
        self.kind = ServiceKind::OneShot;
        self
    }
}
