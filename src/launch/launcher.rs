//! Service launcher
//!
//! Materializes resolved service declarations into running processes:
//! preflights port and mount declarations, binds the environment profile,
//! and spawns the declared startup command. Linked services are started
//! before their dependents. "Started" means the process was launched;
//! readiness probing is not part of this layer.

use super::instance::ServiceInstance;
use super::store::StateStore;
use crate::error::{Result, StackError};
use crate::stack::{ServiceKind, ServiceSpec, Topology};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Window after spawn within which a non-zero exit counts as a launch
/// failure rather than a normal run to completion.
const IMMEDIATE_EXIT_WINDOW: Duration = Duration::from_millis(500);

/// Launches and tracks service processes for one topology.
pub struct Launcher {
    topology: Topology,
    /// Directory relative mount sources are resolved against
    project_dir: PathBuf,
    /// Snapshot storage for launched instances
    store: StateStore,
    /// Instance records keyed by service name
    instances: HashMap<String, ServiceInstance>,
    /// Live child handles keyed by service name
    children: HashMap<String, Child>,
    /// Names in the order services were started
    start_order: Vec<String>,
}

impl Launcher {
    /// Create a launcher for a validated topology
    pub fn new(topology: Topology, project_dir: PathBuf, state_dir: PathBuf) -> Result<Self> {
        topology.validate()?;

        Ok(Self {
            topology,
            project_dir,
            store: StateStore::open(state_dir)?,
            instances: HashMap::new(),
            children: HashMap::new(),
            start_order: Vec::new(),
        })
    }

    /// Resolve a service and start its startup sequence in order.
    ///
    /// Linked services are started before the requested service. If the
    /// requested service is a one-shot job it is run to completion and its
    /// exit status returned; long-running services yield `None`.
    pub async fn up(&mut self, name: &str) -> Result<Option<i32>> {
        let resolution = self.topology.resolve(name)?;
        tracing::info!(service = name, order = ?resolution.order, "starting");

        for service in &resolution.order {
            if self.is_running(service) {
                tracing::debug!(service = %service, "already running");
                continue;
            }

            let spec = self.topology.get(service)?.clone();
            if service == name && spec.kind == ServiceKind::OneShot {
                let code = self.run_to_completion(spec).await?;
                return Ok(Some(code));
            }
            self.start_service(spec).await?;
        }

        Ok(None)
    }

    /// Stop one running service. Stopping does not cascade to dependents.
    pub async fn stop(&mut self, name: &str) -> Result<()> {
        if let Some(mut child) = self.children.remove(name) {
            child.kill().await?;
        } else {
            match self.instances.get(name) {
                Some(instance) if instance.is_running() => {}
                _ => return Err(StackError::ServiceNotRunning(name.to_string())),
            }
        }

        if let Some(instance) = self.instances.get_mut(name) {
            instance.mark_stopped();
            self.store.save(instance)?;
        }

        tracing::info!(service = name, "stopped");
        Ok(())
    }

    /// Stop every running service, in reverse start order
    pub async fn down(&mut self) -> Result<()> {
        let order: Vec<String> = self.start_order.iter().rev().cloned().collect();
        for name in order {
            if self.is_running(&name) {
                if let Err(e) = self.stop(&name).await {
                    tracing::warn!(service = %name, "failed to stop: {e}");
                }
            }
        }
        Ok(())
    }

    /// Whether a service currently has a running instance
    pub fn is_running(&self, name: &str) -> bool {
        self.instances
            .get(name)
            .map(|i| i.is_running())
            .unwrap_or(false)
    }

    /// Tracked instances, in start order
    pub fn instances(&self) -> Vec<&ServiceInstance> {
        self.start_order
            .iter()
            .filter_map(|name| self.instances.get(name))
            .collect()
    }

    /// Instance record for a service, if one was launched
    pub fn instance(&self, name: &str) -> Option<&ServiceInstance> {
        self.instances.get(name)
    }

    /// Start one long-running service
    async fn start_service(&mut self, spec: ServiceSpec) -> Result<()> {
        let name = spec.name.clone();
        if self.is_running(&name) {
            return Err(StackError::ServiceAlreadyRunning(name));
        }

        self.preflight_ports(&spec)?;
        let workdir = self.resolve_mounts(&spec)?;

        let mut instance = ServiceInstance::new(spec.clone());

        if spec.command.is_empty() {
            // No declared command; the image's default entrypoint is outside
            // this layer. The instance is recorded as started.
            tracing::info!(service = %name, image = %spec.image, "started (image default command)");
            instance.mark_started(None);
            self.store.save(&instance)?;
            self.track(instance);
            return Ok(());
        }

        let mut child = self.spawn(&spec, workdir)?;
        let pid = child.id();

        match tokio::time::timeout(IMMEDIATE_EXIT_WINDOW, child.wait()).await {
            Ok(status) => {
                let code = status?.code().unwrap_or(-1);
                instance.mark_exited(code);
                self.store.save(&instance)?;
                self.track(instance);
                if code != 0 {
                    return Err(StackError::Launch {
                        service: name,
                        code,
                    });
                }
                tracing::info!(service = %name, "ran to completion");
            }
            Err(_) => {
                tracing::info!(service = %name, pid, "started");
                instance.mark_started(pid);
                self.store.save(&instance)?;
                self.track(instance);
                self.children.insert(name, child);
            }
        }

        Ok(())
    }

    /// Run a one-shot service to completion and return its exit status
    async fn run_to_completion(&mut self, spec: ServiceSpec) -> Result<i32> {
        let name = spec.name.clone();

        self.preflight_ports(&spec)?;
        let workdir = self.resolve_mounts(&spec)?;

        let mut instance = ServiceInstance::new(spec.clone());

        if spec.command.is_empty() {
            instance.mark_exited(0);
            self.store.save(&instance)?;
            self.track(instance);
            return Ok(0);
        }

        let mut child = self.spawn(&spec, workdir)?;
        instance.mark_started(child.id());

        let status = child.wait().await?;
        let code = status.code().unwrap_or(-1);
        instance.mark_exited(code);
        self.store.save(&instance)?;
        self.track(instance);

        tracing::info!(service = %name, code, "finished");
        Ok(code)
    }

    /// Spawn the declared command with the profile as its environment
    fn spawn(&self, spec: &ServiceSpec, workdir: Option<PathBuf>) -> Result<Child> {
        let mut command = Command::new(&spec.command[0]);
        command.args(&spec.command[1..]).envs(spec.env.iter());
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }
        Ok(command.spawn()?)
    }

    /// Every declared host port must be bindable
    fn preflight_ports(&self, spec: &ServiceSpec) -> Result<()> {
        for port in &spec.ports {
            std::net::TcpListener::bind(("127.0.0.1", port.host_port)).map_err(|e| {
                StackError::PortBinding {
                    service: spec.name.clone(),
                    port: port.host_port,
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Every declared mount source must exist; the first one becomes the
    /// working directory of the launched process.
    fn resolve_mounts(&self, spec: &ServiceSpec) -> Result<Option<PathBuf>> {
        let mut workdir = None;

        for mount in &spec.volumes {
            let source = PathBuf::from(&mount.host_path);
            let source = if source.is_absolute() {
                source
            } else {
                self.project_dir.join(source)
            };

            let resolved = source.canonicalize().map_err(|_| StackError::Mount {
                service: spec.name.clone(),
                path: mount.host_path.clone(),
            })?;

            if workdir.is_none() && resolved.is_dir() {
                workdir = Some(resolved);
            }
        }

        Ok(workdir)
    }

    fn track(&mut self, instance: ServiceInstance) {
        let name = instance.name().to_string();
        if !self.start_order.contains(&name) {
            self.start_order.push(name.clone());
        }
        self.instances.insert(name, instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::instance::ServiceStatus;
    use crate::stack::EnvProfile;
    use tempfile::tempdir;

    fn launcher_for(topology: Topology) -> (Launcher, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let launcher = Launcher::new(
            topology,
            dir.path().to_path_buf(),
            dir.path().join("state"),
        )
        .unwrap();
        (launcher, dir)
    }

    fn single_service(spec: ServiceSpec) -> Topology {
        let mut topology = Topology::new();
        topology.insert(spec).unwrap();
        topology
    }

    #[tokio::test]
    async fn missing_mount_source_fails() {
        let spec = ServiceSpec::new("web", "img")
            .volume("definitely-not-there", "/app")
            .command(&["/bin/sh", "-c", "exit 0"]);
        let (mut launcher, _dir) = launcher_for(single_service(spec));

        let err = launcher.up("web").await.unwrap_err();
        assert!(matches!(
            err,
            StackError::Mount { service, path }
                if service == "web" && path == "definitely-not-there"
        ));
    }

    #[tokio::test]
    async fn occupied_host_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let spec = ServiceSpec::new("web", "img")
            .port(port, 8000)
            .command(&["/bin/sh", "-c", "exit 0"]);
        let (mut launcher, _dir) = launcher_for(single_service(spec));

        let err = launcher.up("web").await.unwrap_err();
        assert!(matches!(
            err,
            StackError::PortBinding { port: p, .. } if p == port
        ));
    }

    #[tokio::test]
    async fn immediate_nonzero_exit_is_a_launch_failure() {
        let spec = ServiceSpec::new("web", "img").command(&["/bin/sh", "-c", "exit 7"]);
        let (mut launcher, _dir) = launcher_for(single_service(spec));

        let err = launcher.up("web").await.unwrap_err();
        assert!(matches!(
            err,
            StackError::Launch { ref service, code } if service == "web" && code == 7
        ));
        assert_eq!(err.exit_code(), 7);
    }

    #[tokio::test]
    async fn one_shot_exit_status_is_returned_not_an_error() {
        let spec = ServiceSpec::new("test", "img")
            .command(&["/bin/sh", "-c", "exit 3"])
            .one_shot();
        let (mut launcher, _dir) = launcher_for(single_service(spec));

        let code = launcher.up("test").await.unwrap();
        assert_eq!(code, Some(3));
        assert_eq!(
            launcher.instance("test").unwrap().status,
            ServiceStatus::Exited
        );
    }

    #[tokio::test]
    async fn profile_is_materialized_into_the_environment() {
        let spec = ServiceSpec::new("check", "img")
            .env(EnvProfile::dev())
            .command(&["/bin/sh", "-c", "test \"$DEBUG\" = True"])
            .one_shot();
        let (mut launcher, _dir) = launcher_for(single_service(spec));

        assert_eq!(launcher.up("check").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn linked_service_starts_before_dependent() {
        let mut topology = Topology::new();
        topology.insert(ServiceSpec::new("db", "postgres:9.4")).unwrap();
        topology
            .insert(
                ServiceSpec::new("job", "img")
                    .link("db")
                    .command(&["/bin/sh", "-c", "exit 0"])
                    .one_shot(),
            )
            .unwrap();
        let (mut launcher, _dir) = launcher_for(topology);

        let code = launcher.up("job").await.unwrap();
        assert_eq!(code, Some(0));
        // db has no command; it is recorded as started before the job ran
        assert!(launcher.is_running("db"));
        let names: Vec<&str> = launcher.instances().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["db", "job"]);
    }

    #[tokio::test]
    async fn down_stops_running_services_in_reverse_order() {
        let mut topology = Topology::new();
        topology.insert(ServiceSpec::new("db", "postgres:9.4")).unwrap();
        topology
            .insert(
                ServiceSpec::new("web", "img")
                    .link("db")
                    .command(&["/bin/sh", "-c", "sleep 30"]),
            )
            .unwrap();
        let (mut launcher, _dir) = launcher_for(topology);

        launcher.up("web").await.unwrap();
        assert!(launcher.is_running("web"));
        assert!(launcher.instance("web").unwrap().pid.is_some());

        launcher.down().await.unwrap();
        assert_eq!(
            launcher.instance("web").unwrap().status,
            ServiceStatus::Stopped
        );
        assert_eq!(
            launcher.instance("db").unwrap().status,
            ServiceStatus::Stopped
        );
    }

    #[tokio::test]
    async fn stopping_a_service_that_never_started_fails() {
        let topology = single_service(ServiceSpec::new("db", "postgres:9.4"));
        let (mut launcher, _dir) = launcher_for(topology);

        assert!(matches!(
            launcher.stop("db").await.unwrap_err(),
            StackError::ServiceNotRunning(_)
        ));
    }

    #[tokio::test]
    async fn snapshots_are_persisted() {
        let spec = ServiceSpec::new("job", "img")
            .command(&["/bin/sh", "-c", "exit 0"])
            .one_shot();
        let (mut launcher, dir) = launcher_for(single_service(spec));

        launcher.up("job").await.unwrap();
        let snapshots: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .collect();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn relaunch_overwrites_the_service_snapshot() {
        let dir = tempdir().unwrap();

        for _ in 0..2 {
            let spec = ServiceSpec::new("job", "img")
                .command(&["/bin/sh", "-c", "exit 0"])
                .one_shot();
            let mut launcher = Launcher::new(
                single_service(spec),
                dir.path().to_path_buf(),
                dir.path().join("state"),
            )
            .unwrap();
            launcher.up("job").await.unwrap();
        }

        let snapshots: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .collect();
        assert_eq!(snapshots.len(), 1);
    }
}
