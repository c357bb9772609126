//! Persisted instance state
//!
//! Instance snapshots live as one JSON file per service under a state
//! directory, so a later invocation can list and tear down what an earlier
//! one started. Relaunching a service overwrites its snapshot.

use super::instance::ServiceInstance;
use crate::error::{Result, StackError};
use std::path::PathBuf;

/// Snapshot storage for launched instances, keyed by service name.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open a store, creating the directory if needed
    pub fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{service}.json"))
    }

    /// Write a service's snapshot, replacing any previous one
    pub fn save(&self, instance: &ServiceInstance) -> Result<()> {
        let json = serde_json::to_vec_pretty(instance)?;
        std::fs::write(self.path_for(instance.name()), json)?;
        Ok(())
    }

    /// Read one service's snapshot, if it has been launched
    pub fn load(&self, service: &str) -> Result<Option<ServiceInstance>> {
        let path = self.path_for(service);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Read every snapshot, oldest launch first
    pub fn load_all(&self) -> Result<Vec<ServiceInstance>> {
        let mut instances = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(instances),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let json = std::fs::read_to_string(&path)?;
                match serde_json::from_str(&json) {
                    Ok(instance) => instances.push(instance),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "skipping bad snapshot: {e}")
                    }
                }
            }
        }

        instances.sort_by_key(|i: &ServiceInstance| i.created_at);
        Ok(instances)
    }

    /// Terminate one service's persisted instance.
    ///
    /// Stopping a service does not cascade to services that link to it.
    pub fn stop_service(&self, name: &str) -> Result<()> {
        let mut instance = match self.load(name)? {
            Some(instance) if instance.is_running() => instance,
            _ => return Err(StackError::ServiceNotRunning(name.to_string())),
        };

        signal_stop(&mut instance)?;
        self.save(&instance)?;
        tracing::info!(service = name, "stopped");
        Ok(())
    }

    /// Terminate every running persisted instance, most recently started
    /// first. Returns how many were stopped.
    pub fn stop_all(&self) -> Result<usize> {
        let mut instances = self.load_all()?;
        instances.reverse();

        let mut stopped = 0;
        for mut instance in instances {
            if instance.is_running() {
                signal_stop(&mut instance)?;
                self.save(&instance)?;
                tracing::info!(service = instance.name(), "stopped");
                stopped += 1;
            }
        }
        Ok(stopped)
    }
}

/// Send SIGTERM to the instance's process, if it spawned one, and mark the
/// instance stopped. A pid that no longer exists counts as already gone.
fn signal_stop(instance: &mut ServiceInstance) -> Result<()> {
    if let Some(pid) = instance.pid {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
    }
    instance.mark_stopped();
    Ok(())
}
