//! Service topology and startup resolution

use super::profile::EnvProfile;
use super::service::ServiceSpec;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The outcome of resolving a service: the ordered startup sequence
/// (dependencies before dependents, terminating with the requested service)
/// and a verbatim copy of the requested service's environment profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Service names in startup order
    pub order: Vec<String>,
    /// The requested service's resolved profile
    pub profile: EnvProfile,
}

/// The complete set of service declarations and their link edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    services: BTreeMap<String, ServiceSpec>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in standup deployment topology.
    ///
    /// A star graph: `web` and `prod` link to `db`; the test services link
    /// to nothing. `db` runs its image's default command.
    pub fn standup() -> Self {
        let specs = [
            ServiceSpec::new("db", "postgres:9.4"),
            ServiceSpec::new("web", "local/standup_dev")
                .port(8000, 8000)
                .volume(".", "/app")
                .link("db")
                .env(EnvProfile::dev())
                .command(&["./bin/run-supervisor.sh", "dev"]),
            ServiceSpec::new("prod", "local/standup_base")
                .port(8000, 8000)
                .volume(".", "/app")
                .link("db")
                .env(EnvProfile::prod())
                .command(&["./bin/run-supervisor.sh", "prod"]),
            ServiceSpec::new("test", "local/standup_dev")
                .volume(".", "/app")
                .env(EnvProfile::test())
                .command(&["./bin/run-tests.sh"])
                .one_shot(),
            ServiceSpec::new("test-image", "local/standup_dev")
                .env(EnvProfile::test())
                .command(&["./bin/run-tests.sh"])
                .one_shot(),
        ];

        Self {
            services: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Add a service declaration; names must be unique
    pub fn insert(&mut self, spec: ServiceSpec) -> Result<()> {
        if self.services.contains_key(&spec.name) {
            return Err(StackError::DuplicateService(spec.name));
        }
        self.services.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Look up a service by name
    pub fn get(&self, name: &str) -> Result<&ServiceSpec> {
        self.services
            .get(name)
            .ok_or_else(|| StackError::UnknownService(name.to_string()))
    }

    /// Whether a service is declared
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// All declared service names, in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(|s| s.as_str())
    }

    /// All declared services, in name order
    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.values()
    }

    /// Number of declared services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are declared
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Validate the topology: every link target must resolve to a declared
    /// service, and the link graph must be acyclic.
    pub fn validate(&self) -> Result<()> {
        for (name, spec) in &self.services {
            for target in &spec.links {
                if !self.services.contains_key(target) {
                    return Err(StackError::DanglingLink {
                        service: name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        // Cycle check: walk every service; the per-service sort fails on a
        // back edge.
        let mut visited = HashSet::new();
        for name in self.services.keys() {
            let mut visiting = HashSet::new();
            let mut order = Vec::new();
            self.sort_from(name, &mut visited, &mut visiting, &mut order)?;
        }

        Ok(())
    }

    /// Resolve a service into its startup sequence and environment profile.
    ///
    /// Pure and idempotent: resolving the same name twice yields the same
    /// sequence and profile. A service with no links resolves to a
    /// singleton sequence containing only itself.
    pub fn resolve(&self, name: &str) -> Result<Resolution> {
        let spec = self.get(name)?;

        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        let mut order = Vec::new();
        self.sort_from(name, &mut visited, &mut visiting, &mut order)?;

        Ok(Resolution {
            order,
            profile: spec.env.clone(),
        })
    }

    /// Depth-first topological sort, dependencies first
    fn sort_from(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            return Err(StackError::DependencyCycle(name.to_string()));
        }

        visiting.insert(name.to_string());

        let spec = self.get(name)?;
        for target in &spec.links {
            self.sort_from(target, visited, visiting, order)?;
        }

        visiting.remove(name);
        visited.insert(name.to_string());
        order.push(name.to_string());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standup_declares_five_services() {
        let topology = Topology::standup();
        let names: Vec<&str> = topology.names().collect();
        assert_eq!(names, vec!["db", "prod", "test", "test-image", "web"]);
    }

    #[test]
    fn standup_validates_cleanly() {
        Topology::standup().validate().unwrap();
    }

    #[test]
    fn resolve_web_starts_db_first() {
        let topology = Topology::standup();
        let resolution = topology.resolve("web").unwrap();
        assert_eq!(resolution.order, vec!["db", "web"]);
        assert_eq!(resolution.profile.get("DEBUG"), Some("True"));
    }

    #[test]
    fn resolve_prod_starts_db_first() {
        let topology = Topology::standup();
        let resolution = topology.resolve("prod").unwrap();
        assert_eq!(resolution.order, vec!["db", "prod"]);
        assert_eq!(resolution.profile.get("DEBUG"), Some("False"));
    }

    #[test]
    fn web_and_prod_profiles_differ_only_in_debug() {
        let topology = Topology::standup();
        let web = topology.resolve("web").unwrap().profile;
        let prod = topology.resolve("prod").unwrap().profile;

        for (key, value) in web.iter() {
            if key != "DEBUG" {
                assert_eq!(prod.get(key), Some(value.as_str()));
            }
        }
        assert_eq!(web.len(), prod.len());
    }

    #[test]
    fn unlinked_service_resolves_to_singleton() {
        let topology = Topology::standup();
        let resolution = topology.resolve("test-image").unwrap();
        assert_eq!(resolution.order, vec!["test-image"]);
    }

    #[test]
    fn db_resolves_to_itself() {
        let topology = Topology::standup();
        let resolution = topology.resolve("db").unwrap();
        assert_eq!(resolution.order, vec!["db"]);
        assert!(resolution.profile.is_empty());
    }

    #[test]
    fn resolve_is_idempotent() {
        let topology = Topology::standup();
        let first = topology.resolve("web").unwrap();
        let second = topology.resolve("web").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_unknown_service_fails() {
        let topology = Topology::standup();
        let err = topology.resolve("worker").unwrap_err();
        assert!(matches!(err, StackError::UnknownService(name) if name == "worker"));
    }

    #[test]
    fn duplicate_declaration_fails() {
        let mut topology = Topology::new();
        topology.insert(ServiceSpec::new("db", "postgres:9.4")).unwrap();
        let err = topology
            .insert(ServiceSpec::new("db", "postgres:9.5"))
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateService(_)));
    }

    #[test]
    fn dangling_link_fails_validation() {
        let mut topology = Topology::new();
        topology
            .insert(ServiceSpec::new("web", "nginx").link("db"))
            .unwrap();
        let err = topology.validate().unwrap_err();
        assert!(matches!(
            err,
            StackError::DanglingLink { service, target }
                if service == "web" && target == "db"
        ));
    }

    #[test]
    fn cycle_fails_validation() {
        let mut topology = Topology::new();
        topology
            .insert(ServiceSpec::new("a", "img").link("b"))
            .unwrap();
        topology
            .insert(ServiceSpec::new("b", "img").link("a"))
            .unwrap();
        assert!(matches!(
            topology.validate().unwrap_err(),
            StackError::DependencyCycle(_)
        ));
    }

    #[test]
    fn deep_chain_resolves_in_dependency_order() {
        let mut topology = Topology::new();
        topology
            .insert(ServiceSpec::new("web", "nginx").link("api"))
            .unwrap();
        topology
            .insert(ServiceSpec::new("api", "node").link("db"))
            .unwrap();
        topology.insert(ServiceSpec::new("db", "postgres")).unwrap();

        let resolution = topology.resolve("web").unwrap();
        assert_eq!(resolution.order, vec!["db", "api", "web"]);
    }
}
