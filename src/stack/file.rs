//! Stack file loading
//!
//! Loads a topology from a compose-style YAML file. The supported subset
//! covers what the standup deployment uses: `services:` entries with
//! `image`, `build`, `command`, `ports`, `volumes`, `links` and
//! `environment`. Values are taken verbatim; no variable interpolation is
//! evaluated.

use super::profile::EnvProfile;
use super::service::{PortMapping, ServiceSpec, VolumeMount};
use super::topology::Topology;
use crate::error::{Result, StackError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default stack file names, probed in order
pub const DEFAULT_STACK_FILES: &[&str] = &[
    "stack.yaml",
    "stack.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Raw stack file shape
#[derive(Debug, Deserialize)]
struct StackFile {
    #[serde(default)]
    services: BTreeMap<String, ServiceEntry>,
}

/// Raw per-service entry
#[derive(Debug, Default, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    build: Option<String>,
    #[serde(default)]
    command: Option<CommandEntry>,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    environment: Option<EnvEntry>,
    #[serde(default)]
    one_shot: bool,
}

/// Command in shell or exec form
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandEntry {
    Shell(String),
    Exec(Vec<String>),
}

/// Environment in map or `KEY=value` array form
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvEntry {
    Array(Vec<String>),
    Map(BTreeMap<String, Option<String>>),
}

/// Stack file parser
pub struct StackParser;

impl StackParser {
    /// Find a stack file in a directory
    pub fn find_stack_file(dir: &Path) -> Option<PathBuf> {
        for name in DEFAULT_STACK_FILES {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Parse a stack file from a path
    pub fn parse_file(path: &Path) -> Result<Topology> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StackError::StackParse(format!("failed to read file: {e}")))?;
        Self::parse_str(&content)
    }

    /// Parse a stack file from a string
    pub fn parse_str(content: &str) -> Result<Topology> {
        let file: StackFile = serde_yaml::from_str(content)
            .map_err(|e| StackError::StackParse(format!("failed to parse YAML: {e}")))?;

        let mut topology = Topology::new();
        for (name, entry) in file.services {
            topology.insert(entry_to_spec(&name, entry)?)?;
        }
        topology.validate()?;
        Ok(topology)
    }
}

fn entry_to_spec(name: &str, entry: ServiceEntry) -> Result<ServiceSpec> {
    // A locally built service is referenced by a synthetic image name, the
    // same way the standup images are consumed: by name only.
    let image = match (entry.image, entry.build) {
        (Some(image), _) => image,
        (None, Some(_)) => format!("local/{name}"),
        (None, None) => {
            return Err(StackError::StackParse(format!(
                "service '{name}' must declare 'image' or 'build'"
            )))
        }
    };

    let mut spec = ServiceSpec::new(name, &image);

    for port in &entry.ports {
        spec.ports.push(PortMapping::parse(port)?);
    }
    for volume in &entry.volumes {
        spec.volumes.push(VolumeMount::parse(volume)?);
    }
    spec.links = entry.links;

    if let Some(env) = entry.environment {
        spec.env = match env {
            EnvEntry::Array(items) => {
                let mut profile = EnvProfile::new();
                for item in items {
                    let (key, value) = item.split_once('=').ok_or_else(|| {
                        StackError::StackParse(format!(
                            "service '{name}': environment entry '{item}' is not KEY=value"
                        ))
                    })?;
                    profile.set(key, value);
                }
                profile
            }
            EnvEntry::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
        };
    }

    if let Some(command) = entry.command {
        spec.command = match command {
            CommandEntry::Shell(line) => {
                vec!["/bin/sh".to_string(), "-c".to_string(), line]
            }
            CommandEntry::Exec(argv) => argv,
        };
    }

    if entry.one_shot {
        spec = spec.one_shot();
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::service::ServiceKind;

    const STANDUP_YAML: &str = r#"
services:
  db:
    image: postgres:9.4
  web:
    image: local/standup_dev
    ports:
      - "8000:8000"
    volumes:
      - .:/app
    links:
      - db
    environment:
      DATABASE_URL: postgres://postgres@db/postgres
      DEBUG: "True"
      ALLOWED_HOSTS: localhost,127.0.0.1
      SECRET_KEY: itsasekrit
    command: ["./bin/run-supervisor.sh", "dev"]
"#;

    #[test]
    fn parse_standup_subset() {
        let topology = StackParser::parse_str(STANDUP_YAML).unwrap();
        assert_eq!(topology.len(), 2);

        let web = topology.get("web").unwrap();
        assert_eq!(web.image, "local/standup_dev");
        assert_eq!(web.ports[0].host_port, 8000);
        assert_eq!(web.volumes[0].host_path, ".");
        assert_eq!(web.links, vec!["db".to_string()]);
        assert_eq!(web.env.get("DEBUG"), Some("True"));
        assert_eq!(web.command[0], "./bin/run-supervisor.sh");

        let resolution = topology.resolve("web").unwrap();
        assert_eq!(resolution.order, vec!["db", "web"]);
    }

    #[test]
    fn shell_command_wraps_in_sh() {
        let yaml = r#"
services:
  job:
    image: busybox
    command: echo hello
"#;
        let topology = StackParser::parse_str(yaml).unwrap();
        let job = topology.get("job").unwrap();
        assert_eq!(
            job.command,
            vec!["/bin/sh", "-c", "echo hello"]
        );
    }

    #[test]
    fn environment_array_form() {
        let yaml = r#"
services:
  job:
    image: busybox
    environment:
      - DEBUG=False
      - SECRET_KEY=itsasekrit
"#;
        let topology = StackParser::parse_str(yaml).unwrap();
        let job = topology.get("job").unwrap();
        assert_eq!(job.env.get("DEBUG"), Some("False"));
        assert_eq!(job.env.get("SECRET_KEY"), Some("itsasekrit"));
    }

    #[test]
    fn build_without_image_gets_local_name() {
        let yaml = r#"
services:
  app:
    build: .
    one_shot: true
"#;
        let topology = StackParser::parse_str(yaml).unwrap();
        let app = topology.get("app").unwrap();
        assert_eq!(app.image, "local/app");
        assert_eq!(app.kind, ServiceKind::OneShot);
    }

    #[test]
    fn missing_image_and_build_fails() {
        let yaml = r#"
services:
  app:
    ports:
      - "80:80"
"#;
        assert!(matches!(
            StackParser::parse_str(yaml).unwrap_err(),
            StackError::StackParse(_)
        ));
    }

    #[test]
    fn dangling_link_fails_at_load() {
        let yaml = r#"
services:
  web:
    image: nginx
    links:
      - db
"#;
        assert!(matches!(
            StackParser::parse_str(yaml).unwrap_err(),
            StackError::DanglingLink { .. }
        ));
    }

    #[test]
    fn find_stack_file_probes_known_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StackParser::find_stack_file(dir.path()).is_none());

        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}").unwrap();
        let found = StackParser::find_stack_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "docker-compose.yml");
    }
}
