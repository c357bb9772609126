//! Error types for stackup

use thiserror::Error;

/// Result type for stackup operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Stackup error types
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service already declared: {0}")]
    DuplicateService(String),

    #[error("Service {service} links to undeclared service {target}")]
    DanglingLink { service: String, target: String },

    #[error("Dependency cycle detected at service: {0}")]
    DependencyCycle(String),

    #[error("Service already running: {0}")]
    ServiceAlreadyRunning(String),

    #[error("Service not running: {0}")]
    ServiceNotRunning(String),

    #[error("Cannot bind host port {port} for service {service}: {reason}")]
    PortBinding {
        service: String,
        port: u16,
        reason: String,
    },

    #[error("Mount source {path} for service {service} is missing or inaccessible")]
    Mount { service: String, path: String },

    #[error("Service {service} exited immediately with status {code}")]
    Launch { service: String, code: i32 },

    #[error("Lint pass failed with status {0}")]
    Lint(i32),

    #[error("Test pass failed with status {0}")]
    Test(i32),

    #[error("Stack file parse error: {0}")]
    StackParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StackError {
    /// Exit code to surface to the invoking operator or CI system.
    ///
    /// Errors that carry a child process status propagate it unchanged, so
    /// the first failing step's code becomes the process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            StackError::Lint(code) | StackError::Test(code) => *code,
            StackError::Launch { code, .. } => *code,
            _ => 1,
        }
    }
}
