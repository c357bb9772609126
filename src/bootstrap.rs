//! Test bootstrap
//!
//! Configures and executes an isolated test pass: a fixed test environment
//! profile, then a lint step, then the test step. The pipeline is an
//! explicit sequence of steps where each step's success is a precondition
//! for the next; the first non-zero status halts the procedure and becomes
//! the overall exit status. Nothing persists beyond the child processes:
//! the database is ephemeral and the environment bindings die with them.

use crate::error::{Result, StackError};
use crate::stack::EnvProfile;
use std::path::PathBuf;
use tokio::process::Command;

/// Default lint invocation
const DEFAULT_LINT: &[&str] = &["flake8"];
/// Default test-runner invocation
const DEFAULT_TESTS: &[&str] = &["pytest"];

/// The lint-then-test pipeline.
pub struct TestBootstrap {
    env: EnvProfile,
    lint: Vec<String>,
    tests: Vec<String>,
    extra_args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl Default for TestBootstrap {
    fn default() -> Self {
        Self {
            env: EnvProfile::test(),
            lint: DEFAULT_LINT.iter().map(|s| s.to_string()).collect(),
            tests: DEFAULT_TESTS.iter().map(|s| s.to_string()).collect(),
            extra_args: Vec::new(),
            workdir: None,
        }
    }
}

impl TestBootstrap {
    /// Create a bootstrap with the fixed test profile and default commands
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra arguments forwarded verbatim to the test step (e.g. a test
    /// file path or filter expression). The lint step never sees them.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Override the lint invocation
    pub fn lint_command(mut self, argv: &[&str]) -> Self {
        self.lint = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Override the test-runner invocation
    pub fn test_command(mut self, argv: &[&str]) -> Self {
        self.tests = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Working directory for both steps
    pub fn workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }

    /// Run lint, then tests, fail-fast.
    ///
    /// Returns 0 when both steps succeed. A failing lint step aborts the
    /// pipeline with its status and the test step never runs; a failing
    /// test step surfaces its status. The test environment profile is in
    /// place before either step executes.
    pub async fn run(&self) -> Result<i32> {
        let lint_status = self.run_step(&self.lint, &[]).await?;
        if lint_status != 0 {
            tracing::error!(status = lint_status, "lint pass failed");
            return Err(StackError::Lint(lint_status));
        }
        tracing::info!("lint pass clean");

        let test_status = self.run_step(&self.tests, &self.extra_args).await?;
        if test_status != 0 {
            tracing::error!(status = test_status, "test pass failed");
            return Err(StackError::Test(test_status));
        }
        tracing::info!("test pass clean");

        Ok(0)
    }

    /// Run one step with the test profile applied, returning its status
    async fn run_step(&self, argv: &[String], extra: &[String]) -> Result<i32> {
        let program = argv.first().ok_or_else(|| {
            StackError::InvalidConfig("bootstrap step has an empty command".to_string())
        })?;

        let mut command = Command::new(program);
        command
            .args(&argv[1..])
            .args(extra)
            .envs(self.env.iter());
        if let Some(ref dir) = self.workdir {
            command.current_dir(dir);
        }

        tracing::debug!(step = %argv.join(" "), "running step");
        let status = command.status().await?;
        Ok(status.code().unwrap_or(-1))
    }
}
