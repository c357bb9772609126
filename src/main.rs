//! stackup - compose-style stack runner for the standup deployment
//!
//! This is the CLI entry point for stackup.

use clap::{Parser, Subcommand};
use stackup::bootstrap::TestBootstrap;
use stackup::error::Result;
use stackup::launch::{Launcher, StateStore};
use stackup::stack::{StackParser, Topology};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// stackup - stack runner for the standup deployment
#[derive(Parser)]
#[command(name = "stackup")]
#[command(version)]
#[command(about = "A compose-style stack runner for the standup service", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a service and start it with its linked services
    Up {
        /// Service to start
        service: String,
        /// Stack file (defaults to the built-in standup topology)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Leave services running and return immediately
        #[arg(short = 'D', long)]
        detach: bool,
    },

    /// Stop one launched service
    Stop {
        /// Service to stop
        service: String,
    },

    /// Stop every launched service, most recently started first
    Down,

    /// List launched instances
    Ps,

    /// Print a service's startup sequence
    Resolve {
        /// Service to resolve
        service: String,
        /// Stack file (defaults to the built-in standup topology)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Also print the service's environment profile
        #[arg(short, long)]
        env: bool,
    },

    /// Validate the topology and print it
    Config {
        /// Stack file (defaults to the built-in standup topology)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run the test bootstrap: lint, then tests, fail-fast
    Test {
        /// Arguments forwarded verbatim to the test runner
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Base path for stackup state
    let state_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("stackup")
        .join("instances");

    match cli.command {
        Commands::Up {
            service,
            file,
            detach,
        } => {
            let topology = load_topology(file)?;
            let project_dir = std::env::current_dir()?;
            let mut launcher = Launcher::new(topology, project_dir, state_dir)?;

            match launcher.up(&service).await? {
                Some(code) => {
                    // One-shot job: its exit status is ours
                    if code != 0 {
                        std::process::exit(code);
                    }
                }
                None => {
                    if detach {
                        println!("{service} started");
                    } else {
                        tracing::info!("attached; press Ctrl-C to stop");
                        tokio::signal::ctrl_c().await?;
                        launcher.down().await?;
                    }
                }
            }
        }

        Commands::Stop { service } => {
            StateStore::open(state_dir)?.stop_service(&service)?;
            println!("{service}");
        }

        Commands::Down => {
            let stopped = StateStore::open(state_dir)?.stop_all()?;
            println!("stopped {stopped} service(s)");
        }

        Commands::Ps => {
            let instances = StateStore::open(state_dir)?.load_all()?;
            println!(
                "{:<14} {:<12} {:<20} {:<10} {:<20}",
                "INSTANCE ID", "SERVICE", "IMAGE", "STATUS", "CREATED"
            );
            for instance in instances {
                println!(
                    "{:<14} {:<12} {:<20} {:<10} {:<20}",
                    instance.id,
                    instance.name(),
                    instance.spec.image,
                    instance.status.to_string(),
                    instance.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::Resolve { service, file, env } => {
            let topology = load_topology(file)?;
            let resolution = topology.resolve(&service)?;
            for name in &resolution.order {
                println!("{name}");
            }
            if env {
                for (key, value) in resolution.profile.iter() {
                    println!("{key}={value}");
                }
            }
        }

        Commands::Config { file } => {
            let topology = load_topology(file)?;
            topology.validate()?;
            print!("{}", serde_yaml::to_string(&topology)?);
        }

        Commands::Test { args } => {
            TestBootstrap::new().args(args).run().await?;
        }
    }

    Ok(())
}

/// Load the topology from an explicit file, a stack file found in the
/// current directory, or fall back to the built-in standup topology.
fn load_topology(file: Option<PathBuf>) -> Result<Topology> {
    if let Some(path) = file {
        return StackParser::parse_file(&path);
    }
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(path) = StackParser::find_stack_file(&cwd) {
            tracing::debug!(path = %path.display(), "using stack file");
            return StackParser::parse_file(&path);
        }
    }
    Ok(Topology::standup())
}
