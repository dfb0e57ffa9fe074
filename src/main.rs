#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labstx::config::Config;
use labstx::engine::{invoker, session, Orchestrator, ProcessRunner, SessionRegistry, TOOL_NAME};
use labstx::gateway::{self, AppState};
use labstx::git::GitRepo;
use labstx::install::{self, InstallOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// Backend for the LabSTX Clarity IDE.
#[derive(Parser, Debug)]
#[command(name = "labstx")]
#[command(version, about = "Clarity IDE backend driving the Clarinet CLI", long_about = None)]
struct Cli {
    /// Path to config.toml (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP backend
    Serve {
        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Download the Clarinet CLI next to this executable
    InstallClarinet {
        /// Reinstall even if a binary is already present
        #[arg(long)]
        force: bool,
    },
    /// Print the Clarinet binary the backend would use
    Resolve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(config.log_level.as_deref());

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Commands::InstallClarinet { force } => {
            let dir = install_dir(&config)?;
            match install::install(&config.clarinet, &dir, force).await? {
                InstallOutcome::Installed(path) => println!("Installed {}", path.display()),
                InstallOutcome::AlreadyPresent(path) => {
                    println!("Already installed at {} (use --force to reinstall)", path.display());
                }
                InstallOutcome::Unsupported(os) => {
                    println!("Automatic install is not supported on {os}; install clarinet manually.");
                }
            }
            Ok(())
        }
        Commands::Resolve => {
            println!("{}", resolve(&config).display());
            Ok(())
        }
    }
}

fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info")));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn install_dir(config: &Config) -> Result<PathBuf> {
    config
        .clarinet
        .install_dir()
        .or_else(invoker::current_install_dir)
        .context("Could not determine an install directory; set [clarinet].install_dir")
}

fn resolve(config: &Config) -> PathBuf {
    let install = config.clarinet.install_dir().or_else(invoker::current_install_dir);
    let cwd = std::env::current_dir().ok();
    invoker::resolve_binary(install.as_deref(), cwd.as_deref(), TOOL_NAME)
}

async fn serve(config: Config) -> Result<()> {
    let binary = resolve(&config);
    tracing::info!("Using Clarinet binary: {}", binary.display());

    let scratch = config.clarinet.scratch_dir();
    ensure_dir(&scratch)?;

    let runner = Arc::new(ProcessRunner::new(config.clarinet.timeout()));
    let orchestrator = Arc::new(Orchestrator::new(runner.clone(), binary, scratch));
    let sessions = Arc::new(SessionRegistry::new(config.session.idle_ttl()));
    let git = Arc::new(GitRepo::new(runner, config.git.repo_root()));

    if config.session.idle_ttl().is_some() {
        session::spawn_reaper(sessions.clone(), config.session.sweep_interval());
    }

    let state = AppState::new(config, orchestrator, sessions, git)?;
    gateway::serve(state).await
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create scratch directory {}", dir.display()))
}
