use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use switchyard_core::{LogFormat, LoggingConfig, TopologyConfig};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about = "Plan and apply trigger/identity topologies")]
struct Cli {
    /// Topology file.
    #[arg(long, short, global = true, env = "SWITCHYARD_CONFIG", default_value = "switchyard.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the topology file and report every problem found.
    Check,

    /// Show the operations needed to bring the control plane in line with the topology.
    Plan {
        /// State file listing natural keys that already exist.
        #[arg(long)]
        state: Option<PathBuf>,

        /// Query gcloud for the current state instead of reading a state file.
        #[arg(long, default_value_t = false, conflicts_with = "state")]
        observe: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the gcloud commands a plan would run.
    Render {
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Execute the plan.
    Apply {
        #[arg(long)]
        state: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Backend::Local)]
        backend: Backend,

        /// Print the plan without executing it.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Manage discovered service URLs.
    Endpoints {
        #[command(subcommand)]
        cmd: EndpointsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EndpointsCommand {
    /// Record the deployed base URL of a service.
    Register { service: String, url: String },

    /// List every service and its resolved URL.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory control plane persisted to the state file.
    Local,
    /// Real resources through the gcloud CLI.
    Gcloud,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&logging_config(&cli.config));

    match cli.cmd {
        Command::Check => commands::check::run(&cli.config)?,
        Command::Plan {
            state,
            observe,
            format,
        } => commands::plan::run(&cli.config, state.as_deref(), observe, format).await?,
        Command::Render { state } => commands::render::run(&cli.config, state.as_deref())?,
        Command::Apply {
            state,
            backend,
            dry_run,
        } => commands::apply::run(&cli.config, state.as_deref(), backend, dry_run).await?,
        Command::Endpoints { cmd } => match cmd {
            EndpointsCommand::Register { service, url } => {
                commands::endpoints::register(&cli.config, &service, &url)?
            }
            EndpointsCommand::List => commands::endpoints::list(&cli.config)?,
        },
    }

    Ok(())
}

/// Logging settings from the topology file, or defaults when it can't be read.
fn logging_config(config_path: &Path) -> LoggingConfig {
    TopologyConfig::from_file(config_path)
        .map(|config| config.logging)
        .unwrap_or_default()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
