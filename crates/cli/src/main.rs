use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tandem_core::{cluster::Convergence, config::AppConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{nodes, rpc, UpOptions};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem - start liquidd nodes and wait until they agree on chain state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to config/tandem.toml)
    #[arg(short, long, global = true, env = "TANDEM_CONFIG")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset every node's datadir and copy in its template config
    Prepare,

    /// Start all configured nodes and wait for them to converge
    Up {
        /// Prepare datadirs first
        #[arg(long)]
        prepare: bool,

        /// Return as soon as the daemons are spawned
        #[arg(long)]
        no_wait: bool,

        /// Stay attached and shut the nodes down on Ctrl-C
        #[arg(long)]
        foreground: bool,
    },

    /// Wait for already running nodes to converge
    Wait {
        /// best_block_hash or block_count (defaults to the configured criterion)
        #[arg(long)]
        criterion: Option<Convergence>,

        /// Give up after this many seconds (0 waits forever)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print each node's block count and tip
    Status,

    /// Issue one RPC call; params are parsed as JSON, falling back to strings
    Call {
        /// Configured node name
        node: String,

        /// RPC method name
        method: String,

        /// Positional parameters
        params: Vec<String>,
    },

    /// Ask every configured node to stop over RPC
    Down,

    /// Show the endpoint found in the daemon's default config
    Discover {
        /// Read this config instead of the platform default
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Initializes logging from the `[logging]` settings.
///
/// `RUST_LOG` takes precedence over the configured level. When a log file is configured,
/// plain-text output is appended there as well as to the console.
fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,tandem_core={level},cli={level},tests={level}"))
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load settings")?;

    config.validate().map_err(|e| anyhow::anyhow!("invalid settings: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config)?;

    match cli.command {
        Commands::Prepare => nodes::prepare(&config)?,
        Commands::Up { prepare, no_wait, foreground } => {
            nodes::up(&config, UpOptions { prepare, no_wait, foreground }).await?;
        }
        Commands::Wait { criterion, timeout } => nodes::wait(&config, criterion, timeout).await?,
        Commands::Status => nodes::status(&config).await?,
        Commands::Call { node, method, params } => {
            rpc::call(&config, &node, &method, &params).await?;
        }
        Commands::Down => nodes::down(&config).await?,
        Commands::Discover { path } => rpc::discover(path.as_deref())?,
    }

    Ok(())
}
