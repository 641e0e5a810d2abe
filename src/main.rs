use clap::Parser;
use foreman::config::ForemanConfig;
use foreman::process::SystemProcesses;
use foreman::signals;
use foreman::supervisor::{self, Supervisor};
use signal_hook::consts::{SIGCHLD, SIGUSR1, SIGUSR2};
use std::path::PathBuf;

/// A minimal process supervisor: spawn tally workers, grant or revoke
/// their reporting windows over POSIX signals, and reap them as they
/// exit.
#[derive(Parser, Debug)]
#[command(name = "foreman", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "foreman.toml")]
    config: PathBuf,

    /// Worker executable (overrides config)
    #[arg(short, long)]
    worker: Option<PathBuf>,

    /// Extra logging (signal traffic, reap decisions)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match ForemanConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let (_guard, events) = match signals::install(&[SIGUSR1, SIGUSR2, SIGCHLD]) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to install signal handlers: {e}");
            std::process::exit(1);
        }
    };

    let worker_command = config.supervisor.worker_command(cli.worker.as_deref());
    tracing::info!(worker = %worker_command.display(), "foreman starting");

    let supervisor = Supervisor::new(
        SystemProcesses,
        worker_command,
        config.supervisor.label_prefix(),
    );
    if let Err(e) = supervisor::run(supervisor, events).await {
        eprintln!("operator input failed: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
