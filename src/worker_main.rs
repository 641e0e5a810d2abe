use clap::Parser;
use foreman::config::ForemanConfig;
use foreman::signals;
use foreman::worker;
use signal_hook::consts::{SIGUSR1, SIGUSR2};
use std::path::PathBuf;

/// Tally worker: samples a two-valued joint state once per tick,
/// accumulates frequency counters, and reports them to its supervising
/// parent when permitted. Spawned by `foreman`; runs with no required
/// arguments and addresses the supervisor as `getppid()`.
#[derive(Parser, Debug)]
#[command(name = "foreman-worker", version, about)]
struct Cli {
    /// Config file path (only the [worker] section applies)
    #[arg(short, long, default_value = "foreman.toml")]
    config: PathBuf,

    /// Extra logging (handshake progress, signal traffic)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match ForemanConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let (_guard, events) = match signals::install(&[SIGUSR1, SIGUSR2]) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to install signal handlers: {e}");
            std::process::exit(1);
        }
    };

    worker::run(&config.worker, events).await;
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so report blocks on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
