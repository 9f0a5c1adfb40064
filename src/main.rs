use clap::Parser;
use fleetctl::cli::{self, Cli, Commands};
use fleetctl::config::LoggingConfig;
use fleetctl::error::Result;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => {
            let config = cli::load_config(&cli.config, &args.overrides)?;
            init_logging(&config.logging);
            info!(
                engines = config.remote.hosts.len(),
                workload = %args.workload.display(),
                "Starting fleet run"
            );
            if let Err(e) = cli::run_fleet(&config, args, shutdown_signal()).await {
                error!("Fleet run failed: {}", e);
                return Err(e);
            }
        }
        Commands::Check(overrides) => {
            init_logging_simple();
            let config = cli::load_config(&cli.config, overrides)?;
            cli::print_config(&config);
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},fleetctl={}", logging.level, logging.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping fleet"),
        _ = terminate => info!("Received SIGTERM, stopping fleet"),
    }
}
