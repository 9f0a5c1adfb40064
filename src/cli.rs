use clap::{Args, Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{FleetError, Result};
use crate::fleet::{EngineFactory, FleetCoordinator, FleetReporter, TracingReporter, Workload};
use crate::transport::HttpEngineFactory;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(author = "Fleetctl Team")]
#[command(version = "0.1.0")]
#[command(about = "Coordinate a fleet of remote workload engines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the fleet, start the workload, stop it on Ctrl+C
    Run(RunArgs),
    /// Validate configuration and print the effective fleet settings
    Check(OverrideArgs),
}

/// Overrides applied on top of the loaded configuration
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Engine addresses (comma separated host:port list)
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Number of configuration rounds
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay between configuration rounds (ms)
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Run with the engines that configured when others never do
    #[arg(long)]
    pub continue_on_fail: bool,

    /// Engine property sent after configure (KEY=VALUE, repeatable)
    #[arg(short = 'D', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

impl OverrideArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.hosts.is_empty() {
            config.remote.hosts = self.hosts.clone();
        }
        if let Some(retries) = self.retries {
            config.retry.retry_count = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry.retry_delay_ms = delay;
        }
        if self.continue_on_fail {
            config.retry.continue_on_fail = true;
        }
        for (key, value) in &self.properties {
            config.properties.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Workload file (.json or .toml)
    #[arg(short, long)]
    pub workload: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Stop engines without letting in-flight work finish
    #[arg(long)]
    pub immediate: bool,

    /// Tell engine processes to exit after stopping
    #[arg(long)]
    pub exit_after: bool,
}

fn parse_property(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Load, override and validate configuration
pub fn load_config(config_dir: &str, overrides: &OverrideArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_from(config_dir)?;
    overrides.apply(&mut config);
    config
        .validate()
        .map_err(|errors| FleetError::Validation(errors.join("; ")))?;
    Ok(config)
}

/// Print the effective fleet settings
pub fn print_config(config: &AppConfig) {
    println!("Engines ({}):", config.remote.hosts.len());
    for host in &config.remote.hosts {
        println!("  {}://{}", config.remote.scheme, host);
    }
    println!("Retry rounds:      {}", config.retry.retry_count);
    println!("Retry delay:       {}ms", config.retry.retry_delay_ms);
    println!("Continue on fail:  {}", config.retry.continue_on_fail);
    match config.retry.call_timeout_ms {
        Some(ms) => println!("Call timeout:      {}ms", ms),
        None => println!("Call timeout:      none"),
    }
    if !config.properties.is_empty() {
        println!("Properties:");
        for (key, value) in &config.properties {
            println!("  {} = {}", key, value);
        }
    }
}

/// Configure the fleet over HTTP, run the workload until `shutdown`
/// resolves, then stop (and optionally exit) every engine.
pub async fn run_fleet<S>(config: &AppConfig, args: &RunArgs, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let factory = HttpEngineFactory::new(&config.remote.scheme, config.request_timeout())?;
    run_fleet_with(
        config,
        args,
        Arc::new(factory),
        Arc::new(TracingReporter),
        shutdown,
    )
    .await
}

pub async fn run_fleet_with<S>(
    config: &AppConfig,
    args: &RunArgs,
    factory: Arc<dyn EngineFactory>,
    reporter: Arc<dyn FleetReporter>,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let workload = Workload::from_file(&args.workload)?;
    let mut coordinator = FleetCoordinator::new(factory, reporter);

    coordinator
        .init(&config.remote.hosts, &workload, &config.fleet_options())
        .await?;
    coordinator.start().await;
    info!(
        engines = coordinator.engine_count(),
        degraded = !coordinator.is_fully_configured(),
        "Workload started, waiting for shutdown signal"
    );

    shutdown.await;

    if args.immediate {
        coordinator.shutdown().await;
    } else {
        coordinator.stop().await;
    }
    if args.exit_after {
        coordinator.exit().await;
    }
    info!("Fleet stopped");
    Ok(())
}
