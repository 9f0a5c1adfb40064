use clap::Parser;
use fleetctl::error::Result;
use fleetctl::transport::stub::{self, StubEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Stub engine speaking the fleet HTTP control API
#[derive(Parser)]
#[command(name = "engine-stub")]
#[command(about = "Run a stub engine for fleet experiments", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:1099")]
    listen: String,

    /// Reject this many configure requests before accepting
    #[arg(long, default_value = "0")]
    reject_configures: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = Arc::new(StubEngine::rejecting_configures(args.reject_configures));
    let listener = TcpListener::bind(&args.listen).await?;
    stub::serve(listener, engine).await
}
