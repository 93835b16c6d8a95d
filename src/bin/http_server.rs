//! HTTP Server Binary for the federation
//!
//! Loads a federation config and serves it as a SPARQL endpoint.
//!
//! Usage:
//!   cargo run --bin http_server -- --config federation.json --host 0.0.0.0 --port 8080

use clap::Parser;
use federator::{api::Federation, config::FederationConfig, http::start_server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "Federator HTTP Server")]
#[command(about = "SPARQL endpoint over a federation of RDF sources", long_about = None)]
struct Args {
    /// Federation config (JSON)
    #[arg(short, long)]
    config: PathBuf,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Per-query timeout in milliseconds, overriding the config
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    println!("Loading federation from {}", args.config.display());
    let mut config = FederationConfig::from_file(&args.config)?;
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }
    let federation = Arc::new(Federation::from_config(&config).await?);
    println!("  - Sources: {}", federation.registry().len());
    println!("  - Timeout: {:?}", federation.settings().timeout);
    println!();

    let addr = format!("{}:{}", args.host, args.port);

    // Set up graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
        println!();
        println!("Shutdown signal received, stopping server...");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = start_server(&addr, Arc::clone(&federation)) => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = shutdown_signal => {
            println!("Server shut down gracefully");
        }
    }

    federation.close().await;
    Ok(())
}
