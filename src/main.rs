//! Federator - statistics-driven federated SPARQL query processing
//!
//! This is the main entry point for the command-line interface.
//!
//! Usage:
//!   federator --config federation.json query queries/*.rq --stats stats.csv
//!   federator --config federation.json explain queries/q1.rq
//!   federator --config federation.json sources queries/*.rq --output sources.csv

use clap::{Parser, Subcommand};
use federator::api::{Federation, QueryResponse};
use federator::config::FederationConfig;
use federator::execution::result_converter::{boolean_to_json, solutions_to_json};
use federator::execution::QueryInfo;
use federator::Result;
use futures_util::TryStreamExt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const STATS_HEADER: &str =
    "query;selection_ms;planning_ms;execution_ms;results;probes;requests;timed_out;failed_sources";

#[derive(Parser, Debug)]
#[command(name = "federator")]
#[command(about = "Federated SPARQL queries over independent RDF sources")]
struct Args {
    /// Federation config (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Per-query timeout in milliseconds, overriding the config
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run queries and print their results as SPARQL JSON
    Query {
        /// Query files
        #[arg(required = true)]
        queries: Vec<PathBuf>,

        /// Write one statistics line per query to this file instead of stderr
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Print the operator tree of a query
    Explain { query: PathBuf },
    /// Report the sources selected for every pattern group
    Sources {
        #[arg(required = true)]
        queries: Vec<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn query_name(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("query").to_string()
}

fn read_query(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
}

fn open_output(path: Option<&Path>, fallback: Box<dyn Write>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => fallback,
    })
}

fn stats_line(name: &str, results: usize, info: &QueryInfo) -> String {
    let failed: Vec<String> = info.failures().iter().map(|f| f.source.to_string()).collect();
    format!(
        "{};{:.3};{:.3};{:.3};{};{};{};{};{}",
        name,
        info.source_selection_time().as_secs_f64() * 1000.0,
        info.planning_time().as_secs_f64() * 1000.0,
        info.execution_time().as_secs_f64() * 1000.0,
        results,
        info.probe_queries(),
        info.remote_requests(),
        info.timed_out(),
        failed.join(",")
    )
}

async fn run_queries(
    federation: &Federation,
    queries: &[PathBuf],
    stats: Option<&Path>,
) -> io::Result<()> {
    let mut stats_out = open_output(stats, Box::new(io::stderr()))?;
    writeln!(stats_out, "{}", STATS_HEADER)?;

    for path in queries {
        let name = query_name(path);
        let text = read_query(path)?;

        let response = match federation.query(&text).await {
            Ok(response) => response,
            Err(e) => {
                eprintln!("{}: {}", name, e);
                continue;
            }
        };
        let info = Arc::clone(response.info());
        let (document, results) = match response {
            QueryResponse::Solutions(stream) => {
                let variables = stream.variables().to_vec();
                match stream.try_collect::<Vec<_>>().await {
                    Ok(rows) => (solutions_to_json(&variables, &rows), rows.len()),
                    Err(e) => {
                        eprintln!("{}: {}", name, e);
                        writeln!(stats_out, "{}", stats_line(&name, 0, &info))?;
                        continue;
                    }
                }
            }
            QueryResponse::Boolean { value, .. } => (boolean_to_json(value), 1),
        };

        println!("{}", serde_json::to_string_pretty(&document).unwrap_or_default());
        for failure in info.failures() {
            eprintln!(
                "{}: partial result, source '{}' failed: {}",
                name, failure.source, failure.message
            );
        }
        writeln!(stats_out, "{}", stats_line(&name, results, &info))?;
    }
    stats_out.flush()
}

fn report_sources(
    federation: &Federation,
    queries: &[PathBuf],
    output: Option<&Path>,
) -> io::Result<()> {
    let mut out = open_output(output, Box::new(io::stdout()))?;
    writeln!(out, "query;triples;#sources;sources")?;

    for path in queries {
        let name = query_name(path);
        let text = read_query(path)?;
        match federation.select_sources(&text) {
            Ok(reports) => {
                for report in reports {
                    writeln!(out, "{};{}", name, report)?;
                }
            }
            Err(e) => eprintln!("cannot parse query {}: {}", name, e),
        }
    }
    out.flush()
}

async fn run(args: Args) -> Result<()> {
    let mut config = FederationConfig::from_file(&args.config)?;
    if args.timeout_ms.is_some() {
        config.timeout_ms = args.timeout_ms;
    }
    let federation = Federation::from_config(&config).await?;

    match &args.command {
        Command::Query { queries, stats } => {
            run_queries(&federation, queries, stats.as_deref()).await?;
        }
        Command::Explain { query } => {
            println!("{}", federation.explain(&read_query(query)?)?);
        }
        Command::Sources { queries, output } => {
            report_sources(&federation, queries, output.as_deref())?;
        }
    }

    federation.close().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
