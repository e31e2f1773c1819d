//! One-shot client: runs a single question through the pipeline and prints the JSON result.
//!
//! ```bash
//! kq-ask "How many pods are running?"
//! kq-ask --fixtures ./cluster-dump "Which nodes are not ready?"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use kubequery_lib::application::{ErrorResponse, QueryResponse};
use kubequery_lib::settings::{ClusterSource, ConfigManager};
use kubequery_lib::{build_service, init_tracing, resolve_config_dir};

#[derive(Parser)]
#[command(name = "kq-ask")]
#[command(about = "Ask a question about a Kubernetes cluster")]
#[command(version)]
struct Cli {
    /// The question, in plain language
    query: Vec<String>,

    /// Read cluster state from kubectl JSON dumps in this directory
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Write the effective configuration to config.json and exit
    #[arg(long)]
    init_config: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[kq-ask] {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let manager = ConfigManager::load(resolve_config_dir()?);

    if cli.init_config {
        manager
            .persist()
            .with_context(|| format!("failed to write {}", manager.path().display()))?;
        println!("{}", manager.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = manager.current();
    if let Some(dir) = cli.fixtures {
        config.cluster = ClusterSource::Fixture { dir };
    }
    let service = build_service(&config)?;

    let query = cli.query.join(" ");
    let (payload, code) = match service.answer(&query) {
        Ok(outcome) => (
            serde_json::to_value(QueryResponse::from(outcome))?,
            ExitCode::SUCCESS,
        ),
        Err(err) => (
            serde_json::to_value(ErrorResponse::from(&err))?,
            ExitCode::FAILURE,
        ),
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };
    println!("{rendered}");
    Ok(code)
}
