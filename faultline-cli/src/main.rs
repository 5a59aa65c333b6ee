//! # faultline CLI
//!
//! Runs JSON failure-propagation scenarios against a shared taxonomy.
//!
//! Usage:
//!   faultline run <FILES>... [--json]
//!   faultline check <FILES>...
//!   faultline kinds [FILES]...
//!
//! Examples:
//!   faultline run scenarios/config-fallback.json
//!   faultline -v run scenarios/*.json --json
//!   RUST_LOG=faultline_core=debug faultline run scenarios/cleanup.json

use clap::{Parser, Subcommand};
use faultline_core::{ChainConfig, Plan, Scenario, ScenarioReport, Taxonomy};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(author, version, about = "faultline - classify, unwind, clean up")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log engine decisions (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios, one independent call chain per file
    Run {
        /// Scenario JSON files
        #[arg(required = true)]
        files: Vec<String>,

        /// Print reports as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Validate scenarios without running them
    Check {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Print the kind hierarchy, including kinds declared by FILES
    Kinds { files: Vec<String> },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Load every file and install its kinds, exiting on the first error.
///
/// Installation is serialized here so the taxonomy has a single writer; the
/// chains that run afterwards only read it.
fn load(files: &[String], taxonomy: &Taxonomy) -> Vec<Scenario> {
    let mut scenarios = Vec::with_capacity(files.len());
    for file in files {
        let scenario = match Scenario::from_file(file) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading {}: {}", file, e);
                std::process::exit(1);
            }
        };
        if let Err(e) = scenario.install(taxonomy) {
            eprintln!("Error installing kinds from {}: {}", file, e);
            std::process::exit(1);
        }
        debug!(file = %file, scenario = %scenario.name, "installed");
        scenarios.push(scenario);
    }
    scenarios
}

fn compile(files: &[String], scenarios: &[Scenario], taxonomy: &Taxonomy) -> Vec<Plan> {
    let mut plans = Vec::with_capacity(scenarios.len());
    for (file, scenario) in files.iter().zip(scenarios) {
        match scenario.compile(taxonomy) {
            Ok(plan) => plans.push(plan),
            Err(e) => {
                eprintln!("Error in {}: {}", file, e);
                std::process::exit(1);
            }
        }
    }
    plans
}

async fn run_scenarios(files: &[String], json: bool) {
    let taxonomy = Arc::new(Taxonomy::standard());
    let scenarios = load(files, &taxonomy);
    let plans = compile(files, &scenarios, &taxonomy);
    info!(count = plans.len(), "running scenarios");

    let mut set = JoinSet::new();
    for (index, plan) in plans.into_iter().enumerate() {
        let taxonomy = Arc::clone(&taxonomy);
        set.spawn_blocking(move || (index, plan.run(taxonomy, ChainConfig::default())));
    }

    let mut reports: Vec<(usize, ScenarioReport)> = Vec::with_capacity(files.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("Scenario task failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    reports.sort_by_key(|(index, _)| *index);
    let reports: Vec<ScenarioReport> = reports.into_iter().map(|(_, r)| r).collect();

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing reports: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        for report in &reports {
            println!("{}", report.render());
        }
    }

    let unhandled = reports.iter().filter(|r| r.is_unhandled()).count();
    if !json {
        println!("{} scenario(s), {} unhandled", reports.len(), unhandled);
    }
    if unhandled > 0 {
        std::process::exit(1);
    }
}

fn check_scenarios(files: &[String]) {
    let taxonomy = Taxonomy::standard();
    let scenarios = load(files, &taxonomy);
    let plans = compile(files, &scenarios, &taxonomy);
    for (file, plan) in files.iter().zip(&plans) {
        println!("ok  {} ({})", file, plan.name());
    }
}

fn show_kinds(files: &[String]) {
    let taxonomy = Taxonomy::standard();
    load(files, &taxonomy);
    print!("{}", taxonomy.render_tree());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { files, json } => run_scenarios(&files, json).await,
        Commands::Check { files } => check_scenarios(&files),
        Commands::Kinds { files } => show_kinds(&files),
    }
}
