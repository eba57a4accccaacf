use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleet_dispatch::{
    init_telemetry, AgentPool, FleetConfig, Location, ShutdownCoordinator, ShutdownReason,
};

/// Destinations dispatched when none are given on the command line
const DEFAULT_DESTINATIONS: [Location; 6] = [
    Location::new(-2, -3),
    Location::new(-2, 2),
    Location::new(3, -7),
    Location::new(7, 4),
    Location::new(5, -1),
    Location::new(-3, -6),
];

/// Coordinate range of `--random` destinations
const RANDOM_SPAN: i64 = 10;

#[derive(Parser)]
#[command(name = "fleet-dispatch")]
#[command(about = "Dispatch destination tasks to a simulated fleet of mobile agents")]
#[command(long_about = "Each destination goes to the available agent with the fewest moves \
                       to reach it (diagonal moves allowed), ties broken by lower priority. \
                       Agents walk one unit step at a time and report progress on stdout.")]
struct Cli {
    /// Configuration file (defaults to ./fleet-dispatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fleet until every destination is reached
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Number of agents in the fleet
    #[arg(long)]
    agents: Option<usize>,
    /// Comma-separated priority per agent, lower wins ties
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    priorities: Vec<i64>,
    /// Pause after every unit step, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Fail a submission when no agent frees up within this many milliseconds
    #[arg(long)]
    submit_timeout_ms: Option<u64>,
    /// Destination as `x,y`; repeat for several tasks
    #[arg(long = "to", allow_hyphen_values = true)]
    destinations: Vec<Location>,
    /// Dispatch this many random destinations instead
    #[arg(long, conflicts_with = "destinations")]
    random: Option<usize>,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
    /// Cancel remaining moves after this many seconds
    #[arg(long)]
    grace_secs: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    FleetConfig::load_env_file()?;
    let config = match &cli.config {
        Some(path) => FleetConfig::load_from(path)?,
        None => FleetConfig::load()?,
    };

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(Commands::Run(args)) => {
            tokio::runtime::Runtime::new()?.block_on(async { run_command(config, args).await })
        }
        None => tokio::runtime::Runtime::new()?
            .block_on(async { run_command(config, RunArgs::default()).await }),
    }
}

async fn run_command(mut config: FleetConfig, args: RunArgs) -> Result<()> {
    if let Some(agents) = args.agents {
        config.agents.count = agents;
        if args.priorities.is_empty() && config.agents.priorities.len() != agents {
            config.agents.priorities.clear();
        }
        if config.agents.start_positions.len() != agents {
            config.agents.start_positions.clear();
        }
    }
    if !args.priorities.is_empty() {
        config.agents.priorities = args.priorities;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.dispatch.step_delay_ms = delay_ms;
    }
    if args.submit_timeout_ms.is_some() {
        config.dispatch.submit_timeout_ms = args.submit_timeout_ms;
    }

    init_telemetry(&config.observability.log_level, config.observability.json_logs)?;

    let destinations = match args.random {
        Some(count) => random_destinations(count),
        None if args.destinations.is_empty() => DEFAULT_DESTINATIONS.to_vec(),
        None => args.destinations,
    };

    let pool = Arc::new(AgentPool::from_config(&config).context("invalid fleet configuration")?);
    let mut events = pool.subscribe();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
                }
            } else {
                println!("{event}");
            }
        }
    });

    pool.start(config.dispatch.step_delay());

    let submitter = Arc::clone(&pool);
    let report = ShutdownCoordinator::new(Arc::clone(&pool))
        .with_grace(args.grace_secs.map(Duration::from_secs))
        .run(async move {
            for destination in destinations {
                if let Err(e) = submitter.submit(destination).await {
                    tracing::warn!(error = %e, destination = %destination, "Destination not dispatched");
                }
            }
        })
        .await?;

    // Last pool handle gone: the event stream closes and the printer drains
    drop(pool);
    printer.await.context("event printer task failed")?;

    let reason = match report.reason {
        ShutdownReason::Drained => "drained",
        ShutdownReason::Signal => "interrupted",
        ShutdownReason::GraceExpired => "grace period expired",
    };
    println!(
        "fleet stopped ({reason}): {} completed, {} cancelled, {} rejected, {} steps",
        report.tasks.completed, report.tasks.cancelled, report.tasks.rejected, report.stats.steps
    );
    Ok(())
}

fn random_destinations(count: usize) -> Vec<Location> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            Location::new(
                rng.random_range(-RANDOM_SPAN..=RANDOM_SPAN),
                rng.random_range(-RANDOM_SPAN..=RANDOM_SPAN),
            )
        })
        .collect()
}
