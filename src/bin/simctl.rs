//! Attack simulation CLI
//!
//! Lists the available simulators or runs one and prints its result as JSON.

use std::time::Duration;

use attack_sim::scheduler::{Scheduler, SchedulerConfig, TaskStatus};
use attack_sim::simulation::Registry;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simctl")]
#[command(about = "Run cryptographic attack simulations")]
#[command(version)]
struct Cli {
    /// Number of worker threads
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Seconds finished tasks are retained
    #[arg(long, default_value = "3600")]
    retention_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the simulator catalog
    List,

    /// Run one simulation and print its result
    Run {
        /// Simulator id, e.g. hastad-attack or cbc-padding-oracle
        simulator: String,

        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Execute on the calling thread instead of the scheduler
        #[arg(long)]
        inline: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,

        /// Also print every recorded step
        #[arg(long)]
        steps: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List => {
            let catalog = Registry::builtin().list();
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }

        Commands::Run {
            simulator,
            params,
            inline,
            timeout_secs,
            steps,
        } => {
            let params: Value = serde_json::from_str(&params)?;

            let result = if inline {
                let registry = Registry::builtin();
                let sim = registry
                    .get(&simulator)
                    .ok_or_else(|| format!("unknown simulator: {simulator}"))?;
                sim.run(&params)?
            } else {
                let config = SchedulerConfig::new()
                    .with_workers(cli.workers)
                    .with_retention(Duration::from_secs(cli.retention_secs));
                let scheduler = Scheduler::new(config)?;

                let id = scheduler.submit(&simulator, &params)?;
                let task = scheduler.wait(&id, Duration::from_secs(timeout_secs))?;

                if task.status != TaskStatus::Completed {
                    scheduler.cancel(&id)?;
                    println!("{}", serde_json::to_string_pretty(&scheduler.get_status(&id)?)?);
                    return Err(format!("task {id} ended as {}", task.status).into());
                }

                scheduler.get_result(&id)?.as_ref().clone()
            };

            let mut out = json!({
                "primary_output": result.primary_output,
                "visualization_data": result.visualization_data,
            });
            if steps {
                out["steps"] = serde_json::to_value(&result.steps)?;
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
