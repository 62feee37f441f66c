mod config;
mod workers;

use clap::{Parser, Subcommand};
use conductor_agent::{Agent, AgentDescriptor, AgentRegistry};
use conductor_coordinator::{Coordinator, TaskSpec};
use conductor_events::EventChannel;
use config::ConductorFileConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use workers::DemoWorker;

#[derive(Parser)]
#[command(
    name = "conductor",
    about = "Conductor: capability-based task coordination for agents"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured agents and run a batch of tasks
    Run {
        /// JSON array of task specs
        #[arg(long)]
        tasks: PathBuf,
        /// Give up waiting for results after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Parse and validate the config file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ConductorFileConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            tasks,
            timeout_secs,
        } => run(config, &tasks, Duration::from_secs(timeout_secs)).await,
        Commands::Validate => {
            print_summary(&cli.config, &config);
            Ok(())
        }
    }
}

async fn run(config: ConductorFileConfig, tasks: &Path, timeout: Duration) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(tasks).await.map_err(|e| {
        anyhow::anyhow!("Failed to read tasks file '{}': {e}", tasks.display())
    })?;
    let specs: Vec<TaskSpec> = serde_json::from_str(&raw)?;

    let events = Arc::new(EventChannel::new(config.events.history_capacity));
    let registry = Arc::new(AgentRegistry::new());
    for agent in &config.agents {
        let descriptor = AgentDescriptor::new(
            agent.name.as_str(),
            agent.agent_type.as_str(),
            agent.capabilities.iter().map(String::as_str),
            agent.priority,
        );
        let worker = DemoWorker::from_config(agent);
        registry.register(Arc::new(Agent::new(descriptor, worker, events.clone())));
    }

    let coordinator = Coordinator::new(config.coordinator, registry.clone(), events.clone())?;
    coordinator.start();

    for e in registry.start_all().await {
        warn!(error = %e, "Agent did not start");
    }
    info!(agents = registry.len(), tasks = specs.len(), "Submitting tasks");

    let mut submitted = Vec::with_capacity(specs.len());
    for spec in specs {
        let task_type = spec.task_type.clone();
        match coordinator.submit_task(spec, None) {
            Ok(id) => submitted.push(id),
            Err(e) => {
                warn!(task_type = %task_type, error = %e, "Task rejected");
                println!(
                    "{}",
                    serde_json::json!({ "task_type": task_type, "rejected": e.to_string() })
                );
            }
        }
    }

    let deadline = tokio::time::Instant::now() + timeout;
    for id in submitted {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match coordinator.wait_for_result(id, remaining).await {
            Some(result) => println!("{}", serde_json::to_string(&result)?),
            None => {
                let state = coordinator.get_task_status(id);
                warn!(task_id = %id, state = ?state, "No result before timeout");
                println!(
                    "{}",
                    serde_json::json!({ "task_id": id, "state": state, "timed_out": true })
                );
            }
        }
    }

    coordinator.stop();
    for e in registry.shutdown_all(false).await {
        warn!(error = %e, "Agent did not shut down cleanly");
    }

    let stats = coordinator.get_queue_stats();
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        pending = stats.queued + stats.in_progress,
        "Run finished"
    );
    if stats.queued + stats.in_progress > 0 {
        anyhow::bail!("{} task(s) did not finish", stats.queued + stats.in_progress);
    }
    Ok(())
}

fn print_summary(path: &Path, config: &ConductorFileConfig) {
    let c = &config.coordinator;
    println!("Config OK: {}", path.display());
    println!(
        "  coordinator: strategy={} max_queue_size={} max_retries={} poll={}ms",
        c.default_selection_strategy, c.max_queue_size, c.max_retries, c.task_poll_interval_ms
    );
    if !c.capability_map.is_empty() {
        let mut mapped: Vec<_> = c.capability_map.iter().collect();
        mapped.sort();
        for (task_type, capability) in mapped {
            println!("  {task_type} -> {capability}");
        }
    }
    println!("  event history: {}", config.events.history_capacity);
    for agent in &config.agents {
        println!(
            "  agent {} ({}) caps=[{}] priority={} behavior={:?}",
            agent.name,
            agent.agent_type,
            agent.capabilities.join(", "),
            agent.priority,
            agent.behavior
        );
    }
    if config.agents.is_empty() {
        println!("  warning: no agents configured, tasks will stay queued");
    }
}
