//! keeld: the Keel daemon.
//!
//! Builds offer requirements for pod instances from a pod specification and
//! the persisted task state, evaluates them against a batch of offers and
//! prints the resulting operations.
//!
//! # Usage
//!
//! ```text
//! keeld init --name kafka
//! keeld plan --pod pod.json --index 0 --tasks broker --offers offers.json --apply
//! keeld set-status --task kafka-0-broker --state running
//! keeld status
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use keel_core::{KeelConfig, Offer, PodInstance, PodInstanceRequirement, PodSpec, TaskState, TaskStatus};
use keel_offer::{EvaluationReport, Operation};
use keel_scheduler::{DefaultOfferRequirementProvider, Planner};
use keel_state::{StateStore, TaskStore};

#[derive(Parser)]
#[command(name = "keeld", about = "Keel daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter keel.toml.
    Init {
        /// Service name.
        #[arg(long)]
        name: String,

        /// Where to write the configuration.
        #[arg(long, default_value = "keel.toml")]
        out: PathBuf,
    },

    /// Build a pod instance's requirement and match it against offers.
    Plan {
        #[arg(long, default_value = "keel.toml")]
        config: PathBuf,

        /// Pod specification (JSON).
        #[arg(long)]
        pod: PathBuf,

        /// Pod instance index.
        #[arg(long, default_value = "0")]
        index: u32,

        /// Tasks to launch; all tasks of the pod when omitted.
        #[arg(long, value_delimiter = ',')]
        tasks: Vec<String>,

        /// Reuse the reservations of previously launched tasks.
        #[arg(long)]
        existing: bool,

        /// Offers to evaluate (JSON array).
        #[arg(long)]
        offers: PathBuf,

        /// Persist launched tasks and their executor.
        #[arg(long)]
        apply: bool,
    },

    /// List persisted tasks and their last status.
    Status {
        #[arg(long, default_value = "keel.toml")]
        config: PathBuf,
    },

    /// Record a status update for a task.
    SetStatus {
        #[arg(long, default_value = "keel.toml")]
        config: PathBuf,

        /// Task instance name, e.g. `kafka-0-broker`.
        #[arg(long)]
        task: String,

        #[arg(long)]
        state: TaskState,

        #[arg(long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,keeld=debug,keel=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { name, out } => init(&name, &out),
        Command::Plan {
            config,
            pod,
            index,
            tasks,
            existing,
            offers,
            apply,
        } => plan(&config, &pod, index, tasks, existing, &offers, apply).await,
        Command::Status { config } => status(&config),
        Command::SetStatus {
            config,
            task,
            state,
            message,
        } => set_status(&config, &task, state, message),
    }
}

fn init(name: &str, out: &Path) -> anyhow::Result<()> {
    if out.exists() {
        anyhow::bail!("{} already exists", out.display());
    }
    let config = KeelConfig::scaffold(name);
    std::fs::write(out, config.to_toml_string()?)?;
    info!(service = name, path = %out.display(), "configuration written");
    Ok(())
}

/// Open the state store under the configured data directory.
fn open_state(config: &KeelConfig) -> anyhow::Result<StateStore> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let state = StateStore::open(&data_dir.join("keel.redb"))?;
    Ok(state)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

async fn plan(
    config_path: &Path,
    pod_path: &Path,
    index: u32,
    tasks: Vec<String>,
    existing: bool,
    offers_path: &Path,
    apply: bool,
) -> anyhow::Result<()> {
    let config = KeelConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let pod: PodSpec = read_json(pod_path)?;
    let offers: Vec<Offer> = read_json(offers_path)?;

    if index >= pod.count {
        anyhow::bail!("pod {} has {} instances, index {index} is out of range", pod.pod_type, pod.count);
    }
    let tasks = if tasks.is_empty() {
        pod.tasks.iter().map(|t| t.name.clone()).collect()
    } else {
        tasks
    };

    let state = open_state(&config)?;
    let provider = DefaultOfferRequirementProvider::new(
        state.clone(),
        config.service.name.clone(),
        config.scheduler.clone(),
    );
    let planner = Planner::new(provider);

    let requirement = PodInstanceRequirement::new(PodInstance::new(pod, index), tasks);
    let report = planner.plan(&requirement, existing, &offers).await?;

    println!("{}", serde_json::to_string_pretty(report.recommendations())?);
    match &report.accepted {
        Some(outcome) => info!(offer = ?report.recommendations().first().map(|r| &r.offer_id), "\n{outcome}"),
        None => {
            for outcome in &report.rejected {
                warn!("offer rejected:\n{outcome}");
            }
        }
    }

    if apply {
        persist(&state, &requirement.pod_instance, &report)?;
    }
    Ok(())
}

/// Record launched tasks and the executor they run under.
fn persist(state: &StateStore, pod_instance: &PodInstance, report: &EvaluationReport) -> anyhow::Result<()> {
    let launched: Vec<_> = report
        .recommendations()
        .iter()
        .filter_map(|r| match &r.operation {
            Operation::Launch {
                task,
                transient: false,
            } => Some(task.clone()),
            _ => None,
        })
        .collect();
    if launched.is_empty() {
        warn!(pod = %pod_instance.name(), "nothing to persist");
        return Ok(());
    }

    state.store_tasks(&launched)?;
    if let Some(executor) = launched.iter().find_map(|t| t.executor.as_ref()) {
        state.store_executor(&pod_instance.name(), executor)?;
    }
    info!(pod = %pod_instance.name(), tasks = launched.len(), "launched tasks persisted");
    Ok(())
}

fn status(config_path: &Path) -> anyhow::Result<()> {
    let config = KeelConfig::from_file(config_path)?;
    let state = open_state(&config)?;

    for task in state.fetch_tasks()? {
        let state_name = match state.fetch_status(&task.name)? {
            Some(status) => format!("{:?}", status.state),
            None => "-".to_string(),
        };
        println!("{:<40} {:<12} {}", task.name, state_name, task.task_id);
    }
    Ok(())
}

fn set_status(
    config_path: &Path,
    task: &str,
    task_state: TaskState,
    message: Option<String>,
) -> anyhow::Result<()> {
    let config = KeelConfig::from_file(config_path)?;
    let state = open_state(&config)?;

    let Some(info) = state.fetch_task(task)? else {
        anyhow::bail!("no task named {task}");
    };
    state.store_status(
        task,
        &TaskStatus {
            task_id: info.task_id,
            state: task_state,
            message,
        },
    )?;
    info!(task, state = ?task_state, "status recorded");
    Ok(())
}
