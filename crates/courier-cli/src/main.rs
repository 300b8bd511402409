//! `courier` - drive the task scheduler against scripted collaborators and
//! inspect persisted task records.

mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_core::app::{App, MessageReply, SchedulerBuilder};
use courier_core::config::{CourierConfig, load_config, write_config};
use courier_core::domain::{Task, TaskId};
use courier_core::impls::{FileTaskStore, Script, ScriptedExecutor, ScriptedPlanner};
use courier_core::observability::{QueueCounts, TaskSummary};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Task dispatch with retry, escalation and TTL-bounded lifecycles"
)]
struct Cli {
    /// Path to the TOML config. Missing file means defaults.
    #[arg(long, global = true, env = "COURIER_CONFIG", default_value = "courier.toml")]
    config: PathBuf,

    /// Override `store.dir` from the config.
    #[arg(long, global = true, env = "COURIER_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Log at info level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit every task in a script, run the scheduler until idle, print the results.
    Simulate {
        /// JSON script with tasks, verdicts and canned answers.
        #[arg(long)]
        script: PathBuf,

        /// Use the polling control loop instead of stepping rounds directly.
        #[arg(long)]
        live: bool,
    },
    /// Send a free-text message: simple ones are answered, others become tasks.
    Message {
        text: String,

        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Print the full record of one task as JSON.
    Status { task_id: TaskId },
    /// List tasks, most recent first.
    List,
    /// List dead-lettered tasks.
    DeadLetters,
    /// Print the effective config as TOML.
    Config {
        /// Also write it to the config path.
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli).await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    if let Some(dir) = cli.store_dir {
        config.store.dir = dir;
    }

    match cli.command {
        Command::Simulate { script, live } => cmd_simulate(&config, &script, live).await,
        Command::Message { text, script } => cmd_message(&config, &text, script.as_deref()).await,
        Command::Status { task_id } => cmd_status(&config, task_id).await,
        Command::List => cmd_list(&config).await,
        Command::DeadLetters => cmd_dead_letters(&config).await,
        Command::Config { write } => cmd_config(&config, &cli.config, write),
    }
}

fn read_script(path: &Path) -> Result<Script> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Script::from_json(&raw).with_context(|| format!("parse script {}", path.display()))
}

fn build_app(config: &CourierConfig, script: &Script) -> Result<App> {
    let app = SchedulerBuilder::new()
        .planner(Arc::new(ScriptedPlanner::from_script(script)))
        .executor(Arc::new(ScriptedExecutor::from_script(script)))
        .store(Arc::new(FileTaskStore::new(&config.store.dir)))
        .config(config)
        .build()
        .context("build scheduler")?;
    Ok(app)
}

async fn cmd_simulate(config: &CourierConfig, script_path: &Path, live: bool) -> Result<()> {
    let script = read_script(script_path)?;
    let app = build_app(config, &script)?;

    let recovered = app.scheduler.recover().await.context("recover task records")?;
    if recovered > 0 {
        println!("recovered {recovered} unfinished task(s)");
    }

    let mut submitted = Vec::with_capacity(script.tasks.len());
    for scripted in &script.tasks {
        let (task_id, _) = app
            .service
            .submit(scripted.submission())
            .await
            .with_context(|| format!("submit '{}'", scripted.description))?;
        submitted.push(task_id);
    }
    info!(tasks = submitted.len(), live, "simulation started");

    let counts = if live {
        run_live(&app, config).await
    } else {
        app.scheduler.drain().await
    };

    for task_id in submitted {
        let task = app.service.status(task_id).await?;
        print_summary(&task);
    }
    print_counts(&counts);
    Ok(())
}

async fn run_live(app: &App, config: &CourierConfig) -> QueueCounts {
    let handle = app.scheduler.spawn();
    let poll = config.scheduler.poll_interval().min(Duration::from_millis(50));
    while !app.scheduler.is_idle().await {
        tokio::time::sleep(poll).await;
    }
    handle.shutdown_and_join().await;
    app.scheduler.counts().await
}

async fn cmd_message(config: &CourierConfig, text: &str, script: Option<&Path>) -> Result<()> {
    let script = match script {
        Some(path) => read_script(path)?,
        None => Script::default(),
    };
    let app = build_app(config, &script)?;

    match app.service.handle_message(text).await? {
        MessageReply::Answer { text } => println!("{text}"),
        MessageReply::Queued { task_id } => {
            println!("queued {task_id}");
            app.scheduler.drain().await;
            print_summary(&app.service.status(task_id).await?);
        }
    }
    Ok(())
}

async fn cmd_status(config: &CourierConfig, task_id: TaskId) -> Result<()> {
    let app = build_app(config, &Script::default())?;
    let task = app.service.status(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

async fn cmd_list(config: &CourierConfig) -> Result<()> {
    let app = build_app(config, &Script::default())?;
    for task in app.service.list().await? {
        print_summary(&task);
    }
    Ok(())
}

async fn cmd_dead_letters(config: &CourierConfig) -> Result<()> {
    let app = build_app(config, &Script::default())?;
    for task in app.service.dead_letters().await? {
        print_summary(&task);
        if let Some(error) = &task.last_error {
            println!("    last error: {error}");
        }
    }
    Ok(())
}

fn cmd_config(config: &CourierConfig, path: &Path, write: bool) -> Result<()> {
    if write {
        write_config(path, config).with_context(|| format!("write {}", path.display()))?;
    }
    print!("{}", config.to_toml().context("render config")?);
    Ok(())
}

fn print_summary(task: &Task) {
    let s = TaskSummary::from(task);
    println!(
        "{}  {:<13} {:<9} hops {}/{}{}  {}",
        s.id,
        s.status.as_str(),
        s.mode.to_string(),
        s.hops,
        s.ttl_max,
        if s.escalated { " escalated" } else { "" },
        s.description
    );
}

fn print_counts(counts: &QueueCounts) {
    println!(
        "pending {} processing {} completed {} needs-human {} dead-lettered {}",
        counts.pending,
        counts.processing,
        counts.completed,
        counts.needs_human,
        counts.dead_lettered
    );
}
