use std::sync::Arc;

use clap::{Parser, Subcommand};

use conductor::core::{Project, Task, TaskId, TaskStatus};
use conductor::orchestration::{ClaudeHeadless, Collaborators, Orchestrator, RuntimeFault};
use conductor::state::{FileStore, Persistence, RecoveryReport};
use conductor::util::truncate_chars;
use conductor::{clog, Error, Result};

/// Conductor - turn a project description into a task graph and build it
/// one task at a time
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    CONDUCTOR_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.conductor/conductor.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate a task plan from a natural language description
    Plan {
        prompt: String,

        /// Discard the current project first
        #[arg(long)]
        replace: bool,
    },

    /// Show every task with its status
    Status,

    /// List tasks that can run now
    Ready,

    /// Execute one task, or every ready task with --all
    Run {
        /// Task ID or unique prefix (defaults to the first ready task).
        /// A failed task named here is run again.
        task: Option<String>,

        #[arg(long, conflicts_with = "task")]
        all: bool,
    },

    /// Replace a pending task with smaller subtasks
    Split { task: String },

    /// Change a pending task's title or description
    Edit {
        task: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Manage the project's package list
    Package {
        #[command(subcommand)]
        action: PackageAction,
    },

    /// Report a runtime error and queue a fix task for it
    Fault {
        #[arg(long)]
        message: String,

        #[arg(long, default_value = "")]
        stack: String,
    },

    /// List generated files, or print one
    Files { path: Option<String> },

    /// Show the activity log
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete the current project
    Reset,

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PackageAction {
    Add { name: String },
    Remove { name: String },
    List,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    Show,
    SetCommand { command: String },
    SetModel { model: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    conductor::log::init_with_debug(cli.debug);
    clog!("Conductor command: {:?}", cli.command);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli.command))
}

async fn open_store() -> Result<FileStore> {
    let store = FileStore::default_location()?;
    let config = store.load_config().await?.unwrap_or_default();
    match &config.state_dir {
        Some(_) => Ok(store.with_project_dir(&config.effective_state_dir()?)),
        None => Ok(store),
    }
}

async fn start() -> Result<Orchestrator> {
    let store: Arc<dyn Persistence> = Arc::new(open_store().await?);
    let collaborators = Collaborators::shared(Arc::new(ClaudeHeadless::new()));
    let (orchestrator, report) = Orchestrator::start(collaborators, store).await?;
    if let Some(report) = report {
        print_recovery(&report);
    }
    Ok(orchestrator)
}

async fn dispatch(command: Command) -> Result<()> {
    let command = match command {
        Command::Config { action } => return run_config(action).await,
        other => other,
    };

    let orchestrator = start().await?;
    match command {
        Command::Plan { prompt, replace } => run_plan(&orchestrator, &prompt, replace).await,
        Command::Status => run_status(&orchestrator),
        Command::Ready => run_ready(&orchestrator),
        Command::Run { task, all } => run_tasks(&orchestrator, task, all).await,
        Command::Split { task } => run_split(&orchestrator, &task).await,
        Command::Edit {
            task,
            title,
            description,
        } => {
            let id = resolve_task(&orchestrator, &task)?;
            let task = orchestrator
                .edit_task(&id, title.as_deref(), description.as_deref())
                .await?;
            println!("Updated {}", format_task(&task));
            Ok(())
        }
        Command::Package { action } => run_package(&orchestrator, action).await,
        Command::Fault { message, stack } => {
            let task = orchestrator
                .report_runtime_fault(&RuntimeFault::new(&message, &stack))
                .await?;
            println!("Queued {}", format_task(&task));
            Ok(())
        }
        Command::Files { path } => run_files(&orchestrator, path.as_deref()),
        Command::Log { limit } => run_log(&orchestrator, limit),
        Command::Reset => {
            orchestrator.reset().await?;
            println!("Project deleted.");
            Ok(())
        }
        Command::Config { action } => run_config(action).await,
    }
}

fn print_recovery(report: &RecoveryReport) {
    for warning in &report.warnings {
        eprintln!("recovered: {}", warning);
    }
}

fn resolve_task(orchestrator: &Orchestrator, query: &str) -> Result<TaskId> {
    orchestrator.project()?.tasks.resolve(query)
}

/// Colored status label for terminal output.
fn format_status(status: TaskStatus) -> String {
    match status {
        TaskStatus::Completed => format!("\x1b[32m{}\x1b[0m", status),
        TaskStatus::Failed => format!("\x1b[31m{}\x1b[0m", status),
        TaskStatus::InProgress => format!("\x1b[33m{}\x1b[0m", status),
        TaskStatus::Blocked => format!("\x1b[35m{}\x1b[0m", status),
        TaskStatus::Pending => format!("\x1b[90m{}\x1b[0m", status),
    }
}

fn format_task(task: &Task) -> String {
    format!("{}  {}  [{}]", task.id.short(), task.title, task.agent_role)
}

fn print_summary(project: &Project) {
    println!();
    println!("  Project:     {}", project.name);
    println!("  Tasks:       {}", project.tasks.len());
    println!(
        "  Completed:   {}",
        project.tasks.count_with_status(TaskStatus::Completed)
    );
    println!("  Files:       {}", project.files.len());
    if !project.packages.is_empty() {
        println!("  Packages:    {}", project.packages.join(", "));
    }
    println!();
}

async fn run_plan(orchestrator: &Orchestrator, prompt: &str, replace: bool) -> Result<()> {
    if replace && orchestrator.snapshot().is_some() {
        orchestrator.reset().await?;
    }
    println!("Planning: {}", truncate_chars(prompt, 60));
    let project = orchestrator.generate_plan(prompt).await?;
    print_summary(&project);
    for task in project.tasks.iter() {
        println!("  {}  {}", format_status(task.status), format_task(task));
    }
    Ok(())
}

fn run_status(orchestrator: &Orchestrator) -> Result<()> {
    let project = orchestrator.project()?;
    print_summary(&project);
    for task in project.tasks.iter() {
        println!("  {:<22} {}", format_status(task.status), format_task(task));
        for dep in &task.dependencies {
            let title = project
                .tasks
                .get(dep)
                .map(|t| t.title.as_str())
                .unwrap_or("(missing)");
            println!("        after {}  {}", dep.short(), title);
        }
    }
    Ok(())
}

fn run_ready(orchestrator: &Orchestrator) -> Result<()> {
    orchestrator.project()?;
    let ready = orchestrator.ready_tasks();
    if ready.is_empty() {
        println!("No tasks are ready.");
    }
    for task in &ready {
        println!("  {}", format_task(task));
    }
    Ok(())
}

async fn run_tasks(orchestrator: &Orchestrator, task: Option<String>, all: bool) -> Result<()> {
    if all {
        let summary = orchestrator.run_all().await?;
        println!("Completed {} task(s).", summary.completed.len());
        return Ok(());
    }

    let completed = match task {
        Some(query) => {
            let id = resolve_task(orchestrator, &query)?;
            Some(orchestrator.execute_task(&id).await?)
        }
        None => orchestrator.execute_next().await?,
    };
    match completed {
        Some(task) => println!("Completed {}", format_task(&task)),
        None => println!("No tasks are ready."),
    }
    Ok(())
}

async fn run_split(orchestrator: &Orchestrator, query: &str) -> Result<()> {
    let id = resolve_task(orchestrator, query)?;
    let ids = orchestrator.split_task(&id).await?;
    let project = orchestrator.project()?;
    println!("Split into {} subtasks:", ids.len());
    for id in &ids {
        if let Some(task) = project.tasks.get(id) {
            println!("  {}", format_task(task));
        }
    }
    Ok(())
}

async fn run_package(orchestrator: &Orchestrator, action: PackageAction) -> Result<()> {
    match action {
        PackageAction::Add { name } => {
            if orchestrator.add_package(&name).await? {
                println!("Added {}", name.trim());
            } else {
                println!("{} is already listed", name.trim());
            }
        }
        PackageAction::Remove { name } => {
            if orchestrator.remove_package(&name).await? {
                println!("Removed {}", name.trim());
            } else {
                println!("{} is not listed", name.trim());
            }
        }
        PackageAction::List => {
            for package in &orchestrator.project()?.packages {
                println!("{}", package);
            }
        }
    }
    Ok(())
}

fn run_files(orchestrator: &Orchestrator, path: Option<&str>) -> Result<()> {
    let project = orchestrator.project()?;
    match path {
        Some(path) => {
            let file = project
                .files
                .get(path)
                .ok_or_else(|| Error::Validation(format!("No file at '{}'", path)))?;
            print!("{}", file.content);
        }
        None => {
            for file in project.files.files() {
                println!("  {:<12} {}", file.language, file.path);
            }
        }
    }
    Ok(())
}

fn run_log(orchestrator: &Orchestrator, limit: usize) -> Result<()> {
    let project = orchestrator.project()?;
    for entry in project.activity_log.tail(limit) {
        println!(
            "{}  {:<9}  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.status,
            entry.task_title,
            entry.details.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_config(action: ConfigAction) -> Result<()> {
    let store = FileStore::default_location()?;
    let mut config = store.load_config().await?.unwrap_or_default();
    match action {
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
            println!("# effective command: {}", config.effective_command());
            return Ok(());
        }
        ConfigAction::SetCommand { command } => config.command = Some(command),
        ConfigAction::SetModel { model } => config.model = Some(model),
    }
    store.save_config(&config).await?;
    println!("Saved {}", store.config_path().display());
    Ok(())
}
