use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "caltasks", about = "Mirror calendar events as Todoist tasks")]
struct Cli {
    /// Config file (default: configs/configs.toml, then ~/.caltasks/config.toml, then environment)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path (default: ~/.caltasks/caltasks.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Increase logging verbosity (overrides log_level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize calendars into Todoist
    Run {
        /// Run a single pass even if keep_running is set
        #[arg(long)]
        once: bool,
    },
    /// Show recent runs and tracked record counts
    Status {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tracked occurrences
    Records {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which calendar feeds which project
    Calendars,
}

/// Flip the shutdown flag on Ctrl-C or SIGTERM.
fn install_shutdown_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("Shutdown requested, finishing the current run");
        let _ = tx.send(true);
    });
    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let source = caltasks::Config::locate(cli.config.as_deref());
    let config = caltasks::Config::load_from(&source)?;

    let level = match cli.verbose {
        0 => config.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::debug!("Configuration read from {source}");

    let db_path = cli.db.clone().or_else(|| config.database_path.clone());
    let db = match db_path {
        Some(path) => caltasks::Database::open_at(path).await?,
        None => caltasks::Database::open().await?,
    };

    match cli.command {
        Commands::Run { once } => {
            let app = caltasks::CalTasks::connect(config, db)?;
            if once || !app.config().keep_running {
                let report = app.run_once().await?;
                println!("{report}");
            } else {
                let shutdown = install_shutdown_handler();
                app.run_forever(shutdown).await;
            }
        }
        Commands::Status { limit, json } => {
            print_status(&db, limit, json).await?;
        }
        Commands::Records { json } => {
            print_records(&db, json).await?;
        }
        Commands::Calendars => {
            let app = caltasks::CalTasks::connect(config, db)?;
            let bindings = app.calendars().await?;
            if bindings.is_empty() {
                println!("No calendars found.");
            }
            for binding in bindings {
                println!("{}  ->  project {}", binding.calendar_id, binding.project_id);
            }
        }
    }

    Ok(())
}

async fn print_status(db: &caltasks::Database, limit: u32, json: bool) -> anyhow::Result<()> {
    let counts = db.record_counts().await?;
    let runs = db.recent_runs(limit).await?;

    if json {
        let out = serde_json::json!({ "records": counts, "runs": runs });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Sync Status");
    println!("  Tracked:   {}", counts.total);
    println!("  With task: {}", counts.with_task);
    println!("  Completed: {}", counts.completed);
    println!();
    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }
    println!(
        "{:<15} {:<21} {:<8} {:>7} {:>7} {:>9} {:>7}",
        "RUN", "STARTED", "STATUS", "CREATED", "UPDATED", "COMPLETED", "DELETED"
    );
    for run in &runs {
        println!(
            "{:<15} {:<21} {:<8} {:>7} {:>7} {:>9} {:>7}",
            run.run_id, run.started_at, run.status, run.created, run.updated, run.completed, run.deleted
        );
        if let Some(ref error) = run.error {
            println!("  error: {error}");
        }
    }
    Ok(())
}

async fn print_records(db: &caltasks::Database, json: bool) -> anyhow::Result<()> {
    let records = db.list_records().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No tracked occurrences.");
        return Ok(());
    }
    for record in &records {
        let task = record.task_id.as_deref().unwrap_or("-");
        let done = if record.completed { " (done)" } else { "" };
        println!(
            "{:<26} {}[{}]  task {task}{done}",
            record.due_date, record.event_id, record.event_index
        );
    }
    Ok(())
}
