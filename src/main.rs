use clap::{Parser, Subcommand};
use kodo_lib::commands::{board, history, settings};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kodo")]
#[command(author, version, about = "Kanban board for the TODO comments in your code")]
struct Cli {
    /// Project directory to scan
    #[arg(long, short = 'p', global = true, default_value = ".")]
    project: PathBuf,

    /// Config directory, relative to the project
    #[arg(long, global = true, default_value = settings::DEFAULT_CONFIG_DIR)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the project and list items
    Scan,
    /// Move an item (by scan ID) to a column
    Move { id: usize, column: String },
    /// Project statistics from the latest history save
    Stats,
    /// Recorded snapshots, newest first
    History,
    /// Items added, removed and moved between the last two snapshots
    Changes,
    /// Per-column counts and completion rate over all snapshots
    Trends,
    /// Column deltas against the previous commit
    Compare,
    /// Drop snapshots older than 30 days
    Cleanup,
    /// Show settings, or merge a partial JSON document into them
    Settings {
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let project = cli.project.to_string_lossy().to_string();

    if let Commands::Settings { set } = &cli.command {
        let current = match set {
            Some(raw) => {
                let patch = serde_json::from_str(raw).map_err(|e| format!("INVALID_JSON: {e}"))?;
                settings::save_settings(project, cli.config.clone(), patch).await?
            }
            None => settings::get_settings(project, cli.config.clone()).await?,
        };
        return print_json(&current);
    }

    let board = board::open_board(project, cli.config.clone()).await?;
    match cli.command {
        Commands::Scan => print_json(&board::get_items(&board).await?),
        Commands::Move { id, column } => print_json(&board::update_item_status(&board, id, column).await?),
        Commands::Stats => print_json(&history::get_stats(&board).await?),
        Commands::History => print_json(&history::get_stats_history(&board).await?),
        Commands::Changes => print_json(&history::get_item_changes(&board).await?),
        Commands::Trends => print_json(&history::get_item_trends(&board).await?),
        Commands::Compare => print_json(&history::compare_stats(&board).await?),
        Commands::Cleanup => print_json(&history::cleanup_stats(&board).await?),
        Commands::Settings { .. } => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("SERIALIZE_FAILED: {e}"))?;
    println!("{out}");
    Ok(())
}
