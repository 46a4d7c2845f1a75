use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "taskstreak", version, about = "Daily checklists with timezone-aware streaks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a user's checklist and streak
    Status {
        user: String,
        /// Print the full status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Checklist operations
    Tasks {
        #[command(subcommand)]
        action: commands::tasks::TasksAction,
    },
    /// Set a user's IANA timezone (e.g. "America/New_York")
    Timezone { user: String, zone: String },
    /// Evaluate the daily reset for every user once
    Sweep,
    /// Keep running and reset each user at their local midnight
    Watch {
        /// Override the configured scheduler mode
        #[arg(long, value_enum)]
        mode: Option<commands::schedule::WatchMode>,
    },
    /// Task reminders
    Remind {
        #[command(subcommand)]
        action: commands::remind::RemindAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions { shell: clap_complete::Shell },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status { user, json } => commands::status::run(&user, json).await,
        Commands::Tasks { action } => commands::tasks::run(action).await,
        Commands::Timezone { user, zone } => commands::timezone::run(&user, &zone).await,
        Commands::Sweep => commands::schedule::sweep().await,
        Commands::Watch { mode } => commands::schedule::watch(mode).await,
        Commands::Remind { action } => commands::remind::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "taskstreak", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
