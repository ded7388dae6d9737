use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use bhasha_etl::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "bhasha", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the state store (default: ~/.local/share/bhasha/bhasha.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Classify Liked Songs and add them to language playlists
    ///
    /// Enumerates the saved-track library, fetches lyrics from Genius,
    /// scores them with the configured language scorer and adds each track
    /// to the playlist of every language it clears the include threshold
    /// for ("Indian Collection - Hindi" and so on). Borderline tracks are
    /// written to the needs-review report instead.
    ///
    /// Runs are resumable: every finalized track is skipped next time, so
    /// an interrupted run (Ctrl-C, --limit, --time-budget-mins or a crash)
    /// picks up where it stopped. Tracks whose lookups kept failing are
    /// marked failed and retried on the next run.
    ///
    /// Reports: indian_songs.csv and needs_review.csv (see `bhasha config`).
    Run {
        /// Process at most this many tracks that are not yet finalized
        #[arg(long)]
        limit: Option<usize>,

        /// Stop starting new tracks after this many minutes
        #[arg(long)]
        time_budget_mins: Option<u64>,

        /// Re-score finalized tracks with stored lyrics and rebuild the reports
        #[arg(long)]
        reevaluate: bool,

        /// Override the include threshold
        #[arg(long)]
        include_threshold: Option<f64>,

        /// Override the lower bound of the review band
        #[arg(long)]
        review_low: Option<f64>,

        /// Override the upper bound of the review band
        #[arg(long)]
        review_high: Option<f64>,
    },
    /// Show how many tracks are in each state
    Status,
    /// List finalized tracks flagged for manual review
    Review,
    /// Rebuild both CSV reports from the state store
    Export,
    /// Score a piece of text with the configured scorer
    Score {
        /// Text to score, one lyric line per line
        text: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print one configuration value, or the config file when no key is given
    Get { key: Option<String> },
    /// Print the config file path
    Path,
    /// Print an example configuration
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Get { key } => commands::config::get_config(key.as_deref()),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
        };
    }

    let mut config = match cli.db {
        Some(db) => Config::load_with_db_path(db)?,
        None => Config::load()?,
    };

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Run {
            limit,
            time_budget_mins,
            reevaluate,
            include_threshold,
            review_low,
            review_high,
        } => {
            if let Some(value) = include_threshold {
                config.include_threshold = value;
            }
            if let Some(value) = review_low {
                config.review_low = value;
            }
            if let Some(value) = review_high {
                config.review_high = value;
            }
            let args = commands::run::RunArgs {
                limit,
                time_budget_mins,
                reevaluate,
            };
            commands::run_pipeline(&config, args).await?;
        }
        Commands::Status => commands::show_status(&config)?,
        Commands::Review => commands::show_review(&config)?,
        Commands::Export => commands::export_reports(&config)?,
        Commands::Score { text } => commands::score_text(&config, &text).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
