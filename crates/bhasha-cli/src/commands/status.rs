use anyhow::Result;

use bhasha_core::model::{Language, Status};
use bhasha_core::schema::Database;
use bhasha_etl::Config;

pub fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)?;
    let counts = db.status_counts()?;
    let flagged = db.list_needs_review()?.len();

    println!("\n📊 bhasha status\n");
    println!("  Database: {}", config.database_path.display());
    for status in Status::ALL {
        let count = match status {
            Status::Pending => counts.pending,
            Status::Scored => counts.scored,
            Status::Finalized => counts.finalized,
            Status::Failed => counts.failed,
        };
        println!("  {:<10} {count}", format!("{status}:"));
    }
    println!("  Total:     {}", counts.total());
    println!("  Flagged for review: {flagged}");

    let finalized = db.list_by_status(Status::Finalized)?;
    println!("\n  Playlist members:");
    for language in Language::ALL {
        let members = finalized
            .iter()
            .filter(|record| record.is_member(language))
            .count();
        println!("    {:<10} {members}", language.name());
    }

    if counts.failed > 0 {
        println!("\n  Failed tracks are retried on the next `bhasha run`");
        for record in db.list_by_status(Status::Failed)? {
            println!(
                "    {} '{}' ({} attempt(s)): {}",
                record.track.id,
                record.track.name,
                record.attempts,
                record.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if counts.outstanding() > 0 {
        println!("\n  Run `bhasha run` to process outstanding tracks");
    }

    Ok(())
}
