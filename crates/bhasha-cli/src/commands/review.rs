use anyhow::Result;

use bhasha_core::schema::Database;
use bhasha_etl::Config;

/// List finalized tracks whose confidence landed in the review band.
pub fn show_review(config: &Config) -> Result<()> {
    let thresholds = config.thresholds()?;
    let db = Database::open(&config.database_path)?;
    let records = db.list_needs_review()?;

    if records.is_empty() {
        println!("No tracks are flagged for review");
        return Ok(());
    }

    println!(
        "\n🔎 {} track(s) scored between {} and {}\n",
        records.len(),
        thresholds.review_low(),
        thresholds.review_high()
    );
    for record in records {
        let languages = record
            .classification(&thresholds)
            .review
            .iter()
            .map(|language| format!("{language} {:.2}", record.confidence(*language)))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {}  {} - {}  [{languages}]",
            record.track.id,
            record.track.name,
            record.track.artists_display()
        );
    }
    println!("\nFull list: {}", config.needs_review_csv.display());

    Ok(())
}
