use anyhow::Result;

use bhasha_core::schema::Database;
use bhasha_etl::{Config, Reports};

/// Rewrite both reports from the finalized records in the store.
pub fn export_reports(config: &Config) -> Result<()> {
    let thresholds = config.thresholds()?;
    let db = Database::open(&config.database_path)?;
    let mut reports = Reports::open(&config.songs_csv, &config.needs_review_csv)?;

    let summary = reports.export(&db, &thresholds)?;

    println!(
        "✓ Wrote {} detected track(s) to {}",
        summary.detected,
        config.songs_csv.display()
    );
    println!(
        "✓ Wrote {} review track(s) to {}",
        summary.review,
        config.needs_review_csv.display()
    );
    Ok(())
}
