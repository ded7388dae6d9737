use anyhow::Result;

use bhasha_core::model::Band;
use bhasha_etl::{scorer, Config};

/// Score ad-hoc text with the configured scorer and show each language's band.
pub async fn score_text(config: &Config, text: &str) -> Result<()> {
    let thresholds = config.thresholds()?;
    let model = scorer::from_config(config);
    let scores = scorer::score_text(model.as_ref(), text).await?;

    if scores.is_empty() {
        println!("No supported language detected");
        return Ok(());
    }
    for (language, confidence) in &scores {
        let band = match thresholds.band(*confidence) {
            Band::Included => "include",
            Band::Review => "review",
            Band::Omitted => "-",
        };
        println!("  {:<10} {confidence:.4}  {band}", language.name());
    }
    Ok(())
}
