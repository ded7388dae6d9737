use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bhasha_core::schema::Database;
use bhasha_etl::genius::GeniusClient;
use bhasha_etl::spotify::{resolve_refresh_token, SpotifyClient, TokenProvider};
use bhasha_etl::{scorer, Adapters, Config, Pipeline, PipelineSettings, Reports, RunOptions};

#[derive(Debug)]
pub struct RunArgs {
    pub limit: Option<usize>,
    pub time_budget_mins: Option<u64>,
    pub reevaluate: bool,
}

/// Wall-clock budget for `--time-budget` minutes; huge values saturate.
fn time_budget(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}

/// Wire the production adapters from configuration.
fn build_adapters(config: &Config) -> Result<Adapters> {
    let client_id = config
        .spotify_client_id
        .clone()
        .context("spotify_client_id is not set (config file or BHASHA_SPOTIFY_CLIENT_ID)")?;
    let client_secret = config
        .spotify_client_secret
        .clone()
        .context("spotify_client_secret is not set (config file or BHASHA_SPOTIFY_CLIENT_SECRET)")?;
    let refresh_token = resolve_refresh_token(
        config.spotify_refresh_token.as_deref(),
        &config.spotify_cache_path,
    )?;
    let genius_token = config
        .genius_access_token
        .clone()
        .context("genius_access_token is not set (config file or BHASHA_GENIUS_ACCESS_TOKEN)")?;

    let spotify = Arc::new(SpotifyClient::new(TokenProvider::new(
        client_id,
        client_secret,
        refresh_token,
    ))?);
    let genius = GeniusClient::new(genius_token, config.genius_delay())?;

    Ok(Adapters {
        source: Arc::<SpotifyClient>::clone(&spotify),
        lyrics: Arc::new(genius),
        scorer: scorer::from_config(config),
        sink: spotify,
    })
}

/// Execute one pipeline run and print its summary.
///
/// A fatal error still prints the partial summary before failing.
pub async fn run_pipeline(config: &Config, args: RunArgs) -> Result<()> {
    let settings = PipelineSettings::from_config(config)?;
    let adapters = build_adapters(config)?;
    let store = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open state store {}", config.database_path.display())
    })?;
    let reports = Reports::open(&config.songs_csv, &config.needs_review_csv)?;

    println!("\n🎧 bhasha run\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Reports: {}, {}", config.songs_csv.display(), config.needs_review_csv.display());
    println!(
        "  Thresholds: include >= {}, review {}..={}",
        settings.thresholds.include(),
        settings.thresholds.review_low(),
        settings.thresholds.review_high()
    );
    println!();

    let options = RunOptions {
        limit: args.limit,
        time_budget: args.time_budget_mins.map(time_budget),
        reevaluate: args.reevaluate,
        ..RunOptions::default()
    };

    let stop = Arc::clone(&options.stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after the current track");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let mut pipeline = Pipeline::new(store, reports, adapters, settings);
    match pipeline.run(&options).await {
        Ok(summary) => {
            println!("\n{summary}");
            println!("\n✓ Run complete");
            if summary.flagged > 0 {
                println!("  Run 'bhasha review' to see tracks flagged for review");
            }
            Ok(())
        }
        Err(failure) => {
            println!("\n{}", failure.summary);
            Err(anyhow::Error::new(failure.error).context(
                "Run aborted; finalized tracks are kept and the next run resumes from here",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_budget_converts_minutes() {
        assert_eq!(time_budget(0), Duration::ZERO);
        assert_eq!(time_budget(90), Duration::from_secs(5400));
    }

    #[test]
    fn test_time_budget_saturates_instead_of_overflowing() {
        assert_eq!(time_budget(u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(time_budget(u64::MAX / 60 + 1), Duration::from_secs(u64::MAX));
    }
}
