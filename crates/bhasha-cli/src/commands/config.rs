use anyhow::{Context, Result};
use bhasha_etl::{config, Config};

const SECRET_KEYS: [&str; 3] = [
    "spotify_client_secret",
    "spotify_refresh_token",
    "genius_access_token",
];

fn mask(value: Option<&str>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "<set>",
        _ => "<not set>",
    }
}

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  songs_csv: {}", config.songs_csv.display());
    println!("  needs_review_csv: {}", config.needs_review_csv.display());
    println!(
        "  thresholds: include {}, review {}..={}",
        config.include_threshold, config.review_low, config.review_high
    );
    println!("  playlist_prefix: {}", config.playlist_prefix);
    println!(
        "  scorer_command: {}",
        config
            .scorer_command
            .as_ref()
            .map_or_else(|| "<script heuristic>".to_string(), |p| p.display().to_string())
    );
    println!(
        "  spotify_client_id: {}",
        config.spotify_client_id.as_deref().unwrap_or("<not set>")
    );
    println!(
        "  spotify_client_secret: {}",
        mask(config.spotify_client_secret.as_deref())
    );
    println!(
        "  spotify_refresh_token: {}",
        mask(config.spotify_refresh_token.as_deref())
    );
    println!(
        "  genius_access_token: {}",
        mask(config.genius_access_token.as_deref())
    );
    println!("  genius_delay_ms: {}", config.genius_delay_ms);
    println!("  max_attempts: {}", config.max_attempts);
    println!("  track_order: {:?}", config.track_order);

    println!("\nPriority: CLI args > ENV vars (BHASHA_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value.
pub fn get_config(key: Option<&str>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load()?;
        let value = serde_json::to_value(&config).context("Failed to serialize config")?;
        let entry = value.get(key).ok_or_else(|| {
            let keys = value
                .as_object()
                .map(|o| o.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            anyhow::anyhow!("Unknown config key: {key}\n\nValid keys: {keys}")
        })?;

        if SECRET_KEYS.contains(&key) {
            println!("{}", mask(entry.as_str()));
        } else {
            match entry {
                serde_json::Value::String(s) => println!("{s}"),
                serde_json::Value::Null => println!("<not set>"),
                other => println!("{other}"),
            }
        }
    } else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            print!("{contents}");
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'bhasha config init' to create it.");
        }
    }

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to add your Spotify and Genius credentials.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_secret_values() {
        assert_eq!(mask(Some("abc")), "<set>");
        assert_eq!(mask(Some("")), "<not set>");
        assert_eq!(mask(None), "<not set>");
    }
}
