//! Language scorers and line aggregation.

pub mod aggregate;
pub mod command;
pub mod script;

use std::sync::Arc;
use std::time::Duration;

pub use aggregate::{aggregate, score_text, split_lines};
pub use command::CommandScorer;
pub use script::ScriptScorer;

use crate::adapters::LanguageScorer;
use crate::config::Config;

/// Build the scorer described by the configuration.
///
/// Uses the external helper when `scorer_command` is set and falls back to
/// the script heuristic otherwise.
pub fn from_config(config: &Config) -> Arc<dyn LanguageScorer> {
    match &config.scorer_command {
        Some(program) => {
            log::info!("Using language scorer command {}", program.display());
            Arc::new(
                CommandScorer::new(
                    program.clone(),
                    config.scorer_args.clone(),
                    Duration::from_secs(config.scorer_timeout_secs),
                )
                .with_model_dir(config.model_dir.clone()),
            )
        }
        None => {
            log::warn!(
                "No scorer_command configured; using the script heuristic (romanized lyrics will not be detected)"
            );
            Arc::new(ScriptScorer)
        }
    }
}
