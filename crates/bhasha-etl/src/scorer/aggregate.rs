//! Folding per-line script-tag scores into per-language confidence.

use std::collections::BTreeMap;

use bhasha_core::model::Language;

use crate::adapters::{LanguageScorer, LineScores};
use crate::error::{AdapterError, AdapterResult};

/// Split lyrics into trimmed, non-empty lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Aggregate line results by taking, per language, the maximum over every
/// line and every script tag of that language.
///
/// Unknown tags and NaN scores are ignored; values are clamped to `[0, 1]`.
pub fn aggregate(lines: &[LineScores]) -> BTreeMap<Language, f64> {
    let mut scores: BTreeMap<Language, f64> = BTreeMap::new();
    for line in lines {
        for (tag, &value) in line {
            let Some(language) = Language::from_tag(tag) else {
                continue;
            };
            if value.is_nan() {
                continue;
            }
            let value = value.clamp(0.0, 1.0);
            scores
                .entry(language)
                .and_modify(|best| *best = best.max(value))
                .or_insert(value);
        }
    }
    scores
}

/// Score a whole lyrics text. Empty text yields empty scores without
/// calling the scorer.
pub async fn score_text(
    scorer: &dyn LanguageScorer,
    text: &str,
) -> AdapterResult<BTreeMap<Language, f64>> {
    let lines = split_lines(text);
    if lines.is_empty() {
        return Ok(BTreeMap::new());
    }
    let results = scorer.score_lines(&lines).await?;
    if results.len() != lines.len() {
        return Err(AdapterError::scorer(format!(
            "expected {} results, got {}",
            lines.len(),
            results.len()
        )));
    }
    Ok(aggregate(&results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(pairs: &[(&str, f64)]) -> LineScores {
        pairs.iter().map(|(t, v)| ((*t).to_string(), *v)).collect()
    }

    #[test]
    fn test_split_lines_drops_blank_lines() {
        assert_eq!(
            split_lines("  Tum hi ho \n\n\t\nAb tum hi ho\r\n"),
            vec!["Tum hi ho", "Ab tum hi ho"]
        );
        assert!(split_lines(" \n \n").is_empty());
    }

    #[test]
    fn test_aggregate_takes_max_over_lines_and_scripts() {
        let scores = aggregate(&[
            line(&[("hin_Latn", 0.6)]),
            line(&[("hin_Deva", 0.9), ("tam_Tamil", 0.3)]),
            line(&[("hin_Latn", 0.2)]),
        ]);
        assert_eq!(scores.get(&Language::Hindi), Some(&0.9));
        assert_eq!(scores.get(&Language::Tamil), Some(&0.3));
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_aggregate_ignores_unknown_and_invalid() {
        let scores = aggregate(&[line(&[
            ("eng_Latn", 0.99),
            ("ben_Beng", 0.8),
            ("tel_Telu", f64::NAN),
            ("kan_Knda", 1.7),
        ])]);
        assert_eq!(scores, BTreeMap::from([(Language::Kannada, 1.0)]));
    }
}
