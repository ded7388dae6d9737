//! Unicode-script heuristic scorer.

use async_trait::async_trait;

use crate::adapters::{LanguageScorer, LineScores};
use crate::error::AdapterResult;

/// Native-script blocks and the tag each one is evidence for.
const SCRIPT_BLOCKS: &[(char, char, &str)] = &[
    ('\u{0900}', '\u{097F}', "hin_Deva"),
    ('\u{0B80}', '\u{0BFF}', "tam_Tamil"),
    ('\u{0C00}', '\u{0C7F}', "tel_Telu"),
    ('\u{0C80}', '\u{0CFF}', "kan_Knda"),
    ('\u{0D00}', '\u{0D7F}', "mal_Mlym"),
];

/// Scores a line by the share of its letters written in each Indic script.
///
/// Only recognizes native-script text; romanized lyrics score nothing. Used
/// when no model helper is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptScorer;

impl ScriptScorer {
    pub fn score(line: &str) -> LineScores {
        let mut counts = [0usize; SCRIPT_BLOCKS.len()];
        let mut letters = 0usize;
        for c in line.chars().filter(|c| c.is_alphabetic() || is_combining_mark(*c)) {
            letters += 1;
            if let Some(idx) = SCRIPT_BLOCKS
                .iter()
                .position(|(lo, hi, _)| (*lo..=*hi).contains(&c))
            {
                counts[idx] += 1;
            }
        }

        let mut scores = LineScores::new();
        if letters == 0 {
            return scores;
        }
        for (idx, count) in counts.iter().enumerate() {
            if *count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let share = *count as f64 / letters as f64;
                scores.insert(SCRIPT_BLOCKS[idx].2.to_string(), share);
            }
        }
        scores
    }
}

// Indic vowel signs and viramas are not alphabetic but belong to the word.
fn is_combining_mark(c: char) -> bool {
    SCRIPT_BLOCKS
        .iter()
        .any(|(lo, hi, _)| (*lo..=*hi).contains(&c))
}

#[async_trait]
impl LanguageScorer for ScriptScorer {
    async fn score_lines(&self, lines: &[String]) -> AdapterResult<Vec<LineScores>> {
        Ok(lines.iter().map(|line| Self::score(line)).collect())
    }
}
