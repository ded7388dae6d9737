use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::language::Language;

/// Default confidence at or above which a track joins a language playlist.
pub const DEFAULT_INCLUDE_THRESHOLD: f64 = 0.8;
/// Default lower bound (inclusive) of the review band.
pub const DEFAULT_REVIEW_LOW: f64 = 0.4;
/// Default upper bound (inclusive) of the review band.
pub const DEFAULT_REVIEW_HIGH: f64 = 0.7;

/// Where a single (track, language) confidence lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// Added to the language's playlist and listed in the detected report.
    Included,
    /// Flagged for manual review.
    Review,
    /// Not reported.
    Omitted,
}

/// Confidence thresholds, read-only for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    include: f64,
    review_low: f64,
    review_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            include: DEFAULT_INCLUDE_THRESHOLD,
            review_low: DEFAULT_REVIEW_LOW,
            review_high: DEFAULT_REVIEW_HIGH,
        }
    }
}

impl Thresholds {
    /// Build a validated threshold set.
    ///
    /// All values must lie in `[0, 1]` and satisfy
    /// `review_low <= review_high < include`.
    pub fn new(include: f64, review_low: f64, review_high: f64) -> Result<Self> {
        for (label, value) in [
            ("include_threshold", include),
            ("review_low", review_low),
            ("review_high", review_high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidData(format!(
                    "{label} must be within [0, 1], got {value}"
                )));
            }
        }
        if review_low > review_high {
            return Err(Error::InvalidData(format!(
                "review_low ({review_low}) must not exceed review_high ({review_high})"
            )));
        }
        if review_high >= include {
            return Err(Error::InvalidData(format!(
                "review_high ({review_high}) must be below include_threshold ({include})"
            )));
        }
        Ok(Self {
            include,
            review_low,
            review_high,
        })
    }

    #[must_use]
    pub const fn include(&self) -> f64 {
        self.include
    }

    #[must_use]
    pub const fn review_low(&self) -> f64 {
        self.review_low
    }

    #[must_use]
    pub const fn review_high(&self) -> f64 {
        self.review_high
    }

    /// Place one confidence value in exactly one band.
    #[must_use]
    pub fn band(&self, confidence: f64) -> Band {
        if confidence >= self.include {
            Band::Included
        } else if confidence >= self.review_low && confidence <= self.review_high {
            Band::Review
        } else {
            Band::Omitted
        }
    }

    /// Classify every scored language of a track.
    #[must_use]
    pub fn classify(&self, scores: &BTreeMap<Language, f64>) -> Classification {
        let mut classification = Classification::default();
        for (&language, &confidence) in scores {
            match self.band(confidence) {
                Band::Included => classification.included.push(language),
                Band::Review => classification.review.push(language),
                Band::Omitted => {}
            }
        }
        classification
    }
}

/// The per-language outcome of applying [`Thresholds`] to a score map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Languages whose playlist the track joins, in language order.
    pub included: Vec<Language>,
    /// Languages that put the track in the review band.
    pub review: Vec<Language>,
}

impl Classification {
    #[must_use]
    pub fn needs_review(&self) -> bool {
        !self.review.is_empty()
    }

    #[must_use]
    pub fn is_detected(&self) -> bool {
        !self.included.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.include(), 0.8);
        assert_eq!(t.review_low(), 0.4);
        assert_eq!(t.review_high(), 0.7);
    }

    #[test]
    fn test_band_boundaries_are_inclusive() {
        let t = Thresholds::default();
        assert_eq!(t.band(0.8), Band::Included);
        assert_eq!(t.band(0.7), Band::Review);
        assert_eq!(t.band(0.4), Band::Review);
        assert_eq!(t.band(1.0), Band::Included);
    }

    #[test]
    fn test_band_gaps_are_omitted() {
        let t = Thresholds::default();
        assert_eq!(t.band(0.75), Band::Omitted);
        assert_eq!(t.band(0.79), Band::Omitted);
        assert_eq!(t.band(0.39), Band::Omitted);
        assert_eq!(t.band(0.0), Band::Omitted);
    }

    #[test]
    fn test_bands_partition_unit_interval() {
        let t = Thresholds::default();
        for step in 0..=1000 {
            let c = f64::from(step) / 1000.0;
            let band = t.band(c);
            let expected = if c >= 0.8 {
                Band::Included
            } else if (0.4..=0.7).contains(&c) {
                Band::Review
            } else {
                Band::Omitted
            };
            assert_eq!(band, expected, "confidence {c}");
        }
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Thresholds::new(1.2, 0.4, 0.7).is_err());
        assert!(Thresholds::new(0.8, -0.1, 0.7).is_err());
    }

    #[test]
    fn test_new_rejects_inverted_band() {
        assert!(Thresholds::new(0.8, 0.7, 0.4).is_err());
        assert!(Thresholds::new(0.6, 0.4, 0.7).is_err());
        assert!(Thresholds::new(0.7, 0.4, 0.7).is_err());
    }

    #[test]
    fn test_new_accepts_custom_values() {
        let t = Thresholds::new(0.9, 0.5, 0.6).unwrap();
        assert_eq!(t.band(0.9), Band::Included);
        assert_eq!(t.band(0.8), Band::Omitted);
        assert_eq!(t.band(0.55), Band::Review);
    }

    #[test]
    fn test_classify_multi_language() {
        let t = Thresholds::default();
        let scores = BTreeMap::from([
            (Language::Hindi, 0.85),
            (Language::Tamil, 0.82),
            (Language::Telugu, 0.5),
            (Language::Kannada, 0.1),
        ]);
        let c = t.classify(&scores);
        assert_eq!(c.included, vec![Language::Hindi, Language::Tamil]);
        assert_eq!(c.review, vec![Language::Telugu]);
        assert!(c.is_detected());
        assert!(c.needs_review());
    }

    #[test]
    fn test_classify_empty_scores() {
        let c = Thresholds::default().classify(&BTreeMap::new());
        assert!(!c.is_detected());
        assert!(!c.needs_review());
    }
}
