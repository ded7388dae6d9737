use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::language::Language;
use crate::model::thresholds::{Classification, Thresholds};
use crate::model::track::Track;

/// Processing status of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Observed, not yet scored.
    Pending,
    /// Scored; side effects may be partially applied.
    Scored,
    /// All side effects durably applied. Skipped by later runs.
    Finalized,
    /// Retries exhausted in some run; picked up again by the next one.
    Failed,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Scored, Self::Finalized, Self::Failed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scored => "scored",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidData(format!("unknown status: {s}")))
    }
}

/// What is known about a track's lyrics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "lowercase")]
pub enum Lyrics {
    /// Not fetched yet.
    #[default]
    Pending,
    /// The provider has no lyrics for this track.
    Unavailable,
    /// Fetched lyrics text.
    Found(String),
}

impl Lyrics {
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Lyrics text, if any was found.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Found(text) => Some(text),
            Self::Pending | Self::Unavailable => None,
        }
    }

    #[must_use]
    pub const fn state_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Unavailable => "unavailable",
            Self::Found(_) => "found",
        }
    }
}

/// The persisted classification state of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub track: Track,

    pub status: Status,

    pub lyrics: Lyrics,

    /// Aggregated per-language confidence. Empty when no lyrics were found.
    pub scores: BTreeMap<Language, f64>,

    /// Whether the track was confirmed added to each language's playlist.
    pub playlist_membership: BTreeMap<Language, bool>,

    /// Some language landed in the review band.
    pub needs_review: bool,

    /// Number of runs in which processing this track failed.
    pub attempts: u32,

    /// Message of the most recent failure.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassificationRecord {
    /// A fresh `pending` record for a newly observed track.
    #[must_use]
    pub fn new(track: Track) -> Self {
        let now = Utc::now();
        Self {
            track,
            status: Status::Pending,
            lyrics: Lyrics::Pending,
            scores: BTreeMap::new(),
            playlist_membership: BTreeMap::new(),
            needs_review: false,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.status == Status::Finalized
    }

    /// Confidence for a language, `0.0` when unscored.
    #[must_use]
    pub fn confidence(&self, language: Language) -> f64 {
        self.scores.get(&language).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_member(&self, language: Language) -> bool {
        self.playlist_membership
            .get(&language)
            .copied()
            .unwrap_or(false)
    }

    /// Replace scores (rescoring overwrites) and move to `scored`.
    pub fn record_scores(&mut self, scores: BTreeMap<Language, f64>, thresholds: &Thresholds) {
        self.needs_review = thresholds.classify(&scores).needs_review();
        self.scores = scores;
        self.status = Status::Scored;
        self.touch();
    }

    /// Classification of the current scores.
    #[must_use]
    pub fn classification(&self, thresholds: &Thresholds) -> Classification {
        thresholds.classify(&self.scores)
    }

    /// Record a confirmed playlist membership. Membership is never
    /// downgraded: a track stays in a playlist once added.
    pub fn mark_member(&mut self, language: Language) {
        self.playlist_membership.insert(language, true);
        self.touch();
    }

    /// Fill in `false` for every scored language without confirmed
    /// membership.
    pub fn settle_membership(&mut self) {
        for language in self.scores.keys() {
            self.playlist_membership.entry(*language).or_insert(false);
        }
    }

    /// Demote to `failed` after retries were exhausted.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = Status::Failed;
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.touch();
    }

    /// Mark all side effects applied.
    pub fn mark_finalized(&mut self) {
        self.settle_membership();
        self.status = Status::Finalized;
        self.last_error = None;
        self.touch();
    }

    /// Send a finalized record back for rescoring. Lyrics and confirmed
    /// membership are kept.
    pub fn reopen(&mut self) {
        self.status = Status::Pending;
        self.touch();
    }

    /// Refresh display metadata from a newly enumerated copy of the track.
    pub fn refresh_track(&mut self, track: &Track) {
        if self.track != *track {
            self.track = track.clone();
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
