use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::TrackId;

/// A track from the user's saved library.
///
/// Discovered by the track source and immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,

    /// Track title.
    pub name: String,

    /// Credited artists, primary artist first.
    pub artists: Vec<String>,

    /// When the user saved the track.
    pub added_at: DateTime<Utc>,
}

impl Track {
    #[must_use]
    pub fn new(
        id: impl Into<TrackId>,
        name: impl Into<String>,
        artists: Vec<String>,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artists,
            added_at,
        }
    }

    /// The first credited artist, used for lyrics lookups.
    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// Artists joined for display and reports.
    #[must_use]
    pub fn artists_display(&self) -> String {
        self.artists.join(", ")
    }

    /// `added_at` truncated to seconds, as written to reports.
    #[must_use]
    pub fn added_at_display(&self) -> String {
        self.added_at.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Track {
        Track::new(
            "t1",
            "Kun Faya Kun",
            vec!["A.R. Rahman".to_string(), "Javed Ali".to_string()],
            Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap(),
        )
    }

    #[test]
    fn test_primary_artist() {
        assert_eq!(sample().primary_artist(), Some("A.R. Rahman"));

        let mut track = sample();
        track.artists.clear();
        assert_eq!(track.primary_artist(), None);
    }

    #[test]
    fn test_artists_display() {
        assert_eq!(sample().artists_display(), "A.R. Rahman, Javed Ali");
    }

    #[test]
    fn test_added_at_display_has_second_precision() {
        assert_eq!(sample().added_at_display(), "2021-03-04T05:06:07");
    }
}
