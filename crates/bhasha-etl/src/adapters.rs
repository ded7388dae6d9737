//! Capability traits for the external services the pipeline talks to.
//!
//! Each trait has a production implementation (Spotify, Genius, the
//! IndicLID helper) and is held as `Arc<dyn ...>` by the pipeline so tests
//! can substitute in-memory doubles.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bhasha_core::model::{PlaylistId, Track, TrackId};

use crate::error::{AdapterError, AdapterResult};
use crate::resilience::RetryPolicy;

/// One page of the saved-track library.
#[derive(Debug, Clone, Default)]
pub struct TrackPage {
    pub tracks: Vec<Track>,
    /// Cursor of the following page, `None` on the last page.
    pub next: Option<String>,
    /// Total library size, when the source reports it.
    pub total: Option<usize>,
}

/// Paginated access to a user's saved tracks.
#[async_trait]
pub trait TrackSource: Send + Sync + fmt::Debug {
    /// Fetch the page at `cursor` (`None` for the first page).
    async fn page(&self, cursor: Option<&str>) -> AdapterResult<TrackPage>;
}

/// Lyrics lookup by track metadata.
///
/// A track without lyrics is reported as [`AdapterError::NotFound`].
#[async_trait]
pub trait LyricsProvider: Send + Sync + fmt::Debug {
    async fn fetch(&self, track: &Track) -> AdapterResult<String>;
}

/// Per-line scores keyed by script tag (e.g. `hin_Latn`).
pub type LineScores = BTreeMap<String, f64>;

/// A black-box language-identification model.
#[async_trait]
pub trait LanguageScorer: Send + Sync + fmt::Debug {
    /// Score a batch of non-empty lines, one result per line in order.
    async fn score_lines(&self, lines: &[String]) -> AdapterResult<Vec<LineScores>>;

    /// Score a single line.
    async fn score_line(&self, line: &str) -> AdapterResult<LineScores> {
        self.score_lines(&[line.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AdapterError::scorer("scorer returned no result"))
    }
}

/// A playlist found or created by a [`PlaylistSink`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistHandle {
    pub id: PlaylistId,
    pub name: String,
}

/// Destination playlists.
#[async_trait]
pub trait PlaylistSink: Send + Sync + fmt::Debug {
    /// Find a playlist by exact name, creating it when missing.
    async fn ensure_playlist(&self, name: &str) -> AdapterResult<PlaylistHandle>;

    /// Add a track to a playlist unless it is already there.
    ///
    /// Returns whether an add happened.
    async fn ensure_member(
        &self,
        playlist: &PlaylistHandle,
        track_id: &TrackId,
    ) -> AdapterResult<bool>;
}

/// Processing order of the enumerated library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl TrackOrder {
    /// Sort tracks by `added_at`, breaking ties by id.
    pub fn sort(self, tracks: &mut [Track]) {
        tracks.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if self == Self::NewestFirst {
            tracks.reverse();
        }
    }
}

impl FromStr for TrackOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest-first" => Ok(Self::OldestFirst),
            "newest-first" => Ok(Self::NewestFirst),
            other => Err(format!(
                "unknown track order '{other}' (expected oldest-first or newest-first)"
            )),
        }
    }
}

/// Walk every page of `source`, retrying each page on transient errors.
///
/// Duplicate ids are collapsed (first occurrence wins) and the result is
/// sorted by `order`.
pub async fn enumerate_tracks(
    source: &dyn TrackSource,
    retry: &RetryPolicy,
    order: TrackOrder,
) -> AdapterResult<Vec<Track>> {
    let mut tracks = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = retry
            .run("fetch saved tracks", || source.page(cursor.as_deref()))
            .await?;
        pages += 1;
        if let Some(total) = page.total {
            log::debug!("Fetched page {pages} ({} of {total} tracks)", tracks.len());
        }
        for track in page.tracks {
            if seen.insert(track.id.clone()) {
                tracks.push(track);
            } else {
                log::debug!("Skipping duplicate track {}", track.id);
            }
        }
        match page.next {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            Some(next) => {
                log::warn!("Track source returned the same cursor twice ({next}); stopping");
                break;
            }
            None => break,
        }
    }

    order.sort(&mut tracks);
    log::info!("Enumerated {} saved tracks in {pages} page(s)", tracks.len());
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn track(id: &str, day: u32) -> Track {
        Track::new(
            id,
            id.to_uppercase(),
            vec!["Artist".to_string()],
            Utc.with_ymd_and_hms(2021, 3, day, 0, 0, 0).unwrap(),
        )
    }

    #[derive(Debug)]
    struct PagedSource {
        pages: Vec<Vec<Track>>,
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TrackSource for PagedSource {
        async fn page(&self, cursor: Option<&str>) -> AdapterResult<TrackPage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures_before_success {
                return Err(AdapterError::Http {
                    source_name: "test".to_string(),
                    message: "502".to_string(),
                });
            }
            let index: usize = cursor.map_or(0, |c| c.parse().unwrap());
            let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(TrackPage {
                tracks: self.pages[index].clone(),
                next,
                total: Some(self.pages.iter().map(Vec::len).sum()),
            })
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_enumerate_dedups_and_sorts_oldest_first() {
        let source = PagedSource {
            pages: vec![
                vec![track("c", 3), track("a", 1)],
                vec![track("b", 2), track("a", 1)],
            ],
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        };
        let tracks = enumerate_tracks(&source, &quick_retry(), TrackOrder::OldestFirst)
            .await
            .unwrap();
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_enumerate_newest_first() {
        let source = PagedSource {
            pages: vec![vec![track("a", 1), track("b", 2)]],
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        };
        let tracks = enumerate_tracks(&source, &quick_retry(), TrackOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(tracks[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_enumerate_retries_pages() {
        let source = PagedSource {
            pages: vec![vec![track("a", 1)]],
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };
        let tracks = enumerate_tracks(&source, &quick_retry(), TrackOrder::OldestFirst)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn test_same_timestamp_ties_break_by_id() {
        let mut tracks = vec![track("b", 1), track("a", 1)];
        TrackOrder::OldestFirst.sort(&mut tracks);
        assert_eq!(tracks[0].id.as_str(), "a");
    }

    #[test]
    fn test_track_order_parse() {
        assert_eq!("newest-first".parse::<TrackOrder>(), Ok(TrackOrder::NewestFirst));
        assert!("random".parse::<TrackOrder>().is_err());
    }
}
