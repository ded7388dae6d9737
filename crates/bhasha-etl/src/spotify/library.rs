//! Saved-track enumeration (`GET /me/tracks`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use bhasha_core::model::Track;

use crate::adapters::{TrackPage, TrackSource};
use crate::error::{AdapterError, AdapterResult};

use super::{SpotifyClient, SOURCE_NAME};

/// Largest page the endpoint accepts.
const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct SavedTracksPage {
    items: Vec<SavedTrackItem>,
    #[serde(default)]
    next: Option<String>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct SavedTrackItem {
    added_at: String,
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    /// Absent for local files.
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

fn parse_offset(cursor: Option<&str>) -> AdapterResult<usize> {
    cursor.map_or(Ok(0), |c| {
        c.parse().map_err(|_| AdapterError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: format!("invalid page cursor '{c}'"),
        })
    })
}

fn parse_added_at(value: &str) -> AdapterResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AdapterError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: format!("invalid added_at '{value}': {e}"),
        })
}

/// Convert one API page into tracks plus the next offset cursor.
fn to_track_page(page: SavedTracksPage, offset: usize) -> AdapterResult<TrackPage> {
    let fetched = page.items.len();
    let mut tracks = Vec::with_capacity(fetched);
    for item in page.items {
        let Some(track) = item.track else {
            continue;
        };
        let Some(id) = track.id else {
            log::debug!("Skipping local file '{}'", track.name);
            continue;
        };
        tracks.push(Track::new(
            id,
            track.name,
            track.artists.into_iter().map(|a| a.name).collect(),
            parse_added_at(&item.added_at)?,
        ));
    }

    let next_offset = offset + fetched;
    let next = (page.next.is_some() && fetched > 0 && next_offset < page.total)
        .then(|| next_offset.to_string());
    Ok(TrackPage {
        tracks,
        next,
        total: Some(page.total),
    })
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn page(&self, cursor: Option<&str>) -> AdapterResult<TrackPage> {
        let offset = parse_offset(cursor)?;
        let page: SavedTracksPage = self
            .get_json(
                "/me/tracks",
                &[
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        to_track_page(page, offset)
    }
}
