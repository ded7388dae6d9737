//! Genius lyrics provider.
//!
//! Searches the Genius API for `"{title} {artist}"`, picks the best song
//! hit and scrapes lyrics from the song page. Requests are spaced by the
//! configured delay.

pub mod html;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use bhasha_core::model::Track;

use crate::adapters::LyricsProvider;
use crate::error::{retry_after, AdapterError, AdapterResult};
use crate::resilience::RateLimiter;

const GENIUS_API_BASE: &str = "https://api.genius.com";
const SOURCE_NAME: &str = "Genius";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "type")]
    kind: String,
    result: SongResult,
}

#[derive(Debug, Clone, Deserialize)]
struct SongResult {
    title: String,
    url: String,
    primary_artist: PrimaryArtist,
}

#[derive(Debug, Clone, Deserialize)]
struct PrimaryArtist {
    name: String,
}

/// Lowercase alphanumerics only, for loose title/artist comparison.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Pick the song hit that best matches the track.
///
/// Preference: same title and artist, then same artist, then the first
/// song hit.
fn best_hit(hits: Vec<SearchHit>, title: &str, artist: Option<&str>) -> Option<SongResult> {
    let title = normalize(title);
    let artist = artist.map(normalize).unwrap_or_default();
    let songs: Vec<SongResult> = hits
        .into_iter()
        .filter(|hit| hit.kind == "song")
        .map(|hit| hit.result)
        .collect();

    let artist_matches = |song: &SongResult| {
        let candidate = normalize(&song.primary_artist.name);
        !artist.is_empty() && (candidate.contains(&artist) || artist.contains(&candidate))
    };

    songs
        .iter()
        .find(|song| normalize(&song.title) == title && artist_matches(song))
        .or_else(|| songs.iter().find(|song| artist_matches(song)))
        .or_else(|| songs.first())
        .cloned()
}

/// Genius API client.
///
/// Wraps an HTTP client, an access token, and a rate limiter.
#[derive(Debug, Clone)]
pub struct GeniusClient {
    http: Client,
    access_token: String,
    rate_limiter: RateLimiter,
}

impl GeniusClient {
    /// Create a new Genius client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(access_token: String, delay: Duration) -> AdapterResult<Self> {
        Ok(Self {
            http: Client::builder()
                .user_agent("bhasha/0.1.0 (https://github.com/oxur/bhasha)")
                .timeout(Duration::from_secs(30))
                .build()?,
            access_token,
            rate_limiter: RateLimiter::with_interval(delay),
        })
    }

    async fn search(&self, query: &str) -> AdapterResult<Vec<SearchHit>> {
        self.rate_limiter.acquire().await;

        let response = self
            .http
            .get(format!("{GENIUS_API_BASE}/search"))
            .bearer_auth(&self.access_token)
            .query(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(SOURCE_NAME, status, &body).with_retry_after(wait));
        }

        let result: SearchResponse = response.json().await.map_err(|e| AdapterError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;
        Ok(result.response.hits)
    }

    async fn song_page(&self, url: &str) -> AdapterResult<String> {
        self.rate_limiter.acquire().await;

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            // Song pages need no credentials; a refusal here is bot
            // protection, not an expired token.
            return Err(AdapterError::Rejected {
                source_name: SOURCE_NAME.to_string(),
                status: status.as_u16(),
                message: format!("song page {url} refused"),
            });
        }
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(SOURCE_NAME, status, &body).with_retry_after(wait));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl LyricsProvider for GeniusClient {
    async fn fetch(&self, track: &Track) -> AdapterResult<String> {
        let artist = track.primary_artist();
        let query = match artist {
            Some(artist) => format!("{} {artist}", track.name),
            None => track.name.clone(),
        };
        let not_found = || AdapterError::NotFound {
            entity: format!("lyrics for '{query}'"),
            source_name: SOURCE_NAME.to_string(),
        };

        let hits = self.search(&query).await?;
        let song = best_hit(hits, &track.name, artist).ok_or_else(not_found)?;
        log::debug!(
            "Genius match for '{query}': {} by {}",
            song.title,
            song.primary_artist.name
        );

        let page = self.song_page(&song.url).await?;
        html::extract_lyrics(&page).ok_or_else(not_found)
    }
}
