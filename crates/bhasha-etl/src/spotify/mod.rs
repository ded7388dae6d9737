//! Spotify Web API client.
//!
//! Serves as both the [`TrackSource`] (the user's saved tracks) and the
//! [`PlaylistSink`] (per-language playlists).
//!
//! [`TrackSource`]: crate::adapters::TrackSource
//! [`PlaylistSink`]: crate::adapters::PlaylistSink

pub mod auth;
pub mod library;
pub mod playlists;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::error::{retry_after, AdapterError, AdapterResult};
use crate::resilience::RateLimiter;

pub use auth::{resolve_refresh_token, TokenProvider};

use playlists::MembershipCache;

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

pub(crate) const SOURCE_NAME: &str = "Spotify";

/// Spotify Web API client.
///
/// Wraps an HTTP client, a token provider, and a rate limiter (10 requests
/// per second). Playlist contents are loaded once per playlist and kept for
/// the lifetime of the client.
#[derive(Debug)]
pub struct SpotifyClient {
    http: Client,
    auth: TokenProvider,
    rate_limiter: RateLimiter,
    user_id: OnceCell<String>,
    playlist_tracks: MembershipCache,
}

impl SpotifyClient {
    /// Create a new Spotify client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(auth: TokenProvider) -> AdapterResult<Self> {
        let http = Client::builder()
            .user_agent("bhasha/0.1.0 (https://github.com/oxur/bhasha)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            auth,
            rate_limiter: RateLimiter::per_second(10),
            user_id: OnceCell::new(),
            playlist_tracks: MembershipCache::default(),
        })
    }

    fn url(path: &str) -> String {
        format!("{SPOTIFY_API_BASE}{path}")
    }

    /// Send an authenticated request built by `build`.
    ///
    /// A 401 drops the cached access token and the request is sent once
    /// more with a fresh one before giving up.
    async fn send<F>(&self, build: F) -> AdapterResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut reauthenticated = false;
        loop {
            self.rate_limiter.acquire().await;
            let token = self.auth.access_token(&self.http).await?;
            let response = build(&self.http).bearer_auth(token).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                log::debug!("Spotify rejected the access token; refreshing");
                self.auth.invalidate().await;
                reauthenticated = true;
                continue;
            }
            let wait = retry_after(response.headers());
            if status == StatusCode::TOO_MANY_REQUESTS {
                log::warn!("Spotify rate limit hit; server asks to wait {wait:?}");
            }
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(SOURCE_NAME, status, &body).with_retry_after(wait));
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<T> {
        let url = Self::url(path);
        let response = self.send(|http| http.get(&url).query(query)).await?;
        parse_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> AdapterResult<T> {
        let url = Self::url(path);
        let response = self.send(|http| http.post(&url).json(body)).await?;
        parse_json(response).await
    }

    /// Id of the authenticated user, fetched once.
    async fn user_id(&self) -> AdapterResult<&str> {
        #[derive(serde::Deserialize)]
        struct Me {
            id: String,
        }

        let id = self
            .user_id
            .get_or_try_init(|| async {
                let me: Me = self.get_json("/me", &[]).await?;
                Ok::<_, AdapterError>(me.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> AdapterResult<T> {
    response.json().await.map_err(|e| AdapterError::Parse {
        source_name: SOURCE_NAME.to_string(),
        message: e.to_string(),
    })
}
