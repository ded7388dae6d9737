//! Refresh-token grant against the Spotify accounts service.
//!
//! The interactive login that produces the refresh token is out of scope;
//! the token comes from configuration or from the JSON token cache left by
//! an earlier login.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AdapterError, AdapterResult};

use super::SOURCE_NAME;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// The subset of a token cache file needed here.
#[derive(Debug, Deserialize)]
struct TokenCache {
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Client credentials plus a refresh token; hands out access tokens.
#[derive(Debug)]
pub struct TokenProvider {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    current: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            current: Mutex::new(None),
        }
    }

    /// A valid access token, refreshing when missing or about to expire.
    pub async fn access_token(&self, http: &Client) -> AdapterResult<String> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }
        let token = self.refresh(http).await?;
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Drop the cached access token after the API rejected it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    async fn refresh(&self, http: &Client) -> AdapterResult<AccessToken> {
        log::debug!("Refreshing Spotify access token");
        let response = http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The accounts service answers 400 invalid_grant for a revoked
            // refresh token.
            if status.is_client_error() {
                return Err(AdapterError::Auth {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("token refresh rejected ({status}): {body}"),
                });
            }
            return Err(AdapterError::from_status(SOURCE_NAME, status, &body));
        }

        let token: TokenResponse = response.json().await.map_err(|e| AdapterError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;
        let lifetime = token.expires_in.unwrap_or(3600) - EXPIRY_MARGIN_SECS;
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime.max(0)),
        })
    }
}

/// Pick the refresh token: configuration first, then the token cache file.
pub fn resolve_refresh_token(
    configured: Option<&str>,
    cache_path: &Path,
) -> AdapterResult<String> {
    if let Some(token) = configured.filter(|t| !t.trim().is_empty()) {
        return Ok(token.to_string());
    }

    let missing = |message: String| AdapterError::Auth {
        source_name: SOURCE_NAME.to_string(),
        message,
    };
    let contents = std::fs::read_to_string(cache_path).map_err(|e| {
        missing(format!(
            "no refresh token configured and token cache {} is unreadable: {e}",
            cache_path.display()
        ))
    })?;
    let cache: TokenCache = serde_json::from_str(&contents).map_err(|e| {
        missing(format!(
            "token cache {} is not valid JSON: {e}",
            cache_path.display()
        ))
    })?;
    cache
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            missing(format!(
                "token cache {} has no refresh_token",
                cache_path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_configured_token_wins() {
        let token = resolve_refresh_token(Some("AQD-configured"), Path::new("/nonexistent"))
            .unwrap();
        assert_eq!(token, "AQD-configured");
    }

    #[test]
    fn test_token_read_from_cache_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"access_token": "BQ...", "token_type": "Bearer", "expires_in": 3600,
               "refresh_token": "AQD-cached", "scope": "user-library-read", "expires_at": 1700000000}}"#
        )
        .unwrap();

        let token = resolve_refresh_token(None, file.path()).unwrap();
        assert_eq!(token, "AQD-cached");
    }

    #[test]
    fn test_blank_configured_token_falls_back_to_cache() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"refresh_token": "AQD-cached"}}"#).unwrap();
        let token = resolve_refresh_token(Some("  "), file.path()).unwrap();
        assert_eq!(token, "AQD-cached");
    }

    #[test]
    fn test_missing_token_is_auth_error() {
        let err = resolve_refresh_token(None, Path::new("/nonexistent/.cache")).unwrap_err();
        assert!(err.is_fatal());

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"access_token": "BQ..."}}"#).unwrap();
        assert!(resolve_refresh_token(None, file.path()).unwrap_err().is_fatal());
    }

    #[test]
    fn test_token_response_without_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token": "BQ"}"#).unwrap();
        assert_eq!(token.access_token, "BQ");
        assert!(token.expires_in.is_none());
    }
}
