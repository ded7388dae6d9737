//! Playlist lookup, creation and membership.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use bhasha_core::model::{PlaylistId, TrackId};

use crate::adapters::{PlaylistHandle, PlaylistSink};
use crate::error::AdapterResult;

use super::SpotifyClient;

const PLAYLIST_PAGE_SIZE: usize = 50;
const ITEMS_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct PlaylistsPage {
    items: Vec<Option<SimplePlaylist>>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimplePlaylist {
    id: String,
    name: String,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsPage {
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ItemTrack>,
}

#[derive(Debug, Deserialize)]
struct ItemTrack {
    id: Option<String>,
}

/// Playlist description for a language playlist name.
fn description_for(name: &str) -> String {
    let language = name.rsplit(" - ").next().unwrap_or(name);
    format!("{language} tracks from Liked Songs")
}

/// Exact-name match among the user's own playlists.
fn find_owned(playlists: &[SimplePlaylist], name: &str, user_id: &str) -> Option<PlaylistHandle> {
    playlists
        .iter()
        .find(|p| p.name == name && p.owner.id == user_id)
        .map(|p| PlaylistHandle {
            id: PlaylistId::new(p.id.clone()),
            name: p.name.clone(),
        })
}

impl SpotifyClient {
    async fn find_playlist(&self, name: &str) -> AdapterResult<Option<PlaylistHandle>> {
        let user_id = self.user_id().await?.to_string();
        let mut offset = 0;
        loop {
            let page: PlaylistsPage = self
                .get_json(
                    "/me/playlists",
                    &[
                        ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            let fetched = page.items.len();
            let playlists: Vec<SimplePlaylist> = page.items.into_iter().flatten().collect();
            if let Some(handle) = find_owned(&playlists, name, &user_id) {
                return Ok(Some(handle));
            }
            if page.next.is_none() || fetched == 0 {
                return Ok(None);
            }
            offset += fetched;
        }
    }

    async fn create_playlist(&self, name: &str) -> AdapterResult<PlaylistHandle> {
        let user_id = self.user_id().await?.to_string();
        let created: CreatedPlaylist = self
            .post_json(
                &format!("/users/{user_id}/playlists"),
                &json!({
                    "name": name,
                    "public": false,
                    "description": description_for(name),
                }),
            )
            .await?;
        log::info!("Created playlist '{}' ({})", created.name, created.id);
        Ok(PlaylistHandle {
            id: PlaylistId::new(created.id),
            name: created.name,
        })
    }

    async fn load_members(&self, playlist: &PlaylistId) -> AdapterResult<HashSet<TrackId>> {
        let path = format!("/playlists/{playlist}/tracks");
        let mut members = HashSet::new();
        let mut offset = 0;
        loop {
            let page: PlaylistItemsPage = self
                .get_json(
                    &path,
                    &[
                        ("fields", "items(track(id)),next".to_string()),
                        ("limit", ITEMS_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            let fetched = page.items.len();
            members.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|t| t.id))
                    .map(TrackId::new),
            );
            if page.next.is_none() || fetched == 0 {
                break;
            }
            offset += fetched;
        }
        log::debug!("Playlist {playlist} has {} track(s)", members.len());
        Ok(members)
    }
}

/// Known members of each playlist touched during a run.
///
/// A playlist's set is loaded on first use and updated after each add.
#[derive(Debug, Default)]
pub(crate) struct MembershipCache {
    playlists: Mutex<HashMap<PlaylistId, HashSet<TrackId>>>,
}

impl MembershipCache {
    /// Record a freshly created, empty playlist.
    async fn insert_empty(&self, playlist: &PlaylistId) {
        self.playlists
            .lock()
            .await
            .insert(playlist.clone(), HashSet::new());
    }

    /// Add `track_id` through `post` unless the playlist already holds it.
    ///
    /// `load` fetches the current members when the playlist is not cached.
    /// A failed `post` drops the playlist's cached set: the server may have
    /// applied the add anyway, and the next attempt must see that.
    async fn add_if_absent<L, LF, P, PF>(
        &self,
        playlist: &PlaylistId,
        track_id: &TrackId,
        load: L,
        post: P,
    ) -> AdapterResult<bool>
    where
        L: FnOnce() -> LF,
        LF: Future<Output = AdapterResult<HashSet<TrackId>>>,
        P: FnOnce() -> PF,
        PF: Future<Output = AdapterResult<()>>,
    {
        let cached = self
            .playlists
            .lock()
            .await
            .get(playlist)
            .map(|members| members.contains(track_id));
        let present = match cached {
            Some(present) => present,
            None => {
                let members = load().await?;
                let present = members.contains(track_id);
                self.playlists
                    .lock()
                    .await
                    .entry(playlist.clone())
                    .or_insert(members);
                present
            }
        };
        if present {
            return Ok(false);
        }

        if let Err(e) = post().await {
            self.playlists.lock().await.remove(playlist);
            return Err(e);
        }
        self.playlists
            .lock()
            .await
            .entry(playlist.clone())
            .or_default()
            .insert(track_id.clone());
        Ok(true)
    }
}

#[async_trait]
impl PlaylistSink for SpotifyClient {
    async fn ensure_playlist(&self, name: &str) -> AdapterResult<PlaylistHandle> {
        if let Some(handle) = self.find_playlist(name).await? {
            log::debug!("Found playlist '{}' ({})", handle.name, handle.id);
            return Ok(handle);
        }
        let handle = self.create_playlist(name).await?;
        self.playlist_tracks.insert_empty(&handle.id).await;
        Ok(handle)
    }

    async fn ensure_member(
        &self,
        playlist: &PlaylistHandle,
        track_id: &TrackId,
    ) -> AdapterResult<bool> {
        let path = &format!("/playlists/{}/tracks", playlist.id);
        let body = &json!({ "uris": [track_id.spotify_uri()] });
        let added = self
            .playlist_tracks
            .add_if_absent(
                &playlist.id,
                track_id,
                || self.load_members(&playlist.id),
                || async move {
                    let _snapshot: serde_json::Value = self.post_json(path, body).await?;
                    Ok(())
                },
            )
            .await?;
        if added {
            log::info!("Added {track_id} to '{}'", playlist.name);
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Server-side playlist state shared by the load and post closures.
    #[derive(Default)]
    struct Server {
        members: std::sync::Mutex<HashSet<TrackId>>,
        loads: AtomicU32,
        posts: AtomicU32,
    }

    impl Server {
        async fn load(&self) -> AdapterResult<HashSet<TrackId>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.members.lock().unwrap().clone())
        }

        /// Applies the add, then reports a gateway error when `drop_reply`.
        async fn post(&self, track_id: &TrackId, drop_reply: bool) -> AdapterResult<()> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            self.members.lock().unwrap().insert(track_id.clone());
            if drop_reply {
                return Err(AdapterError::Http {
                    source_name: "Spotify".to_string(),
                    message: "502 Bad Gateway".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_add_reloads_members_before_retrying() {
        let server = Server::default();
        let cache = MembershipCache::default();
        let playlist = PlaylistId::new("p1");
        let track = TrackId::new("t1");

        let first = cache
            .add_if_absent(&playlist, &track, || server.load(), || server.post(&track, true))
            .await;
        assert!(first.unwrap_err().is_transient());

        let retried = cache
            .add_if_absent(&playlist, &track, || server.load(), || server.post(&track, false))
            .await
            .unwrap();
        assert!(!retried);
        assert_eq!(server.posts.load(Ordering::SeqCst), 1);
        assert_eq!(server.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_members_skip_reload_and_duplicate_adds() {
        let server = Server::default();
        let cache = MembershipCache::default();
        let playlist = PlaylistId::new("p1");
        cache.insert_empty(&playlist).await;

        for id in ["t1", "t2", "t1"] {
            let track = TrackId::new(id);
            cache
                .add_if_absent(&playlist, &track, || server.load(), || server.post(&track, false))
                .await
                .unwrap();
        }
        assert_eq!(server.loads.load(Ordering::SeqCst), 0);
        assert_eq!(server.posts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_description_uses_language_name() {
        assert_eq!(
            description_for("Indian Collection - Tamil"),
            "Tamil tracks from Liked Songs"
        );
    }

    #[test]
    fn test_find_owned_requires_exact_name_and_owner() {
        let page: PlaylistsPage = serde_json::from_str(
            r#"{"items": [
                {"id": "p1", "name": "Indian Collection - Hindi ", "owner": {"id": "me"}},
                {"id": "p2", "name": "Indian Collection - Hindi", "owner": {"id": "someone"}},
                {"id": "p3", "name": "Indian Collection - Hindi", "owner": {"id": "me"}},
                null
            ], "next": null}"#,
        )
        .unwrap();
        let playlists: Vec<SimplePlaylist> = page.items.into_iter().flatten().collect();
        let handle = find_owned(&playlists, "Indian Collection - Hindi", "me").unwrap();
        assert_eq!(handle.id.as_str(), "p3");
        assert!(find_owned(&playlists, "Indian Collection - Tamil", "me").is_none());
    }

    #[test]
    fn test_playlist_items_skip_local_and_removed_tracks() {
        let page: PlaylistItemsPage = serde_json::from_str(
            r#"{"items": [{"track": {"id": "t1"}}, {"track": {"id": null}}, {"track": null}],
                "next": null}"#,
        )
        .unwrap();
        let ids: Vec<String> = page
            .items
            .into_iter()
            .filter_map(|item| item.track.and_then(|t| t.id))
            .collect();
        assert_eq!(ids, vec!["t1"]);
    }
}
