use std::time::{Duration, Instant};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use crate::errors::{AppError, Result};
use crate::metadata::{CatalogCollection, CatalogKind, CatalogService, CatalogSummary, CatalogTrack};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
/// Refresh a little before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackObject {
    id: Option<String>,
    name: String,
    artists: Vec<ArtistObject>,
    external_urls: ExternalUrls,
}

impl TrackObject {
    fn into_catalog(self) -> CatalogTrack {
        CatalogTrack {
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).filter(|n| !n.is_empty()).collect(),
            url: self.external_urls.spotify,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    total_tracks: usize,
    tracks: Paging<TrackObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwnerObject {
    display_name: Option<String>,
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    name: String,
    #[serde(default)]
    owner: OwnerObject,
    tracks: Paging<PlaylistItem>,
}

fn join_artists(artists: &[ArtistObject]) -> String {
    artists.iter().map(|a| a.name.as_str()).filter(|n| !n.is_empty()).collect::<Vec<_>>().join(", ")
}

fn album_summary(album: &AlbumObject) -> CatalogSummary {
    CatalogSummary {
        kind: CatalogKind::Album,
        name: album.name.clone(),
        owner: join_artists(&album.artists),
        total: album.total_tracks.max(album.tracks.total),
    }
}

fn playlist_summary(playlist: &PlaylistObject) -> CatalogSummary {
    CatalogSummary {
        kind: CatalogKind::Playlist,
        name: playlist.name.clone(),
        owner: playlist.owner.display_name.clone().unwrap_or_else(|| playlist.owner.id.clone()),
        total: playlist.tracks.total,
    }
}

/// Playlist entries without a track id are local files or removed tracks.
fn usable_playlist_tracks(items: Vec<PlaylistItem>) -> impl Iterator<Item = CatalogTrack> {
    items
        .into_iter()
        .filter_map(|item| item.track)
        .filter(|track| track.id.as_deref().map_or(false, |id| !id.is_empty()))
        .map(TrackObject::into_catalog)
}

/// Spotify Web API client using the client-credentials flow.
pub struct SpotifyCatalog {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyCatalog {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("linkdrop/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        log::info!("🔑 [SPOTIFY] Requesting access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Catalog(format!("token request failed with status {}", response.status())));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
        Ok(token.access_token)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        log::debug!("[SPOTIFY] GET {}", url);
        let response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::Catalog(format!("{} does not exist", url)));
        }
        if !status.is_success() {
            return Err(AppError::Catalog(format!("request to {} failed with status {}", url, status)));
        }
        Ok(response.json().await?)
    }

    async fn album(&self, id: &str) -> Result<AlbumObject> {
        self.get(&format!("{}/albums/{}", API_BASE, id)).await
    }

    async fn playlist(&self, id: &str) -> Result<PlaylistObject> {
        self.get(&format!("{}/playlists/{}", API_BASE, id)).await
    }

    async fn remaining_pages<T: for<'de> Deserialize<'de>>(&self, mut next: Option<String>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(url) = next {
            let page: Paging<T> = self.get(&url).await?;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }
}

#[async_trait]
impl CatalogService for SpotifyCatalog {
    async fn track(&self, id: &str) -> Result<CatalogTrack> {
        let track: TrackObject = self.get(&format!("{}/tracks/{}", API_BASE, id)).await?;
        Ok(track.into_catalog())
    }

    async fn summary(&self, kind: CatalogKind, id: &str) -> Result<CatalogSummary> {
        match kind {
            CatalogKind::Album => Ok(album_summary(&self.album(id).await?)),
            CatalogKind::Playlist => Ok(playlist_summary(&self.playlist(id).await?)),
            CatalogKind::Track => Err(AppError::InvalidInput("a track is not a collection".into())),
        }
    }

    async fn collection(&self, kind: CatalogKind, id: &str) -> Result<CatalogCollection> {
        let collection = match kind {
            CatalogKind::Album => {
                let mut album = self.album(id).await?;
                let summary = album_summary(&album);
                let first_page = std::mem::take(&mut album.tracks.items);
                let rest: Vec<TrackObject> = self.remaining_pages(album.tracks.next.take()).await?;
                let tracks = first_page.into_iter().chain(rest).map(TrackObject::into_catalog).collect();
                CatalogCollection { summary, tracks }
            }
            CatalogKind::Playlist => {
                let mut playlist = self.playlist(id).await?;
                let summary = playlist_summary(&playlist);
                let first_page = std::mem::take(&mut playlist.tracks.items);
                let rest: Vec<PlaylistItem> = self.remaining_pages(playlist.tracks.next.take()).await?;
                let tracks = usable_playlist_tracks(first_page.into_iter().chain(rest).collect()).collect();
                CatalogCollection { summary, tracks }
            }
            CatalogKind::Track => return Err(AppError::InvalidInput("a track is not a collection".into())),
        };

        log::info!(
            "✅ [SPOTIFY] {} '{}' by '{}': {} usable track(s) of {}",
            kind.as_str(),
            collection.summary.name,
            collection.summary.owner,
            collection.tracks.len(),
            collection.summary.total
        );
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_skips_items_without_track_id() {
        let json = r#"{
            "name": "Road Trip",
            "owner": {"display_name": "sam", "id": "sam123"},
            "tracks": {
                "total": 3,
                "next": "https://api.spotify.com/v1/playlists/x/tracks?offset=100",
                "items": [
                    {"track": {"id": "1", "name": "One", "artists": [{"name": "A"}], "external_urls": {"spotify": "https://open.spotify.com/track/1"}}},
                    {"track": {"id": null, "name": "local.mp3", "artists": []}},
                    {"track": null}
                ]
            }
        }"#;
        let playlist: PlaylistObject = serde_json::from_str(json).unwrap();
        let summary = playlist_summary(&playlist);
        assert_eq!(summary.owner, "sam");
        assert_eq!(summary.total, 3);
        assert!(playlist.tracks.next.is_some());

        let tracks: Vec<CatalogTrack> = usable_playlist_tracks(playlist.tracks.items).collect();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].url.as_deref(), Some("https://open.spotify.com/track/1"));
    }

    #[test]
    fn album_summary_joins_artists() {
        let json = r#"{
            "name": "Collab",
            "artists": [{"name": "A"}, {"name": "B"}],
            "total_tracks": 2,
            "tracks": {"items": [{"id": "1", "name": "x", "artists": [{"name": "A"}]}], "next": null, "total": 2}
        }"#;
        let album: AlbumObject = serde_json::from_str(json).unwrap();
        let summary = album_summary(&album);
        assert_eq!(summary.owner, "A, B");
        assert_eq!(summary.total, 2);
        assert!(album.tracks.next.is_none());
    }

    #[test]
    fn track_object_maps_artists() {
        let json = r#"{"id": "7", "name": "Teardrop", "artists": [{"name": "Massive Attack"}]}"#;
        let track: TrackObject = serde_json::from_str(json).unwrap();
        let track = track.into_catalog();
        assert_eq!(track.search_query(), "Massive Attack - Teardrop");
        assert!(track.url.is_none());
    }
}
