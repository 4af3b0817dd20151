// Catalog lookups for links that carry metadata but no downloadable media.
pub mod spotify;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::api::{CollectionDescriptor, CollectionKind, TrackDescriptor, UNKNOWN_ARTIST, UNKNOWN_TITLE};
use crate::errors::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Track,
    Album,
    Playlist,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Track => "track",
            CatalogKind::Album => "album",
            CatalogKind::Playlist => "playlist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "track" => Some(CatalogKind::Track),
            "album" => Some(CatalogKind::Album),
            "playlist" => Some(CatalogKind::Playlist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub name: String,
    pub artists: Vec<String>,
    pub url: Option<String>,
}

impl CatalogTrack {
    pub fn artist(&self) -> String {
        if self.artists.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            self.artists.join(", ")
        }
    }

    pub fn search_query(&self) -> String {
        format!("{} - {}", self.artist(), self.name)
    }

    pub fn into_descriptor(self) -> TrackDescriptor {
        let artist = self.artist();
        let title = if self.name.trim().is_empty() { UNKNOWN_TITLE.to_string() } else { self.name };
        TrackDescriptor::from_catalog(title, artist, self.url)
    }
}

/// Name, owner and size of an album or playlist, without its tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub kind: CatalogKind,
    pub name: String,
    pub owner: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCollection {
    pub summary: CatalogSummary,
    pub tracks: Vec<CatalogTrack>,
}

impl CatalogCollection {
    /// Members keep the catalog's order; the total is the number of usable tracks.
    pub fn into_descriptor(self) -> CollectionDescriptor {
        CollectionDescriptor {
            kind: CollectionKind::Collection,
            title: self.summary.name,
            owner: self.summary.owner,
            members: self.tracks.into_iter().map(CatalogTrack::into_descriptor).collect(),
        }
    }
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn track(&self, id: &str) -> Result<CatalogTrack>;

    async fn summary(&self, kind: CatalogKind, id: &str) -> Result<CatalogSummary>;

    /// Every track of an album or playlist, following pagination.
    async fn collection(&self, kind: CatalogKind, id: &str) -> Result<CatalogCollection>;
}
