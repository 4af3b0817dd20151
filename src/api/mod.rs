// Data model shared by the resolver, downloader and batch manager.

use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CollectionKind {
    SingleTrack,
    Collection,
}

/// Which download modes a link offers. The flags are not exclusive:
/// a video link can also be fetched as audio.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    pub has_video: bool,
    pub has_image: bool,
    pub audio_only: bool,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        !self.has_video && !self.has_image && !self.audio_only
    }

    /// Media kinds a user may pick for this track, in button order.
    pub fn offered_kinds(&self) -> Vec<MediaKind> {
        let mut kinds = Vec::new();
        if self.has_video {
            kinds.push(MediaKind::Video);
            kinds.push(MediaKind::Audio);
        }
        if self.has_image {
            kinds.push(MediaKind::Image);
        }
        if self.audio_only && !kinds.contains(&MediaKind::Audio) {
            kinds.push(MediaKind::Audio);
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Image => "photo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "photo" | "image" => Some(MediaKind::Image),
            _ => None,
        }
    }
}

/// Where a track's metadata came from. Catalog tracks have no downloadable
/// URL and must go through the search fallback first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackOrigin {
    Extractor,
    Catalog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub artist: String,
    /// Canonical page URL. Empty for some shallow collection entries.
    pub source_url: String,
    pub direct_media_url: Option<String>,
    pub capabilities: Capabilities,
    pub origin: TrackOrigin,
}

impl TrackDescriptor {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            source_url: source_url.into(),
            direct_media_url: None,
            capabilities: Capabilities::default(),
            origin: TrackOrigin::Extractor,
        }
    }

    /// A catalog entry: full metadata, no downloadable URL yet.
    pub fn from_catalog(title: impl Into<String>, artist: impl Into<String>, catalog_url: Option<String>) -> Self {
        Self {
            origin: TrackOrigin::Catalog,
            capabilities: Capabilities { audio_only: true, ..Capabilities::default() },
            direct_media_url: None,
            source_url: catalog_url.unwrap_or_default(),
            ..Self::new(title, artist, String::new())
        }
    }

    /// `artist - title`, the query string used by the search fallback.
    pub fn search_query(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    pub fn has_known_names(&self) -> bool {
        self.title != UNKNOWN_TITLE && self.artist != UNKNOWN_ARTIST
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub kind: CollectionKind,
    pub title: String,
    pub owner: String,
    /// Enumeration order of the source; never reordered.
    pub members: Vec<TrackDescriptor>,
}

impl CollectionDescriptor {
    pub fn single(track: TrackDescriptor) -> Self {
        Self {
            kind: CollectionKind::SingleTrack,
            title: track.title.clone(),
            owner: track.artist.clone(),
            members: vec![track],
        }
    }

    pub fn is_collection(&self) -> bool {
        self.kind == CollectionKind::Collection
    }

    pub fn total_tracks(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_links_offer_audio_too() {
        let caps = Capabilities { has_video: true, ..Default::default() };
        assert_eq!(caps.offered_kinds(), vec![MediaKind::Video, MediaKind::Audio]);
    }

    #[test]
    fn audio_only_offers_single_button() {
        let caps = Capabilities { audio_only: true, ..Default::default() };
        assert_eq!(caps.offered_kinds(), vec![MediaKind::Audio]);
        assert!(Capabilities::default().offered_kinds().is_empty());
    }

    #[test]
    fn catalog_tracks_build_search_query() {
        let track = TrackDescriptor::from_catalog("Teardrop", "Massive Attack", None);
        assert_eq!(track.origin, TrackOrigin::Catalog);
        assert_eq!(track.search_query(), "Massive Attack - Teardrop");
        assert!(track.source_url.is_empty());
    }

    #[test]
    fn media_kind_round_trips_through_callback_names() {
        for kind in [MediaKind::Audio, MediaKind::Video, MediaKind::Image] {
            assert_eq!(MediaKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::parse("gif"), None);
    }
}
