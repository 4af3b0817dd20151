use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use crate::api::{
    Capabilities, CollectionDescriptor, CollectionKind, TrackDescriptor, TrackOrigin, UNKNOWN_ARTIST,
    UNKNOWN_TITLE,
};
use crate::downloader::cache::MetadataCache;
use crate::downloader::tool::CommandRunner;
use crate::errors::{AppError, Result};

/// Platforms whose posts can be plain pictures.
const IMAGE_EXTRACTORS: &[&str] = &["Instagram"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Turns links into track and collection descriptors.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Metadata-only lookup. Collections come back with shallow members.
    async fn resolve_link(&self, url: &str) -> Result<CollectionDescriptor>;

    /// Detailed lookup of a single item, ignoring any playlist around it.
    async fn resolve_track(&self, url: &str) -> Result<TrackDescriptor> {
        let descriptor = self.resolve_link(url).await?;
        descriptor
            .members
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Resolution(format!("no track found at {}", url)))
    }
}

/// Metadata as printed by `yt-dlp -J`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    creator: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    display_url: Option<String>,
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    extractor_key: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    thumbnails: Option<Vec<ThumbnailInfo>>,
    entries: Option<Vec<Option<ToolInfo>>>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: String,
    width: Option<u64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn codec_present(codec: &Option<String>) -> bool {
    matches!(non_empty(codec), Some(c) if c != "none")
}

fn has_image_extension(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url.to_ascii_lowercase(),
    };
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

impl ToolInfo {
    fn artist_name(&self) -> String {
        non_empty(&self.artist)
            .or_else(|| non_empty(&self.creator))
            .or_else(|| non_empty(&self.uploader))
            .unwrap_or(UNKNOWN_ARTIST)
            .to_string()
    }

    fn title_name(&self) -> String {
        non_empty(&self.title)
            .or_else(|| non_empty(&self.id))
            .unwrap_or(UNKNOWN_TITLE)
            .to_string()
    }

    fn page_url(&self) -> String {
        non_empty(&self.webpage_url)
            .or_else(|| non_empty(&self.original_url))
            .or_else(|| non_empty(&self.url))
            .unwrap_or_default()
            .to_string()
    }

    /// Best direct picture URL: display URL, then an image-looking `url`,
    /// then the widest thumbnail.
    fn best_image_url(&self) -> Option<String> {
        if let Some(display) = non_empty(&self.display_url) {
            return Some(display.to_string());
        }
        if let Some(url) = non_empty(&self.url).filter(|u| has_image_extension(u)) {
            return Some(url.to_string());
        }
        self.thumbnails
            .as_ref()?
            .iter()
            .filter(|t| !t.url.is_empty())
            .max_by_key(|t| t.width.unwrap_or(0))
            .map(|t| t.url.clone())
    }

    fn into_track(self) -> TrackDescriptor {
        let has_video = codec_present(&self.vcodec);
        let is_image_platform = non_empty(&self.extractor_key)
            .map(|key| IMAGE_EXTRACTORS.contains(&key))
            .unwrap_or(false);
        let has_image = is_image_platform && !has_video;
        let audio_only = !has_video && !has_image && codec_present(&self.acodec);

        let direct_media_url = if has_image {
            self.best_image_url()
        } else {
            non_empty(&self.url).filter(|u| u.starts_with("http")).map(str::to_string)
        };

        TrackDescriptor {
            title: self.title_name(),
            artist: self.artist_name(),
            source_url: self.page_url(),
            direct_media_url,
            capabilities: Capabilities { has_video, has_image, audio_only },
            origin: TrackOrigin::Extractor,
        }
    }

    /// Flat playlist entries only carry a handful of fields.
    fn into_shallow_track(self) -> TrackDescriptor {
        let source_url = non_empty(&self.webpage_url)
            .or_else(|| non_empty(&self.url))
            .unwrap_or_default()
            .to_string();
        let artist = non_empty(&self.artist)
            .or_else(|| non_empty(&self.creator))
            .or_else(|| non_empty(&self.uploader))
            .or_else(|| non_empty(&self.channel))
            .unwrap_or(UNKNOWN_ARTIST)
            .to_string();

        TrackDescriptor {
            title: self.title_name(),
            artist,
            source_url,
            direct_media_url: None,
            capabilities: Capabilities::default(),
            origin: TrackOrigin::Extractor,
        }
    }
}

/// Parses `yt-dlp -J` output into a descriptor.
pub fn parse_metadata(json: &[u8]) -> Result<CollectionDescriptor> {
    let text = std::str::from_utf8(json)
        .map_err(|e| AppError::Resolution(format!("Invalid UTF-8 in yt-dlp output: {}", e)))?;
    if text.trim().is_empty() {
        return Err(AppError::Resolution("yt-dlp returned no JSON data".to_string()));
    }
    let mut info: ToolInfo = serde_json::from_str(text.trim())
        .map_err(|e| AppError::Resolution(format!("failed to parse yt-dlp JSON: {}", e)))?;

    let is_playlist = matches!(info.kind.as_deref(), Some("playlist" | "multi_video"));
    if !is_playlist {
        return Ok(CollectionDescriptor::single(info.into_track()));
    }

    let title = info.title_name();
    let owner = info.artist_name();
    let members: Vec<TrackDescriptor> = info
        .entries
        .take()
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(ToolInfo::into_shallow_track)
        .collect();

    Ok(CollectionDescriptor {
        kind: CollectionKind::Collection,
        title,
        owner,
        members,
    })
}

/// yt-dlp information extractor
pub struct YtDlpExtractor {
    runner: Arc<dyn CommandRunner>,
    cache: MetadataCache,
}

impl YtDlpExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>, cache: MetadataCache) -> Self {
        Self { runner, cache }
    }

    async fn extract(&self, args: Vec<String>, url: &str) -> Result<CollectionDescriptor> {
        log::info!("🔍 [EXTRACT] Fetching metadata for URL: {}", url);
        let output = self
            .runner
            .run(&args)
            .await
            .map_err(|e| e.into_app_error(AppError::Resolution))?;

        if !output.stderr.is_empty() {
            log::debug!("[EXTRACT] yt-dlp stderr for {}:\n{}", url, output.stderr);
        }

        if !output.success {
            if output.stdout_is_empty() {
                log::error!("❌ [EXTRACT] yt-dlp failed for {} with no output (exit {:?})", url, output.exit_code);
                return Err(AppError::Resolution(format!(
                    "yt-dlp could not read {}: {}",
                    url,
                    output.stderr.lines().last().unwrap_or("no output")
                )));
            }
            log::warn!("⚠️ [EXTRACT] yt-dlp exited with {:?} but produced metadata for {}", output.exit_code, url);
        }

        let descriptor = parse_metadata(&output.stdout)?;
        log::info!(
            "✅ [EXTRACT] {} '{}' by '{}' ({} item(s))",
            if descriptor.is_collection() { "Collection" } else { "Track" },
            descriptor.title,
            descriptor.owner,
            descriptor.members.len()
        );
        Ok(descriptor)
    }
}

#[async_trait]
impl MediaResolver for YtDlpExtractor {
    async fn resolve_link(&self, url: &str) -> Result<CollectionDescriptor> {
        let cache_key = format!("link:{}", url);
        if let Some(cached) = self.cache.get(&cache_key).await {
            log::debug!("💾 [EXTRACT] Using cached metadata for {}", url);
            return Ok(cached);
        }

        let args = vec!["-J".to_string(), "--flat-playlist".to_string(), url.to_string()];
        let descriptor = self.extract(args, url).await?;
        self.cache.set(cache_key, descriptor.clone()).await;
        Ok(descriptor)
    }

    async fn resolve_track(&self, url: &str) -> Result<TrackDescriptor> {
        let cache_key = format!("track:{}", url);
        let descriptor = match self.cache.get(&cache_key).await {
            Some(cached) => cached,
            None => {
                let args = vec!["-J".to_string(), "--no-playlist".to_string(), url.to_string()];
                let descriptor = self.extract(args, url).await?;
                self.cache.set(cache_key, descriptor.clone()).await;
                descriptor
            }
        };

        descriptor
            .members
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Resolution(format!("no track found at {}", url)))
    }
}
