// User-facing text. Plain strings, no markup, so nothing needs escaping.

use crate::api::{MediaKind, TrackDescriptor};

pub const HELP: &str = "👋 Send me a link and I'll send the media back.\n\n\
Supported: YouTube, SoundCloud, Instagram and most sites yt-dlp understands, \
plus Spotify tracks, albums and playlists.\n\n\
Playlists and albums are downloaded as audio and delivered in groups of up to 10 files.";

pub const UNKNOWN_COMMAND: &str = "🤔 Unknown command. Send /help to see what I can do.";
pub const NOT_ALLOWED: &str = "⛔ Sorry, this bot is private.";
pub const NOT_A_LINK: &str = "🔗 Please send a link (it should start with http:// or https://).";
pub const FETCHING_LINK: &str = "🔎 Fetching link info...";
pub const RESOLUTION_FAILED: &str = "❌ Could not read that link. It may be private, removed or unsupported.";
pub const NOTHING_DOWNLOADABLE: &str = "🤷 I found the link but nothing on it can be downloaded.";
pub const EMPTY_COLLECTION: &str = "📭 That collection has no tracks.";
pub const CATALOG_DISABLED: &str = "🚫 Spotify links are not enabled on this bot.";
pub const CATALOG_LOOKUP_FAILED: &str = "❌ Could not fetch that item from Spotify.";
pub const LINK_EXPIRED: &str = "⌛ This button has expired. Please send the link again.";
pub const CATALOG_PROCESSING: &str = "🔗 Spotify link received, processing...";
pub const BATCH_STARTING: &str = "📥 Okay! Starting the download. This can take a while...";
pub const BATCH_FETCH_FAILED: &str = "❌ Could not read the playlist or album. Nothing was downloaded.";
pub const BATCH_CRASHED: &str = "💥 Something went wrong while processing this download. Please try again later.";
pub const BUTTON_YES: &str = "✅ Yes, download all";
pub const BUTTON_NO: &str = "❌ No";

pub fn kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "🎵 Audio",
        MediaKind::Video => "🎬 Video",
        MediaKind::Image => "🖼️ Photo",
    }
}

fn kind_noun(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
        MediaKind::Image => "photo",
    }
}

pub fn choose_format(track: &TrackDescriptor) -> String {
    format!("🎧 {} - {}\n\nWhat would you like to download?", track.artist, track.title)
}

pub fn collection_prompt(title: &str, owner: &str, total: usize) -> String {
    format!(
        "📀 {}\n👤 {}\n🔢 {} track(s)\n\nDownload all tracks as audio?",
        title, owner, total
    )
}

pub fn search_not_found(query: &str) -> String {
    format!("🔍 Couldn't find \"{}\" on any supported platform.", query)
}

pub fn downloading(kind: MediaKind, track: &TrackDescriptor) -> String {
    if track.has_known_names() {
        format!("⏳ Downloading {} for:\n{} - {}\n\nThis may take a moment...", kind_noun(kind), track.artist, track.title)
    } else {
        format!("⏳ Downloading your {}...", kind_noun(kind))
    }
}

pub fn download_failed(kind: MediaKind, title: &str) -> String {
    format!("❌ Failed to download the {} for \"{}\".", kind_noun(kind), title)
}

pub fn send_failed(kind: MediaKind, title: &str) -> String {
    format!("❌ Failed to send the {} for \"{}\".", kind_noun(kind), title)
}

pub fn caption(kind: MediaKind, track: &TrackDescriptor) -> String {
    let icon = match kind {
        MediaKind::Audio => "🎵",
        MediaKind::Video => "🎬",
        MediaKind::Image => "🖼️",
    };
    format!("{} {}\n👤 {}", icon, track.title, track.artist)
}

pub fn batch_progress(title: &str, attempted: usize, succeeded: usize, total: usize) -> String {
    format!(
        "📥 Downloading \"{}\"\n{} of {} processed, {} downloaded",
        title, attempted, total, succeeded
    )
}

pub fn batch_all_failed(title: &str, total: usize) -> String {
    format!("❌ None of the {} tracks of \"{}\" could be downloaded.", total, title)
}

pub fn batch_summary(title: &str, succeeded: usize, total: usize) -> String {
    format!("✅ \"{}\": {} of {} succeeded. Sending files...", title, succeeded, total)
}

/// Pulls the "N of Total" counter back out of a progress text.
pub fn parse_progress_count(text: &str) -> Option<usize> {
    let line = text.lines().find(|line| line.contains(" processed"))?;
    line.split_whitespace().next()?.parse().ok()
}
