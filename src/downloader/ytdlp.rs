use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use async_trait::async_trait;
use crate::api::{MediaKind, TrackDescriptor};
use crate::downloader::tool::CommandRunner;
use crate::downloader::{remove_scratch_dir, DownloadedFile};
use crate::errors::{AppError, Result};
use crate::utils::{escape_output_template, generate_job_id, sanitize_track_filename};

/// Suffixes yt-dlp leaves on in-progress fragments.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

#[async_trait]
pub trait TrackDownloader: Send + Sync {
    /// Materializes `url` as a local file of the requested kind.
    ///
    /// `tag` identifies the requesting user in log lines.
    async fn download(&self, url: &str, kind: MediaKind, track: &TrackDescriptor, tag: &str) -> Result<DownloadedFile>;
}

pub struct YtDlpDownloader {
    runner: Arc<dyn CommandRunner>,
    download_dir: PathBuf,
}

impl YtDlpDownloader {
    pub fn new(runner: Arc<dyn CommandRunner>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            download_dir: download_dir.into(),
        }
    }

    fn build_args(dir: &Path, url: &str, kind: MediaKind, base_name: &str) -> Vec<String> {
        let template = dir
            .join(format!("{}.%(ext)s", escape_output_template(base_name)))
            .to_string_lossy()
            .into_owned();

        let mode_args: &[&str] = match kind {
            MediaKind::Audio => &[
                "-f",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--restrict-filenames",
                "--embed-thumbnail",
            ],
            MediaKind::Video => &[
                "-f",
                "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
                "--merge-output-format",
                "mp4",
                "--restrict-filenames",
                "--embed-thumbnail",
            ],
            MediaKind::Image => &["--restrict-filenames"],
        };

        let mut args = vec!["--no-playlist".to_string()];
        args.extend(mode_args.iter().map(|arg| arg.to_string()));
        args.extend(["-o".to_string(), template, url.to_string()]);
        args
    }

    /// Runs one download inside `scratch`, a directory no other download uses.
    async fn download_into(
        &self,
        scratch: &Path,
        url: &str,
        kind: MediaKind,
        track: &TrackDescriptor,
        tag: &str,
    ) -> Result<PathBuf> {
        let base_name = sanitize_track_filename(&track.artist, &track.title);

        let target_url = match kind {
            MediaKind::Image => track.direct_media_url.as_deref().unwrap_or(url),
            _ => url,
        };

        let args = Self::build_args(scratch, target_url, kind, &base_name);
        log::info!("⬇️ [{}] Downloading {} as {}: {}", tag, target_url, kind.as_str(), args.join(" "));

        let output = self
            .runner
            .run(&args)
            .await
            .map_err(|e| e.into_app_error(AppError::Download))?;

        if !output.stdout_is_empty() {
            log::debug!("[{}] yt-dlp (download) stdout:\n{}", tag, output.stdout_text());
        }
        if !output.stderr.is_empty() {
            log::debug!("[{}] yt-dlp (download) stderr:\n{}", tag, output.stderr);
        }

        if !output.success {
            log::error!("❌ [{}] yt-dlp download failed for {} (exit {:?})", tag, target_url, output.exit_code);
            return Err(AppError::Download(format!(
                "yt-dlp exited with {:?}: {}",
                output.exit_code,
                output.stderr.lines().last().unwrap_or("no output")
            )));
        }

        find_downloaded_file(scratch, &base_name, tag).await
    }
}

#[async_trait]
impl TrackDownloader for YtDlpDownloader {
    async fn download(&self, url: &str, kind: MediaKind, track: &TrackDescriptor, tag: &str) -> Result<DownloadedFile> {
        let start_time = Instant::now();
        let scratch = self.download_dir.join(generate_job_id());
        tokio::fs::create_dir_all(&scratch).await?;

        let path = match self.download_into(&scratch, url, kind, track, tag).await {
            Ok(path) => path,
            Err(e) => {
                remove_scratch_dir(&scratch).await;
                return Err(e);
            }
        };

        let file = DownloadedFile::in_scratch_dir(path, track.clone(), scratch);
        log::info!(
            "✅ [{}] Downloaded '{}' in {:.2}s: {:?} ({})",
            tag,
            track.title,
            start_time.elapsed().as_secs_f64(),
            file.path(),
            file.extension()
        );
        Ok(file)
    }
}

fn matches_base_name(file_name: &str, base_name: &str) -> bool {
    if PARTIAL_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
        return false;
    }
    file_name
        .strip_prefix(base_name)
        .map_or(false, |rest| rest.starts_with('.'))
}

/// Finds the newest file in `dir` named `<base_name>.<ext>`.
///
/// yt-dlp decides the final extension itself, so the directory is scanned
/// after the run. Several matches are not an error: the most recently
/// modified one wins and the ambiguity is logged.
pub async fn find_downloaded_file(dir: &Path, base_name: &str, tag: &str) -> Result<PathBuf> {
    log::debug!("🔍 [{}] Scanning {:?} for files named '{}.*'", tag, dir, base_name);
    let mut entries = tokio::fs::read_dir(dir).await?;

    let mut found: Vec<PathBuf> = Vec::new();
    let mut latest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !matches_base_name(file_name, base_name) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("⚠️ [{}] Stat failed for {:?}: {}", tag, entry.path(), e);
                continue;
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();

        if latest.as_ref().map_or(true, |(time, _)| modified > *time) {
            latest = Some((modified, path.clone()));
        }
        found.push(path);
    }

    let (_, selected) = latest.ok_or_else(|| {
        AppError::NotFoundAfterDownload(format!("no file named '{}.*' in {:?}", base_name, dir))
    })?;

    if found.len() > 1 {
        log::warn!(
            "⚠️ [{}] Multiple files match '{}': {:?}. Selected latest: {:?}",
            tag,
            base_name,
            found,
            selected
        );
    }

    Ok(selected)
}
