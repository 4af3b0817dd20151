use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::downloader::tool::CommandRunner;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchPlatformKind {
    YouTube,
    SoundCloud,
}

/// One platform in the search fallback chain.
#[async_trait]
pub trait PlatformSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Canonical page URL of the best hit, `None` when nothing matched.
    async fn first_hit(&self, query: &str) -> Result<Option<String>>;
}

pub struct YouTubeSearch {
    runner: Arc<dyn CommandRunner>,
}

impl YouTubeSearch {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PlatformSearch for YouTubeSearch {
    fn name(&self) -> &str {
        "YouTube"
    }

    async fn first_hit(&self, query: &str) -> Result<Option<String>> {
        let args = vec![
            "--print".to_string(),
            "webpage_url".to_string(),
            "--no-warnings".to_string(),
            format!("ytsearch1:{}", query),
        ];
        let output = self
            .runner
            .run(&args)
            .await
            .map_err(|e| e.into_app_error(AppError::Resolution))?;

        if !output.success && output.stdout_is_empty() {
            return Err(AppError::Resolution(format!(
                "yt-dlp search failed: {}",
                output.stderr.lines().last().unwrap_or("no output")
            )));
        }

        Ok(output
            .stdout_text()
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("http"))
            .map(str::to_string))
    }
}

pub struct SoundCloudSearch {
    runner: Arc<dyn CommandRunner>,
}

impl SoundCloudSearch {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PlatformSearch for SoundCloudSearch {
    fn name(&self) -> &str {
        "SoundCloud"
    }

    async fn first_hit(&self, query: &str) -> Result<Option<String>> {
        let args = vec!["-J".to_string(), format!("scsearch1:{}", query)];
        let output = self
            .runner
            .run(&args)
            .await
            .map_err(|e| e.into_app_error(AppError::Resolution))?;

        if output.stdout_is_empty() {
            if output.success {
                return Ok(None);
            }
            return Err(AppError::Resolution(format!(
                "yt-dlp search failed: {}",
                output.stderr.lines().last().unwrap_or("no output")
            )));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::Resolution(format!("failed to parse search results: {}", e)))?;

        Ok(json["entries"]
            .as_array()
            .and_then(|entries| entries.first())
            .and_then(|entry| entry["webpage_url"].as_str().or_else(|| entry["url"].as_str()))
            .filter(|url| !url.is_empty())
            .map(str::to_string))
    }
}

/// Cross-platform lookup for tracks that only exist as catalog metadata.
pub struct SearchManager {
    platforms: Vec<Arc<dyn PlatformSearch>>,
}

impl SearchManager {
    pub fn new(platforms: Vec<Arc<dyn PlatformSearch>>) -> Self {
        Self { platforms }
    }

    pub fn from_kinds(kinds: &[SearchPlatformKind], runner: Arc<dyn CommandRunner>) -> Self {
        let platforms = kinds
            .iter()
            .map(|kind| -> Arc<dyn PlatformSearch> {
                match kind {
                    SearchPlatformKind::YouTube => Arc::new(YouTubeSearch::new(runner.clone())),
                    SearchPlatformKind::SoundCloud => Arc::new(SoundCloudSearch::new(runner.clone())),
                }
            })
            .collect();
        Self::new(platforms)
    }

    pub fn get_available_sources(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name().to_string()).collect()
    }

    /// Tries each platform in order and returns the first hit.
    ///
    /// A platform that errors counts as a miss; `NotFound` is returned only
    /// after every platform has been asked.
    pub async fn resolve_via_search(&self, query: &str) -> Result<String> {
        for platform in &self.platforms {
            match platform.first_hit(query).await {
                Ok(Some(url)) => {
                    log::info!("✅ [SEARCH] '{}' found on {}: {}", query, platform.name(), url);
                    return Ok(url);
                }
                Ok(None) => {
                    log::info!("[SEARCH] '{}' not found on {}", query, platform.name());
                }
                Err(e) => {
                    log::warn!("⚠️ [SEARCH] {} search for '{}' failed: {}", platform.name(), query, e);
                }
            }
        }

        Err(AppError::NotFound(format!(
            "'{}' not found on {}",
            query,
            self.get_available_sources().join(" or ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::tool::testing::{exit_with, ok_json, ScriptedRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePlatform {
        name: &'static str,
        hit: Option<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakePlatform {
        fn new(name: &'static str, hit: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self { name, hit, fail: false, calls: AtomicUsize::new(0) })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, hit: None, fail: true, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl PlatformSearch for FakePlatform {
        fn name(&self) -> &str {
            self.name
        }

        async fn first_hit(&self, _query: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Resolution("boom".into()));
            }
            Ok(self.hit.map(str::to_string))
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_platform_and_stops() {
        let first = FakePlatform::new("first", None);
        let second = FakePlatform::new("second", Some("https://soundcloud.com/a/b"));
        let third = FakePlatform::new("third", Some("https://example.com/never"));
        let manager = SearchManager::new(vec![first.clone(), second.clone(), third.clone()]);

        let url = manager.resolve_via_search("Artist - Title").await.unwrap();
        assert_eq!(url, "https://soundcloud.com/a/b");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn erroring_platform_counts_as_miss() {
        let first = FakePlatform::failing("first");
        let second = FakePlatform::new("second", Some("https://youtu.be/x"));
        let manager = SearchManager::new(vec![first, second]);
        assert_eq!(manager.resolve_via_search("q").await.unwrap(), "https://youtu.be/x");
    }

    #[tokio::test]
    async fn exhausted_platforms_are_not_found() {
        let manager = SearchManager::new(vec![FakePlatform::new("a", None), FakePlatform::failing("b")]);
        let err = manager.resolve_via_search("q").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn youtube_search_reads_printed_url() {
        let runner = Arc::new(ScriptedRunner::always(|_| Ok(ok_json("https://www.youtube.com/watch?v=abc\n"))));
        let search = YouTubeSearch::new(runner.clone());
        let hit = search.first_hit("Band - Song").await.unwrap();
        assert_eq!(hit.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        assert_eq!(runner.calls.lock().unwrap()[0].last().unwrap(), "ytsearch1:Band - Song");
    }

    #[tokio::test]
    async fn youtube_search_without_output_is_a_miss() {
        let runner = Arc::new(ScriptedRunner::always(|_| Ok(ok_json(""))));
        let search = YouTubeSearch::new(runner);
        assert_eq!(search.first_hit("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn soundcloud_search_reads_first_entry() {
        let runner = Arc::new(ScriptedRunner::always(|_| {
            Ok(ok_json(r#"{"_type":"playlist","entries":[{"webpage_url":"https://soundcloud.com/x/y"}]}"#))
        }));
        let search = SoundCloudSearch::new(runner);
        assert_eq!(search.first_hit("q").await.unwrap().as_deref(), Some("https://soundcloud.com/x/y"));
    }

    #[tokio::test]
    async fn soundcloud_search_with_no_entries_is_a_miss() {
        let runner = Arc::new(ScriptedRunner::always(|_| Ok(ok_json(r#"{"_type":"playlist","entries":[]}"#))));
        let search = SoundCloudSearch::new(runner);
        assert_eq!(search.first_hit("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn soundcloud_hard_failure_is_an_error() {
        let runner = Arc::new(ScriptedRunner::always(|_| Ok(exit_with(1, "", "ERROR: boom"))));
        let search = SoundCloudSearch::new(runner);
        assert!(search.first_hit("q").await.is_err());
    }

    #[test]
    fn builds_platforms_in_configured_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let manager = SearchManager::from_kinds(
            &[SearchPlatformKind::SoundCloud, SearchPlatformKind::YouTube],
            runner,
        );
        assert_eq!(manager.get_available_sources(), vec!["SoundCloud", "YouTube"]);
    }
}
