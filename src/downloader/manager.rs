use std::future::Future;
use std::sync::Arc;
use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use crate::api::{CollectionDescriptor, MediaKind, TrackDescriptor, TrackOrigin};
use crate::config::MAX_MEDIA_GROUP_SIZE;
use crate::downloader::delivery::{DeliveryBatcher, DeliveryReport};
use crate::downloader::extractor::MediaResolver;
use crate::downloader::progress::ProgressReporter;
use crate::downloader::ytdlp::TrackDownloader;
use crate::downloader::DownloadedFile;
use crate::errors::{AppError, Result};
use crate::messages;
use crate::metadata::{CatalogKind, CatalogService};
use crate::search::SearchManager;
use crate::transport::{ChatId, ChatTransport, MessageId};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 3;

/// What a batch downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    /// A playlist or album link the extraction tool understands.
    Link(String),
    /// An album or playlist from the streaming catalog.
    Catalog { kind: CatalogKind, id: String },
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub chat: ChatId,
    /// Existing message that is edited with progress and results.
    pub status_message: MessageId,
    pub source: BatchSource,
    /// Log tag of the requesting user.
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The collection could not be read; no worker was started.
    FetchFailed,
    /// Every member failed, or there were none.
    AllFailed { total: usize },
    Delivered { total: usize, succeeded: usize, report: DeliveryReport },
    /// The job itself faulted and was stopped at its boundary.
    Crashed,
}

/// Shared by the workers of one batch; only touched under its lock.
#[derive(Debug, Default)]
struct BatchState {
    files: Vec<DownloadedFile>,
    attempted: usize,
    succeeded: usize,
}

/// Runs `job` on its own task and turns a panic into one failure message.
///
/// The message edits `report_to` when given, otherwise it is sent as a new
/// message. Returns `None` when the job did not finish normally.
pub async fn supervise<T, F>(
    transport: Arc<dyn ChatTransport>,
    chat: ChatId,
    report_to: Option<MessageId>,
    tag: &str,
    job: F,
) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("💥 [{}] Job stopped at its boundary: {}", tag, e);
            let reported = match report_to {
                Some(message) => transport.edit_text(chat, message, messages::BATCH_CRASHED).await,
                None => transport.send_text(chat, messages::BATCH_CRASHED, None, &[]).await.map(|_| ()),
            };
            if let Err(e) = reported {
                log::error!("❌ [{}] Could not report the failure: {}", tag, e);
            }
            None
        }
    }
}

/// Downloads whole playlists and albums.
#[derive(Clone)]
pub struct BatchManager {
    resolver: Arc<dyn MediaResolver>,
    search: Arc<SearchManager>,
    downloader: Arc<dyn TrackDownloader>,
    catalog: Option<Arc<dyn CatalogService>>,
    transport: Arc<dyn ChatTransport>,
    concurrency: usize,
    group_size: usize,
}

impl BatchManager {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        search: Arc<SearchManager>,
        downloader: Arc<dyn TrackDownloader>,
        catalog: Option<Arc<dyn CatalogService>>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            resolver,
            search,
            downloader,
            catalog,
            transport,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            group_size: MAX_MEDIA_GROUP_SIZE,
        }
    }

    pub fn with_limits(mut self, concurrency: usize, group_size: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self.group_size = group_size.clamp(1, MAX_MEDIA_GROUP_SIZE);
        self
    }

    /// Starts `request` on its own task under a supervisory boundary.
    pub fn spawn_batch(&self, request: BatchRequest) -> JoinHandle<BatchOutcome> {
        let manager = self.clone();
        tokio::spawn(async move {
            let transport = manager.transport.clone();
            let chat = request.chat;
            let status = request.status_message;
            let tag = request.tag.clone();
            supervise(transport, chat, Some(status), &tag, async move { manager.run_batch(request).await })
                .await
                .unwrap_or(BatchOutcome::Crashed)
        })
    }

    async fn fetch(&self, source: &BatchSource) -> Result<CollectionDescriptor> {
        match source {
            BatchSource::Link(url) => self.resolver.resolve_link(url).await,
            BatchSource::Catalog { kind, id } => {
                let catalog = self
                    .catalog
                    .as_ref()
                    .ok_or_else(|| AppError::Catalog("catalog lookups are disabled".to_string()))?;
                Ok(catalog.collection(*kind, id).await?.into_descriptor())
            }
        }
    }

    /// Fetches the collection, downloads every member as audio with bounded
    /// concurrency, then delivers whatever succeeded.
    pub async fn run_batch(&self, request: BatchRequest) -> BatchOutcome {
        let BatchRequest { chat, status_message, source, tag } = request;
        log::info!("📥 [{}] Batch started for {:?}", tag, source);

        let collection = match self.fetch(&source).await {
            Ok(collection) => collection,
            Err(e) => {
                log::error!("❌ [{}] Could not fetch collection {:?}: {}", tag, source, e);
                self.edit_status(chat, status_message, messages::BATCH_FETCH_FAILED, &tag).await;
                return BatchOutcome::FetchFailed;
            }
        };

        let total = collection.total_tracks();
        let title = collection.title.clone();
        if total == 0 {
            log::warn!("⚠️ [{}] Collection '{}' has no members", tag, title);
            self.edit_status(chat, status_message, messages::EMPTY_COLLECTION, &tag).await;
            return BatchOutcome::AllFailed { total };
        }

        let state = Arc::new(Mutex::new(BatchState::default()));
        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let reporter = Arc::new(ProgressReporter::start(self.transport.clone(), chat, status_message));
        reporter.report(messages::batch_progress(&title, 0, 0, total));

        let workers: Vec<JoinHandle<()>> = collection
            .members
            .into_iter()
            .enumerate()
            .map(|(index, member)| {
                let manager = self.clone();
                let state = state.clone();
                let limiter = limiter.clone();
                let reporter = reporter.clone();
                let title = title.clone();
                let tag = tag.clone();
                tokio::spawn(async move {
                    let result = match limiter.acquire_owned().await {
                        Ok(_permit) => manager.process_member(&member, &tag).await,
                        Err(e) => Err(AppError::Internal(format!("download limiter closed: {}", e))),
                    };

                    let mut state = state.lock().await;
                    state.attempted += 1;
                    match result {
                        Ok(file) => {
                            state.succeeded += 1;
                            state.files.push(file);
                        }
                        Err(e) => {
                            log::warn!(
                                "⚠️ [{}] Track {}/{} '{}' skipped: {}",
                                tag,
                                index + 1,
                                total,
                                member.search_query(),
                                e
                            );
                        }
                    }
                    reporter.report(messages::batch_progress(&title, state.attempted, state.succeeded, total));
                })
            })
            .collect();

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                log::error!("💥 [{}] Download worker faulted: {}", tag, e);
                let mut state = state.lock().await;
                state.attempted += 1;
                reporter.report(messages::batch_progress(&title, state.attempted, state.succeeded, total));
            }
        }

        let (files, attempted, succeeded) = {
            let mut state = state.lock().await;
            (std::mem::take(&mut state.files), state.attempted, state.succeeded)
        };
        debug_assert_eq!(attempted, total);
        log::info!("🏁 [{}] '{}': {} of {} track(s) downloaded", tag, title, succeeded, total);

        match Arc::try_unwrap(reporter) {
            Ok(reporter) => reporter.finish().await,
            Err(_) => log::warn!("⚠️ [{}] Progress reporter still shared after all workers finished", tag),
        }

        if files.is_empty() {
            self.edit_status(chat, status_message, &messages::batch_all_failed(&title, total), &tag).await;
            return BatchOutcome::AllFailed { total };
        }

        self.edit_status(chat, status_message, &messages::batch_summary(&title, succeeded, total), &tag).await;
        let report = DeliveryBatcher::new(self.transport.clone(), self.group_size)
            .deliver(chat, files, &tag)
            .await;

        BatchOutcome::Delivered { total, succeeded, report }
    }

    /// One member: find a concrete URL, then download it as audio.
    async fn process_member(&self, member: &TrackDescriptor, tag: &str) -> Result<DownloadedFile> {
        match member.origin {
            TrackOrigin::Extractor => {
                if member.source_url.is_empty() {
                    return Err(AppError::Resolution(format!("'{}' has no URL", member.title)));
                }
                // flat playlist entries lack per-track metadata
                let detailed = self.resolver.resolve_track(&member.source_url).await?;
                let url = if detailed.source_url.is_empty() {
                    member.source_url.clone()
                } else {
                    detailed.source_url.clone()
                };
                self.downloader.download(&url, MediaKind::Audio, &detailed, tag).await
            }
            TrackOrigin::Catalog => {
                let url = self.search.resolve_via_search(&member.search_query()).await?;
                self.downloader.download(&url, MediaKind::Audio, member, tag).await
            }
        }
    }

    async fn edit_status(&self, chat: ChatId, message: MessageId, text: &str, tag: &str) {
        if let Err(e) = self.transport.edit_text(chat, message, text).await {
            log::warn!("⚠️ [{}] Failed to update status message: {}", tag, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CollectionKind;
    use crate::search::PlatformSearch;
    use crate::transport::testing::{RecordingTransport, Sent};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts members between track resolution and the end of their download.
    #[derive(Default)]
    struct Gauge {
        now: AtomicUsize,
        max: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.now.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeResolver {
        collection: Option<CollectionDescriptor>,
        panic_on_fetch: bool,
        track_calls: AtomicUsize,
        gauge: Option<Arc<Gauge>>,
    }

    impl FakeResolver {
        fn with_members(count: usize) -> Self {
            let members = (0..count)
                .map(|i| TrackDescriptor::new(format!("Track {}", i), "Unknown Artist", format!("https://example.com/t/{}", i)))
                .collect();
            Self {
                collection: Some(CollectionDescriptor {
                    kind: CollectionKind::Collection,
                    title: "Mix".into(),
                    owner: "dj".into(),
                    members,
                }),
                panic_on_fetch: false,
                track_calls: AtomicUsize::new(0),
                gauge: None,
            }
        }

        fn failing() -> Self {
            Self { collection: None, panic_on_fetch: false, track_calls: AtomicUsize::new(0), gauge: None }
        }
    }

    #[async_trait]
    impl MediaResolver for FakeResolver {
        async fn resolve_link(&self, url: &str) -> Result<CollectionDescriptor> {
            if self.panic_on_fetch {
                panic!("resolver exploded");
            }
            self.collection
                .clone()
                .ok_or_else(|| AppError::Resolution(format!("cannot read {}", url)))
        }

        async fn resolve_track(&self, url: &str) -> Result<TrackDescriptor> {
            self.track_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gauge) = &self.gauge {
                gauge.enter();
            }
            let index = url.rsplit('/').next().unwrap_or_default();
            Ok(TrackDescriptor::new(format!("Track {}", index), "Band", url))
        }
    }

    /// Writes a real file per download.
    struct FakeDownloader {
        dir: PathBuf,
        fail: HashSet<String>,
        panic_on: HashSet<String>,
        calls: AtomicUsize,
        gauge: Option<Arc<Gauge>>,
        produced: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl FakeDownloader {
        fn new(dir: &std::path::Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                fail: HashSet::new(),
                panic_on: HashSet::new(),
                calls: AtomicUsize::new(0),
                gauge: None,
                produced: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn failing_all(dir: &std::path::Path, count: usize) -> Self {
            let mut downloader = Self::new(dir);
            downloader.fail = (0..count).map(|i| format!("Track {}", i)).collect();
            downloader
        }
    }

    #[async_trait]
    impl TrackDownloader for FakeDownloader {
        async fn download(&self, _url: &str, kind: MediaKind, track: &TrackDescriptor, _tag: &str) -> Result<DownloadedFile> {
            assert_eq!(kind, MediaKind::Audio);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(gauge) = &self.gauge {
                gauge.leave();
            }

            if self.panic_on.contains(&track.title) {
                panic!("downloader exploded on {}", track.title);
            }
            if self.fail.contains(&track.title) {
                return Err(AppError::Download(format!("{} unavailable", track.title)));
            }
            let path = self.dir.join(format!("{} - {}.mp3", track.artist, track.title));
            std::fs::write(&path, b"audio").unwrap();
            self.produced.lock().unwrap().push(path.clone());
            Ok(DownloadedFile::new(path, track.clone()))
        }
    }

    struct FixedSearch;

    #[async_trait]
    impl PlatformSearch for FixedSearch {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn first_hit(&self, query: &str) -> Result<Option<String>> {
            if query.contains("Missing") {
                return Ok(None);
            }
            Ok(Some(format!("https://example.com/search/{}", query.len())))
        }
    }

    fn manager(resolver: FakeResolver, downloader: Arc<FakeDownloader>, transport: Arc<RecordingTransport>) -> BatchManager {
        BatchManager::new(
            Arc::new(resolver),
            Arc::new(SearchManager::new(vec![Arc::new(FixedSearch)])),
            downloader,
            None,
            transport,
        )
    }

    fn request() -> BatchRequest {
        BatchRequest {
            chat: ChatId(42),
            status_message: MessageId(7),
            source: BatchSource::Link("https://example.com/playlist".into()),
            tag: "tester_1".into(),
        }
    }

    #[tokio::test]
    async fn every_member_is_attempted_and_delivered_in_groups() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let downloader = Arc::new(FakeDownloader::new(dir.path()));
        let resolver = FakeResolver::with_members(23);
        let batch = manager(resolver, downloader.clone(), transport.clone());

        let outcome = batch.run_batch(request()).await;

        match outcome {
            BatchOutcome::Delivered { total, succeeded, report } => {
                assert_eq!(total, 23);
                assert_eq!(succeeded, 23);
                assert_eq!(report.files_delivered, 23);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let sizes: Vec<usize> = transport.groups().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);

        let produced = downloader.produced.lock().unwrap().clone();
        assert_eq!(produced.len(), 23);
        assert!(produced.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn members_are_re_resolved_before_download() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let downloader = Arc::new(FakeDownloader::new(dir.path()));
        let resolver = Arc::new(FakeResolver::with_members(4));
        let batch = BatchManager::new(
            resolver.clone(),
            Arc::new(SearchManager::new(vec![])),
            downloader.clone(),
            None,
            transport.clone(),
        );

        batch.run_batch(request()).await;

        assert_eq!(resolver.track_calls.load(Ordering::SeqCst), 4);
        // detailed metadata replaced the shallow placeholder artist
        let groups = transport.groups();
        assert!(groups[0].iter().all(|a| a.performer.as_deref() == Some("Band")));
    }

    #[tokio::test]
    async fn fetch_failure_starts_no_workers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let downloader = Arc::new(FakeDownloader::new(dir.path()));
        let batch = manager(FakeResolver::failing(), downloader.clone(), transport.clone());

        let outcome = batch.run_batch(request()).await;

        assert_eq!(outcome, BatchOutcome::FetchFailed);
        assert!(downloader.produced.lock().unwrap().is_empty());
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.edits(), vec![messages::BATCH_FETCH_FAILED.to_string()]);
        assert!(transport.texts().is_empty());
    }

    #[tokio::test]
    async fn all_failed_sends_one_message_and_no_groups() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let downloader = Arc::new(FakeDownloader::failing_all(dir.path(), 5));
        let batch = manager(FakeResolver::with_members(5), downloader, transport.clone());

        let outcome = batch.run_batch(request()).await;

        assert_eq!(outcome, BatchOutcome::AllFailed { total: 5 });
        assert!(transport.groups().is_empty());
        let failure = messages::batch_all_failed("Mix", 5);
        assert_eq!(transport.edits().iter().filter(|t| **t == failure).count(), 1);
    }

    #[tokio::test]
    async fn partial_failure_delivers_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let mut downloader = FakeDownloader::new(dir.path());
        downloader.fail = ["Track 1", "Track 3"].iter().map(|s| s.to_string()).collect();
        let batch = manager(FakeResolver::with_members(6), Arc::new(downloader), transport.clone());

        let outcome = batch.run_batch(request()).await;

        assert!(matches!(outcome, BatchOutcome::Delivered { total: 6, succeeded: 4, .. }));
        assert_eq!(transport.groups().iter().map(Vec::len).sum::<usize>(), 4);
        assert!(transport.edits().contains(&messages::batch_summary("Mix", 4, 6)));
    }

    #[tokio::test]
    async fn exactly_three_members_are_processed_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let gauge = Arc::new(Gauge::default());
        let mut resolver = FakeResolver::with_members(12);
        resolver.gauge = Some(gauge.clone());
        let mut downloader = FakeDownloader::new(dir.path());
        downloader.gauge = Some(gauge.clone());
        let downloader = Arc::new(downloader);
        let batch = manager(resolver, downloader.clone(), transport);

        let outcome = batch.run_batch(request()).await;

        assert!(matches!(outcome, BatchOutcome::Delivered { total: 12, succeeded: 12, .. }));
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 12);
        assert_eq!(gauge.now.load(Ordering::SeqCst), 0);
        assert_eq!(gauge.max.load(Ordering::SeqCst), DEFAULT_BATCH_CONCURRENCY);
    }

    #[tokio::test]
    async fn worker_panic_counts_as_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let mut downloader = FakeDownloader::new(dir.path());
        downloader.panic_on.insert("Track 2".to_string());
        let batch = manager(FakeResolver::with_members(5), Arc::new(downloader), transport.clone());

        let outcome = batch.run_batch(request()).await;

        assert!(matches!(outcome, BatchOutcome::Delivered { total: 5, succeeded: 4, .. }));
        let last_progress = transport
            .edits()
            .iter()
            .filter_map(|t| messages::parse_progress_count(t))
            .max();
        assert_eq!(last_progress, Some(5));
    }

    #[tokio::test]
    async fn progress_counts_never_go_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let downloader = Arc::new(FakeDownloader::new(dir.path()));
        let batch = manager(FakeResolver::with_members(15), downloader, transport.clone());

        batch.run_batch(request()).await;

        let counts: Vec<usize> = transport
            .sent()
            .iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => messages::parse_progress_count(text),
                _ => None,
            })
            .collect();
        assert!(!counts.is_empty());
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{:?}", counts);
        assert_eq!(counts.last(), Some(&15));
    }

    #[tokio::test]
    async fn crashed_job_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let mut resolver = FakeResolver::with_members(3);
        resolver.panic_on_fetch = true;
        let batch = manager(resolver, Arc::new(FakeDownloader::new(dir.path())), transport.clone());

        let outcome = batch.spawn_batch(request()).await.unwrap();

        assert_eq!(outcome, BatchOutcome::Crashed);
        assert_eq!(transport.edits(), vec![messages::BATCH_CRASHED.to_string()]);
    }

    #[tokio::test]
    async fn catalog_batch_without_catalog_is_a_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let batch = manager(FakeResolver::failing(), Arc::new(FakeDownloader::new(dir.path())), transport);

        let mut req = request();
        req.source = BatchSource::Catalog { kind: CatalogKind::Album, id: "abc".into() };
        assert_eq!(batch.run_batch(req).await, BatchOutcome::FetchFailed);
    }

    #[tokio::test]
    async fn catalog_members_go_through_search() {
        use crate::metadata::{CatalogCollection, CatalogSummary, CatalogTrack};

        struct FakeCatalog;

        #[async_trait]
        impl CatalogService for FakeCatalog {
            async fn track(&self, _id: &str) -> Result<CatalogTrack> {
                unreachable!()
            }

            async fn summary(&self, _kind: CatalogKind, _id: &str) -> Result<CatalogSummary> {
                unreachable!()
            }

            async fn collection(&self, kind: CatalogKind, _id: &str) -> Result<CatalogCollection> {
                Ok(CatalogCollection {
                    summary: CatalogSummary { kind, name: "Album".into(), owner: "Band".into(), total: 3 },
                    tracks: vec![
                        CatalogTrack { name: "One".into(), artists: vec!["Band".into()], url: None },
                        CatalogTrack { name: "Missing".into(), artists: vec!["Band".into()], url: None },
                        CatalogTrack { name: "Three".into(), artists: vec!["Band".into()], url: None },
                    ],
                })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let resolver = Arc::new(FakeResolver::failing());
        let batch = BatchManager::new(
            resolver.clone(),
            Arc::new(SearchManager::new(vec![Arc::new(FixedSearch)])),
            Arc::new(FakeDownloader::new(dir.path())),
            Some(Arc::new(FakeCatalog)),
            transport.clone(),
        );

        let mut req = request();
        req.source = BatchSource::Catalog { kind: CatalogKind::Album, id: "abc".into() };
        let outcome = batch.run_batch(req).await;

        assert!(matches!(outcome, BatchOutcome::Delivered { total: 3, succeeded: 2, .. }));
        assert_eq!(resolver.track_calls.load(Ordering::SeqCst), 0);
        let titles: HashSet<String> = transport.groups()[0].iter().filter_map(|a| a.title.clone()).collect();
        assert_eq!(titles, ["One", "Three"].iter().map(|s| s.to_string()).collect());
    }
}
