//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the breadth-first crawl loop that ties together:
//! - The frontier (scope, dedup, per-domain budget)
//! - The fetcher (pacing, retries, redirects)
//! - The robots policy
//! - Content handling (markdown pages, PDFs, images)
//! - The optional provenance manifest
//!
//! A run stops when the frontier is exhausted, the page budget is spent, the
//! wall-clock limit passes, or the shutdown future resolves. Per-task failures
//! never end the run; they are logged, counted and recorded.

use crate::config::Config;
use crate::crawler::fetcher::{Body, FetchResult, Fetcher, Payload};
use crate::crawler::frontier::{CrawlTask, Frontier};
use crate::crawler::parser::{is_pdf_link, parse_html, path_extension, ParsedPage};
use crate::output::{
    extension_for_content_type, page_document, render_page, visible_text, ArtifactKind,
    ArtifactStore, CrawlStats, Termination,
};
use crate::robots::{policy_for, RobotsPolicy};
use crate::state::TaskState;
use crate::storage::{ArtifactRecord, Manifest, RunStatus, SqliteManifest, TaskRecord};
use crate::url::{fingerprint, normalize_url};
use crate::Result;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use url::Url;

/// A progress line is logged every this many processed pages
const PROGRESS_INTERVAL: u64 = 10;

/// Outcome of writing an artifact; the error is the message recorded
type SaveResult = std::result::Result<(), String>;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    frontier: Frontier,
    fetcher: Fetcher,
    store: ArtifactStore,
    robots: Box<dyn RobotsPolicy>,
    manifest: Option<SqliteManifest>,
    config_hash: String,
    run_id: Option<i64>,

    /// Normalized URLs fetched successfully this run
    processed: HashSet<String>,

    /// Normalized URLs of binaries already attempted this run
    attempted_downloads: HashSet<String>,

    /// Lower-cased image extensions worth downloading
    image_extensions: HashSet<String>,

    stats: CrawlStats,
}

impl Coordinator {
    /// Creates a coordinator and seeds its frontier
    ///
    /// # Arguments
    ///
    /// * `config` - A validated crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage directories exist and the client is built
    /// * `Err(CrawlError)` - Bad patterns, unwritable storage root, manifest
    ///   or HTTP client failure
    pub fn new(config: Config) -> Result<Self> {
        let mut frontier = Frontier::new(&config)?;
        frontier.add_seeds(&config.crawl.seeds);

        let fetcher = Fetcher::open(&config.crawl)?;
        let store = ArtifactStore::create(&config.storage.root)?;

        let manifest = if config.storage.manifest {
            Some(SqliteManifest::new(&config.storage.manifest_path())?)
        } else {
            None
        };

        let image_extensions = config
            .storage
            .image_extensions
            .iter()
            .map(|ext| ext.to_ascii_lowercase())
            .collect();

        tracing::info!(
            "Coordinator ready: {} seed task(s), storage at {}",
            frontier.len(),
            store.root().display()
        );

        Ok(Self {
            robots: policy_for(&config.crawl),
            config,
            frontier,
            fetcher,
            store,
            manifest,
            config_hash: String::new(),
            run_id: None,
            processed: HashSet::new(),
            attempted_downloads: HashSet::new(),
            image_extensions,
            stats: CrawlStats::default(),
        })
    }

    /// Sets the configuration hash stored with the manifest run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Replaces the robots policy chosen from the configuration
    pub fn with_robots_policy(mut self, policy: Box<dyn RobotsPolicy>) -> Self {
        self.robots = policy;
        self
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn storage_root(&self) -> &Path {
        self.store.root()
    }

    /// Manifest run ID, once a run has started with a manifest
    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Current counters, including the frontier's
    pub fn stats(&self) -> CrawlStats {
        let mut stats = self.stats.clone();
        stats.frontier_enqueued = self.frontier.total_enqueued();
        stats.frontier_skipped = self.frontier.total_skipped();
        stats.visited = self.frontier.visited_count();
        stats
    }

    /// Runs until the frontier is exhausted or a budget is spent
    pub async fn run(&mut self) -> Termination {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the crawl loop until it stops on its own or `shutdown` resolves
    ///
    /// The task in flight when `shutdown` fires or the deadline passes is
    /// abandoned; anything it already saved stays on disk.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Termination
    where
        F: Future<Output = ()>,
    {
        self.begin_run();

        let started = Instant::now();
        let deadline = self
            .config
            .crawl
            .max_run_time()
            .map(|limit| tokio::time::Instant::now() + limit);
        let deadline_reached = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline_reached);

        let max_pages = u64::from(self.config.crawl.max_pages);

        tracing::info!(
            "Starting crawl: {} task(s) queued, max depth {}, max pages {}",
            self.frontier.len(),
            self.config.crawl.max_depth,
            max_pages
        );

        let termination = loop {
            if self.stats.pages_processed >= max_pages {
                tracing::info!("Page budget of {} reached", max_pages);
                break Termination::PageBudgetReached;
            }

            let Some(task) = self.frontier.dequeue() else {
                tracing::info!("Frontier is empty, crawl complete");
                break Termination::QueueExhausted;
            };

            let processed_before = self.stats.pages_processed;
            let stopped = tokio::select! {
                biased;
                _ = &mut shutdown => Some(Termination::Interrupted),
                _ = &mut deadline_reached => Some(Termination::DeadlineReached),
                _ = self.process_task(&task) => None,
            };

            if let Some(reason) = stopped {
                tracing::warn!("Crawl stopping ({}) while handling {}", reason, task.url);
                self.record_abandoned(&task, reason);
                break reason;
            }

            let processed = self.stats.pages_processed;
            if processed != processed_before && processed % PROGRESS_INTERVAL == 0 {
                let rate = processed as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "Progress: {} pages processed, {} in frontier, {:.2} pages/sec",
                    processed,
                    self.frontier.len(),
                    rate
                );
            }
        };

        self.stats.elapsed += started.elapsed();
        self.stats.termination = termination;

        let stats = self.stats();
        tracing::info!(
            "Crawl stopped ({}): {} processed, {} failed, {} skipped, {} visited in {:?}",
            termination,
            stats.pages_processed,
            stats.tasks_failed,
            stats.tasks_skipped,
            stats.visited,
            stats.elapsed
        );

        termination
    }

    /// Closes the manifest run and the HTTP client, returning final counters
    pub fn finish(mut self) -> CrawlStats {
        let stats = self.stats();
        let status = match stats.termination {
            Termination::Interrupted => RunStatus::Interrupted,
            _ => RunStatus::Completed,
        };

        if let (Some(manifest), Some(run_id)) = (self.manifest.as_mut(), self.run_id) {
            if let Err(e) = manifest.finish_run(
                run_id,
                status,
                Some(stats.termination.as_str()),
                &stats.run_totals(),
            ) {
                tracing::warn!("Failed to close manifest run {}: {}", run_id, e);
            }
        }

        self.fetcher.close();
        stats
    }

    fn begin_run(&mut self) {
        if self.run_id.is_some() {
            return;
        }
        let Some(manifest) = self.manifest.as_mut() else {
            return;
        };

        match manifest.begin_run(&self.config_hash) {
            Ok(run_id) => {
                tracing::info!("Recording provenance as run {}", run_id);
                self.run_id = Some(run_id);
            }
            Err(e) => {
                tracing::warn!("Manifest unavailable, continuing without it: {}", e);
                self.manifest = None;
            }
        }
    }

    /// Handles one dequeued task from discard checks to content handling
    async fn process_task(&mut self, task: &CrawlTask) {
        let mut record = TaskRecord::queued(task);

        if task.depth > self.config.crawl.max_depth {
            self.skip(record, "depth limit");
            return;
        }

        if self.processed.contains(&task.normalized_url) {
            self.skip(record, "already processed");
            return;
        }

        let url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                self.skip(record, &format!("invalid URL: {}", e));
                return;
            }
        };

        if is_pdf_link(&task.url)
            && self
                .store
                .binary_path(ArtifactKind::Pdf, &task.fingerprint, ".pdf")
                .exists()
        {
            self.stats.binaries_reused += 1;
            self.skip(record, "artifact already saved");
            return;
        }

        if !self.robots.is_allowed(&url, &self.fetcher).await {
            self.skip(record, "disallowed by robots.txt");
            return;
        }

        advance(&mut record, TaskState::Fetching);
        tracing::info!("[depth {}] Fetching {}", task.depth, task.url);

        let result = self.fetcher.fetch(&task.url).await;
        record.status_code = (result.status_code != 0).then_some(result.status_code);
        record.content_type = (!result.content_type.is_empty()).then(|| result.content_type.clone());

        if result.success() {
            self.stats.pages_processed += 1;
            self.processed.insert(task.normalized_url.clone());
            let outcome = self.handle_payload(task, result, &mut record).await;
            advance(&mut record, outcome);
        } else {
            self.stats.tasks_failed += 1;
            record.error_message = result.error.as_ref().map(ToString::to_string);
            advance(&mut record, TaskState::Failed);
        }

        self.save_task(&record);
        self.pause().await;
    }

    /// Dispatches a successful response by content kind
    async fn handle_payload(
        &mut self,
        task: &CrawlTask,
        result: FetchResult,
        record: &mut TaskRecord,
    ) -> TaskState {
        let FetchResult {
            final_url,
            content_type,
            payload,
            ..
        } = result;

        let saved = match payload {
            Some(Payload::Html(html)) => {
                let parsed = match base_url(&final_url, &task.url) {
                    Some(base) => parse_html(&html, &base),
                    None => ParsedPage::default(),
                };
                record.title = parsed.title.clone();
                let saved = self.save_page(task, html, &content_type).await;
                self.follow_links(task, parsed).await;
                saved
            }
            Some(Payload::Pdf(bytes)) => self.save_fetched_binary(
                task,
                ArtifactKind::Pdf,
                Some(".pdf".to_string()),
                &content_type,
                &bytes,
            ),
            Some(Payload::Image(bytes)) => {
                let ext = path_extension(&task.url)
                    .or_else(|| extension_for_content_type(&content_type).map(str::to_string));
                self.save_fetched_binary(task, ArtifactKind::Image, ext, &content_type, &bytes)
            }
            Some(Payload::Other(Body::Text(text))) => {
                self.write_page(task, &render_page(&task.url, &text), &content_type)
            }
            Some(Payload::Other(Body::Bytes(_))) => {
                tracing::debug!("Not saving {} ({})", task.url, content_type);
                record.error_message = Some(format!("unsupported content type: {}", content_type));
                return TaskState::Skipped;
            }
            None => Err("response carried no body".to_string()),
        };

        match saved {
            Ok(()) => TaskState::Processed,
            Err(message) => {
                tracing::error!("Failed to save {}: {}", task.url, message);
                record.error_message = Some(message);
                TaskState::Failed
            }
        }
    }

    /// Converts an HTML page to markdown and writes it
    async fn save_page(&mut self, task: &CrawlTask, html: String, content_type: &str) -> SaveResult {
        let url = task.url.clone();
        let document = tokio::task::spawn_blocking(move || {
            page_document(&url, &html).unwrap_or_else(|e| {
                tracing::warn!("{}; saving visible text instead", e);
                render_page(&url, &visible_text(&html))
            })
        })
        .await
        .map_err(|e| format!("markdown conversion aborted: {}", e))?;

        self.write_page(task, &document, content_type)
    }

    fn write_page(&mut self, task: &CrawlTask, document: &str, content_type: &str) -> SaveResult {
        let path = self
            .store
            .write_page(&task.fingerprint, document)
            .map_err(|e| e.to_string())?;

        self.stats.pages_saved += 1;
        tracing::info!("Saved page {} -> {}", task.url, path.display());
        self.save_artifact(ArtifactRecord {
            kind: ArtifactKind::Page,
            fingerprint: task.fingerprint.clone(),
            source_url: task.url.clone(),
            path: path.display().to_string(),
            content_type: (!content_type.is_empty()).then(|| content_type.to_string()),
            size_bytes: document.len() as u64,
        });
        Ok(())
    }

    /// Saves a PDF or image that was fetched as a task of its own
    fn save_fetched_binary(
        &mut self,
        task: &CrawlTask,
        kind: ArtifactKind,
        ext: Option<String>,
        content_type: &str,
        bytes: &[u8],
    ) -> SaveResult {
        self.attempted_downloads.insert(task.normalized_url.clone());

        let Some(ext) = ext else {
            return Err(format!("no file extension for {} content", kind));
        };

        if self.store.binary_path(kind, &task.fingerprint, &ext).exists() {
            self.stats.binaries_reused += 1;
            tracing::debug!("Keeping existing {} for {}", kind, task.url);
            return Ok(());
        }

        self.write_binary(&task.url, &task.fingerprint, kind, &ext, content_type, bytes)
            .map_err(|e| e.to_string())
    }

    /// Enqueues page links and downloads linked PDFs and images
    async fn follow_links(&mut self, task: &CrawlTask, parsed: ParsedPage) {
        let next_depth = task.depth + 1;
        let mut accepted = 0usize;

        for link in &parsed.links {
            if is_pdf_link(&link.url) {
                self.download(&link.url, ArtifactKind::Pdf).await;
                continue;
            }

            let context = (!link.text.is_empty()).then_some(link.text.as_str());
            if self
                .frontier
                .enqueue(&link.url, next_depth, Some(task.url.as_str()), context)
                .is_accepted()
            {
                accepted += 1;
            }
        }

        for image in &parsed.images {
            let wanted = path_extension(image).is_some_and(|ext| self.image_extensions.contains(&ext));
            if wanted {
                self.download(image, ArtifactKind::Image).await;
            }
        }

        tracing::debug!(
            "{}: {} links, {} new tasks, {} images",
            task.url,
            parsed.links.len(),
            accepted,
            parsed.images.len()
        );
    }

    /// Downloads a linked binary once per run, unless it is already on disk
    async fn download(&mut self, url: &str, kind: ArtifactKind) {
        if !self.attempted_downloads.insert(normalize_url(url)) {
            return;
        }

        let Ok(parsed) = Url::parse(url) else {
            return;
        };
        if !self.frontier.is_in_scope(&parsed) {
            tracing::debug!("Skipping out-of-scope {} {}", kind, url);
            return;
        }

        let Some(ext) = path_extension(url) else {
            tracing::debug!("Skipping {} without extension: {}", kind, url);
            return;
        };

        let fp = fingerprint(url);
        if self.store.binary_path(kind, &fp, &ext).exists() {
            self.stats.binaries_reused += 1;
            tracing::debug!("Already have {} {}", kind, url);
            return;
        }

        if !self.robots.is_allowed(&parsed, &self.fetcher).await {
            return;
        }

        tracing::info!("Downloading {} {}", kind, url);
        let result = self.fetcher.fetch(url).await;
        let bytes = match &result.payload {
            Some(Payload::Pdf(bytes))
            | Some(Payload::Image(bytes))
            | Some(Payload::Other(Body::Bytes(bytes))) => bytes.as_slice(),
            Some(Payload::Other(Body::Text(text))) => text.as_bytes(),
            Some(Payload::Html(_)) | None => {
                self.stats.downloads_failed += 1;
                match &result.error {
                    Some(error) => tracing::warn!("Download of {} failed: {}", url, error),
                    None => tracing::warn!("Download of {} returned an HTML page", url),
                }
                return;
            }
        };

        if let Err(e) = self.write_binary(url, &fp, kind, &ext, &result.content_type, bytes) {
            self.stats.downloads_failed += 1;
            tracing::error!("Failed to save {} {}: {}", kind, url, e);
        }
    }

    fn write_binary(
        &mut self,
        url: &str,
        fp: &str,
        kind: ArtifactKind,
        ext: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        let path = self.store.write_binary(kind, fp, ext, bytes)?;
        match kind {
            ArtifactKind::Pdf => self.stats.pdfs_saved += 1,
            ArtifactKind::Image => self.stats.images_saved += 1,
            ArtifactKind::Page => self.stats.pages_saved += 1,
        }
        tracing::info!("Saved {} {} -> {}", kind, url, path.display());

        self.save_artifact(ArtifactRecord {
            kind,
            fingerprint: fp.to_string(),
            source_url: url.to_string(),
            path: path.display().to_string(),
            content_type: (!content_type.is_empty()).then(|| content_type.to_string()),
            size_bytes: bytes.len() as u64,
        });
        Ok(())
    }

    fn skip(&mut self, mut record: TaskRecord, reason: &str) {
        tracing::debug!("Skipping {}: {}", record.url, reason);
        self.stats.tasks_skipped += 1;
        record.error_message = Some(reason.to_string());
        advance(&mut record, TaskState::Skipped);
        self.save_task(&record);
    }

    /// Records the task in flight when the loop was cut short
    fn record_abandoned(&mut self, task: &CrawlTask, reason: Termination) {
        let (Some(manifest), Some(run_id)) = (self.manifest.as_mut(), self.run_id) else {
            return;
        };
        // Keep the outcome if the task finished and was only pausing
        if let Ok(Some(_)) = manifest.get_task(run_id, &task.normalized_url) {
            return;
        }

        let mut record = TaskRecord::queued(task);
        record.error_message = Some(format!("abandoned: {}", reason));
        advance(&mut record, TaskState::Skipped);
        if let Err(e) = manifest.record_task(run_id, &record) {
            tracing::warn!("Failed to record {} in manifest: {}", task.url, e);
        }
    }

    fn save_task(&mut self, record: &TaskRecord) {
        if let (Some(manifest), Some(run_id)) = (self.manifest.as_mut(), self.run_id) {
            if let Err(e) = manifest.record_task(run_id, record) {
                tracing::warn!("Failed to record {} in manifest: {}", record.url, e);
            }
        }
    }

    fn save_artifact(&mut self, record: ArtifactRecord) {
        if let (Some(manifest), Some(run_id)) = (self.manifest.as_mut(), self.run_id) {
            if let Err(e) = manifest.record_artifact(run_id, &record) {
                tracing::warn!("Failed to record artifact {} in manifest: {}", record.path, e);
            }
        }
    }

    /// Fixed pause after every task that issued a request
    async fn pause(&self) {
        let delay = self.config.crawl.inter_request_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn advance(record: &mut TaskRecord, next: TaskState) {
    if let Err(e) = record.advance(next) {
        tracing::error!("{} for {}", e, record.url);
    }
}

/// Base for resolving page links: the post-redirect URL when it parses
fn base_url(final_url: &str, requested: &str) -> Option<Url> {
    Url::parse(final_url)
        .or_else(|_| Url::parse(requested))
        .ok()
}

/// Runs a complete crawl
///
/// Builds a coordinator, runs it until it stops or `shutdown` resolves, and
/// closes it.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored in the manifest
/// * `shutdown` - Resolves when the crawl should stop early
///
/// # Example
///
/// ```no_run
/// use corpus_crawler::config::load_config_with_hash;
/// use corpus_crawler::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("crawl.toml"))?;
/// let stats = run_crawl(config, &hash, async {
///     let _ = tokio::signal::ctrl_c().await;
/// })
/// .await?;
/// println!("{} pages processed", stats.pages_processed);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl<F>(config: Config, config_hash: &str, shutdown: F) -> Result<CrawlStats>
where
    F: Future<Output = ()>,
{
    let mut coordinator = Coordinator::new(config)?.with_config_hash(config_hash);
    coordinator.run_until(shutdown).await;
    Ok(coordinator.finish())
}
