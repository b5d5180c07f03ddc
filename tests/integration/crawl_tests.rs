//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use corpus_crawler::config::{Config, CrawlConfig};
use corpus_crawler::crawler::{Coordinator, FetchError, Fetcher};
use corpus_crawler::output::Termination;
use corpus_crawler::robots::{RobotsPolicy, RobotsTxtPolicy, MAX_CRAWL_DELAY};
use corpus_crawler::state::TaskState;
use corpus_crawler::storage::{Manifest, RunStatus, SqliteManifest};
use corpus_crawler::fingerprint;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration crawling `seed` into `root`
fn create_test_config(seed: &str, root: &Path) -> Config {
    let mut config = Config::default();
    config.crawl.seeds = vec![seed.to_string()];
    config.crawl.max_depth = 2;
    config.crawl.user_agent = "TestBot/1.0".to_string();
    config.crawl.delay_between_requests_sec = 0.0;
    config.crawl.inter_request_delay_sec = 0.0;
    config.crawl.max_retries = 1;
    config.crawl.backoff_factor_sec = 0.01;
    config.crawl.request_timeout_sec = 5.0;
    config.storage.root = root.to_path_buf();
    config
}

fn fetcher_config() -> CrawlConfig {
    CrawlConfig {
        delay_between_requests_sec: 0.0,
        max_retries: 2,
        backoff_factor_sec: 0.01,
        request_timeout_sec: 5.0,
        max_redirects: 3,
        user_agent: "TestBot/1.0".to_string(),
        ..CrawlConfig::default()
    }
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_full_crawl_saves_markdown_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let seed = format!("{}/", base_url);

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><head><title>Home</title><script>var tracking = 1;</script></head>
            <body><nav>Site menu</nav><h1>Welcome Home</h1>
            <p>Public information portal.</p><a href="/about">About us</a></body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html_page(
            r#"<html><head><title>About</title></head>
            <body><h1>About</h1><p>We publish notices.</p><a href="/">Home</a></body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();

    let termination = coordinator.run().await;
    assert_eq!(termination, Termination::QueueExhausted);

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 2);
    assert_eq!(stats.pages_saved, 2);
    assert_eq!(stats.tasks_failed, 0);
    assert_eq!(stats.visited, 2);

    let home = std::fs::read_to_string(
        temp_dir
            .path()
            .join("pages")
            .join(format!("{}.md", fingerprint(&seed))),
    )
    .unwrap();
    assert!(home.starts_with(&format!("--- SOURCE: {} ---\n\n", seed)));
    assert!(home.contains("Welcome Home"));
    assert!(home.contains("Public information portal."));
    assert!(!home.contains("tracking"));
    assert!(!home.contains("Site menu"));

    let about_path = temp_dir
        .path()
        .join("pages")
        .join(format!("{}.md", fingerprint(&format!("{}/about", base_url))));
    assert!(about_path.exists());
}

#[tokio::test]
async fn test_crawl_records_provenance_manifest() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><head><title>Home</title></head><body><a href="/missing">Gone</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap().with_config_hash("abc123");

    coordinator.run().await;
    let run_id = coordinator.run_id().unwrap();
    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.tasks_failed, 1);

    let manifest = SqliteManifest::new(&temp_dir.path().join("manifest.db")).unwrap();
    let run = manifest.get_run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "abc123");
    assert_eq!(run.totals.pages_processed, 1);

    let home = manifest.get_task(run_id, &seed).unwrap().unwrap();
    assert_eq!(home.state, TaskState::Processed);
    assert_eq!(home.title.as_deref(), Some("Home"));
    assert_eq!(home.status_code, Some(200));

    let missing_url = format!("{}/missing", mock_server.uri());
    let missing = manifest.get_task(run_id, &missing_url).unwrap().unwrap();
    assert_eq!(missing.state, TaskState::Failed);
    assert_eq!(missing.status_code, Some(404));
    assert_eq!(missing.error_message.as_deref(), Some("HTTP 404"));
    assert_eq!(missing.parent_url.as_deref(), Some(seed.as_str()));
    assert_eq!(missing.context.as_deref(), Some("Gone"));
}

#[tokio::test]
async fn test_depth_limit_is_respected() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/level1">Next</a></body></html>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/level1"))
        .respond_with(html_page(r#"<html><body><a href="/level2">Deeper</a></body></html>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    // One hop past max_depth, so it must never be requested
    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(html_page("<html><body>Too deep</body></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&seed, temp_dir.path());
    config.crawl.max_depth = 1;

    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 2);
    assert_eq!(stats.tasks_skipped, 1);
    assert_eq!(stats.frontier_enqueued, 3);
}

#[tokio::test]
async fn test_strict_depth_rejects_at_enqueue() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/level1">Next</a></body></html>"#))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&seed, temp_dir.path());
    config.crawl.max_depth = 0;
    config.crawl.strict_depth = true;

    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.tasks_skipped, 0);
    assert_eq!(stats.frontier_skipped, 1);
}

#[tokio::test]
async fn test_external_links_are_not_followed() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body>
            <a href="https://external.example.org/page">Elsewhere</a>
            <a href="mailto:info@example.org">Mail</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();

    assert_eq!(coordinator.run().await, Termination::QueueExhausted);

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.frontier_skipped, 1);
    assert_eq!(stats.visited, 1);
}

#[tokio::test]
async fn test_page_budget_leaves_pending_tasks() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/about">About us</a></body></html>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html_page("<html><body>About</body></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&seed, temp_dir.path());
    config.crawl.max_pages = 1;

    let mut coordinator = Coordinator::new(config).unwrap();
    assert_eq!(coordinator.run().await, Termination::PageBudgetReached);

    let pending: Vec<_> = coordinator.frontier().pending().collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, format!("{}/about", mock_server.uri()));
    assert_eq!(pending[0].depth, 1);
    assert_eq!(pending[0].parent_url.as_deref(), Some(seed.as_str()));
    assert_eq!(pending[0].context.as_deref(), Some("About us"));

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.termination, Termination::PageBudgetReached);
}

#[tokio::test]
async fn test_linked_pdf_is_downloaded() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());
    let pdf_url = format!("{}/docs/report.pdf", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/docs/report.pdf">Annual report</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/docs/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4 test".to_vec())
                .insert_header("content-type", "application/pdf"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.pdfs_saved, 1);
    assert_eq!(stats.pages_processed, 1);
    assert_eq!(stats.visited, 1);

    let saved = temp_dir
        .path()
        .join("pdfs")
        .join(format!("{}.pdf", fingerprint(&pdf_url)));
    assert_eq!(std::fs::read(saved).unwrap(), b"%PDF-1.4 test");
}

#[tokio::test]
async fn test_existing_pdf_is_not_downloaded_again() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());
    let pdf_url = format!("{}/docs/report.pdf", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/docs/report.pdf">Annual report</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/docs/report.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/pdf"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let pdf_dir = temp_dir.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();
    std::fs::write(pdf_dir.join(format!("{}.pdf", fingerprint(&pdf_url))), b"old copy").unwrap();

    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.pdfs_saved, 0);
    assert_eq!(stats.binaries_reused, 1);
}

#[tokio::test]
async fn test_images_with_wanted_extensions_are_downloaded() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());
    let logo_url = format!("{}/img/logo.png", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><img src="/img/logo.png" alt="Logo"><img src="/img/anim.gif"></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x89, b'P', b'N', b'G'])
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/anim.gif"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/gif"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.images_saved, 1);

    let saved = temp_dir
        .path()
        .join("images")
        .join(format!("{}.png", fingerprint(&logo_url)));
    assert_eq!(std::fs::read(saved).unwrap(), vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_robots_txt_disallow_is_respected() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/private/notes">Private</a><a href="/public">Public</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_page("<html><body>Open</body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/notes"))
        .respond_with(html_page("<html><body>Secret</body></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&seed, temp_dir.path());
    config.crawl.respect_robots_txt = true;

    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    let stats = coordinator.finish();
    assert_eq!(stats.pages_processed, 2);
    assert_eq!(stats.tasks_skipped, 1);
}

#[tokio::test]
async fn test_robots_txt_ignored_by_default() {
    let mock_server = MockServer::start().await;
    let seed = format!("{}/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<html><body>Home</body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&seed, temp_dir.path());
    let mut coordinator = Coordinator::new(config).unwrap();
    coordinator.run().await;

    assert_eq!(coordinator.finish().pages_processed, 1);
}

#[tokio::test]
async fn test_fetcher_paces_requests_to_same_host() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html_page("<html><body>ok</body></html>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = fetcher_config();
    config.delay_between_requests_sec = 1.0;
    let fetcher = Fetcher::open(&config).unwrap();

    let started = Instant::now();
    let first = fetcher.fetch(&format!("{}/a", mock_server.uri())).await;
    let second = fetcher.fetch(&format!("{}/b", mock_server.uri())).await;

    assert!(first.success());
    assert!(second.success());
    assert!(started.elapsed() >= Duration::from_millis(950));
}

#[tokio::test]
async fn test_fetcher_retries_transient_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html_page("<html><body>recovered</body></html>"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let result = fetcher.fetch(&format!("{}/flaky", mock_server.uri())).await;

    assert!(result.success());
    assert_eq!(result.status_code, 200);
    assert!(result.text().unwrap().contains("recovered"));
}

#[tokio::test]
async fn test_fetcher_reports_persistent_failure() {
    let mock_server = MockServer::start().await;

    // One initial attempt plus two retries
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let result = fetcher.fetch(&format!("{}/down", mock_server.uri())).await;

    assert!(!result.success());
    assert_eq!(result.status_code, 503);
    assert_eq!(result.error, Some(FetchError::Status(503)));
    assert_eq!(result.error.unwrap().to_string(), "HTTP 503");
    assert!(result.payload.is_none());
}

#[tokio::test]
async fn test_fetcher_records_redirect_chain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/middle"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html_page("<html><body>moved</body></html>"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let result = fetcher.fetch(&format!("{}/old", base_url)).await;

    assert!(result.success());
    assert!(result.was_redirected());
    assert_eq!(
        result.redirect_chain,
        vec![format!("{}/old", base_url), format!("{}/middle", base_url)]
    );
    assert_eq!(result.final_url, format!("{}/new", base_url));
}

#[tokio::test]
async fn test_fetcher_stops_redirect_loops() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let result = fetcher.fetch(&format!("{}/loop", mock_server.uri())).await;

    assert!(!result.success());
    assert_eq!(result.error, Some(FetchError::TooManyRedirects));
    assert_eq!(result.redirect_chain.len(), 3);
}

#[tokio::test]
async fn test_head_probe_reports_metadata() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/file.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .insert_header("content-length", "2048"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let info = fetcher.head(&format!("{}/file.pdf", mock_server.uri())).await;

    assert_eq!(info.status_code, 200);
    assert_eq!(info.content_type, "application/pdf");
    assert!(info.error.is_none());
}

#[tokio::test]
async fn test_huge_crawl_delay_is_clamped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1e20\n"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::open(&fetcher_config()).unwrap();
    let mut policy = RobotsTxtPolicy::new("TestBot/1.0");
    let url = url::Url::parse(&format!("{}/page", mock_server.uri())).unwrap();

    assert!(policy.is_allowed(&url, &fetcher).await);
    assert_eq!(
        fetcher.pacer().delay_for(url.host_str().unwrap()),
        MAX_CRAWL_DELAY
    );
}
