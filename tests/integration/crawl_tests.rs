//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up a small school directory and run
//! the full crawl cycle end-to-end against a temporary record store.

use school_harvester::config::{
    Config, CrawlConfig, FailurePolicy, FetcherConfig, OutputConfig, SiteConfig,
};
use school_harvester::crawler::Coordinator;
use school_harvester::extract::SchoolsnetExtractor;
use school_harvester::output::export_store;
use school_harvester::regions::{select_regions, REGIONS};
use school_harvester::state::RegionState;
use school_harvester::storage::RecordStore;
use school_harvester::HarvestError;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/uk-schools/search/search-schools.html";
const NO_RESULTS: &str =
    "<html><body><p>Unfortunately, your search yielded no results.</p></body></html>";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &TempDir, regions: &[&str]) -> Config {
    Config {
        site: SiteConfig {
            base_url: base_url.to_string(),
            user_agent: "TestHarvester/1.0".to_string(),
        },
        fetcher: FetcherConfig {
            max_retries: 0,
            retry_delay_ms: 1,
            timeout_secs: 5,
            cache_path: None,
        },
        crawl: CrawlConfig {
            start_page: 1,
            on_region_failure: FailurePolicy::AbortRun,
            regions: regions.iter().map(|r| r.to_string()).collect(),
            max_new_records: None,
        },
        output: OutputConfig {
            store_path: dir.path().join("schools.jsonl").display().to_string(),
            export_dir: dir.path().join("export").display().to_string(),
        },
    }
}

fn results_page(total: usize, ids: &[u32]) -> String {
    let blocks: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<dl><dt><a href="/uk-schools/schools/{id}.html">School {id}</a></dt>
                <dd>{id} High St</dd><dd></dd><dd>Townsville </dd></dl>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><p>Your search yielded {total} schools</p><p class="ViewResult">Viewing</p>
        <table class="leasearch"><tr><td>{blocks}</td></tr></table></body></html>"#
    )
}

fn detail_page(id: u32) -> String {
    format!(
        r#"<html><body><div id="contentcolumn">
        <div itemprop="address"><span itemprop="name">School {id}</span>
          <span itemprop="telephone">0100 {id}</span></div>
        <dl><dt>Type:</dt><dd>Primary</dd><dt>Pupils:</dt><dd>{id}00</dd></dl>
        </div></body></html>"#
    )
}

/// Mounts the listing of one region: `pages` in order, then no results
async fn mount_listing(server: &MockServer, region_id: u32, total: usize, pages: &[&[u32]]) {
    for (i, ids) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("p_region_id", region_id.to_string()))
            .and(query_param("pageno", (i + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(results_page(total, ids)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", region_id.to_string()))
        .and(query_param("pageno", (pages.len() + 1).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(NO_RESULTS))
        .mount(server)
        .await;
}

/// Mounts a detail page that must be requested exactly `times` times
async fn mount_detail(server: &MockServer, id: u32, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/uk-schools/schools/{}.html", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(id)))
        .expect(times)
        .mount(server)
        .await;
}

fn seed_store(config: &Config, base_url: &str, ids: &[u32]) {
    let lines: String = ids
        .iter()
        .map(|id| {
            format!(
                "{{\"name\":\"School {id}\",\"url\":\"{base_url}/uk-schools/schools/{id}.html\",\"full_address\":\"{id} High St Townsville\",\"region\":\"Wales\",\"Type\":\"Primary\"}}\n"
            )
        })
        .collect();
    std::fs::write(&config.output.store_path, lines).unwrap();
}

async fn run(config: &Config) -> Result<school_harvester::crawler::RunSummary, HarvestError> {
    let regions = select_regions(&config.crawl.regions).unwrap();
    let mut coordinator = Coordinator::from_config(config, SchoolsnetExtractor).unwrap();
    coordinator.run(&regions).await
}

fn store_lines(config: &Config) -> Vec<serde_json::Value> {
    std::fs::read_to_string(&config.output.store_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_full_crawl_single_region() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 3, &[&[1, 2], &[3]]).await;
    for id in 1..=3 {
        mount_detail(&server, id, 1).await;
    }

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.regions.len(), 1);
    assert_eq!(summary.regions[0].state, RegionState::RegionComplete);
    assert_eq!(summary.fetched(), 3);

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 3);
    let first = lines[0].as_object().unwrap();
    let keys: Vec<&str> = first.keys().map(String::as_str).collect();
    assert_eq!(keys[..4], ["name", "url", "full_address", "region"]);
    assert_eq!(first["name"], "School 1");
    assert_eq!(first["full_address"], "1 High St Townsville");
    assert_eq!(first["region"], "Wales");
    assert_eq!(first["telephone"], "0100 1");
    assert_eq!(first["Pupils"], "100");
}

#[tokio::test]
async fn test_interrupted_runs_resume_without_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Wales"]);
    config.crawl.max_new_records = Some(2);

    mount_listing(&server, 2, 5, &[&[1, 2], &[3, 4], &[5]]).await;
    for id in 1..=5 {
        mount_detail(&server, id, 1).await;
    }

    let first = run(&config).await.unwrap();
    assert!(first.budget_exhausted);
    assert_eq!(first.fetched(), 2);

    let second = run(&config).await.unwrap();
    assert!(second.budget_exhausted);
    assert_eq!(second.regions[0].skipped, 2);
    assert_eq!(second.fetched(), 2);

    config.crawl.max_new_records = None;
    let third = run(&config).await.unwrap();
    assert_eq!(third.fetched(), 1);
    assert_eq!(third.regions[0].state, RegionState::RegionComplete);

    // Everything stored: the first row short-circuits the region
    let fourth = run(&config).await.unwrap();
    assert_eq!(fourth.fetched(), 0);
    assert_eq!(fourth.regions[0].skipped, 0);
    assert_eq!(fourth.regions[0].stored, 5);

    let urls: Vec<String> = store_lines(&config)
        .iter()
        .map(|r| r["url"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (1..=5)
        .map(|id| format!("{}/uk-schools/schools/{}.html", server.uri(), id))
        .collect();
    assert_eq!(urls, expected);
}

#[tokio::test]
async fn test_completed_region_fetches_no_details() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    mount_detail(&server, 1, 0).await;
    mount_detail(&server, 2, 0).await;
    seed_store(&config, &server.uri(), &[1, 2]);

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.regions[0].state, RegionState::RegionComplete);
    assert_eq!(summary.regions[0].total, Some(2));
    assert_eq!(summary.fetched(), 0);
}

#[tokio::test]
async fn test_stored_urls_are_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 3, &[&[1, 2], &[3]]).await;
    mount_detail(&server, 1, 0).await;
    mount_detail(&server, 2, 1).await;
    mount_detail(&server, 3, 1).await;
    seed_store(&config, &server.uri(), &[1]);

    let summary = run(&config).await.unwrap();
    let outcome = &summary.regions[0];
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.fetched, 2);
    assert_eq!(outcome.stored, 3);
    assert_eq!(store_lines(&config).len(), 3);
}

#[tokio::test]
async fn test_torn_last_line_is_discarded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 3, &[&[1, 2, 3]]).await;
    mount_detail(&server, 1, 0).await;
    mount_detail(&server, 2, 1).await;
    mount_detail(&server, 3, 1).await;

    seed_store(&config, &server.uri(), &[1]);
    let mut content = std::fs::read_to_string(&config.output.store_path).unwrap();
    content.push_str(r#"{"name":"School 2","url":"http://tor"#);
    std::fs::write(&config.output.store_path, content).unwrap();

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.fetched(), 2);

    // Every line parses and each url appears once
    let lines = store_lines(&config);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["name"], "School 2");
}

#[tokio::test]
async fn test_item_failures_store_listing_fields_only() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 3, &[&[1, 2, 3]]).await;
    mount_detail(&server, 1, 1).await;
    Mock::given(method("GET"))
        .and(path("/uk-schools/schools/2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Moved</body></html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uk-schools/schools/3.html"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", &*format!("{}/", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>home</html>"))
        .mount(&server)
        .await;

    let summary = run(&config).await.unwrap();
    let outcome = &summary.regions[0];
    assert_eq!(outcome.state, RegionState::RegionComplete);
    assert_eq!(outcome.fetched, 3);
    assert_eq!(outcome.failed_items, 2);

    let store = RecordStore::open(Path::new(&config.output.store_path)).unwrap();
    let records = store.records();
    assert!(records[0].has_details());
    assert!(!records[1].has_details());
    assert!(!records[2].has_details());
    assert_eq!(
        records[2].get("full_address").and_then(|v| v.as_str()),
        Some("3 High St Townsville")
    );
}

#[tokio::test]
async fn test_failed_region_aborts_run_by_default() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Scotland", "Wales"]);

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><h1>An unexpected problem</h1><div id="errorDetails">ORA-1</div></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(NO_RESULTS))
        .expect(0)
        .mount(&server)
        .await;

    match run(&config).await {
        Err(HarvestError::Protocol { message, .. }) => assert_eq!(message, "ORA-1"),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_region_is_skipped_under_skip_region() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Scotland", "Wales"]);
    config.crawl.on_region_failure = FailurePolicy::SkipRegion;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>redesigned</body></html>"))
        .mount(&server)
        .await;
    mount_listing(&server, 2, 1, &[&[7]]).await;
    mount_detail(&server, 7, 1).await;

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.regions.len(), 2);
    assert_eq!(summary.regions[0].region, REGIONS[0]);
    assert_eq!(summary.regions[0].state, RegionState::RegionFailed);
    assert!(matches!(
        summary.regions[0].error,
        Some(HarvestError::Parse { .. })
    ));
    assert_eq!(summary.regions[1].state, RegionState::RegionComplete);
    assert_eq!(summary.failed_regions(), 1);
    assert_eq!(summary.fetched(), 1);
}

#[tokio::test]
async fn test_rescrape_fills_missing_details() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    seed_store(&config, &server.uri(), &[1]);
    let bare = format!(
        "{{\"name\":\"School 2\",\"url\":\"{}/uk-schools/schools/2.html\",\"full_address\":\"\",\"region\":\"Wales\"}}\n",
        server.uri()
    );
    let mut content = std::fs::read_to_string(&config.output.store_path).unwrap();
    content.push_str(&bare);
    std::fs::write(&config.output.store_path, content).unwrap();

    mount_detail(&server, 1, 0).await;
    mount_detail(&server, 2, 1).await;

    let mut coordinator = Coordinator::from_config(&config, SchoolsnetExtractor).unwrap();
    let summary = coordinator.rescrape(true).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.untouched, 1);
    assert_eq!(summary.failed, 0);

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["telephone"], "0100 2");
    assert_eq!(lines[1]["region"], "Wales");
}

#[tokio::test]
async fn test_crawl_then_export() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    mount_detail(&server, 1, 1).await;
    mount_detail(&server, 2, 1).await;

    run(&config).await.unwrap();

    let report = export_store(
        Path::new(&config.output.store_path),
        Path::new(&config.output.export_dir),
        false,
    )
    .unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.dropped_fields, 0);

    let csv = std::fs::read_to_string(&report.files[0]).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("name,url,full_address,region,street_address,locality,postal_code,telephone,Type,Pupils")
    );
    assert_eq!(csv.lines().count(), 3);
}

/// Mounts a detail page that always answers with a gateway error
async fn mount_gateway_error(server: &MockServer, id: u32, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/uk-schools/schools/{}.html", id)))
        .respond_with(ResponseTemplate::new(503))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_redirect_loop_on_detail_page_is_item_level() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    Mock::given(method("GET"))
        .and(path("/uk-schools/schools/1.html"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            &*format!("{}/uk-schools/schools/1.html", server.uri()),
        ))
        .mount(&server)
        .await;
    mount_detail(&server, 2, 1).await;

    let summary = run(&config).await.unwrap();
    let outcome = &summary.regions[0];
    assert_eq!(outcome.state, RegionState::RegionComplete);
    assert_eq!(outcome.fetched, 2);
    assert_eq!(outcome.failed_items, 1);

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].get("telephone").is_none());
    assert_eq!(lines[1]["telephone"], "0100 2");
}

#[tokio::test]
async fn test_detail_transport_failure_aborts_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Wales", "North West"]);
    config.fetcher.max_retries = 1;

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    mount_gateway_error(&server, 1, 2).await;
    mount_detail(&server, 2, 0).await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(NO_RESULTS))
        .expect(0)
        .mount(&server)
        .await;

    match run(&config).await {
        Err(HarvestError::Transport { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(RecordStore::load(Path::new(&config.output.store_path))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_detail_transport_failure_skips_region() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Wales", "North West"]);
    config.crawl.on_region_failure = FailurePolicy::SkipRegion;

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    mount_gateway_error(&server, 1, 1).await;
    mount_detail(&server, 2, 0).await;
    mount_listing(&server, 8, 1, &[&[9]]).await;
    mount_detail(&server, 9, 1).await;

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.regions.len(), 2);
    assert_eq!(summary.regions[0].state, RegionState::RegionFailed);
    assert!(matches!(
        summary.regions[0].error,
        Some(HarvestError::Transport { .. })
    ));
    assert_eq!(summary.regions[1].state, RegionState::RegionComplete);

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["region"], "North West");
}

#[tokio::test]
async fn test_listing_gateway_error_is_retried_then_fails_region() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Wales"]);
    config.fetcher.max_retries = 2;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "2"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    match run(&config).await {
        Err(HarvestError::Transport { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_listing_gateway_error_recovers_within_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir, &["Wales"]);
    config.fetcher.max_retries = 2;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("p_region_id", "2"))
        .and(query_param("pageno", "1"))
        .respond_with(ResponseTemplate::new(504))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, 2, 1, &[&[1]]).await;
    mount_detail(&server, 1, 1).await;

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.regions[0].state, RegionState::RegionComplete);
    assert_eq!(summary.fetched(), 1);
}

#[tokio::test]
async fn test_rescrape_keeps_record_when_refetch_fails() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    seed_store(&config, &server.uri(), &[1, 2]);
    let before = std::fs::read_to_string(&config.output.store_path).unwrap();

    mount_gateway_error(&server, 1, 1).await;
    mount_detail(&server, 2, 1).await;

    let mut coordinator = Coordinator::from_config(&config, SchoolsnetExtractor).unwrap();
    let summary = coordinator.rescrape(false).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.refreshed, 1);

    let after = std::fs::read_to_string(&config.output.store_path).unwrap();
    assert_eq!(after.lines().next(), before.lines().next());

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["telephone"], "0100 2");
}

#[tokio::test]
async fn test_tail_torn_inside_utf8_char_is_discarded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, &["Wales"]);

    mount_listing(&server, 2, 2, &[&[1, 2]]).await;
    mount_detail(&server, 1, 0).await;
    mount_detail(&server, 2, 1).await;

    seed_store(&config, &server.uri(), &[1]);
    let mut content = std::fs::read(&config.output.store_path).unwrap();
    content.extend_from_slice(b"{\"name\":\"Ysgol Gymraeg Bro \xC5");
    std::fs::write(&config.output.store_path, content).unwrap();

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.fetched(), 1);
    assert_eq!(summary.regions[0].state, RegionState::RegionComplete);

    let lines = store_lines(&config);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["name"], "School 2");
}
