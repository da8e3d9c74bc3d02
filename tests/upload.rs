mod common;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use common::{profile, targets, two_categories};
use listcrawl::{
    runner::{Runner, RunnerOptions},
    types::{CrawlError, ItemRecord},
    uploader::{Destination, UploadOptions, Uploader},
};
use reqwest::Url;
use serde_json::Value;
use wiremock::{
    matchers::{body_string_contains, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn record(title: &str) -> ItemRecord {
    ItemRecord {
        source: "niceday".into(),
        prefix_url: Some("//play.niceday.tw".into()),
        category: "愛上戶外".into(),
        title: title.into(),
        description: "desc".into(),
        link: format!("/product/{}", title),
        img: "//cdn/1.jpg".into(),
        price: Some("$ 1,234 起".into()),
        date: None,
    }
}

fn graphql(server: &MockServer) -> Destination {
    Destination::GraphQl(Url::parse(&format!("{}/graphql", server.uri())).unwrap())
}

async fn query_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            body["query"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn every_chunk_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":{"insertProducts":{"affected_rows":100}}}"#),
        )
        .expect(3)
        .mount(&server)
        .await;

    let uploader = Uploader::new(graphql(&server), &UploadOptions::default()).unwrap();
    let records: Vec<ItemRecord> = (0..237).map(|i| record(&format!("item-{}", i))).collect();
    let reports = uploader.upload(records, &AtomicBool::new(false)).await;

    let sizes: Vec<usize> = reports.iter().map(|r| r.size).collect();
    assert_eq!(sizes, vec![100, 100, 37]);
    assert!(reports.iter().all(|r| r.result.is_ok()));

    let queries = query_bodies(&server).await;
    assert_eq!(queries.len(), 3);
    for q in &queries {
        assert!(q.starts_with("mutation { insertProducts(data: [{"), "{}", q);
        assert!(!q.contains(r#""title":"#));
    }
    let sent: usize = queries.iter().map(|q| q.matches("title:").count()).sum();
    assert_eq!(sent, 237);
}

#[tokio::test]
async fn failed_chunk_does_not_stop_the_others() {
    let server = MockServer::start().await;
    // only chunks made of "ok-" records are accepted, the rest get a 404
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("ok-"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
        .mount(&server)
        .await;

    let options = UploadOptions {
        chunk_size: 2,
        ..Default::default()
    };
    let uploader = Uploader::new(graphql(&server), &options).unwrap();
    let records = vec![
        record("ok-a"),
        record("ok-b"),
        record("bad-a"),
        record("bad-b"),
        record("ok-c"),
    ];
    let reports = uploader.upload(records, &AtomicBool::new(false)).await;

    assert_eq!(reports.len(), 3);
    assert!(reports[0].result.is_ok());
    assert!(matches!(
        reports[1].result,
        Err(CrawlError::UploadDispatch { chunk: 1, .. })
    ));
    assert!(reports[2].result.is_ok());
}

#[tokio::test]
async fn graphql_errors_fail_the_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"errors":[{"message":"field 'img' not found"}]}"#),
        )
        .mount(&server)
        .await;

    let uploader = Uploader::new(graphql(&server), &UploadOptions::default()).unwrap();
    let reports = uploader
        .upload(vec![record("a")], &AtomicBool::new(false))
        .await;

    match &reports[0].result {
        Err(CrawlError::UploadDispatch { reason, .. }) => assert!(reason.contains("img")),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn null_errors_entry_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":{"insertProducts":{"affected_rows":1}},"errors":null}"#),
        )
        .mount(&server)
        .await;

    let uploader = Uploader::new(graphql(&server), &UploadOptions::default()).unwrap();
    let reports = uploader
        .upload(vec![record("a")], &AtomicBool::new(false))
        .await;

    assert!(reports[0].result.is_ok());
}

#[tokio::test]
async fn hung_endpoint_times_out_its_chunk_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("slow-"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":{}}"#)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("ok-"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
        .mount(&server)
        .await;

    let options = UploadOptions {
        chunk_size: 2,
        request_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let uploader = Uploader::new(graphql(&server), &options).unwrap();
    let records = vec![
        record("ok-a"),
        record("ok-b"),
        record("slow-a"),
        record("slow-b"),
        record("ok-c"),
    ];
    let reports = uploader.upload(records, &AtomicBool::new(false)).await;

    assert_eq!(reports.len(), 3);
    assert!(reports[0].result.is_ok());
    assert!(matches!(
        reports[1].result,
        Err(CrawlError::UploadDispatch { chunk: 1, .. })
    ));
    assert!(reports[2].result.is_ok());
}

#[tokio::test]
async fn airtable_gets_one_row_per_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/app/Table%201"))
        .and(query_param("api_key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(3)
        .mount(&server)
        .await;

    let url = Url::parse_with_params(
        &format!("{}/v0/app/Table%201", server.uri()),
        &[("api_key", "secret")],
    )
    .unwrap();
    let uploader = Uploader::new(Destination::Airtable(url), &UploadOptions::default()).unwrap();
    let reports = uploader
        .upload(
            vec![record("a"), record("b"), record("c")],
            &AtomicBool::new(false),
        )
        .await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_ok());

    let requests = server.received_requests().await.unwrap();
    let titles: Vec<String> = requests
        .iter()
        .map(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            body["fields"]["title"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn cancelled_upload_sends_nothing() {
    let server = MockServer::start().await;
    let uploader = Uploader::new(graphql(&server), &UploadOptions::default()).unwrap();

    let reports = uploader
        .upload(vec![record("a"), record("b")], &AtomicBool::new(true))
        .await;

    assert!(matches!(reports[0].result, Err(CrawlError::Cancelled)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_crawl_still_relays_partial_records() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
        .mount(&server)
        .await;

    let options = RunnerOptions::default_builder()
        .profile(profile())
        .scroll_interval_ms(1u64)
        .destination(graphql(&server))
        .chunk_size(4usize)
        .build()?;
    let runner = Runner::new(options)?;

    let released = Arc::new(AtomicUsize::new(0));
    let site = two_categories(released.clone())
        .without_page("https://mock.test/search?category=2&page=1");
    let summary = runner.run_with(site, &targets()).await?;

    assert!(matches!(
        summary.crawl_error,
        Some(CrawlError::Navigation { .. })
    ));
    assert_eq!(summary.records, 6);
    let sizes: Vec<usize> = summary.chunk_reports.iter().map(|r| r.size).collect();
    assert_eq!(sizes, vec![4, 2]);
    assert_eq!(summary.failed_chunks(), 0);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let sent: usize = query_bodies(&server)
        .await
        .iter()
        .map(|q| q.matches("title:").count())
        .sum();
    assert_eq!(sent, 6);
    Ok(())
}
