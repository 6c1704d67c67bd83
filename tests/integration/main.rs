//! End-to-end tests: router → scheduler → builder → store, with
//! in-memory upstreams.

mod mock_upstream;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use curio_supply::api::{build_router, ApiState};
use curio_supply::balance::{BalanceLookup, ScrapedBalanceLookup};
use curio_supply::config::BalanceTargets;
use curio_supply::engine::builder::SnapshotBuilder;
use curio_supply::engine::scheduler::RefreshScheduler;
use curio_supply::feed::{FeedParser, FeedSource};
use curio_supply::storage::SnapshotStore;
use curio_supply::types::ItemId;

use mock_upstream::{MockBalances, MockFeed, SAMPLE_FEED};

const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn scheduler(
    dir: &TempDir,
    feed: Arc<dyn FeedSource>,
    balances: Arc<dyn BalanceLookup>,
) -> Arc<RefreshScheduler> {
    let builder = SnapshotBuilder::new(feed, FeedParser::default(), balances);
    Arc::new(RefreshScheduler::new(
        builder,
        SnapshotStore::new(dir.path().join("data")),
        WEEK,
    )
    .unwrap())
}

fn app(scheduler: Arc<RefreshScheduler>, dir: &TempDir) -> Router {
    build_router(
        Arc::new(ApiState::new(scheduler, "Curio Cards Supply Backend")),
        &dir.path().join("public"),
    )
}

async fn json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn first_supply_request_builds_exactly_once() {
    let dir = TempDir::new().unwrap();
    let feed = MockFeed::new(SAMPLE_FEED);
    let sched = scheduler(&dir, feed.clone(), MockBalances::with(&[]));
    let app = app(sched, &dir);

    let meta = json(app.clone().oneshot(get("/api/metadata")).await.unwrap()).await;
    assert!(meta["lastFetch"].is_null());

    let resp = app.clone().oneshot(get("/api/supply")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(feed.fetches(), 1);

    let meta = json(app.clone().oneshot(get("/api/metadata")).await.unwrap()).await;
    assert!(meta["lastFetch"].is_string());

    // Subsequent reads come from the store.
    app.clone().oneshot(get("/api/data")).await.unwrap();
    app.oneshot(get("/api/supply")).await.unwrap();
    assert_eq!(feed.fetches(), 1);
}

#[tokio::test]
async fn sample_feed_with_failing_lookups_yields_zero_wrapped() {
    let dir = TempDir::new().unwrap();

    // Real scraping lookup pointed at a closed local port: every lookup fails.
    let mut contracts = HashMap::new();
    contracts.insert(ItemId::Base(1), "0xc1".to_string());
    contracts.insert(ItemId::Variant { base: 17, suffix: 'b' }, "0xc17b".to_string());
    let targets = BalanceTargets::new(
        "http://127.0.0.1:9/token/{contract}?a={holder}",
        "0xholder",
        contracts,
        HashMap::new(),
    );
    let lookup = ScrapedBalanceLookup::new(
        targets,
        Duration::from_secs(2),
        Duration::from_millis(5),
        "integration-test",
    )
    .unwrap();

    let sched = scheduler(&dir, MockFeed::new(SAMPLE_FEED), Arc::new(lookup));
    let snap = sched.refresh().await.unwrap();

    let ids: Vec<String> = snap.records.iter().map(|r| r.item_id.to_string()).collect();
    assert_eq!(ids, vec!["1", "17b"]);
    assert!(snap.records.iter().all(|r| r.wrapped_count == 0));
    assert_eq!(snap.records[0].remaining_count, 90);
}

#[tokio::test]
async fn balances_looked_up_in_display_order() {
    let dir = TempDir::new().unwrap();
    let feed = "h\n18,Eighteen,1,0,1,0,1\n17b,Seventeen B,1,0,1,0,1\n17,Seventeen,1,0,1,0,1\n";
    let variant = ItemId::Variant { base: 17, suffix: 'b' };
    let balances = MockBalances::with(&[(variant, 21), (ItemId::Base(18), 2)]);
    let sched = scheduler(&dir, MockFeed::new(feed), balances.clone());

    let snap = sched.refresh().await.unwrap();
    assert_eq!(
        balances.calls(),
        vec![ItemId::Base(17), variant, ItemId::Base(18)]
    );
    assert_eq!(snap.get(&variant).unwrap().wrapped_count, 21);
    assert_eq!(snap.get(&ItemId::Base(17)).unwrap().wrapped_count, 0);
}

#[tokio::test]
async fn concurrent_manual_refreshes_run_one_build() {
    let dir = TempDir::new().unwrap();
    let feed = MockFeed::slow(SAMPLE_FEED, Duration::from_millis(100));
    let sched = scheduler(&dir, feed.clone(), MockBalances::with(&[]));
    let app = app(sched, &dir);

    let responses = join_all((0..4).map(|_| app.clone().oneshot(post("/api/refresh")))).await;

    let mut stamps = Vec::new();
    for resp in responses {
        let resp = resp.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["cardsCount"], 2);
        stamps.push(body["lastUpdated"].as_str().unwrap().to_string());
    }

    assert_eq!(feed.fetches(), 1);
    assert!(stamps.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let feed = MockFeed::new(SAMPLE_FEED);
    let sched = scheduler(&dir, feed.clone(), MockBalances::with(&[]));
    let app = app(sched.clone(), &dir);

    let first = sched.refresh().await.unwrap();
    let marker = sched.marker();

    feed.set_error(true);
    let resp = app.clone().oneshot(post("/api/refresh")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(resp).await["success"], false);

    // Readers still get the old, complete snapshot and marker.
    let body = json(app.oneshot(get("/api/supply")).await.unwrap()).await;
    assert_eq!(body["cards"].as_array().unwrap().len(), first.len());
    assert_eq!(sched.marker(), marker);
}

#[tokio::test]
async fn refresh_replaces_snapshot_wholesale() {
    let dir = TempDir::new().unwrap();
    let feed = MockFeed::new(SAMPLE_FEED);
    let sched = scheduler(&dir, feed.clone(), MockBalances::with(&[]));

    sched.refresh().await.unwrap();
    feed.set_body("Header\n5,Five,10,0,10,0,10\n");
    sched.refresh().await.unwrap();

    let stored = sched.store().load().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.records[0].item_id, ItemId::Base(5));
}

#[tokio::test]
async fn restart_with_stored_snapshot_skips_startup_build() {
    let dir = TempDir::new().unwrap();

    let feed = MockFeed::new(SAMPLE_FEED);
    let first = scheduler(&dir, feed.clone(), MockBalances::with(&[]));
    assert!(first.startup().await.unwrap().is_some());

    // A new process over the same data directory.
    let feed2 = MockFeed::new(SAMPLE_FEED);
    let second = scheduler(&dir, feed2.clone(), MockBalances::with(&[]));
    assert!(second.startup().await.unwrap().is_none());
    assert_eq!(feed2.fetches(), 0);
    assert_eq!(second.current_or_build().await.unwrap().len(), 2);
}
