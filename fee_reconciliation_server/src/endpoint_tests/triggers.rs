use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use fee_reconciliation_engine::{
    db_types::{Cents, NewLineItem, SyncKind},
    events::EventProducers,
    FeeQueryApi,
    FeeSyncApi,
    LineItemStore,
    SqliteDatabase,
    SyncConfig,
    SyncStateManagement,
};
use serde_json::{json, Value};

use super::{
    helpers::{get_request, json, post_request, TestDb},
    mocks::{CannedConnector, CannedFeed, MAIN_STORE},
};
use crate::{
    backfill_worker::BackfillQueue,
    config::TriggerLimits,
    routes::{BackfillRoute, OrderBreakdownsRoute, SyncRoute, SyncRunsRoute},
};

fn trigger(months_back: u32) -> Value {
    json!({ "userId": "alice", "credentialRef": MAIN_STORE, "marketplaceIds": ["ATVPDKIKX0DER"], "monthsBack": months_back })
}

fn sync_config(db: &SqliteDatabase, connector: CannedConnector) -> impl FnOnce(&mut ServiceConfig) {
    let api = FeeSyncApi::new(db.clone(), SyncConfig::without_delays(), EventProducers::default());
    let query_api = FeeQueryApi::new(db.clone());
    move |cfg: &mut ServiceConfig| {
        cfg.app_data(web::Data::new(api))
            .app_data(web::Data::new(query_api))
            .app_data(web::Data::new(connector))
            .app_data(web::Data::new(TriggerLimits::default()))
            .service(SyncRoute::<SqliteDatabase, CannedConnector>::new())
            .service(SyncRunsRoute::<SqliteDatabase>::new())
            .service(OrderBreakdownsRoute::<SqliteDatabase>::new());
    }
}

fn backfill_config(queue: BackfillQueue<CannedFeed>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.app_data(web::Data::new(queue))
            .app_data(web::Data::new(CannedConnector::default()))
            .app_data(web::Data::new(TriggerLimits::default()))
            .service(BackfillRoute::<CannedConnector>::new());
    }
}

#[actix_web::test]
async fn sync_runs_settlement_then_ledger() {
    let test_db = TestDb::new().await;
    let item = NewLineItem::new("alice", "111-222", "LI-1", "ABC", 1, Cents::from(1999))
        .with_purchased_at(Utc::now() - Duration::days(10));
    test_db.db.upsert_line_item(item).await.expect("Could not save line item");
    let connector = CannedConnector::new(CannedFeed::with_referral_fee());

    let (status, body) =
        post_request("/sync", trigger(2), sync_config(&test_db.db, connector)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK, "{body}");
    let runs = json(&body);
    assert_eq!(runs.as_array().map(|r| r.len()), Some(2));
    assert_eq!(runs[0]["kind"], "SETTLEMENT");
    assert_eq!(runs[0]["stage"], "DONE");
    assert_eq!(runs[0]["counters"]["matched"], 1);
    assert_eq!(runs[1]["kind"], "LEDGER");
    assert_eq!(runs[1]["stage"], "DONE");

    let (status, body) = get_request("/breakdowns/alice/111-222", sync_config(&test_db.db, CannedConnector::default()))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK, "{body}");
    let breakdowns = json(&body);
    assert_eq!(breakdowns[0]["lineItemId"], "LI-1");
    assert_eq!(breakdowns[0]["referral"], 110);
    assert_eq!(breakdowns[0]["totalFee"], 110);
    assert_eq!(breakdowns[0]["authoritativeSource"], "SETTLEMENT_REPORT");

    let (status, body) =
        get_request("/runs/alice?limit=1", sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let runs = json(&body);
    assert_eq!(runs.as_array().map(|r| r.len()), Some(1));
    assert_eq!(runs[0]["kind"], "LEDGER");
    test_db.tear_down().await;
}

#[actix_web::test]
async fn sync_honours_requested_kinds() {
    let test_db = TestDb::new().await;
    let mut body = trigger(1);
    body["kinds"] = json!(["ESTIMATE"]);
    let (status, body) =
        post_request("/sync", body, sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let runs = json(&body);
    assert_eq!(runs.as_array().map(|r| r.len()), Some(1));
    assert_eq!(runs[0]["kind"], "ESTIMATE");
    test_db.tear_down().await;
}

#[actix_web::test]
async fn sync_rejects_out_of_range_months() {
    let test_db = TestDb::new().await;
    for months in [0, 4] {
        let (status, body) =
            post_request("/sync", trigger(months), sync_config(&test_db.db, CannedConnector::default()))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(json(&body)["error"].as_str().unwrap().contains("monthsBack must be between 1 and 3"));
    }
    test_db.tear_down().await;
}

#[actix_web::test]
async fn malformed_bodies_are_bad_requests() {
    let test_db = TestDb::new().await;
    let body = json!({ "userId": "alice", "credentialRef": MAIN_STORE });
    let (status, body) =
        post_request("/sync", body, sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().starts_with("Could not read request body"));
    test_db.tear_down().await;
}

#[actix_web::test]
async fn concurrent_sync_is_a_conflict() {
    let test_db = TestDb::new().await;
    test_db.db.start_sync_run("alice", SyncKind::Settlement, Duration::minutes(120)).await.expect("Could not lock");
    let (status, body) =
        post_request("/sync", trigger(1), sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(json(&body)["error"], "A SETTLEMENT sync is already running for user alice");
    test_db.tear_down().await;
}

#[actix_web::test]
async fn unknown_credentials_are_unauthorized() {
    let test_db = TestDb::new().await;
    let mut body = trigger(1);
    body["credentialRef"] = json!("someone-else");
    let (status, body) =
        post_request("/sync", body, sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    assert!(json(&body)["error"].as_str().unwrap().contains("someone-else"));
    test_db.tear_down().await;
}

#[actix_web::test]
async fn rejected_tokens_are_unauthorized_and_recorded() {
    let test_db = TestDb::new().await;
    let (status, body) =
        post_request("/sync", trigger(1), sync_config(&test_db.db, CannedConnector::rejecting_tokens())).await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let (status, body) = get_request("/runs/alice", sync_config(&test_db.db, CannedConnector::default())).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let runs = json(&body);
    assert_eq!(runs.as_array().map(|r| r.len()), Some(1));
    assert_eq!(runs[0]["stage"], "FAILED");
    test_db.tear_down().await;
}

#[actix_web::test]
async fn backfill_is_queued() {
    let _ = env_logger::try_init();
    let (queue, mut jobs) = BackfillQueue::<CannedFeed>::new(4);
    let (status, body) = post_request("/backfill", trigger(18), backfill_config(queue)).await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    let accepted = json(&body);
    let job = jobs.recv().await.expect("No job was queued");
    assert_eq!(accepted["jobId"], job.id.as_str());
    assert_eq!(accepted["kinds"], json!(["SETTLEMENT", "LEDGER"]));
    assert_eq!(job.request.user_id, "alice");
    assert_eq!(job.request.months_back, 18);
    assert_eq!(job.request.marketplace_ids, vec!["ATVPDKIKX0DER"]);
}

#[actix_web::test]
async fn backfill_is_refused_when_the_queue_is_full() {
    let _ = env_logger::try_init();
    let (queue, _jobs) = BackfillQueue::<CannedFeed>::new(1);
    let (status, _) = post_request("/backfill", trigger(6), backfill_config(queue.clone())).await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = post_request("/backfill", trigger(6), backfill_config(queue)).await.unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["error"], "The backfill queue is full. Try again later.");
}

#[actix_web::test]
async fn backfill_checks_its_own_limits_and_credentials() {
    let _ = env_logger::try_init();
    let (queue, _jobs) = BackfillQueue::<CannedFeed>::new(4);
    let (status, _) = post_request("/backfill", trigger(25), backfill_config(queue.clone())).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let mut body = trigger(12);
    body["credentialRef"] = json!("unknown");
    let (status, _) = post_request("/backfill", body, backfill_config(queue)).await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
