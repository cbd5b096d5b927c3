use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use fee_reconciliation_engine::{
    db_types::{CategoryAmounts, Cents, FeeCategory, FeeSource, LineItemFeeBreakdown, UnmatchedFee},
    traits::{AccountFeeUpdate, FeeStoreError},
    AccountFeeManagement,
    FeeQueryApi,
    SqliteDatabase,
};

use super::{
    helpers::{get_request, json, TestDb},
    mocks::MockBreakdownStore,
};
use crate::routes::{AccountFeesRoute, OrderBreakdownsRoute, UnmatchedFeesRoute};

fn configure_mock(store: MockBreakdownStore) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.app_data(web::Data::new(FeeQueryApi::new(store)))
            .service(OrderBreakdownsRoute::<MockBreakdownStore>::new())
            .service(UnmatchedFeesRoute::<MockBreakdownStore>::new());
    }
}

fn breakdown() -> LineItemFeeBreakdown {
    let amounts =
        CategoryAmounts { fba_fulfillment: Cents::from(342), referral: Cents::from(110), ..Default::default() };
    LineItemFeeBreakdown {
        id: 1,
        user_id: "alice".into(),
        order_id: "111-222".into(),
        line_item_id: "LI-1".into(),
        amounts,
        total_fee: Cents::from(452),
        authoritative_source: Some(FeeSource::SettlementReport),
        synced_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

#[actix_web::test]
async fn fetch_order_breakdowns() {
    let _ = env_logger::try_init();
    let mut store = MockBreakdownStore::new();
    store
        .expect_fetch_breakdowns_for_order()
        .withf(|user_id, order_id| user_id == "alice" && order_id == "111-222")
        .returning(|_, _| Ok(vec![breakdown()]));
    let (status, body) = get_request("/breakdowns/alice/111-222", configure_mock(store)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v[0]["fbaFulfillment"], 342);
    assert_eq!(v[0]["referral"], 110);
    assert_eq!(v[0]["storage"], 0);
    assert_eq!(v[0]["totalFee"], 452);
    assert_eq!(v[0]["authoritativeSource"], "SETTLEMENT_REPORT");
}

#[actix_web::test]
async fn orders_without_breakdowns_are_not_found() {
    let _ = env_logger::try_init();
    let mut store = MockBreakdownStore::new();
    store.expect_fetch_breakdowns_for_order().returning(|_, _| Ok(vec![]));
    let (status, body) = get_request("/breakdowns/alice/999-000", configure_mock(store)).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "The data was not found. No fee breakdowns for order 999-000");
}

#[actix_web::test]
async fn storage_failures_are_server_errors() {
    let _ = env_logger::try_init();
    let mut store = MockBreakdownStore::new();
    store
        .expect_fetch_breakdowns_for_order()
        .returning(|_, _| Err(FeeStoreError::DatabaseError("database is locked".into())));
    let (status, body) = get_request("/breakdowns/alice/111-222", configure_mock(store)).await.unwrap();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("database is locked"));
}

#[actix_web::test]
async fn fetch_unmatched_fees() {
    let _ = env_logger::try_init();
    let mut store = MockBreakdownStore::new();
    store.expect_fetch_unmatched_fees().withf(|user_id| user_id == "alice").returning(|_| {
        Ok(vec![UnmatchedFee {
            id: 7,
            user_id: "alice".into(),
            source: FeeSource::FinancialEventsApi,
            batch_id: "ledger:2024-05-01".into(),
            order_id: "999-000".into(),
            sku: String::new(),
            category: FeeCategory::Referral,
            amount: Cents::from(150),
            reason: "No line items stored for order".into(),
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        }])
    });
    let (status, body) = get_request("/unmatched/alice", configure_mock(store)).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v[0]["orderId"], "999-000");
    assert_eq!(v[0]["source"], "FINANCIAL_EVENTS_API");
    assert_eq!(v[0]["category"], "REFERRAL");
    assert_eq!(v[0]["amount"], 150);
}

#[actix_web::test]
async fn fetch_account_fees_by_period() {
    let test_db = TestDb::new().await;
    for (period, batch_id, amount) in [("2024-04", "S-1", 3999), ("2024-05", "S-2", 3999), ("2024-05", "S-3", 250)] {
        let category = if amount == 250 { FeeCategory::Storage } else { FeeCategory::Other };
        let update = AccountFeeUpdate {
            user_id: "alice".into(),
            period: period.into(),
            category,
            batch_id: batch_id.into(),
            amount: Cents::from(amount),
        };
        test_db.db.record_account_fee(&update).await.expect("Could not record account fee");
    }
    let configure = |db: SqliteDatabase| {
        move |cfg: &mut ServiceConfig| {
            cfg.app_data(web::Data::new(FeeQueryApi::new(db))).service(AccountFeesRoute::<SqliteDatabase>::new());
        }
    };
    let (status, body) = get_request("/account_fees/alice", configure(test_db.db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body).as_array().map(|a| a.len()), Some(3));

    let (status, body) =
        get_request("/account_fees/alice?period=2024-05", configure(test_db.db.clone())).await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let fees = json(&body);
    let fees = fees.as_array().expect("Expected an array");
    assert_eq!(fees.len(), 2);
    assert!(fees.iter().all(|f| f["period"] == "2024-05"));
    let total: i64 = fees.iter().filter_map(|f| f["amount"].as_i64()).sum();
    assert_eq!(total, 4249);
    test_db.tear_down().await;
}
