use cucumber::World;
use fee_reconciliation_engine::{
    db_types::{LineItemFeeBreakdown, SyncRun},
    FeeBreakdownManagement,
    FeeSyncApi,
    SqliteDatabase,
    SyncConfig,
    SyncError,
};

use crate::support::{FakeMarketplace, TestSystem};

pub const USER: &str = "alice";

#[derive(Default, Debug, World)]
pub struct FeeWorld {
    pub system: Option<TestSystem>,
    pub feed: FakeMarketplace,
    pub config: Option<SyncConfig>,
    pub last_run: Option<Result<SyncRun, SyncError>>,
}

impl FeeWorld {
    pub fn api(&self) -> &FeeSyncApi<SqliteDatabase> {
        &self.system.as_ref().expect("Sync API not initialised").api
    }

    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Test system not initialised")
    }

    pub fn last_run(&self) -> &SyncRun {
        match self.last_run.as_ref().expect("No sync has run yet") {
            Ok(run) => run,
            Err(e) => panic!("The last sync failed: {e}"),
        }
    }

    pub async fn breakdown(&self, line_item_id: &str) -> Option<LineItemFeeBreakdown> {
        self.api().db().fetch_breakdown(USER, line_item_id).await.expect("Error fetching breakdown")
    }
}
