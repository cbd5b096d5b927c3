use chrono::Duration;
use cucumber::given;
use fee_reconciliation_engine::SyncConfig;

use crate::{cucumber::FeeWorld, support::TestSystem};

#[given("a fresh install")]
async fn fresh_database(world: &mut FeeWorld) {
    let config = world.config.clone().unwrap_or_else(|| SyncConfig {
        ledger_window: Duration::days(30),
        max_chunks_per_run: 50,
        ..SyncConfig::without_delays()
    });
    world.system = Some(TestSystem::new(config).await);
}

#[given(expr = "a sync budget of {int} chunk(s) per run")]
async fn chunk_budget(world: &mut FeeWorld, chunks: usize) {
    let config = SyncConfig { max_chunks_per_run: chunks, ..SyncConfig::without_delays() };
    world.config = Some(config);
}
