use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use fee_reconciliation_engine::{
    events::{EventHandlers, EventHooks},
    FeeQueryApi,
    FeeSyncApi,
    SqliteDatabase,
};
use futures::FutureExt;
use log::*;
use marketplace_tools::MarketplaceApi;

use crate::{
    backfill_worker::{start_backfill_worker, BackfillQueue},
    config::ServerConfig,
    connector::MarketplaceConnector,
    errors::ServerError,
    routes::{
        health,
        AccountFeesRoute,
        BackfillRoute,
        OrderBreakdownsRoute,
        SyncRoute,
        SyncRunsRoute,
        UnmatchedFeesRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let sync_api = Arc::new(FeeSyncApi::new(db.clone(), config.sync.clone(), producers));
    let (queue, jobs) = BackfillQueue::<MarketplaceApi>::new(config.job_queue_size);
    // The worker stops by itself once the server, and with it every queue handle, is gone
    let _worker = start_backfill_worker(Arc::clone(&sync_api), jobs, config.max_concurrent_jobs);
    let srv = create_server_instance(config, db, sync_api, queue)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    sync_api: Arc<FeeSyncApi<SqliteDatabase>>,
    queue: BackfillQueue<MarketplaceApi>,
) -> Result<Server, ServerError> {
    let connector = MarketplaceConnector::new(config.marketplace.clone());
    let limits = config.limits;
    let srv = HttpServer::new(move || {
        let query_api = FeeQueryApi::new(db.clone());
        let api_scope = web::scope("/api")
            .service(SyncRoute::<SqliteDatabase, MarketplaceConnector>::new())
            .service(BackfillRoute::<MarketplaceConnector>::new())
            .service(SyncRunsRoute::<SqliteDatabase>::new())
            .service(OrderBreakdownsRoute::<SqliteDatabase>::new())
            .service(UnmatchedFeesRoute::<SqliteDatabase>::new())
            .service(AccountFeesRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("frs::access_log"))
            .app_data(json_config())
            .app_data(web::Data::from(Arc::clone(&sync_api)))
            .app_data(web::Data::new(query_api))
            .app_data(web::Data::new(connector.clone()))
            .app_data(web::Data::new(queue.clone()))
            .app_data(web::Data::new(limits))
            .service(health)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Malformed JSON bodies are reported in the same `{"error": ...}` shape as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into())
}

fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_sync_finished(|ev| {
            async move {
                let run = &ev.run;
                if ev.succeeded() {
                    info!("📬️ {} sync #{} for {} finished. resumable: {}", run.kind, run.id, run.user_id, run.resumable);
                } else {
                    warn!(
                        "📬️ {} sync #{} for {} failed. {}",
                        run.kind,
                        run.id,
                        run.user_id,
                        run.error.as_deref().unwrap_or_default()
                    );
                }
            }
            .boxed()
        })
        .on_unmatched_fee(|ev| {
            async move {
                debug!(
                    "📬️ Unmatched {} fee of {} for order {} ({}): {}",
                    ev.category, ev.amount, ev.order_id, ev.batch_id, ev.reason
                );
            }
            .boxed()
        });
    hooks
}
