//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate module.
//!
//! Since each worker thread processes its requests sequentially, handlers must never block the current thread.
//! Anything that does I/O (database access, marketplace calls) is expressed as a future and awaited. Syncs that may
//! take minutes belong on `/api/backfill`, which hands them to the background worker.
use actix_web::{get, web, HttpResponse, Responder};
use fee_reconciliation_engine::{
    traits::{AccountFeeManagement, FeeBreakdownManagement, FeeReconciliationDatabase, SyncStateManagement},
    FeeQueryApi,
    FeeSyncApi,
};
use log::*;

use crate::{
    backfill_worker::BackfillQueue,
    config::TriggerLimits,
    connector::FeedConnector,
    data_objects::{JobAccepted, PeriodParams, RunHistoryParams, SyncTriggerRequest},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Triggers  ----------------------------------------------------
route!(sync => Post "/sync" impl FeeReconciliationDatabase, FeedConnector);
/// Route handler for the synchronous sync endpoint
///
/// Runs the requested sync kinds (settlement then ledger when `kinds` is omitted) one after the other and responds
/// with their run reports once they have all finished. `monthsBack` is capped by `FRS_MAX_SYNC_MONTHS_BACK`; longer
/// ranges go through `/api/backfill`.
///
/// * 409 when a sync of the same kind is already running for the user.
/// * 401 when the credential reference is unknown or the marketplace rejects the token.
pub async fn sync<B, C>(
    body: web::Json<SyncTriggerRequest>,
    api: web::Data<FeeSyncApi<B>>,
    connector: web::Data<C>,
    limits: web::Data<TriggerLimits>,
) -> Result<HttpResponse, ServerError>
where
    B: FeeReconciliationDatabase,
    C: FeedConnector,
{
    let trigger = body.into_inner();
    debug!("💻️ POST sync for {} ({} months)", trigger.user_id, trigger.months_back);
    trigger.validate(limits.max_sync_months_back)?;
    let feed = connector.connect(&trigger.credential_ref, &trigger.marketplace_ids)?;
    let runs = api.run(&feed, &trigger.sync_request(), &trigger.kinds()).await.map_err(|e| {
        debug!("💻️ Sync for {} did not complete. {e}", trigger.user_id);
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(runs))
}

route!(backfill => Post "/backfill" impl FeedConnector);
/// Route handler for the backfill endpoint
///
/// Validates the request and resolves its credentials up front, then queues the job and responds with 202 and the job
/// id. Progress shows up in `/api/runs/{userId}`. A full queue is reported as 503.
pub async fn backfill<C: FeedConnector>(
    body: web::Json<SyncTriggerRequest>,
    connector: web::Data<C>,
    queue: web::Data<BackfillQueue<C::Feed>>,
    limits: web::Data<TriggerLimits>,
) -> Result<HttpResponse, ServerError> {
    let trigger = body.into_inner();
    debug!("💻️ POST backfill for {} ({} months)", trigger.user_id, trigger.months_back);
    trigger.validate(limits.max_backfill_months_back)?;
    let feed = connector.connect(&trigger.credential_ref, &trigger.marketplace_ids)?;
    let kinds = trigger.kinds();
    let job_id = queue.enqueue(trigger.sync_request(), kinds.clone(), feed)?;
    info!("💻️ Backfill job {job_id} accepted for {}", trigger.user_id);
    let accepted = JobAccepted { job_id, user_id: trigger.user_id, kinds, months_back: trigger.months_back };
    Ok(HttpResponse::Accepted().json(accepted))
}

//----------------------------------------------   Queries  ----------------------------------------------------
route!(sync_runs => Get "/runs/{user_id}" impl SyncStateManagement);
/// The most recent run reports for a user, newest first. `?limit=` defaults to 20.
pub async fn sync_runs<B: SyncStateManagement>(
    path: web::Path<String>,
    params: web::Query<RunHistoryParams>,
    api: web::Data<FeeQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET sync runs for {user_id}");
    let runs = api.recent_runs(&user_id, params.limit).await?;
    Ok(HttpResponse::Ok().json(runs))
}

route!(order_breakdowns => Get "/breakdowns/{user_id}/{order_id}" impl FeeBreakdownManagement);
pub async fn order_breakdowns<B: FeeBreakdownManagement>(
    path: web::Path<(String, String)>,
    api: web::Data<FeeQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (user_id, order_id) = path.into_inner();
    debug!("💻️ GET fee breakdowns for order {order_id} of {user_id}");
    let breakdowns = api.breakdowns_for_order(&user_id, &order_id).await?;
    if breakdowns.is_empty() {
        return Err(ServerError::NoRecordFound(format!("No fee breakdowns for order {order_id}")));
    }
    Ok(HttpResponse::Ok().json(breakdowns))
}

route!(unmatched_fees => Get "/unmatched/{user_id}" impl FeeBreakdownManagement);
pub async fn unmatched_fees<B: FeeBreakdownManagement>(
    path: web::Path<String>,
    api: web::Data<FeeQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET unmatched fees for {user_id}");
    let fees = api.unmatched_fees(&user_id).await?;
    Ok(HttpResponse::Ok().json(fees))
}

route!(account_fees => Get "/account_fees/{user_id}" impl AccountFeeManagement);
/// Account-level fee buckets for a user. `?period=YYYY-MM` narrows the result to one month.
pub async fn account_fees<B: AccountFeeManagement>(
    path: web::Path<String>,
    params: web::Query<PeriodParams>,
    api: web::Data<FeeQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET account-level fees for {user_id}");
    let fees = api.account_fees(&user_id, params.period.as_deref()).await?;
    Ok(HttpResponse::Ok().json(fees))
}
