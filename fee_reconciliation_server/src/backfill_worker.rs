//! Background execution of historical backfills.
//!
//! The `/api/backfill` route resolves credentials, then drops a [`BackfillJob`] into a bounded queue and returns
//! immediately. The worker takes jobs off the queue, running at most `max_concurrent_jobs` of them at once. Each job
//! re-invokes a sync kind while its run reports more work remaining, so one job covers the whole requested range even
//! when that takes several chunk budgets.
use std::sync::Arc;

use chrono::Utc;
use fee_reconciliation_engine::{db_types::SyncKind, FeeSyncApi, SqliteDatabase, SyncRequest};
use log::*;
use marketplace_tools::MarketplaceApi;
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError, Semaphore},
    task::JoinHandle,
};

use crate::errors::ServerError;

/// Upper bound on the runs of one kind a single job performs.
const MAX_PASSES_PER_KIND: usize = 100;

#[derive(Debug)]
pub struct BackfillJob<F> {
    pub id: String,
    pub request: SyncRequest,
    pub kinds: Vec<SyncKind>,
    pub feed: F,
}

#[derive(Debug)]
pub struct BackfillQueue<F> {
    sender: mpsc::Sender<BackfillJob<F>>,
}

impl<F> Clone for BackfillQueue<F> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<F> BackfillQueue<F> {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BackfillJob<F>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queues a job without waiting for space. Returns the job id.
    pub fn enqueue(&self, request: SyncRequest, kinds: Vec<SyncKind>, feed: F) -> Result<String, ServerError> {
        let id = new_job_id();
        let job = BackfillJob { id: id.clone(), request, kinds, feed };
        match self.sender.try_send(job) {
            Ok(()) => {
                debug!("🕰️ Backfill job {id} queued");
                Ok(id)
            },
            Err(TrySendError::Full(job)) => {
                warn!("🕰️ The backfill queue is full. Job for {} was refused", job.request.user_id);
                Err(ServerError::QueueFull)
            },
            Err(TrySendError::Closed(_)) => {
                error!("🕰️ The backfill worker has stopped. No more jobs can be queued");
                Err(ServerError::BackendError("The backfill worker is not running".into()))
            },
        }
    }
}

fn new_job_id() -> String {
    format!("bf-{}-{:08x}", Utc::now().format("%Y%m%d%H%M%S"), rand::random::<u32>())
}

/// Starts the backfill worker. Do not await the returned JoinHandle; it only completes once every queue handle has
/// been dropped.
pub fn start_backfill_worker(
    api: Arc<FeeSyncApi<SqliteDatabase>>,
    mut jobs: mpsc::Receiver<BackfillJob<MarketplaceApi>>,
    max_concurrent_jobs: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let permits = Arc::new(Semaphore::new(max_concurrent_jobs.max(1)));
        info!("🕰️ Backfill worker started. Running up to {} jobs at a time", max_concurrent_jobs.max(1));
        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let Some(job) = jobs.recv().await else {
                break;
            };
            let api = Arc::clone(&api);
            tokio::spawn(async move {
                run_job(&api, job).await;
                drop(permit);
            });
        }
        info!("🕰️ Backfill queue closed. Worker stopping");
    })
}

async fn run_job(api: &FeeSyncApi<SqliteDatabase>, job: BackfillJob<MarketplaceApi>) {
    let BackfillJob { id, request, kinds, feed } = job;
    info!("🕰️ Backfill job {id} started: {} months for {}", request.months_back, request.user_id);
    for kind in kinds {
        for pass in 1..=MAX_PASSES_PER_KIND {
            match api.run(&feed, &request, &[kind]).await {
                Ok(runs) if runs.iter().any(|r| r.resumable) => {
                    debug!("🕰️ Backfill job {id}: {kind} pass {pass} stopped at its chunk budget. Continuing");
                },
                Ok(_) => {
                    info!("🕰️ Backfill job {id}: {kind} complete after {pass} pass(es)");
                    break;
                },
                Err(e) => {
                    error!("🕰️ Backfill job {id}: {kind} sync failed. {e}");
                    return;
                },
            }
            if pass == MAX_PASSES_PER_KIND {
                warn!("🕰️ Backfill job {id}: {kind} still has work after {pass} passes. Giving up for now");
            }
        }
    }
    info!("🕰️ Backfill job {id} finished");
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn a_full_queue_refuses_jobs() {
        let (queue, mut receiver) = BackfillQueue::<()>::new(1);
        let request = SyncRequest::new("alice", 12);
        let id = queue.enqueue(request.clone(), vec![SyncKind::Settlement], ()).expect("First job was refused");
        assert!(id.starts_with("bf-"));
        let err = queue.enqueue(request.clone(), vec![SyncKind::Ledger], ()).unwrap_err();
        assert!(matches!(err, ServerError::QueueFull));

        let job = receiver.recv().await.expect("No job in the queue");
        assert_eq!(job.id, id);
        assert_eq!(job.kinds, vec![SyncKind::Settlement]);
        assert!(queue.enqueue(request, vec![SyncKind::Ledger], ()).is_ok());
    }

    #[tokio::test]
    async fn a_closed_queue_is_a_backend_error() {
        let (queue, receiver) = BackfillQueue::<()>::new(4);
        drop(receiver);
        let err = queue.enqueue(SyncRequest::new("alice", 1), vec![SyncKind::Settlement], ()).unwrap_err();
        assert!(matches!(err, ServerError::BackendError(_)));
    }
}
