use std::{collections::BTreeMap, fmt::Debug};

use chrono::{DateTime, Months, Utc};
use log::*;
use marketplace_tools::data_objects::ReportInfo;

use crate::{
    aggregator::{plan_update, FeeAggregator, MatchedFee},
    db_types::{
        FeeCategory,
        NewUnmatchedFee,
        PageContinuation,
        SyncKind,
        SyncRun,
        SyncStage,
    },
    events::{EventProducers, SyncRunFinishedEvent, UnmatchedFeeEvent},
    feeds::{
        estimate::{estimate_records, estimate_request},
        ledger::{fetch_ledger_window, LedgerWindow},
        settlement::parse_settlement_document,
        CanonicalFeeEvent,
        FeeEstimateSource,
        LedgerEventSource,
        RawFeeRecord,
        SettlementReportSource,
    },
    matching::{MatchKeyResolver, Resolution, UnmatchedReason},
    sync::{FeedThrottle, SyncConfig, SyncError, SyncRunState},
    traits::FeeReconciliationDatabase,
    writer::{account_fee_updates, write_account_fees, write_line_item_updates},
};

/// Parameters of one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub user_id: String,
    pub marketplace_ids: Vec<String>,
    /// How far back, in calendar months from now, the sync should look.
    pub months_back: u32,
}

impl SyncRequest {
    pub fn new(user_id: &str, months_back: u32) -> Self {
        Self { user_id: user_id.to_string(), marketplace_ids: Vec::new(), months_back }
    }

    pub fn with_marketplace_ids(mut self, ids: Vec<String>) -> Self {
        self.marketplace_ids = ids;
        self
    }

    fn range_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months_back)).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// `FeeSyncApi` runs fee syncs for users against a set of feeds and keeps their fee breakdowns reconciled.
///
/// At most one run per `(user, kind)` executes at a time; the lock lives in the database so it holds across
/// processes. Runs for different users are independent and may execute concurrently.
pub struct FeeSyncApi<B> {
    db: B,
    config: SyncConfig,
    producers: EventProducers,
}

impl<B> Debug for FeeSyncApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeeSyncApi ({:?})", self.config)
    }
}

impl<B> FeeSyncApi<B> {
    pub fn new(db: B, config: SyncConfig, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// What happened to one chunk after its records were fetched.
#[derive(Debug, Clone, Copy, Default)]
struct ChunkOutcome {
    errored: i64,
}

impl<B> FeeSyncApi<B>
where B: FeeReconciliationDatabase
{
    /// Runs the requested sync kinds one after the other. A run that is already in progress or fails on
    /// authentication stops the sequence.
    pub async fn run<F>(&self, feeds: &F, request: &SyncRequest, kinds: &[SyncKind]) -> Result<Vec<SyncRun>, SyncError>
    where F: SettlementReportSource + LedgerEventSource + FeeEstimateSource {
        let mut runs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let run = match kind {
                SyncKind::Settlement => self.sync_settlement(feeds, request).await?,
                SyncKind::Ledger => self.sync_ledger(feeds, request).await?,
                SyncKind::Estimate => self.sync_estimates(feeds, request).await?,
            };
            runs.push(run);
        }
        Ok(runs)
    }

    /// Processes settlement documents created within the requested range, oldest first, one document per chunk.
    /// Documents that were fully processed by an earlier run are skipped.
    pub async fn sync_settlement<F: SettlementReportSource>(
        &self,
        feed: &F,
        request: &SyncRequest,
    ) -> Result<SyncRun, SyncError> {
        let mut state = self.start_run(request, SyncKind::Settlement).await?;
        let outcome = self.settlement_chunks(feed, request, &mut state).await;
        self.end_run(state, outcome).await
    }

    /// Reconciles the ledger feed in fixed windows, resuming from the saved cursor when the cursor covers the
    /// requested range.
    pub async fn sync_ledger<F: LedgerEventSource>(&self, feed: &F, request: &SyncRequest) -> Result<SyncRun, SyncError> {
        let mut state = self.start_run(request, SyncKind::Ledger).await?;
        let outcome = self.ledger_chunks(feed, request, &mut state).await;
        self.end_run(state, outcome).await
    }

    /// Writes estimated fees for line items that no feed has reported on yet.
    pub async fn sync_estimates<F: FeeEstimateSource>(
        &self,
        feed: &F,
        request: &SyncRequest,
    ) -> Result<SyncRun, SyncError> {
        let mut state = self.start_run(request, SyncKind::Estimate).await?;
        let outcome = self.estimate_chunks(feed, request, &mut state).await;
        self.end_run(state, outcome).await
    }

    async fn start_run(&self, request: &SyncRequest, kind: SyncKind) -> Result<SyncRunState, SyncError> {
        if request.months_back == 0 {
            return Err(SyncError::InvalidRequest("monthsBack must be at least 1".into()));
        }
        if request.user_id.trim().is_empty() {
            return Err(SyncError::InvalidRequest("userId is required".into()));
        }
        let run = self.db.start_sync_run(&request.user_id, kind, self.config.stale_run_timeout).await?;
        info!("🔄️ {kind} sync #{} started for {} ({} months back)", run.id, request.user_id, request.months_back);
        Ok(SyncRunState::new(run))
    }

    /// Persists the terminal state of the run and notifies subscribers. Fatal errors are returned after the failed
    /// run has been saved.
    async fn end_run(&self, mut state: SyncRunState, outcome: Result<bool, SyncError>) -> Result<SyncRun, SyncError> {
        let outcome = match outcome {
            Ok(resumable) => state.finish(resumable).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!("🔄️ Sync run #{} failed: {e}", state.run().id);
            state.fail(&e.to_string());
        }
        let run = self.db.save_sync_run(state.run()).await?;
        let c = &run.counters;
        info!(
            "🔄️ {} sync #{} for {} ended {}. fetched: {}, matched: {}, unmatched: {}, account level: {}, updated: {}, \
             unchanged: {}, superseded: {}, errored: {}, failed batches: {}, resumable: {}",
            run.kind,
            run.id,
            run.user_id,
            run.stage,
            c.fetched,
            c.matched,
            c.unmatched,
            c.account_level,
            c.updated,
            c.unchanged,
            c.superseded,
            c.errored,
            c.batches_failed,
            run.resumable
        );
        self.producers.publish_sync_finished(SyncRunFinishedEvent::new(run.clone())).await;
        outcome.map(|_| run)
    }

    async fn checkpoint(&self, state: &SyncRunState) {
        if let Err(e) = self.db.save_sync_run(state.run()).await {
            warn!("🔄️ Could not checkpoint sync run #{}: {e}", state.run().id);
        }
    }

    async fn settlement_chunks<F: SettlementReportSource>(
        &self,
        feed: &F,
        request: &SyncRequest,
        state: &mut SyncRunState,
    ) -> Result<bool, SyncError> {
        let user_id = request.user_id.as_str();
        let throttle = FeedThrottle::from_config(&self.config);
        let until = Utc::now();
        let since = request.range_start(until);
        state.advance(SyncStage::Fetching)?;
        let mut reports = Vec::<ReportInfo>::new();
        let mut token: Option<String> = None;
        loop {
            let (page, next) = throttle
                .call("settlement report list", || feed.list_settlement_reports(since, until, token.as_deref()))
                .await?;
            reports.extend(page);
            match next.filter(|t| !t.is_empty()) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        reports.sort_by(|a, b| {
            (a.data_end_time, a.created_time, &a.report_id).cmp(&(b.data_end_time, b.created_time, &b.report_id))
        });
        reports.dedup_by(|a, b| a.report_id == b.report_id);
        debug!("🔄️ {} settlement documents available for {user_id} since {since}", reports.len());
        let mut pending = Vec::with_capacity(reports.len());
        for report in reports {
            let ready = report.report_document_id.is_some() &&
                report.processing_status.as_deref().map(|s| s.eq_ignore_ascii_case("DONE")).unwrap_or(true);
            if !ready {
                debug!("🔄️ Settlement document {} is not ready yet", report.report_id);
                continue;
            }
            if self.db.is_settlement_report_processed(user_id, &report.report_id).await? {
                trace!("🔄️ Settlement document {} was already processed", report.report_id);
                state.counters_mut().batches_skipped += 1;
                continue;
            }
            pending.push(report);
        }
        let budget = self.config.max_chunks_per_run;
        let resumable = pending.len() > budget;
        for report in pending.iter().take(budget) {
            state.advance(SyncStage::Fetching)?;
            let download = throttle.call("settlement document", || feed.download_settlement_report(report)).await;
            let body = match download {
                Ok(body) => body,
                Err(e) if e.is_auth_failure() => return Err(e.into()),
                Err(e) => {
                    error!("🔄️ Settlement document {} could not be downloaded: {e}", report.report_id);
                    state.counters_mut().batches_failed += 1;
                    self.checkpoint(state).await;
                    continue;
                },
            };
            state.advance(SyncStage::Parsing)?;
            let parsed = match parse_settlement_document(&report.report_id, &body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!("🔄️ Settlement document {} could not be parsed: {e}", report.report_id);
                    state.counters_mut().batches_failed += 1;
                    self.checkpoint(state).await;
                    continue;
                },
            };
            let counters = state.counters_mut();
            counters.fetched += parsed.stats.rows;
            counters.parsed += parsed.records.len() as i64;
            counters.skipped_malformed += parsed.stats.skipped_malformed;
            counters.transfers_excluded += parsed.stats.transfers_excluded;
            counters.non_fee += parsed.stats.non_fee;
            let outcome = self.reconcile(user_id, parsed.records, state).await?;
            if outcome.errored == 0 {
                self.db
                    .mark_settlement_report_processed(
                        user_id,
                        &report.report_id,
                        parsed.settlement_id.as_deref(),
                        parsed.stats.rows,
                    )
                    .await?;
                debug!("🔄️ Settlement document {} is fully processed", report.report_id);
            } else {
                warn!(
                    "🔄️ Settlement document {} had {} write errors. It will be processed again next time.",
                    report.report_id, outcome.errored
                );
            }
            self.checkpoint(state).await;
        }
        if resumable {
            info!("🔄️ {} settlement documents are left for a later run", pending.len() - budget);
        }
        Ok(resumable)
    }

    /// Windows follow the grid laid out by [`LedgerWindow::on_grid`]. A window that is longer than the page cap takes
    /// several chunks; the feed's token for its next page is kept in the cursor, so a later run carries on from there
    /// rather than fetching the window from its first page again.
    async fn ledger_chunks<F: LedgerEventSource>(
        &self,
        feed: &F,
        request: &SyncRequest,
        state: &mut SyncRunState,
    ) -> Result<bool, SyncError> {
        let user_id = request.user_id.as_str();
        let throttle = FeedThrottle::from_config(&self.config);
        let width = self.config.ledger_window;
        let now = Utc::now();
        let end = now - self.config.ledger_safety_margin;
        let requested_start = request.range_start(now);
        let mut range_start = requested_start;
        let mut window_start = requested_start;
        let mut continuation = None::<PageContinuation>;
        if let Some(cursor) = self.db.fetch_cursor(user_id, SyncKind::Ledger).await? {
            let position = DateTime::parse_from_rfc3339(&cursor.position).ok().map(|d| d.with_timezone(&Utc));
            match (cursor.range_start, position) {
                (Some(covered_from), Some(position)) if covered_from <= requested_start && position <= end => {
                    info!("🔄️ Resuming the ledger sync for {user_id} from {position}");
                    range_start = covered_from;
                    window_start = position;
                    continuation = cursor.continuation().filter(|c| c.window_end > position && c.window_end <= end);
                },
                _ => debug!("🔄️ The saved ledger cursor for {user_id} does not cover {requested_start}. Starting over."),
            }
        }
        state.advance(SyncStage::Fetching)?;
        let mut contiguous = true;
        let mut resumable = false;
        let mut chunks = 0;
        while window_start < end {
            if chunks >= self.config.max_chunks_per_run {
                info!("🔄️ Chunk budget used up. Ledger sync for {user_id} stops at {window_start}");
                resumable = true;
                break;
            }
            chunks += 1;
            let (window, resume_token) = match continuation.take() {
                Some(c) => (LedgerWindow::new(window_start, c.window_end, width), Some(c.token)),
                None => (LedgerWindow::on_grid(window_start, width, end), None),
            };
            let resumed = resume_token.is_some();
            state.advance(SyncStage::Fetching)?;
            match fetch_ledger_window(feed, &throttle, &window, resume_token, self.config.ledger_page_cap).await {
                Err(e) if e.is_auth_failure() => return Err(e.into()),
                Err(e) => {
                    error!("🔄️ Ledger window {} → {} failed: {e}", window.after, window.before);
                    state.counters_mut().batches_failed += 1;
                    if resumed && contiguous {
                        // The token may have expired. The next run reads this window from its first page.
                        let position = window.after.to_rfc3339();
                        self.db.save_cursor(user_id, SyncKind::Ledger, Some(range_start), &position, None).await?;
                    }
                    contiguous = false;
                    resumable = true;
                },
                Ok(fetch) => {
                    state.advance(SyncStage::Parsing)?;
                    let counters = state.counters_mut();
                    counters.fetched += fetch.records.len() as i64 + fetch.malformed;
                    counters.parsed += fetch.records.len() as i64;
                    counters.skipped_malformed += fetch.malformed;
                    let outcome = self.reconcile(user_id, fetch.records, state).await?;
                    if outcome.errored > 0 {
                        contiguous = false;
                    }
                    if let Some(token) = fetch.unconsumed_token {
                        debug!(
                            "🔄️ Ledger window {} → {} has more pages. Continuing in the next chunk.",
                            window.after, window.before
                        );
                        let rest = PageContinuation { window_end: window.before, token };
                        if contiguous {
                            let position = window.after.to_rfc3339();
                            self.db
                                .save_cursor(user_id, SyncKind::Ledger, Some(range_start), &position, Some(&rest))
                                .await?;
                        }
                        continuation = Some(rest);
                        self.checkpoint(state).await;
                        continue;
                    }
                    if contiguous {
                        let position = window.before.to_rfc3339();
                        self.db.save_cursor(user_id, SyncKind::Ledger, Some(range_start), &position, None).await?;
                    }
                },
            }
            self.checkpoint(state).await;
            window_start = window.before;
        }
        Ok(resumable)
    }

    async fn estimate_chunks<F: FeeEstimateSource>(
        &self,
        feed: &F,
        request: &SyncRequest,
        state: &mut SyncRunState,
    ) -> Result<bool, SyncError> {
        let user_id = request.user_id.as_str();
        let throttle = FeedThrottle::from_config(&self.config);
        let since = request.range_start(Utc::now());
        let batch_size = self.config.estimate_batch_size;
        let mut after_id = 0i64;
        if let Some(cursor) = self.db.fetch_cursor(user_id, SyncKind::Estimate).await? {
            if cursor.range_start.map(|covered| covered <= since).unwrap_or(false) {
                after_id = cursor.position.parse::<i64>().unwrap_or(0);
                info!("🔄️ Resuming estimates for {user_id} after line item #{after_id}");
            }
        }
        state.advance(SyncStage::Fetching)?;
        let mut completed = false;
        for _ in 0..self.config.max_chunks_per_run {
            state.advance(SyncStage::Fetching)?;
            let items = self.db.fetch_line_items_without_breakdown(user_id, since, after_id, batch_size).await?;
            if items.is_empty() {
                completed = true;
                break;
            }
            let mut records = Vec::<RawFeeRecord>::new();
            for item in &items {
                let estimate_for = estimate_request(item);
                match throttle.call("fee estimate", || feed.estimate_fees(&estimate_for)).await {
                    Ok(fees) => {
                        state.counters_mut().fetched += fees.len() as i64;
                        records.extend(estimate_records(item, &fees));
                    },
                    Err(e) if e.is_auth_failure() => return Err(e.into()),
                    Err(e) => {
                        error!("🔄️ Could not estimate fees for line item {}: {e}", item.line_item_id);
                        state.counters_mut().batches_failed += 1;
                    },
                }
            }
            state.advance(SyncStage::Parsing)?;
            state.counters_mut().parsed += records.len() as i64;
            self.reconcile(user_id, records, state).await?;
            after_id = items.iter().map(|i| i.id).max().unwrap_or(after_id);
            self.db.save_cursor(user_id, SyncKind::Estimate, Some(since), &after_id.to_string(), None).await?;
            self.checkpoint(state).await;
            if (items.len() as i64) < batch_size {
                completed = true;
                break;
            }
        }
        if completed {
            self.db.clear_cursor(user_id, SyncKind::Estimate).await?;
        }
        Ok(!completed)
    }

    /// Matches, aggregates and writes the records of one chunk. Write failures are counted, not returned.
    async fn reconcile(
        &self,
        user_id: &str,
        records: Vec<RawFeeRecord>,
        state: &mut SyncRunState,
    ) -> Result<ChunkOutcome, SyncError> {
        let mut outcome = ChunkOutcome::default();
        state.advance(SyncStage::Matching)?;
        let mut resolver = MatchKeyResolver::new(&self.db, user_id, self.config.allocation_policy);
        let mut aggregator = FeeAggregator::new();
        let mut account_level = Vec::<CanonicalFeeEvent>::new();
        let mut unmatched = Vec::new();
        for event in records.iter().map(RawFeeRecord::canonicalize) {
            match resolver.resolve(&event).await {
                Ok(Resolution::AccountLevel) => {
                    state.counters_mut().account_level += 1;
                    account_level.push(event);
                },
                Ok(Resolution::Matched(allocations)) => {
                    state.counters_mut().matched += 1;
                    aggregator.extend(allocations.into_iter().map(|a| {
                        MatchedFee::new(&a.line_item, event.category, event.source, &event.batch_id, a.amount)
                    }));
                },
                Ok(Resolution::Unmatched(reason)) => {
                    state.counters_mut().unmatched += 1;
                    unmatched.push((event, reason));
                },
                Err(e) => {
                    error!("🔄️ Could not resolve line items for order {:?}: {e}", event.order_id);
                    outcome.errored += 1;
                },
            }
        }

        state.advance(SyncStage::Aggregating)?;
        let mut updates = Vec::with_capacity(aggregator.len());
        for group in aggregator.into_groups() {
            match self.db.fetch_category_sources(user_id, &group.line_item_id).await {
                Ok(stored) => {
                    let (update, superseded) = plan_update(group, &stored);
                    state.counters_mut().superseded += superseded as i64;
                    updates.push(update);
                },
                Err(e) => {
                    error!("🔄️ Could not read stored fee sources for line item {}: {e}", group.line_item_id);
                    outcome.errored += 1;
                },
            }
        }

        state.advance(SyncStage::Writing)?;
        let report = write_line_item_updates(&self.db, &updates).await;
        let (_, account_errors) = write_account_fees(&self.db, &account_fee_updates(user_id, &account_level)).await;
        outcome.errored += report.errored + account_errors;
        for fee in collapse_unmatched(user_id, unmatched) {
            warn!(
                "🔄️ {} fee of {} for order {} ({}) did not match a line item: {}",
                fee.category,
                fee.amount,
                fee.order_id,
                if fee.sku.is_empty() { "no sku" } else { fee.sku.as_str() },
                fee.reason
            );
            let notice = UnmatchedFeeEvent {
                user_id: fee.user_id.clone(),
                source: fee.source,
                batch_id: fee.batch_id.clone(),
                order_id: fee.order_id.clone(),
                sku: Some(fee.sku.clone()).filter(|s| !s.is_empty()),
                category: fee.category,
                amount: fee.amount,
                reason: fee.reason.clone(),
            };
            if let Err(e) = self.db.record_unmatched_fee(fee).await {
                error!("🔄️ Could not record unmatched fee for order {}: {e}", notice.order_id);
                outcome.errored += 1;
            }
            self.producers.publish_unmatched_fee(notice).await;
        }
        let counters = state.counters_mut();
        counters.updated += report.updated;
        counters.unchanged += report.unchanged;
        counters.errored += outcome.errored;
        debug!(
            "🔄️ Chunk reconciled for {user_id}: {} line items updated, {} unchanged, {} errors",
            report.updated, report.unchanged, outcome.errored
        );
        Ok(outcome)
    }
}

/// Unmatched events that share a diagnostic key are summed into one row, so a re-run overwrites rather than
/// duplicates them.
fn collapse_unmatched(user_id: &str, events: Vec<(CanonicalFeeEvent, UnmatchedReason)>) -> Vec<NewUnmatchedFee> {
    let mut rows = BTreeMap::<(String, String, String, FeeCategory, String), NewUnmatchedFee>::new();
    for (event, reason) in events {
        let order_id = event.order_id.clone().unwrap_or_default();
        let sku = event.sku.clone().or_else(|| event.asin.clone()).unwrap_or_default();
        let key = (event.batch_id.clone(), order_id.clone(), sku.clone(), event.category, event.source.to_string());
        rows.entry(key)
            .and_modify(|row| row.amount += event.amount)
            .or_insert_with(|| NewUnmatchedFee {
                user_id: user_id.to_string(),
                source: event.source,
                batch_id: event.batch_id.clone(),
                order_id,
                sku,
                category: event.category,
                amount: event.amount,
                reason: reason.to_string(),
            });
    }
    rows.into_values().collect()
}
