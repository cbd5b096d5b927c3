use chrono::Utc;
use log::*;

use crate::{
    db_types::{SyncCounters, SyncRun, SyncStage},
    sync::SyncError,
};

/// The in-memory state machine of a sync run. The wrapped [`SyncRun`] is what gets persisted.
#[derive(Debug, Clone)]
pub struct SyncRunState {
    run: SyncRun,
}

impl SyncRunState {
    pub fn new(run: SyncRun) -> Self {
        Self { run }
    }

    pub fn run(&self) -> &SyncRun {
        &self.run
    }

    pub fn stage(&self) -> SyncStage {
        self.run.stage
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.run.counters
    }

    pub fn counters_mut(&mut self) -> &mut SyncCounters {
        &mut self.run.counters
    }

    pub fn advance(&mut self, next: SyncStage) -> Result<(), SyncError> {
        let current = self.run.stage;
        if !current.can_transition_to(next) {
            return Err(SyncError::InvalidTransition { from: current, to: next });
        }
        if current != next {
            trace!("🔄️ Run #{} {current} → {next}", self.run.id);
        }
        self.run.stage = next;
        Ok(())
    }

    /// Ends the run successfully. `resumable` flags that there is more work for a later invocation.
    pub fn finish(&mut self, resumable: bool) -> Result<(), SyncError> {
        self.advance(SyncStage::Done)?;
        self.run.resumable = resumable;
        self.run.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Ends the run as failed. Counters are kept so the caller can judge how far it got.
    pub fn fail(&mut self, error: &str) {
        if self.run.stage.is_terminal() {
            warn!("🔄️ Run #{} is already {}. Not marking it failed: {error}", self.run.id, self.run.stage);
            return;
        }
        self.run.stage = SyncStage::Failed;
        self.run.resumable = true;
        self.run.error = Some(error.to_string());
        self.run.finished_at = Some(Utc::now());
    }
}
