use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::events::{EventHandler, EventProducer, Handler, SyncRunFinishedEvent, UnmatchedFeeEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub sync_finished_producer: Vec<EventProducer<SyncRunFinishedEvent>>,
    pub unmatched_fee_producer: Vec<EventProducer<UnmatchedFeeEvent>>,
}

impl EventProducers {
    pub async fn publish_sync_finished(&self, event: SyncRunFinishedEvent) {
        for producer in &self.sync_finished_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_unmatched_fee(&self, event: UnmatchedFeeEvent) {
        for producer in &self.unmatched_fee_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_sync_finished: Option<EventHandler<SyncRunFinishedEvent>>,
    pub on_unmatched_fee: Option<EventHandler<UnmatchedFeeEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_sync_finished = hooks.on_sync_finished.map(|f| EventHandler::new(buffer_size, f));
        let on_unmatched_fee = hooks.on_unmatched_fee.map(|f| EventHandler::new(buffer_size, f));
        Self { on_sync_finished, on_unmatched_fee }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_sync_finished {
            result.sync_finished_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_unmatched_fee {
            result.unmatched_fee_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_sync_finished {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_unmatched_fee {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_sync_finished: Option<Handler<SyncRunFinishedEvent>>,
    pub on_unmatched_fee: Option<Handler<UnmatchedFeeEvent>>,
}

impl EventHooks {
    pub fn on_sync_finished<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SyncRunFinishedEvent) -> BoxFuture<'static, ()>) + Send + Sync + 'static {
        self.on_sync_finished = Some(Arc::new(f));
        self
    }

    pub fn on_unmatched_fee<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(UnmatchedFeeEvent) -> BoxFuture<'static, ()>) + Send + Sync + 'static {
        self.on_unmatched_fee = Some(Arc::new(f));
        self
    }
}
