//! Single-flight recompute scheduling.
//!
//! Any number of [`RefreshScheduler::schedule_recompute`] calls made before the
//! driver gets to run collapse into one flatten pass. The pending flag is
//! cleared before the pass reads the timeline, so a mutation that races the
//! pass schedules another one and the last delivered sequence always reflects
//! the final state.

use crate::flatten::RenderSequence;
use crate::timeline::Timeline;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicBool,
    shutdown: AtomicBool,
    notify: Notify,
}

/// Handle shared between the feed consumer and the recompute driver
#[derive(Debug, Clone, Default)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a recompute; a no-op while one is already pending
    pub fn schedule_recompute(&self) {
        if !self.inner.pending.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_one();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Stop the driver after its current pass
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    /// Spawn the driver task
    ///
    /// `on_recompute` receives every freshly flattened sequence.
    pub fn spawn<F>(&self, timeline: Arc<Mutex<Timeline>>, mut on_recompute: F) -> JoinHandle<()>
    where
        F: FnMut(RenderSequence) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            loop {
                inner.notify.notified().await;
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }

                // Let the rest of the burst land before reading the index
                tokio::task::yield_now().await;

                if !inner.pending.swap(false, Ordering::AcqRel) {
                    continue;
                }

                let sequence = timeline.lock().render();
                trace!(nodes = sequence.len(), "timeline recomputed");
                on_recompute(sequence);
            }
            debug!("refresh scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SymbolEquality;
    use crate::settings::TimelineSettings;
    use crate::types::{Instrument, RawOperation};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn timeline() -> Arc<Mutex<Timeline>> {
        let settings = TimelineSettings {
            timeline_trader_id: Some("replay".to_string()),
            disable_instrument_filtering: true,
            ..Default::default()
        };
        Arc::new(Mutex::new(
            Timeline::activate(settings, Arc::new(SymbolEquality)).unwrap(),
        ))
    }

    fn buy(operation_id: &str) -> RawOperation {
        RawOperation {
            operation_id: Some(operation_id.to_string()),
            parent_id: Some("P1".to_string()),
            created_at: Some("2024-05-01T10:00:00Z".parse().unwrap()),
            kind: crate::types::OperationType::Buy,
            instrument: Some(Instrument::from_symbol("AAPL")),
            price: 10.0,
            quantity: 1.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_recompute() {
        let timeline = timeline();
        let scheduler = RefreshScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = scheduler.spawn(Arc::clone(&timeline), move |sequence| {
            let _ = tx.send(sequence);
        });

        for id in ["a", "b", "c"] {
            timeline.lock().ingest(buy(id));
            scheduler.schedule_recompute();
        }

        let sequence = rx.recv().await.unwrap();
        assert_eq!(sequence.group_count(), 1);
        assert_eq!(sequence.groups().next().unwrap().len(), 3);
        assert!(!scheduler.is_pending());

        let second = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "unexpected second recompute");

        scheduler.shutdown();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_during_pending_recompute_delivers_empty_sequence() {
        let timeline = timeline();
        let scheduler = RefreshScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = scheduler.spawn(Arc::clone(&timeline), move |sequence| {
            let _ = tx.send(sequence);
        });

        timeline.lock().ingest(buy("a"));
        scheduler.schedule_recompute();
        timeline.lock().ingest(RawOperation::clear());
        scheduler.schedule_recompute();

        let sequence = rx.recv().await.unwrap();
        assert!(sequence.is_empty());

        scheduler.shutdown();
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_every_burst_after_a_pass_is_delivered() {
        let timeline = timeline();
        let scheduler = RefreshScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = scheduler.spawn(Arc::clone(&timeline), move |sequence| {
            let _ = tx.send(sequence);
        });

        timeline.lock().ingest(buy("a"));
        scheduler.schedule_recompute();
        assert_eq!(rx.recv().await.unwrap().groups().next().unwrap().len(), 1);

        timeline.lock().ingest(buy("b"));
        scheduler.schedule_recompute();
        assert_eq!(rx.recv().await.unwrap().groups().next().unwrap().len(), 2);

        scheduler.shutdown();
        driver.await.unwrap();
    }
}
