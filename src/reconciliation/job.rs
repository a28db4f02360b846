//! Reconciliation Job
//!
//! Periodically drives pending referral events to a terminal state once the
//! linked order has settled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ReconciliationConfig;
use crate::error::LedgerError;
use crate::referral::{OrderStatusSource, ReferralEvent, ReferralEventProcessor, Resolution};
use crate::store::{EventCursor, LedgerStore};

/// Configuration for the reconciliation job
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// How often to scan for pending events
    pub interval: Duration,
    /// Page size of the pending-event scan
    pub batch_size: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 500,
        }
    }
}

impl From<&ReconciliationConfig> for JobConfig {
    fn from(cfg: &ReconciliationConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs.max(1)),
            batch_size: cfg.batch_size.max(1),
        }
    }
}

/// Outcome counts of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub still_open: usize,
    pub already_resolved: usize,
    pub failed: usize,
}

impl ReconcileReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Completed => self.completed += 1,
            Resolution::Cancelled => self.cancelled += 1,
            Resolution::StillOpen => self.still_open += 1,
            Resolution::AlreadyResolved(_) => self.already_resolved += 1,
        }
    }
}

/// Reconciliation Job
///
/// Takes no global lock. Overlapping runs (or a run racing a manual
/// resolution) are safe because every transition is guarded by the event
/// still being pending.
pub struct ReconciliationJob {
    store: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrderStatusSource>,
    processor: Arc<ReferralEventProcessor>,
    config: JobConfig,
}

impl ReconciliationJob {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrderStatusSource>,
        processor: Arc<ReferralEventProcessor>,
        config: JobConfig,
    ) -> Self {
        Self {
            store,
            orders,
            processor,
            config,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting reconciliation job"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Reconciliation run failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation job stopped");
    }

    /// One pass over every pending event.
    ///
    /// Pages through the pending set in `(created_at, event_id)` order, so
    /// events whose orders are still open never hide newer ones. Only a page
    /// fetch can fail the run; per-event failures are logged and counted.
    pub async fn run_once(&self) -> Result<ReconcileReport, LedgerError> {
        let limit = i64::try_from(self.config.batch_size).unwrap_or(i64::MAX);
        let mut report = ReconcileReport::default();
        let mut cursor: Option<EventCursor> = None;

        loop {
            let page = self.store.pending_events(cursor, limit).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(EventCursor::of(last));
            report.scanned += page.len();

            for event in &page {
                self.reconcile_event(event, &mut report).await;
            }

            if page.len() < self.config.batch_size {
                break;
            }
        }

        if report.scanned == 0 {
            debug!("No pending referral events");
            return Ok(report);
        }

        info!(
            scanned = report.scanned,
            completed = report.completed,
            cancelled = report.cancelled,
            still_open = report.still_open,
            already_resolved = report.already_resolved,
            failed = report.failed,
            "Reconciliation run finished"
        );

        Ok(report)
    }

    async fn reconcile_event(&self, event: &ReferralEvent, report: &mut ReconcileReport) {
        let status = match self.orders.order_status(&event.order_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    "Linked order not found, leaving event pending"
                );
                report.failed += 1;
                return;
            }
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    error = %e,
                    "Order status lookup failed"
                );
                report.failed += 1;
                return;
            }
        };

        match self.processor.resolve(event.event_id, status.outcome()).await {
            Ok(resolution) => report.record(resolution),
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    code = e.code(),
                    error = %e,
                    "Failed to resolve referral event"
                );
                report.failed += 1;
            }
        }
    }
}
