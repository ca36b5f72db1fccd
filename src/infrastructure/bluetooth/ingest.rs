//! Notification Ingestion
//!
//! The transport pushes payloads through a [`NotificationSender`] into a
//! bounded queue. A pipeline task drains the queue and runs each payload
//! through [`FramePipeline::process`]: decode, normalize, store.

use crate::domain::calibration::{normalize, CalibrationProfile};
use crate::domain::error::{ControllerError, FrameError};
use crate::domain::state::{ControllerStateStore, UpdateOutcome};
use crate::infrastructure::bluetooth::protocol::FrameLayout;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// One payload as received from the transport.
#[derive(Debug, Clone)]
pub struct Notification {
    pub payload: Vec<u8>,
    pub received_at: Instant,
}

/// Counters describing what happened to incoming notifications.
#[derive(Debug, Default)]
pub struct PipelineStats {
    applied: AtomicU64,
    malformed: AtomicU64,
    unknown_report_type: AtomicU64,
    out_of_order: AtomicU64,
    discarded: AtomicU64,
    overflowed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub applied: u64,
    pub malformed: u64,
    pub unknown_report_type: u64,
    pub out_of_order: u64,
    /// Arrived after the store was closed
    pub discarded: u64,
    /// Dropped because the queue was full
    pub overflowed: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_report_type: self.unknown_report_type.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &Result<UpdateOutcome, FrameError>) {
        let counter = match result {
            Ok(UpdateOutcome::Applied) => &self.applied,
            Ok(UpdateOutcome::OutOfOrder { .. }) => &self.out_of_order,
            Ok(UpdateOutcome::Closed) => &self.discarded,
            Err(FrameError::MalformedFrame { .. }) => &self.malformed,
            Err(FrameError::UnknownReportType(_)) => &self.unknown_report_type,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decode → normalize → store, synchronously.
pub struct FramePipeline {
    layout: &'static FrameLayout,
    profile: CalibrationProfile,
    store: Arc<ControllerStateStore>,
    stats: Arc<PipelineStats>,
}

impl FramePipeline {
    pub fn new(
        layout: &'static FrameLayout,
        profile: CalibrationProfile,
        store: Arc<ControllerStateStore>,
    ) -> Self {
        Self {
            layout,
            profile,
            store,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn layout(&self) -> &'static FrameLayout {
        self.layout
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run one payload through the pipeline. The store is only touched when
    /// the payload decodes.
    pub fn process(&self, payload: &[u8], now: Instant) -> Result<UpdateOutcome, FrameError> {
        let result = self.layout.decode(payload).map(|raw| {
            let report = normalize(&raw, &self.profile, self.layout.buttons);
            self.store.update(&report, now)
        });
        self.stats.record(&result);
        result
    }

    /// [`process`](Self::process) with the caller-side logging of dropped frames.
    fn handle(&self, notification: &Notification) {
        match self.process(&notification.payload, notification.received_at) {
            Ok(UpdateOutcome::Applied) => {}
            Ok(UpdateOutcome::OutOfOrder { last, received }) => {
                debug!(
                    "Dropping out-of-order frame {} (last applied {})",
                    received.value, last.value
                );
            }
            Ok(UpdateOutcome::Closed) => {
                debug!("Dropping frame received after disconnect");
            }
            Err(e) => {
                debug!("Dropping frame: {}", e);
            }
        }
    }
}

/// Cloneable handle the transport callback pushes payloads into. Never blocks.
#[derive(Clone)]
pub struct NotificationSender {
    sender: mpsc::Sender<Notification>,
    stats: Arc<PipelineStats>,
}

impl NotificationSender {
    /// Queue one payload. A full queue drops the payload with a warning;
    /// a shut down session returns [`ControllerError::SessionClosed`].
    pub fn notify(&self, payload: &[u8]) -> Result<(), ControllerError> {
        let notification = Notification {
            payload: payload.to_vec(),
            received_at: Instant::now(),
        };

        match self.sender.try_send(notification) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.overflowed.fetch_add(1, Ordering::Relaxed);
                warn!("Notification queue full, dropping frame");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ControllerError::SessionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create the bounded queue feeding `pipeline`.
pub fn notification_channel(
    pipeline: &FramePipeline,
    capacity: usize,
) -> (NotificationSender, mpsc::Receiver<Notification>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        NotificationSender {
            sender,
            stats: pipeline.stats.clone(),
        },
        receiver,
    )
}

/// Drain the queue until shutdown is signalled or every sender is gone.
/// Frames still queued at shutdown are discarded.
pub async fn run_pipeline(
    pipeline: Arc<FramePipeline>,
    mut receiver: mpsc::Receiver<Notification>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Frame pipeline started ({} layout)", pipeline.layout().name);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            notification = receiver.recv() => match notification {
                Some(notification) => pipeline.handle(&notification),
                None => break,
            },
        }
    }

    receiver.close();
    let mut discarded = 0u64;
    while receiver.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        pipeline
            .stats
            .discarded
            .fetch_add(discarded, Ordering::Relaxed);
        debug!("Discarded {} queued frames on shutdown", discarded);
    }
    info!("Frame pipeline stopped");
}

/// Periodically demote the link to stale when reports stop arriving.
pub async fn run_staleness_watchdog(
    store: Arc<ControllerStateStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                store.mark_stale_if_expired(Instant::now());
            }
        }
    }
    debug!("Staleness watchdog stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Axis, Button, ConnectionStatus};
    use crate::infrastructure::bluetooth::protocol::{COMPACT, COMPACT_SEQUENCED};

    fn pipeline(layout: &'static FrameLayout) -> (FramePipeline, Arc<ControllerStateStore>) {
        let store = Arc::new(ControllerStateStore::new(Duration::from_millis(500)));
        let profile = layout.calibration_profile(&[]).unwrap();
        (FramePipeline::new(layout, profile, store.clone()), store)
    }

    #[test]
    fn test_process_applies_valid_frame() {
        let (pipeline, store) = pipeline(&COMPACT);
        let outcome = pipeline
            .process(&[0x01, 0xFF, 0x00, 0x80, 0x80, 0x01, 0x00], Instant::now())
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        let state = store.read();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.axis(Axis::LeftX), 1.0);
        assert_eq!(state.axis(Axis::LeftY), -1.0);
        assert!(state.is_pressed(Button::A));
        assert_eq!(pipeline.stats().snapshot().applied, 1);
    }

    #[test]
    fn test_dropped_frames_leave_state_untouched() {
        let (pipeline, store) = pipeline(&COMPACT);
        let now = Instant::now();
        pipeline
            .process(&[0x01, 0xFF, 0x80, 0x80, 0x80, 0x02, 0x00], now)
            .unwrap();
        let before = store.read();

        assert!(pipeline.process(&[0x01, 0x00, 0x00], now).is_err());
        assert!(pipeline
            .process(&[0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], now)
            .is_err());
        assert_eq!(store.read(), before);

        // the next good frame decodes normally
        pipeline
            .process(&[0x01, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00], now)
            .unwrap();
        assert_eq!(store.read().axis(Axis::LeftX), 0.0);

        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.unknown_report_type, 1);
    }

    #[test]
    fn test_reordered_frames_are_dropped() {
        let (pipeline, store) = pipeline(&COMPACT_SEQUENCED);
        let now = Instant::now();
        pipeline
            .process(&[0x02, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00, 7], now)
            .unwrap();
        let before = store.read();

        for seq in [7u8, 6, 1] {
            let outcome = pipeline
                .process(&[0x02, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x7F, seq], now)
                .unwrap();
            assert!(matches!(outcome, UpdateOutcome::OutOfOrder { .. }));
        }
        assert_eq!(store.read(), before);
        assert_eq!(pipeline.stats().snapshot().out_of_order, 3);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (pipeline, _store) = pipeline(&COMPACT);
        let (sender, _receiver) = notification_channel(&pipeline, 2);
        for _ in 0..5 {
            sender.notify(&[0x01, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00]).unwrap();
        }
        assert_eq!(pipeline.stats().snapshot().overflowed, 3);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_notifications() {
        let (pipeline, _store) = pipeline(&COMPACT);
        let (sender, receiver) = notification_channel(&pipeline, 4);
        drop(receiver);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.notify(&[0x01]),
            Err(ControllerError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_pipeline_task_applies_queued_frames() {
        let (pipeline, store) = pipeline(&COMPACT);
        let pipeline = Arc::new(pipeline);
        let (sender, receiver) = notification_channel(&pipeline, 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut updates = store.subscribe();

        let task = tokio::spawn(run_pipeline(pipeline.clone(), receiver, shutdown_rx));
        sender.notify(&[0x01, 0x80, 0xFF, 0x80, 0x80, 0x00, 0x00]).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(store.read().axis(Axis::LeftY), 1.0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_watchdog_marks_link_stale() {
        let store = Arc::new(ControllerStateStore::new(Duration::from_millis(20)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut updates = store.subscribe();
        store.update(
            &crate::domain::models::NormalizedReport {
                axes: [0.0; crate::domain::models::AXIS_COUNT],
                buttons: Default::default(),
                sequence: None,
            },
            Instant::now(),
        );
        updates.borrow_and_update();

        let task = tokio::spawn(run_staleness_watchdog(
            store.clone(),
            Duration::from_millis(5),
            shutdown_rx,
        ));
        updates.changed().await.unwrap();
        assert_eq!(store.read().status, ConnectionStatus::Stale);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
