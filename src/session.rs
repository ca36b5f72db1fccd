//! Controller Session
//!
//! Owns one state store, the decode pipeline and the background tasks that
//! feed it. Consumers get [`Joystick`] handles from the session; the
//! transport gets a [`NotificationSender`].

use crate::domain::error::ControllerError;
use crate::domain::models::ControllerState;
use crate::domain::settings::Settings;
use crate::domain::state::{ControllerStateStore, UpdateOutcome};
use crate::infrastructure::bluetooth::ingest::{
    self, FramePipeline, NotificationSender, PipelineStatsSnapshot,
};
use crate::infrastructure::bluetooth::protocol::FrameLayout;
use crate::presentation::joystick::Joystick;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ControllerSession {
    device_name: String,
    layout: &'static FrameLayout,
    store: Arc<ControllerStateStore>,
    pipeline: Arc<FramePipeline>,
    queue_capacity: usize,
    watchdog_interval: Duration,
    sender: Option<NotificationSender>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControllerSession {
    /// Build a session from a configuration record. Calibration is validated
    /// here and fixed for the session's lifetime.
    pub fn new(settings: &Settings) -> Result<Self, ControllerError> {
        let layout = FrameLayout::for_preset(settings.layout);
        let profile = layout.calibration_profile(&settings.calibration_overrides)?;
        let store = Arc::new(ControllerStateStore::new(Duration::from_millis(
            settings.staleness_timeout_ms,
        )));
        let pipeline = Arc::new(FramePipeline::new(layout, profile, store.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            "Created controller session for {} ({} layout, staleness {} ms)",
            settings.device_name, layout.name, settings.staleness_timeout_ms
        );

        Ok(Self {
            device_name: settings.device_name.clone(),
            layout,
            store,
            pipeline,
            queue_capacity: settings.queue_capacity,
            watchdog_interval: Duration::from_millis(settings.watchdog_interval_ms),
            sender: None,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Spawn the pipeline and staleness watchdog tasks and return the sender
    /// the transport pushes notifications into. Must be called from within a
    /// Tokio runtime. Calling it again returns another handle to the same
    /// queue.
    pub fn start(&mut self) -> NotificationSender {
        if let Some(sender) = &self.sender {
            return sender.clone();
        }

        let (sender, receiver) = ingest::notification_channel(&self.pipeline, self.queue_capacity);
        self.tasks.push(tokio::spawn(ingest::run_pipeline(
            self.pipeline.clone(),
            receiver,
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(ingest::run_staleness_watchdog(
            self.store.clone(),
            self.watchdog_interval,
            self.shutdown_tx.subscribe(),
        )));

        debug!(
            "Session tasks started (queue capacity {})",
            self.queue_capacity
        );
        self.sender = Some(sender.clone());
        sender
    }

    /// Run one payload through the pipeline on the calling thread.
    pub fn ingest(&self, payload: &[u8]) -> Result<UpdateOutcome, ControllerError> {
        self.ingest_at(payload, Instant::now())
    }

    pub fn ingest_at(&self, payload: &[u8], now: Instant) -> Result<UpdateOutcome, ControllerError> {
        Ok(self.pipeline.process(payload, now)?)
    }

    /// New polling handle onto this session's state.
    pub fn joystick(&self) -> Joystick {
        Joystick::new(
            self.store.subscribe(),
            self.layout,
            self.device_name.clone(),
        )
    }

    pub fn read(&self) -> ControllerState {
        self.store.read()
    }

    pub fn layout(&self) -> &'static FrameLayout {
        self.layout
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.pipeline.stats().snapshot()
    }

    pub fn mark_stale_if_expired(&self, now: Instant) -> bool {
        self.store.mark_stale_if_expired(now)
    }

    /// The transport reported that the link is gone. Terminal for this
    /// session; reconnecting means creating a new one.
    pub fn disconnect(&self) {
        self.store.disconnect();
    }

    /// Stop the producer side, wait for in-flight frames to finish, then
    /// close the store.
    pub async fn shutdown(mut self) {
        info!("Shutting down controller session for {}", self.device_name);
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Session task ended abnormally: {}", e);
            }
        }
        self.store.disconnect();

        let stats = self.stats();
        info!(
            "Session closed: {} applied, {} malformed, {} unknown type, {} out of order, {} overflowed",
            stats.applied, stats.malformed, stats.unknown_report_type, stats.out_of_order, stats.overflowed
        );
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            self.shutdown_tx.send_replace(true);
        }
        self.store.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::FrameError;
    use crate::domain::models::{Axis, Button, ConnectionStatus};
    use crate::domain::settings::LayoutPreset;

    fn compact_settings() -> Settings {
        Settings {
            layout: LayoutPreset::Compact,
            ..Settings::default()
        }
    }

    #[test]
    fn test_end_to_end_centered_frame() {
        let session = ControllerSession::new(&compact_settings()).unwrap();
        let joystick = session.joystick();
        assert_eq!(joystick.status(), ConnectionStatus::Disconnected);

        let outcome = session
            .ingest(&[0x01, 0x80, 0x80, 0x7F, 0x81, 0x00, 0x00])
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(joystick.axis("left_x").unwrap(), 0.0);
        assert_eq!(joystick.axis("left_y").unwrap(), 0.0);
        // 127 and 129 sit one count from center, inside the 8 count deadzone
        assert_eq!(joystick.axis("right_x").unwrap(), 0.0);
        assert_eq!(joystick.axis("right_y").unwrap(), 0.0);
        assert!(Button::ALL
            .into_iter()
            .all(|b| !joystick.is_pressed(b).unwrap()));
        assert_eq!(joystick.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_small_offset_without_deadzone() {
        let mut settings = compact_settings();
        settings.calibration_overrides = vec![crate::domain::settings::AxisOverride {
            axis: Axis::RightX,
            center: None,
            deadzone: Some(0.0),
            scale: None,
        }];
        let session = ControllerSession::new(&settings).unwrap();
        session
            .ingest(&[0x01, 0x80, 0x80, 0x7F, 0x81, 0x00, 0x00])
            .unwrap();

        let value = session.read().axis(Axis::RightX);
        assert!((value + 0.00787).abs() < 1e-4, "{value}");
    }

    #[test]
    fn test_short_payload_leaves_state_unchanged() {
        let session = ControllerSession::new(&compact_settings()).unwrap();
        session
            .ingest(&[0x01, 0xFF, 0x00, 0x80, 0x80, 0x01, 0x00])
            .unwrap();
        let before = session.read();

        let result = session.ingest(&[0x01, 0x80, 0x80]);

        assert!(matches!(
            result,
            Err(ControllerError::Frame(FrameError::MalformedFrame {
                expected: 7,
                actual: 3
            }))
        ));
        assert_eq!(session.read(), before);
    }

    #[test]
    fn test_invalid_override_fails_construction() {
        let mut settings = compact_settings();
        settings.calibration_overrides = vec![crate::domain::settings::AxisOverride {
            axis: Axis::LeftX,
            center: None,
            deadzone: None,
            scale: Some(-1.0),
        }];
        assert!(matches!(
            ControllerSession::new(&settings),
            Err(ControllerError::InvalidCalibration { .. })
        ));
    }

    #[test]
    fn test_staleness_round_trip() {
        let session = ControllerSession::new(&compact_settings()).unwrap();
        let start = Instant::now();
        session
            .ingest_at(&[0x01, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00], start)
            .unwrap();

        assert!(session.mark_stale_if_expired(start + Duration::from_millis(501)));
        assert_eq!(session.read().status, ConnectionStatus::Stale);

        session
            .ingest_at(
                &[0x01, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00],
                start + Duration::from_millis(600),
            )
            .unwrap();
        assert_eq!(session.read().status, ConnectionStatus::Connected);
    }

    #[test]
    fn test_disconnect_is_terminal_for_the_session() {
        let session = ControllerSession::new(&compact_settings()).unwrap();
        let joystick = session.joystick();
        session
            .ingest(&[0x01, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00])
            .unwrap();

        session.disconnect();
        assert_eq!(joystick.status(), ConnectionStatus::Disconnected);
        assert_eq!(joystick.axis("left_x").unwrap(), 0.0);

        let outcome = session
            .ingest(&[0x01, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00])
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Closed);
        assert_eq!(joystick.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_queued_notifications_reach_consumers() {
        let mut session = ControllerSession::new(&compact_settings()).unwrap();
        let sender = session.start();
        let mut joystick = session.joystick();

        sender
            .notify(&[0x01, 0x80, 0x80, 0xFF, 0x80, 0x02, 0x00])
            .unwrap();
        let state = joystick.changed().await.unwrap();

        assert_eq!(state.axis(Axis::RightX), 1.0);
        assert!(state.is_pressed(Button::B));
        assert!(joystick.button("b").unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_stops_producer_and_closes_store() {
        let mut session = ControllerSession::new(&compact_settings()).unwrap();
        let sender = session.start();
        let joystick = session.joystick();

        sender
            .notify(&[0x01, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00])
            .unwrap();
        session.shutdown().await;

        assert!(matches!(
            sender.notify(&[0x01, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00]),
            Err(ControllerError::SessionClosed)
        ));
        let state = joystick.snapshot();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.is_closed());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut session = ControllerSession::new(&compact_settings()).unwrap();
        let first = session.start();
        let second = session.start();
        assert_eq!(session.tasks.len(), 2);
        assert!(!first.is_closed() && !second.is_closed());
        session.shutdown().await;
        assert!(first.is_closed() && second.is_closed());
    }
}
