//! Controller State Store
//!
//! Holds the single mutable [`ControllerState`]. The state lives inside a
//! `watch` channel: the writer replaces the whole value under the channel's
//! lock and readers copy it out, so no reader ever sees half of a report.

use crate::domain::models::{ConnectionStatus, ControllerState, NormalizedReport, Sequence};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// What happened to a report handed to [`ControllerStateStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Sequence counter was not newer than the last applied one
    OutOfOrder { last: Sequence, received: Sequence },
    /// The store was disconnected; the report was discarded
    Closed,
}

pub struct ControllerStateStore {
    sender: watch::Sender<ControllerState>,
    staleness_threshold: Duration,
}

impl ControllerStateStore {
    pub fn new(staleness_threshold: Duration) -> Self {
        let (sender, _) = watch::channel(ControllerState::default());
        Self {
            sender,
            staleness_threshold,
        }
    }

    pub fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// Atomically replace the visible state with `report`.
    pub fn update(&self, report: &NormalizedReport, now: Instant) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::Applied;
        let mut previous_status = ConnectionStatus::Disconnected;

        self.sender.send_if_modified(|state| {
            if state.closed {
                outcome = UpdateOutcome::Closed;
                return false;
            }

            if let (Some(last), Some(received)) = (state.sequence, report.sequence) {
                if !received.is_newer_than(last) {
                    outcome = UpdateOutcome::OutOfOrder { last, received };
                    return false;
                }
            }

            previous_status = state.status;
            state.axes = report.axes;
            state.buttons = report.buttons;
            state.sequence = report.sequence;
            state.last_update = Some(now);
            state.reports_applied += 1;
            state.status = ConnectionStatus::Connected;
            true
        });

        if outcome == UpdateOutcome::Applied && previous_status != ConnectionStatus::Connected {
            info!("Controller link {} -> connected", previous_status);
        }
        outcome
    }

    /// Copy of the current state.
    pub fn read(&self) -> ControllerState {
        *self.sender.borrow()
    }

    /// Receiver that observes every future state replacement.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.sender.subscribe()
    }

    /// Mark the link stale when no report has been applied within the
    /// staleness threshold. Returns true on the transition.
    pub fn mark_stale_if_expired(&self, now: Instant) -> bool {
        let threshold = self.staleness_threshold;
        let changed = self.sender.send_if_modified(|state| {
            if state.status != ConnectionStatus::Connected {
                return false;
            }
            match state.last_update {
                Some(last) if now.saturating_duration_since(last) > threshold => {
                    state.status = ConnectionStatus::Stale;
                    true
                }
                _ => false,
            }
        });

        if changed {
            info!(
                "No controller report for more than {:?}, link is stale",
                threshold
            );
        }
        changed
    }

    /// Explicit transport disconnect. Zeroes the controls and rejects every
    /// later update.
    pub fn disconnect(&self) {
        let changed = self.sender.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            *state = ControllerState {
                status: ConnectionStatus::Disconnected,
                closed: true,
                reports_applied: state.reports_applied,
                last_update: state.last_update,
                ..ControllerState::default()
            };
            true
        });

        if changed {
            info!("Controller link disconnected");
        } else {
            debug!("Disconnect requested on an already closed store");
        }
    }
}
