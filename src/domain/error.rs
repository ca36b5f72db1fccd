//! Error types for the decode pipeline and the polling interface.

use crate::domain::models::Axis;
use thiserror::Error;

/// Reasons a single notification is dropped. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload length differs from the layout's report size
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// Leading report id does not match the layout
    #[error("unknown report type {0:#04x}")]
    UnknownReportType(u8),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The caller asked for an axis or button that does not exist
    /// on this controller
    #[error("unknown control: {0}")]
    UnknownControl(String),

    #[error("invalid calibration for {axis}: {reason}")]
    InvalidCalibration { axis: Axis, reason: &'static str },

    #[error("controller session is closed")]
    SessionClosed,
}
