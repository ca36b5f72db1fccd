//! Bluetooth Module
//!
//! Everything between the BLE notification callback and the state store.
//! Discovery, pairing and subscription belong to the transport and are not
//! handled here.
//!
//! ## Architecture
//!
//! ```text
//!   transport callback
//!          │ NotificationSender::notify (never blocks)
//!          ▼
//!   ┌──────────────┐   bounded mpsc   ┌───────────────────────────────┐
//!   │    ingest    │ ───────────────▶ │ FramePipeline                 │
//!   └──────────────┘                  │  protocol::decode             │
//!                                     │  calibration::normalize       │
//!                                     │  ControllerStateStore::update │
//!                                     └───────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame layouts and the stateless decoder
//! - [`ingest`] - Notification queue, pipeline and staleness watchdog tasks

pub mod ingest;
pub mod protocol;

pub use ingest::{FramePipeline, NotificationSender, PipelineStatsSnapshot};
pub use protocol::FrameLayout;
