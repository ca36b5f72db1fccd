//! Input abstraction for Bluetooth-LE game controllers.
//!
//! Raw notification payloads go in through a [`NotificationSender`] (or
//! [`ControllerSession::ingest`]), normalized state comes out through a
//! [`Joystick`] that consumers poll at their own rate.
//!
//! ```no_run
//! use gamesir_controller::{ControllerSession, Settings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut session = ControllerSession::new(&Settings::default())?;
//! let sender = session.start();
//! let joystick = session.joystick();
//!
//! // from the BLE notification callback
//! sender.notify(&[0xA1, 0xC5, 0x80, 0x20, 0x08, 0x02, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])?;
//!
//! // from the control loop
//! let yaw = joystick.axis("left_x")?;
//! let takeoff = joystick.button("a")?;
//! # let _ = (yaw, takeoff);
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod session;

pub use domain::error::{ControllerError, FrameError};
pub use domain::models::{Axis, Button, ConnectionStatus, ControllerState};
pub use domain::settings::{LayoutPreset, Settings, SettingsService};
pub use infrastructure::bluetooth::{FrameLayout, NotificationSender};
pub use presentation::joystick::Joystick;
pub use session::ControllerSession;
