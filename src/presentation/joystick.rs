//! Polling Interface
//!
//! [`Joystick`] is what consumers hold. Every getter reads the latest
//! snapshot from the state store and returns immediately; nothing here waits
//! on the transport except [`Joystick::changed`].
//!
//! Two addressing styles are offered: by name (`axis("left_x")`,
//! `button("a")`) and by index in the style of common joystick libraries
//! (`get_axis(0)`, `get_button(0)`, `get_hat(0)`).

use crate::domain::error::ControllerError;
use crate::domain::models::{Axis, Button, ConnectionStatus, ControllerState};
use crate::infrastructure::bluetooth::protocol::FrameLayout;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Joystick {
    receiver: watch::Receiver<ControllerState>,
    layout: &'static FrameLayout,
    name: String,
}

impl Joystick {
    pub(crate) fn new(
        receiver: watch::Receiver<ControllerState>,
        layout: &'static FrameLayout,
        name: String,
    ) -> Self {
        Self {
            receiver,
            layout,
            name,
        }
    }

    /// Consistent copy of the whole controller state.
    pub fn snapshot(&self) -> ControllerState {
        *self.receiver.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.receiver.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Axis value by name, e.g. `"left_x"`.
    pub fn axis(&self, name: &str) -> Result<f32, ControllerError> {
        self.axis_value(name.parse()?)
    }

    pub fn axis_value(&self, axis: Axis) -> Result<f32, ControllerError> {
        if !self.layout.provides_axis(axis) {
            return Err(self.not_provided(axis.as_str()));
        }
        Ok(self.receiver.borrow().axis(axis))
    }

    /// Button state by name, e.g. `"a"` or `"dpad_up"`.
    pub fn button(&self, name: &str) -> Result<bool, ControllerError> {
        self.is_pressed(name.parse()?)
    }

    pub fn is_pressed(&self, button: Button) -> Result<bool, ControllerError> {
        if !self.layout.provides_button(button) {
            return Err(self.not_provided(button.as_str()));
        }
        Ok(self.receiver.borrow().is_pressed(button))
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_numaxes(&self) -> usize {
        self.layout.axes.len()
    }

    pub fn get_axis(&self, index: usize) -> Result<f32, ControllerError> {
        let field = self
            .layout
            .axes
            .get(index)
            .ok_or_else(|| ControllerError::UnknownControl(format!("axis #{index}")))?;
        Ok(self.receiver.borrow().axis(field.axis))
    }

    pub fn get_numbuttons(&self) -> usize {
        self.layout.indexed_buttons().count()
    }

    pub fn get_button(&self, index: usize) -> Result<bool, ControllerError> {
        let button = self
            .layout
            .indexed_buttons()
            .nth(index)
            .ok_or_else(|| ControllerError::UnknownControl(format!("button #{index}")))?;
        Ok(self.receiver.borrow().is_pressed(button))
    }

    pub fn get_numhats(&self) -> usize {
        usize::from(self.layout.has_dpad())
    }

    /// D-pad as `(x, y)`, x positive to the right, y positive upwards.
    pub fn get_hat(&self, index: usize) -> Result<(i8, i8), ControllerError> {
        if index >= self.get_numhats() {
            return Err(ControllerError::UnknownControl(format!("hat #{index}")));
        }
        let state = self.receiver.borrow();
        let direction = |negative: Button, positive: Button| {
            state.is_pressed(positive) as i8 - state.is_pressed(negative) as i8
        };
        Ok((
            direction(Button::DpadLeft, Button::DpadRight),
            direction(Button::DpadDown, Button::DpadUp),
        ))
    }

    /// Wait for the next state replacement and return it.
    ///
    /// Fails with [`ControllerError::SessionClosed`] once the session has been
    /// dropped.
    pub async fn changed(&mut self) -> Result<ControllerState, ControllerError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| ControllerError::SessionClosed)?;
        Ok(*self.receiver.borrow_and_update())
    }

    fn not_provided(&self, control: &str) -> ControllerError {
        ControllerError::UnknownControl(format!(
            "{} (not provided by the {} layout)",
            control, self.layout.name
        ))
    }
}
