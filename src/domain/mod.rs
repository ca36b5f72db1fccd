pub mod calibration;
pub mod error;
pub mod models;
pub mod settings;
pub mod state;
