//! Stand-in transport: reads hex encoded notification payloads from stdin,
//! one per line, and logs the polled controller state at 20 Hz.
//!
//! Usage: `gamesir-bridge [settings.json]`

use anyhow::Context;
use gamesir_controller::infrastructure::logging;
use gamesir_controller::{Axis, ControllerSession, Joystick, SettingsService};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = match std::env::args().nth(1) {
        Some(path) => SettingsService::from_path(path)?,
        None => SettingsService::new()?,
    };
    let settings = settings_service.into_settings();

    let _logging_guard = logging::init_logger(&settings.log_settings)
        .context("Failed to initialize logging")?;
    info!("Starting GameSir controller bridge");

    let mut session = ControllerSession::new(&settings)?;
    let sender = session.start();
    let joystick = session.joystick();

    let mut reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_hex(line) {
                Ok(payload) => sender.notify(&payload)?,
                Err(e) => warn!("Skipping line {:?}: {}", line, e),
            }
        }
        anyhow::Ok(())
    });

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let reader_result = loop {
        tokio::select! {
            _ = ticker.tick() => log_state(&joystick),
            result = &mut reader => break result,
        }
    };

    // let the pipeline drain what the reader queued last
    tokio::time::sleep(POLL_INTERVAL).await;
    log_state(&joystick);
    session.shutdown().await;

    reader_result.context("stdin reader panicked")??;
    Ok(())
}

fn log_state(joystick: &Joystick) {
    let state = joystick.snapshot();
    let pressed: Vec<&str> = state.buttons.iter().map(|b| b.as_str()).collect();
    info!(
        "{} | L ({:+.2}, {:+.2}) R ({:+.2}, {:+.2}) L2 {:.2} R2 {:.2} | {:?}",
        state.status,
        state.axis(Axis::LeftX),
        state.axis(Axis::LeftY),
        state.axis(Axis::RightX),
        state.axis(Axis::RightY),
        state.axis(Axis::LeftTrigger),
        state.axis(Axis::RightTrigger),
        pressed,
    );
}

/// Accepts `a1c580...`, `A1 C5 80`, or `0xA1, 0xC5, 0x80`.
fn parse_hex(line: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if !digits.is_ascii() {
        anyhow::bail!("non-ASCII characters");
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?}", &digits[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_formats() {
        assert_eq!(parse_hex("01807f").unwrap(), vec![0x01, 0x80, 0x7F]);
        assert_eq!(parse_hex("01 80 7F").unwrap(), vec![0x01, 0x80, 0x7F]);
        assert_eq!(parse_hex("0x01, 0x80, 0x7f").unwrap(), vec![0x01, 0x80, 0x7F]);
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(parse_hex("018").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
