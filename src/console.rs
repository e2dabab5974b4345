//! Terminal front end: renders device events and reads threshold changes from stdin.
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{self, ThresholdRequest};
use crate::device::{ConnectionState, DeviceError, DeviceManager, TempStatus, TemperatureReading};
use crate::events::{self, AppEvent, EventQueue, Presenter};

pub struct ConsolePresenter<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn render(&mut self, event: &AppEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => self.line(&line),
                Err(e) => log::error!("Failed to encode {:?}: {}", event, e),
            }
        } else {
            events::dispatch(event, self);
        }
    }

    pub fn rejected(&mut self, input: &str) {
        if self.json {
            let verdict = ThresholdRequest::Rejected { input: input.to_string() };
            if let Ok(line) = serde_json::to_string(&verdict) {
                self.line(&line);
            }
        } else {
            self.line(&format!("Ignored {:?}: enter a whole number from 0 to 999", input));
        }
    }

    pub fn status(&mut self, threshold: i32, ambient: Option<&TemperatureReading>, connection: &ConnectionState) {
        match ambient {
            Some(reading) => self.on_temperature_update(reading),
            None => self.line("Ambient Temperature: -- °C | -- °F"),
        }
        self.line(&format!("Current Warning Temperature: {} °C", threshold));
        self.on_connection_changed(connection);
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            log::debug!("Console write failed: {}", e);
        }
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn on_temperature_update(&mut self, reading: &TemperatureReading) {
        let marker = match reading.status {
            TempStatus::Critical => "!!",
            TempStatus::Elevated => " !",
            TempStatus::Normal => "  ",
        };
        self.line(&format!(
            "{} Ambient Temperature: {} °C | {} °F [{}]",
            marker,
            reading.celsius,
            reading.fahrenheit,
            reading.status.as_str()
        ));
    }

    fn on_threshold_acknowledged(&mut self, celsius: i32) {
        self.line(&format!("Current Warning Temperature: {} °C", celsius));
    }

    fn on_threshold_timeout(&mut self, celsius: i32) {
        self.line(&format!("Device did not acknowledge warning temperature {} °C; unchanged", celsius));
    }

    fn on_connection_changed(&mut self, connection: &ConnectionState) {
        let text = match connection {
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Connected { port } => format!("Connected on {}", port),
            ConnectionState::Disconnected { reason } => format!("Disconnected: {}", reason),
            ConnectionState::Reconnecting { attempt } => format!("Reconnecting (attempt {})...", attempt),
        };
        self.line(&text);
    }
}

/// Drive the console until stdin closes, `quit` is typed or Ctrl-C arrives.
pub async fn run_console(
    device_manager: Arc<DeviceManager>,
    mut queue: EventQueue,
    json: bool,
) -> anyhow::Result<()> {
    let mut presenter = ConsolePresenter::new(std::io::stdout(), json);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !json {
        let state = commands::get_device_state(&device_manager).await;
        presenter.status(state.warning_threshold, state.ambient.as_ref(), &state.connection);
        presenter.line("Type a warning temperature and press Enter (\"status\", \"quit\").");
    }

    loop {
        tokio::select! {
            event = queue.recv() => match event {
                Some(event) => presenter.render(&event),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                match input {
                    "" => continue,
                    "quit" | "q" | "exit" => break,
                    "status" => {
                        let state = commands::get_device_state(&device_manager).await;
                        presenter.status(state.warning_threshold, state.ambient.as_ref(), &state.connection);
                    }
                    _ => match commands::validate_threshold(input) {
                        ThresholdRequest::Accepted { celsius } => {
                            let manager = device_manager.clone();
                            // Result arrives as an event; only unexpected failures are logged here.
                            tokio::spawn(async move {
                                match manager.set_warning_threshold(celsius).await {
                                    Ok(()) | Err(DeviceError::AcknowledgmentTimeout { .. }) => {}
                                    Err(e) => log::warn!("Failed to set threshold {}: {}", celsius, e),
                                }
                            });
                        }
                        ThresholdRequest::Rejected { input } => presenter.rejected(&input),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(json: bool, event: AppEvent) -> String {
        let mut buf = Vec::new();
        ConsolePresenter::new(&mut buf, json).render(&event);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn renders_reading_with_status() {
        let text = rendered(false, AppEvent::TemperatureUpdated { reading: TemperatureReading::new(90, 80) });
        assert_eq!(text, "!! Ambient Temperature: 90 °C | 194 °F [critical]\n");
    }

    #[test]
    fn renders_json_lines() {
        let text = rendered(true, AppEvent::ThresholdTimedOut { celsius: 85 });
        assert_eq!(text, "{\"event\":\"threshold_timed_out\",\"celsius\":85}\n");
    }

    #[test]
    fn renders_connection_changes() {
        let text = rendered(false, AppEvent::ConnectionChanged {
            connection: ConnectionState::Reconnecting { attempt: 3 },
        });
        assert_eq!(text, "Reconnecting (attempt 3)...\n");
    }
}
