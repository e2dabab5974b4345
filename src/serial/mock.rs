//! In-memory stand-in for the sensor firmware.
//!
//! Speaks the same line protocol as the real board so the protocol, manager
//! and poller can be exercised without hardware (tests and `--simulate`).
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::interface::take_line;
use super::protocol::{parse_reading, ACK, GET_TEMP, SET_TEMP};
use super::{Connector, Result, SerialError, SerialTransport};

pub const MOCK_PORT_NAME: &str = "sim0";

const DRIFT_MIN: i32 = 20;
const DRIFT_MAX: i32 = 110;

/// When the simulated board acknowledges a SET_TEMP value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Always,
    Never,
    /// Acknowledge on the n-th value write of an exchange (1-based).
    OnAttempt(u32),
}

#[derive(Debug)]
struct MockState {
    temperature: Option<i32>,
    threshold: i32,
    ack_policy: AckPolicy,
    drift_step: i32,
    awaiting_value: bool,
    value_attempts: u32,
    outbox: VecDeque<String>,
    wire_log: Vec<String>,
    unplugged: bool,
    connects: u32,
}

/// Shared handle to the simulated board. Clones observe the same device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new(temperature: Option<i32>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                temperature,
                threshold: 0,
                ack_policy: AckPolicy::Always,
                drift_step: 0,
                awaiting_value: false,
                value_attempts: 0,
                outbox: VecDeque::new(),
                wire_log: Vec::new(),
                unplugged: false,
                connects: 0,
            })),
        }
    }

    /// A board whose reading wanders up and down by one degree per request.
    pub fn drifting(start: i32) -> Self {
        let device = Self::new(Some(start));
        device.state().drift_step = 1;
        device
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_temperature(&self, temperature: Option<i32>) {
        self.state().temperature = temperature;
    }

    pub fn set_ack_policy(&self, policy: AckPolicy) {
        self.state().ack_policy = policy;
    }

    /// Threshold last accepted by the board
    pub fn threshold(&self) -> i32 {
        self.state().threshold
    }

    /// Queue a raw reply line, as if the board had sent it unprompted.
    pub fn push_reply(&self, line: &str) {
        self.state().outbox.push_back(line.to_string());
    }

    /// Every line written by the host, in order, without terminators.
    pub fn wire_log(&self) -> Vec<String> {
        self.state().wire_log.clone()
    }

    pub fn unplug(&self) {
        let mut state = self.state();
        state.unplugged = true;
        state.outbox.clear();
    }

    pub fn plug_in(&self) {
        self.state().unplugged = false;
    }

    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    fn is_unplugged(&self) -> bool {
        self.state().unplugged
    }

    fn handle_line(&self, line: &str) {
        let mut state = self.state();
        state.wire_log.push(line.to_string());

        match line {
            GET_TEMP => {
                if let Some(current) = state.temperature {
                    state.outbox.push_back(current.to_string());
                    if state.drift_step != 0 {
                        let next = current + state.drift_step;
                        if !(DRIFT_MIN..=DRIFT_MAX).contains(&next) {
                            state.drift_step = -state.drift_step;
                        }
                        state.temperature = Some(current + state.drift_step);
                    }
                }
            }
            SET_TEMP => {
                state.awaiting_value = true;
                state.value_attempts = 0;
            }
            value if state.awaiting_value => {
                let Some(threshold) = parse_reading(value) else {
                    return;
                };
                state.value_attempts += 1;
                let accept = match state.ack_policy {
                    AckPolicy::Always => true,
                    AckPolicy::Never => false,
                    AckPolicy::OnAttempt(n) => state.value_attempts >= n,
                };
                if accept {
                    state.threshold = threshold;
                    state.awaiting_value = false;
                    state.outbox.push_back(ACK.to_string());
                }
            }
            _ => {}
        }
    }

    fn take_reply(&self) -> Option<String> {
        self.state().outbox.pop_front()
    }
}

fn unplugged_error() -> SerialError {
    SerialError::IoError(std::io::Error::new(ErrorKind::BrokenPipe, "simulated device unplugged"))
}

pub struct MockTransport {
    device: MockDevice,
    partial: Vec<u8>,
}

impl MockTransport {
    pub fn new(device: MockDevice) -> Self {
        Self { device, partial: Vec::new() }
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        if self.device.is_unplugged() {
            return Err(unplugged_error());
        }
        self.partial.extend_from_slice(data);
        while let Some(line) = take_line(&mut self.partial) {
            self.device.handle_line(line.trim_end_matches('\r'));
        }
        Ok(data.len())
    }

    async fn read_line(&mut self) -> Result<String> {
        if self.device.is_unplugged() {
            return Err(unplugged_error());
        }
        Ok(self.device.take_reply().unwrap_or_default())
    }

    fn port_name(&self) -> &str {
        MOCK_PORT_NAME
    }
}

/// Hands out transports bound to one simulated board; fails while unplugged.
pub struct MockConnector {
    device: MockDevice,
}

impl MockConnector {
    pub fn new(device: MockDevice) -> Self {
        Self { device }
    }
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn SerialTransport>> {
        let mut state = self.device.state();
        if state.unplugged {
            return Err(SerialError::PortNotFound(MOCK_PORT_NAME.to_string()));
        }
        state.connects += 1;
        drop(state);
        Ok(Box::new(MockTransport::new(self.device.clone())))
    }
}
