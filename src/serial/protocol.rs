use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::{Result, SerialTransport};

pub const GET_TEMP: &str = "GET_TEMP";
pub const SET_TEMP: &str = "SET_TEMP";
pub const ACK: &str = "ACK";

/// Pause between resends of the threshold value while waiting for `ACK`.
pub const ACK_RETRY_INTERVAL: Duration = Duration::from_millis(250);
/// Wall-clock budget for one SET_TEMP exchange, measured from its start.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Host-to-device requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GetTemp,
    SetTemp,
}

impl Request {
    pub fn token(&self) -> &'static str {
        match self {
            Request::GetTemp => GET_TEMP,
            Request::SetTemp => SET_TEMP,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}\n", self.token())
    }
}

/// Parse a GET_TEMP reply. Anything but a plain run of decimal digits means
/// the board had nothing to say yet.
pub fn parse_reading(line: &str) -> Option<i32> {
    let line = line.trim();
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    line.parse().ok()
}

pub fn is_ack(line: &str) -> bool {
    line.trim() == ACK
}

/// How a SET_TEMP exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, elapsed: Duration },
}

/// In-flight SET_TEMP exchange
#[derive(Debug)]
struct PendingCommand {
    message: String,
    started: Instant,
    attempts: u32,
}

impl PendingCommand {
    fn new(celsius: i32) -> Self {
        Self {
            message: format!("{}\n", celsius),
            started: Instant::now(),
            attempts: 0,
        }
    }

    fn expired(&self) -> bool {
        self.started.elapsed() > ACK_TIMEOUT
    }
}

/// Line protocol spoken by the sensor firmware.
///
/// Callers are responsible for serializing access: each method assumes it
/// owns the link for its whole duration.
pub struct TempProtocol {
    transport: Box<dyn SerialTransport>,
}

impl TempProtocol {
    pub fn new(transport: Box<dyn SerialTransport>) -> Self {
        Self { transport }
    }

    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    /// One GET_TEMP request/response pair. `Ok(None)` when no reading was ready.
    pub async fn get_temp(&mut self) -> Result<Option<i32>> {
        self.transport.write_bytes(Request::GetTemp.encode().as_bytes()).await?;
        let line = self.transport.read_line().await?;
        let reading = parse_reading(&line);
        if reading.is_none() && !line.trim().is_empty() {
            log::debug!("Ignoring GET_TEMP reply {:?}", line);
        }
        Ok(reading)
    }

    /// Push a new warning threshold, resending the value until the board
    /// answers `ACK` or `ACK_TIMEOUT` runs out.
    pub async fn set_temp(&mut self, celsius: i32) -> Result<AckOutcome> {
        self.transport.write_bytes(Request::SetTemp.encode().as_bytes()).await?;
        let mut pending = PendingCommand::new(celsius);

        loop {
            if pending.expired() {
                return Ok(AckOutcome::TimedOut {
                    attempts: pending.attempts,
                    elapsed: pending.started.elapsed(),
                });
            }

            self.transport.write_bytes(pending.message.as_bytes()).await?;
            pending.attempts += 1;

            let line = self.transport.read_line().await?;
            if is_ack(&line) {
                return Ok(AckOutcome::Acknowledged {
                    attempts: pending.attempts,
                    elapsed: pending.started.elapsed(),
                });
            }
            log::debug!("SET_TEMP {} attempt {}: got {:?}", celsius, pending.attempts, line);

            sleep(ACK_RETRY_INTERVAL).await;
        }
    }
}
