use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};

use crate::device::DeviceManager;

/// Pause between GET_TEMP polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Exponential delay between reconnect attempts
#[derive(Debug)]
pub struct Backoff {
    attempt: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0, next_delay: RECONNECT_INITIAL_BACKOFF }
    }

    /// Attempt number (1-based) and the delay to wait if it fails.
    pub fn next(&mut self) -> (u32, Duration) {
        self.attempt += 1;
        let delay = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(RECONNECT_MAX_BACKOFF);
        (self.attempt, delay)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Background GET_TEMP poller
pub struct TemperatureMonitor {
    session: Mutex<Option<MonitoringSession>>,
}

struct MonitoringSession {
    task_handle: tokio::task::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
}

impl TemperatureMonitor {
    pub fn new() -> Self {
        Self { session: Mutex::new(None) }
    }

    /// Spawn the polling loop. With `reconnect` off the loop ends when the link drops.
    pub async fn start(&self, device_manager: Arc<DeviceManager>, reconnect: bool) -> Result<(), String> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task_handle.is_finished()) {
            log::warn!("Temperature monitor already running");
            return Err("Monitor already running".to_string());
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task_handle = tokio::spawn(async move {
            Self::polling_loop(device_manager, stop_rx, reconnect).await;
        });

        *session = Some(MonitoringSession { task_handle, stop_tx });
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), String> {
        let session = self.session.lock().await.take();

        if let Some(session) = session {
            let _ = session.stop_tx.send(()).await;

            // Wait for task to complete gracefully (with timeout)
            let _ = timeout(Duration::from_secs(2), session.task_handle).await;
            Ok(())
        } else {
            Err("Monitor not running".to_string())
        }
    }

    pub async fn is_running(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task_handle.is_finished())
    }

    async fn polling_loop(device_manager: Arc<DeviceManager>, mut stop_rx: mpsc::Receiver<()>, reconnect: bool) {
        log::info!("Starting temperature polling every {:?}", POLL_INTERVAL);
        let mut backoff = Backoff::new();

        loop {
            let delay = if device_manager.is_connected().await {
                match device_manager.read_temperature().await {
                    Ok(_) => POLL_INTERVAL,
                    Err(e) if !reconnect => {
                        log::error!("Polling stopped: {}", e);
                        break;
                    }
                    Err(e) => {
                        log::debug!("Poll failed: {}", e);
                        backoff.reset();
                        Duration::ZERO
                    }
                }
            } else if reconnect {
                let (attempt, delay) = backoff.next();
                device_manager.mark_reconnecting(attempt).await;
                match device_manager.connect().await {
                    Ok(()) => {
                        log::info!("Reconnected after {} attempt(s)", attempt);
                        backoff.reset();
                        POLL_INTERVAL
                    }
                    Err(e) => {
                        log::debug!("Reconnect attempt {} failed: {}; retrying in {:?}", attempt, e, delay);
                        delay
                    }
                }
            } else {
                log::error!("Polling stopped: device not connected");
                break;
            };

            tokio::select! {
                _ = stop_rx.recv() => {
                    log::info!("Received stop signal for temperature polling");
                    break;
                }
                _ = sleep(delay) => {}
            }
        }
    }
}

impl Default for TemperatureMonitor {
    fn default() -> Self {
        Self::new()
    }
}
