use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::events::{AppEvent, EventSender};
use crate::serial::{AckOutcome, Connector, TempProtocol};
use super::{ConnectionState, DeviceError, DeviceState, Result, TemperatureReading};

/// Owns the single link to the sensor board and the state derived from it.
///
/// Every exchange with the board goes through `link`: a GET_TEMP poll holds
/// it for one request/reply pair and a SET_TEMP exchange holds it until the
/// board acknowledges or the exchange times out, so bytes from different
/// exchanges never interleave on the wire.
pub struct DeviceManager {
    connector: Arc<dyn Connector>,
    link: Arc<Mutex<Option<TempProtocol>>>,
    state: Arc<RwLock<DeviceState>>,
    events: EventSender,
}

impl DeviceManager {
    pub fn new(connector: Arc<dyn Connector>, events: EventSender) -> Self {
        Self {
            connector,
            link: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(DeviceState::default())),
            events,
        }
    }

    /// Open the link, replacing any previous one
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        *link = None;

        match self.connector.connect() {
            Ok(transport) => {
                let protocol = TempProtocol::new(transport);
                let port = protocol.port_name().to_string();
                *link = Some(protocol);
                log::info!("Connected to sensor board on {}", port);
                self.update_connection_state(ConnectionState::Connected { port }).await;
                Ok(())
            }
            Err(e) => {
                let err = DeviceError::from(e);
                log::error!("Connection failed: {}", err);
                self.update_connection_state(ConnectionState::Disconnected { reason: err.to_string() }).await;
                Err(err)
            }
        }
    }

    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if let Some(protocol) = link.take() {
            log::info!("Disconnecting from {}", protocol.port_name());
            self.update_connection_state(ConnectionState::Disconnected { reason: "closed".to_string() }).await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// Poll the board once. `Ok(None)` when it had no reading ready.
    pub async fn read_temperature(&self) -> Result<Option<TemperatureReading>> {
        let mut link = self.link.lock().await;
        let protocol = link.as_mut().ok_or(DeviceError::NotConnected)?;

        let celsius = match protocol.get_temp().await {
            Ok(Some(celsius)) => celsius,
            Ok(None) => return Ok(None),
            Err(e) => {
                let err = DeviceError::from(e);
                *link = None;
                self.link_lost(&err).await;
                return Err(err);
            }
        };

        let reading = self.state.write().await.record_reading(celsius);
        log::debug!("Ambient {} °C ({})", reading.celsius, reading.status.as_str());
        self.events.emit(AppEvent::TemperatureUpdated { reading: reading.clone() });
        Ok(Some(reading))
    }

    /// Run a full SET_TEMP exchange. Polls wait until it finishes.
    pub async fn set_warning_threshold(&self, celsius: i32) -> Result<()> {
        let mut link = self.link.lock().await;
        let protocol = link.as_mut().ok_or(DeviceError::NotConnected)?;

        let outcome = match protocol.set_temp(celsius).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = DeviceError::from(e);
                *link = None;
                self.link_lost(&err).await;
                return Err(err);
            }
        };

        match outcome {
            AckOutcome::Acknowledged { attempts, elapsed } => {
                self.state.write().await.apply_threshold(celsius);
                log::info!("Warning threshold set to {} °C ({} attempts, {:?})", celsius, attempts, elapsed);
                self.events.emit(AppEvent::ThresholdAcknowledged { celsius });
                Ok(())
            }
            AckOutcome::TimedOut { attempts, elapsed } => {
                log::warn!("SET_TEMP {} not acknowledged after {} attempts in {:?}", celsius, attempts, elapsed);
                self.events.emit(AppEvent::ThresholdTimedOut { celsius });
                Err(DeviceError::AcknowledgmentTimeout { threshold: celsius, attempts })
            }
        }
    }

    pub async fn snapshot(&self) -> DeviceState {
        self.state.read().await.clone()
    }

    pub async fn warning_threshold(&self) -> i32 {
        self.state.read().await.warning_threshold
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection.clone()
    }

    pub(crate) async fn mark_reconnecting(&self, attempt: u32) {
        self.update_connection_state(ConnectionState::Reconnecting { attempt }).await;
    }

    async fn link_lost(&self, err: &DeviceError) {
        log::warn!("Lost connection to sensor board: {}", err);
        self.update_connection_state(ConnectionState::Disconnected { reason: err.to_string() }).await;
    }

    async fn update_connection_state(&self, connection: ConnectionState) {
        {
            let mut state = self.state.write().await;
            if state.connection == connection {
                return;
            }
            state.set_connection(connection.clone());
        }
        self.events.emit(AppEvent::ConnectionChanged { connection });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::serial::{MockConnector, MockDevice};

    fn manager_for(device: &MockDevice) -> (DeviceManager, events::EventQueue) {
        let (tx, rx) = events::channel();
        let manager = DeviceManager::new(Arc::new(MockConnector::new(device.clone())), tx);
        (manager, rx)
    }

    #[tokio::test]
    async fn commands_fail_before_connect() {
        let device = MockDevice::new(Some(30));
        let (manager, _rx) = manager_for(&device);
        assert!(matches!(manager.read_temperature().await, Err(DeviceError::NotConnected)));
        assert!(matches!(manager.set_warning_threshold(50).await, Err(DeviceError::NotConnected)));
        assert!(device.wire_log().is_empty());
    }

    #[tokio::test]
    async fn connect_reports_missing_device() {
        let device = MockDevice::new(Some(30));
        device.unplug();
        let (manager, mut rx) = manager_for(&device);
        assert!(matches!(manager.connect().await, Err(DeviceError::NotFound(_))));
        assert!(matches!(
            manager.connection_state().await,
            ConnectionState::Disconnected { .. }
        ));
        assert!(matches!(rx.try_recv(), Some(AppEvent::ConnectionChanged { .. })));
    }

    #[tokio::test]
    async fn reading_updates_state_and_emits() {
        let device = MockDevice::new(Some(72));
        let (manager, mut rx) = manager_for(&device);
        manager.connect().await.unwrap();
        let _ = rx.try_recv();

        let reading = manager.read_temperature().await.unwrap().unwrap();
        assert_eq!(reading.celsius, 72);
        assert_eq!(reading.fahrenheit, 162);
        assert_eq!(manager.snapshot().await.ambient.unwrap().celsius, 72);
        assert_eq!(manager.warning_threshold().await, 80);
        match rx.try_recv() {
            Some(AppEvent::TemperatureUpdated { reading }) => assert_eq!(reading.celsius, 72),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn io_failure_drops_link() {
        let device = MockDevice::new(Some(72));
        let (manager, _rx) = manager_for(&device);
        manager.connect().await.unwrap();
        device.unplug();
        assert!(matches!(manager.read_temperature().await, Err(DeviceError::SerialError(_))));
        assert!(!manager.is_connected().await);
        assert!(matches!(manager.read_temperature().await, Err(DeviceError::NotConnected)));
    }
}
