//! State-change messages from the device side to the presentation side.
//!
//! Background tasks only enqueue; a single consumer drains the queue and
//! drives the presenter, so presentation state is touched from one task.
use serde::Serialize;
use tokio::sync::mpsc;

use crate::device::{ConnectionState, TemperatureReading};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    TemperatureUpdated { reading: TemperatureReading },
    ThresholdAcknowledged { celsius: i32 },
    ThresholdTimedOut { celsius: i32 },
    ConnectionChanged { connection: ConnectionState },
}

/// Presentation callbacks, invoked only from the queue consumer.
pub trait Presenter {
    fn on_temperature_update(&mut self, reading: &TemperatureReading);
    fn on_threshold_acknowledged(&mut self, celsius: i32);
    fn on_threshold_timeout(&mut self, celsius: i32);
    fn on_connection_changed(&mut self, connection: &ConnectionState);
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventSender {
    pub fn emit(&self, event: AppEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("No presenter listening, dropped {:?}", e.0);
        }
    }
}

pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventQueue {
    pub async fn recv(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AppEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, oldest first
    pub fn drain(&mut self) -> Vec<AppEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub fn channel() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventQueue { rx })
}

pub fn dispatch<P: Presenter + ?Sized>(event: &AppEvent, presenter: &mut P) {
    match event {
        AppEvent::TemperatureUpdated { reading } => presenter.on_temperature_update(reading),
        AppEvent::ThresholdAcknowledged { celsius } => presenter.on_threshold_acknowledged(*celsius),
        AppEvent::ThresholdTimedOut { celsius } => presenter.on_threshold_timeout(*celsius),
        AppEvent::ConnectionChanged { connection } => presenter.on_connection_changed(connection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Presenter for Recorder {
        fn on_temperature_update(&mut self, reading: &TemperatureReading) {
            self.calls.push(format!("temp {}", reading.celsius));
        }
        fn on_threshold_acknowledged(&mut self, celsius: i32) {
            self.calls.push(format!("ack {}", celsius));
        }
        fn on_threshold_timeout(&mut self, celsius: i32) {
            self.calls.push(format!("timeout {}", celsius));
        }
        fn on_connection_changed(&mut self, connection: &ConnectionState) {
            self.calls.push(format!("conn {}", connection.is_connected()));
        }
    }

    #[test]
    fn dispatches_in_order() {
        let (tx, mut rx) = channel();
        tx.emit(AppEvent::ConnectionChanged { connection: ConnectionState::Connected { port: "sim0".into() } });
        tx.emit(AppEvent::TemperatureUpdated { reading: TemperatureReading::new(40, 80) });
        tx.emit(AppEvent::ThresholdAcknowledged { celsius: 85 });
        tx.emit(AppEvent::ThresholdTimedOut { celsius: 90 });

        let mut recorder = Recorder::default();
        for event in rx.drain() {
            dispatch(&event, &mut recorder);
        }
        assert_eq!(recorder.calls, vec!["conn true", "temp 40", "ack 85", "timeout 90"]);
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&AppEvent::ThresholdAcknowledged { celsius: 85 }).unwrap();
        assert_eq!(json, r#"{"event":"threshold_acknowledged","celsius":85}"#);
    }

    #[test]
    fn emit_without_receiver_is_harmless() {
        let (tx, rx) = channel();
        drop(rx);
        tx.emit(AppEvent::ThresholdTimedOut { celsius: 1 });
    }
}
