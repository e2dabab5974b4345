use std::sync::Arc;
use std::time::Duration;

use tempwatch_lib::device::{DeviceManager, TempStatus};
use tempwatch_lib::events::{self, AppEvent};
use tempwatch_lib::monitor::TemperatureMonitor;
use tempwatch_lib::serial::{MockConnector, MockDevice};

async fn connected(device: &MockDevice) -> (Arc<DeviceManager>, events::EventQueue) {
    let (tx, mut rx) = events::channel();
    let manager = Arc::new(DeviceManager::new(Arc::new(MockConnector::new(device.clone())), tx));
    manager.connect().await.expect("simulated board should connect");
    rx.drain();
    (manager, rx)
}

#[tokio::test]
async fn digit_reply_becomes_reading() {
    let device = MockDevice::new(Some(72));
    let (manager, mut rx) = connected(&device).await;

    let reading = manager.read_temperature().await.unwrap().expect("reading");
    assert_eq!(reading.celsius, 72);
    assert_eq!(reading.fahrenheit, 162);
    assert_eq!(reading.status, TempStatus::Elevated);

    let state = manager.snapshot().await;
    assert_eq!(state.ambient.map(|r| r.celsius), Some(72));
    assert_eq!(state.warning_threshold, 80, "poll must not touch the threshold");
    assert!(matches!(rx.try_recv(), Some(AppEvent::TemperatureUpdated { .. })));
}

#[tokio::test]
async fn empty_reply_leaves_reading_unchanged() {
    let device = MockDevice::new(Some(40));
    let (manager, mut rx) = connected(&device).await;
    manager.read_temperature().await.unwrap();
    rx.drain();

    device.set_temperature(None);
    assert_eq!(manager.read_temperature().await.unwrap(), None);
    assert_eq!(manager.snapshot().await.ambient.map(|r| r.celsius), Some(40));
    assert!(rx.try_recv().is_none());
}

#[tokio::test]
async fn garbage_reply_is_not_an_error() {
    let device = MockDevice::new(None);
    let (manager, _rx) = connected(&device).await;
    device.push_reply("T=12.5");
    assert_eq!(manager.read_temperature().await.unwrap(), None);
    assert!(manager.snapshot().await.ambient.is_none());
    assert!(manager.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn poller_issues_get_temp_every_cycle_until_stopped() {
    let device = MockDevice::new(Some(25));
    let (manager, mut rx) = connected(&device).await;
    let monitor = TemperatureMonitor::new();
    monitor.start(manager.clone(), true).await.unwrap();
    assert!(monitor.start(manager.clone(), true).await.is_err());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    monitor.stop().await.unwrap();
    assert!(!monitor.is_running().await);

    let polls = device.wire_log().iter().filter(|l| *l == "GET_TEMP").count();
    assert!((4..=6).contains(&polls), "expected ~5 polls in 1.1 s, got {}", polls);

    let updates = rx
        .drain()
        .into_iter()
        .filter(|e| matches!(e, AppEvent::TemperatureUpdated { .. }))
        .count();
    assert_eq!(updates, polls);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let after = device.wire_log().iter().filter(|l| *l == "GET_TEMP").count();
    assert_eq!(after, polls, "no polls after stop");
}
