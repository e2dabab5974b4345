use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use tempwatch_lib::commands;
use tempwatch_lib::device::{DeviceError, DeviceManager};
use tempwatch_lib::events::{self, AppEvent};
use tempwatch_lib::serial::mock::AckPolicy;
use tempwatch_lib::serial::{MockConnector, MockDevice};

async fn connected(device: &MockDevice) -> (DeviceManager, events::EventQueue) {
    let (tx, mut rx) = events::channel();
    let manager = DeviceManager::new(Arc::new(MockConnector::new(device.clone())), tx);
    manager.connect().await.expect("simulated board should connect");
    rx.drain();
    (manager, rx)
}

#[tokio::test(start_paused = true)]
async fn ack_on_first_attempt_updates_threshold() {
    let device = MockDevice::new(Some(40));
    let (manager, mut rx) = connected(&device).await;

    let start = Instant::now();
    manager.set_warning_threshold(85).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(250));

    assert_eq!(manager.warning_threshold().await, 85);
    assert_eq!(device.threshold(), 85);
    assert_eq!(device.wire_log(), vec!["SET_TEMP", "85"]);
    assert!(matches!(rx.try_recv(), Some(AppEvent::ThresholdAcknowledged { celsius: 85 })));
}

#[tokio::test(start_paused = true)]
async fn value_is_resent_until_acknowledged() {
    let device = MockDevice::new(Some(40));
    device.set_ack_policy(AckPolicy::OnAttempt(3));
    let (manager, _rx) = connected(&device).await;

    let start = Instant::now();
    manager.set_warning_threshold(60).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(750));
    assert_eq!(device.wire_log(), vec!["SET_TEMP", "60", "60", "60"]);
    assert_eq!(manager.warning_threshold().await, 60);
}

#[tokio::test(start_paused = true)]
async fn missing_ack_abandons_after_one_second() {
    let device = MockDevice::new(Some(40));
    device.set_ack_policy(AckPolicy::Never);
    let (manager, mut rx) = connected(&device).await;

    let start = Instant::now();
    let err = manager.set_warning_threshold(85).await.unwrap_err();
    let elapsed = start.elapsed();

    let attempts = match err {
        DeviceError::AcknowledgmentTimeout { threshold, attempts } => {
            assert_eq!(threshold, 85);
            attempts
        }
        other => panic!("expected timeout, got {:?}", other),
    };
    assert!(elapsed >= Duration::from_secs(1), "gave up early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1300), "gave up late: {:?}", elapsed);
    assert!((4..=5).contains(&attempts));

    let resends = device.wire_log().iter().filter(|l| *l == "85").count();
    assert_eq!(resends as u32, attempts);
    assert_eq!(manager.warning_threshold().await, 80);
    assert!(matches!(rx.try_recv(), Some(AppEvent::ThresholdTimedOut { celsius: 85 })));
    assert!(manager.is_connected().await, "a timeout is not a link failure");
}

#[tokio::test]
async fn invalid_input_never_reaches_the_wire() {
    let device = MockDevice::new(Some(40));
    let (manager, _rx) = connected(&device).await;

    for input in ["12a", "1234", "", "-3"] {
        assert!(commands::request_threshold_change(input, &manager).await.is_err());
    }
    assert!(device.wire_log().is_empty());
    assert_eq!(manager.warning_threshold().await, 80);

    assert_eq!(commands::request_threshold_change("85", &manager).await, Ok(85));
    assert_eq!(commands::get_device_state(&manager).await.warning_threshold, 85);
}
