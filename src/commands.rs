use serde::Serialize;

use crate::device::{parse_threshold_input, ConnectionState, DeviceError, DeviceManager, DeviceState};

/// Verdict on a threshold typed by the user, before anything hits the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ThresholdRequest {
    Accepted { celsius: i32 },
    Rejected { input: String },
}

pub fn validate_threshold(input: &str) -> ThresholdRequest {
    match parse_threshold_input(input) {
        Ok(celsius) => ThresholdRequest::Accepted { celsius },
        Err(_) => ThresholdRequest::Rejected { input: input.trim().to_string() },
    }
}

/// Validate user input and push it to the board as the new warning threshold
pub async fn request_threshold_change(
    input: &str,
    device_manager: &DeviceManager,
) -> Result<i32, String> {
    let celsius = match validate_threshold(input) {
        ThresholdRequest::Accepted { celsius } => celsius,
        ThresholdRequest::Rejected { input } => {
            log::debug!("Discarding threshold input {:?}", input);
            return Err(format!("Invalid threshold {:?}: expected 0-999", input));
        }
    };

    match device_manager.set_warning_threshold(celsius).await {
        Ok(()) => Ok(celsius),
        Err(e @ DeviceError::AcknowledgmentTimeout { .. }) => {
            Err(format!("Threshold not applied: {}", e))
        }
        Err(e) => Err(format!("Failed to set threshold: {}", e)),
    }
}

/// Current readings, threshold and link health
pub async fn get_device_state(device_manager: &DeviceManager) -> DeviceState {
    device_manager.snapshot().await
}

pub async fn get_connection_state(device_manager: &DeviceManager) -> ConnectionState {
    device_manager.connection_state().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_like_the_entry_field() {
        assert_eq!(validate_threshold("85"), ThresholdRequest::Accepted { celsius: 85 });
        assert_eq!(validate_threshold("12a"), ThresholdRequest::Rejected { input: "12a".into() });
        assert_eq!(validate_threshold("1234"), ThresholdRequest::Rejected { input: "1234".into() });
        assert_eq!(validate_threshold(""), ThresholdRequest::Rejected { input: String::new() });
    }
}
