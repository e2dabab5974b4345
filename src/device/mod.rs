pub mod manager;
pub mod models;

pub use manager::DeviceManager;
pub use models::*;


#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device not connected")]
    NotConnected,

    #[error("Device did not acknowledge threshold {threshold} after {attempts} attempts")]
    AcknowledgmentTimeout { threshold: i32, attempts: u32 },

    #[error("Invalid threshold input: {0:?}")]
    InvalidInput(String),

    #[error("Serial communication error: {0}")]
    SerialError(crate::serial::SerialError),
}

impl From<crate::serial::SerialError> for DeviceError {
    fn from(err: crate::serial::SerialError) -> Self {
        match err {
            crate::serial::SerialError::PortNotFound(what) => DeviceError::NotFound(what),
            other => DeviceError::SerialError(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
