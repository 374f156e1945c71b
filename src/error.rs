use thiserror::Error;

/// Errors that can occur while talking to fitness sensors
#[derive(Error, Debug)]
pub enum SensorError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No device advertising the requested service was found
    #[error("Sensor device not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// The connected device does not expose the expected GATT service
    #[error("GATT service {0} not found")]
    ServiceNotFound(uuid::Uuid),

    /// The GATT service does not expose the expected characteristic
    #[error("GATT characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),

    /// Device disconnected
    #[error("Device disconnected")]
    Disconnected,

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Notification payload could not be decoded
    #[error("Failed to parse notification: {0}")]
    Parse(String),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for sensor operations
pub type Result<T> = std::result::Result<T, SensorError>;

impl SensorError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::DeviceNotFound
                | Self::Timeout { .. }
        )
    }

    /// Check if this error only affects a single notification
    ///
    /// A session logs a recoverable decode error as a warning and drops the
    /// payload. Any other decode error is logged as an error; the payload is
    /// dropped either way and the next notification is processed normally.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
