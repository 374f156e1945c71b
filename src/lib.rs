#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Sensorlink
//!
//! Telemetry ingestion for Bluetooth Low Energy fitness sensors.
//!
//! This library turns raw GATT notifications from power meters, heart rate
//! straps, cadence sensors and treadmills into typed, unit-converted
//! measurements, and keeps each sensor connected by reconnecting with
//! exponential backoff when the link drops.
//!
//! ## Supported Profiles
//!
//! - **Cycling Power** (0x1818 / 0x2A63): instantaneous power in watts
//! - **Heart Rate** (0x180D / 0x2A37): 8 or 16 bit heart rate
//! - **Cycling Speed and Cadence** (0x1816 / 0x2A5B): crank cadence derived
//!   from rolling-over 16-bit counters
//! - **Fitness Machine** (0x1826 / 0x2ACD): treadmill speed, average speed,
//!   distance, inclination and ramp angle
//!
//! ## Connection Lifecycle
//!
//! Each sensor gets its own [`ConnectionSession`]. When the peripheral drops
//! off, the session retries up to five times, waiting 1, 2, 4, 8 and 16
//! seconds, and reports `reconnecting`, `connected` or `failed` to its status
//! listeners. A manual [`ConnectionSession::disconnect`] cancels any pending
//! retry.
//!
//! The platform Bluetooth stack sits behind the [`transport::BleTransport`]
//! and [`transport::BleDevice`] traits; [`ble::BtleplugTransport`] is the
//! production implementation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sensorlink::{BtleplugTransport, ConnectionParams, SensorConnectionFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = ConnectionParams::default();
//!     let transport = BtleplugTransport::new(params).await?;
//!     let factory = SensorConnectionFactory::with_params(transport, params);
//!
//!     let heart_rate = factory.connect_heart_rate().await?;
//!     heart_rate.add_listener(|m| println!("{m:?}"));
//!     heart_rate.on_status_change(|s| println!("{s}"));
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     heart_rate.disconnect().await;
//!     Ok(())
//! }
//! ```

use uuid::Uuid;

/// Bluetooth Low Energy transport on btleplug
pub mod ble;
/// Timestamp sources
pub mod clock;
/// Error types and handling
pub mod error;
/// Sensor discovery and session construction
pub mod factory;
/// Listener fan-out
pub mod listeners;
/// Notification payload decoders
pub mod protocol;
/// Per-device connection state machine
pub mod session;
/// Platform Bluetooth abstraction
pub mod transport;
/// Type definitions and data structures
pub mod types;

#[cfg(test)]
mod mock;

// Re-export the main types for convenient usage
pub use ble::{BtleplugDevice, BtleplugTransport};
pub use clock::{Clock, MonotonicClock};
pub use error::{Result, SensorError};
pub use factory::SensorConnectionFactory;
pub use listeners::ListenerRegistry;
pub use protocol::{
    decoder_for, CadenceDecoder, CrankCounterState, Decoder, HeartRateDecoder, PowerDecoder,
    TreadmillDecoder,
};
pub use session::{
    CadenceSession, ConnectionSession, HeartRateSession, PowerSession, TreadmillSession,
};
pub use types::{
    CadenceSample, ConnectionParams, ConnectionState, ConnectionStatus, DeviceInfo,
    HeartRateSample, Measurement, PowerSample, ReconnectPolicy, SensorType, SpeedUnit,
    TreadmillSample,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cycling Power Service (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement characteristic (0x2A63)
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Service (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement characteristic (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement characteristic (0x2A5B)
pub const CSC_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Service (0x1826)
pub const FITNESS_MACHINE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Treadmill Data characteristic (0x2ACD)
pub const TREADMILL_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2acd_0000_1000_8000_0080_5f9b_34fb);
