use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use uuid::Uuid;

use crate::{
    CSC_MEASUREMENT_UUID, CSC_SERVICE_UUID, CYCLING_POWER_MEASUREMENT_UUID,
    CYCLING_POWER_SERVICE_UUID, FITNESS_MACHINE_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID,
    HEART_RATE_SERVICE_UUID, TREADMILL_DATA_UUID,
};

/// Kind of sensor a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Cycling power meter (Cycling Power Service)
    Power,
    /// Heart rate strap (Heart Rate Service)
    HeartRate,
    /// Crank cadence sensor (Cycling Speed and Cadence Service)
    Cadence,
    /// Treadmill (Fitness Machine Service)
    Treadmill,
}

impl SensorType {
    /// Every supported sensor type
    pub const ALL: [Self; 4] = [Self::Power, Self::HeartRate, Self::Cadence, Self::Treadmill];

    /// Primary GATT service advertised by this kind of sensor
    #[must_use]
    pub const fn service_uuid(self) -> Uuid {
        match self {
            Self::Power => CYCLING_POWER_SERVICE_UUID,
            Self::HeartRate => HEART_RATE_SERVICE_UUID,
            Self::Cadence => CSC_SERVICE_UUID,
            Self::Treadmill => FITNESS_MACHINE_SERVICE_UUID,
        }
    }

    /// Characteristic that notifies measurements
    #[must_use]
    pub const fn characteristic_uuid(self) -> Uuid {
        match self {
            Self::Power => CYCLING_POWER_MEASUREMENT_UUID,
            Self::HeartRate => HEART_RATE_MEASUREMENT_UUID,
            Self::Cadence => CSC_MEASUREMENT_UUID,
            Self::Treadmill => TREADMILL_DATA_UUID,
        }
    }

    /// Name used when the platform does not report one
    #[must_use]
    pub const fn fallback_name(self) -> &'static str {
        match self {
            Self::Power => "Power Meter",
            Self::HeartRate => "Heart Rate Monitor",
            Self::Cadence => "Cadence Sensor",
            Self::Treadmill => "Treadmill",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power => write!(f, "Power"),
            Self::HeartRate => write!(f, "Heart Rate"),
            Self::Cadence => write!(f, "Cadence"),
            Self::Treadmill => write!(f, "Treadmill"),
        }
    }
}

/// Speed unit for treadmill readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnit {
    /// Kilometers per hour
    Kilometers,
    /// Miles per hour
    Miles,
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kilometers => write!(f, "km/h"),
            Self::Miles => write!(f, "mph"),
        }
    }
}

/// Instantaneous power reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSample {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Instantaneous power in watts
    pub watts: i16,
}

/// Heart rate reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Beats per minute
    pub bpm: u16,
}

/// Crank cadence derived from two consecutive CSC readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceSample {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Crank revolutions per minute
    pub rpm: u16,
}

/// Treadmill data reading; absent fields were not reported by the machine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TreadmillSample {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Instantaneous speed in km/h
    pub speed_kmh: Option<f64>,
    /// Average speed in km/h
    pub average_speed_kmh: Option<f64>,
    /// Total distance in meters
    pub total_distance_m: Option<u32>,
    /// Inclination in percent
    pub incline_percent: Option<f64>,
    /// Ramp angle in degrees
    pub ramp_angle_deg: Option<f64>,
}

impl TreadmillSample {
    /// Instantaneous speed expressed in the given unit
    #[must_use]
    pub fn speed_in(&self, unit: SpeedUnit) -> Option<f64> {
        self.speed_kmh.map(|kmh| match unit {
            SpeedUnit::Kilometers => kmh,
            SpeedUnit::Miles => kmh * 0.621_371,
        })
    }
}

/// A decoded, unit-converted sensor measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measurement {
    /// Power meter reading
    Power(PowerSample),
    /// Heart rate reading
    HeartRate(HeartRateSample),
    /// Cadence reading
    Cadence(CadenceSample),
    /// Treadmill reading
    Treadmill(TreadmillSample),
}

impl Measurement {
    /// Timestamp the measurement was decoded at
    #[must_use]
    pub const fn timestamp_ms(&self) -> i64 {
        match self {
            Self::Power(s) => s.timestamp_ms,
            Self::HeartRate(s) => s.timestamp_ms,
            Self::Cadence(s) => s.timestamp_ms,
            Self::Treadmill(s) => s.timestamp_ms,
        }
    }

    /// Sensor type that produced the measurement
    #[must_use]
    pub const fn sensor_type(&self) -> SensorType {
        match self {
            Self::Power(_) => SensorType::Power,
            Self::HeartRate(_) => SensorType::HeartRate,
            Self::Cadence(_) => SensorType::Cadence,
            Self::Treadmill(_) => SensorType::Treadmill,
        }
    }
}

/// Internal state of a connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Initial GATT connection in progress
    Connecting,
    /// Notifications are flowing
    Connected,
    /// Link lost; waiting for or running the given reconnect attempt
    Reconnecting(u32),
    /// Manually disconnected (terminal)
    Disconnected,
    /// Reconnect budget exhausted (terminal)
    Failed,
}

impl ConnectionState {
    /// Whether the session will never change state again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting(attempt) => write!(f, "Reconnecting (attempt {attempt})"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status transition reported to status listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Link (re)established
    Connected,
    /// Link lost; reconnect attempt scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Manually disconnected
    Disconnected,
    /// Gave up reconnecting
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { .. } => write!(f, "reconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name, platform-supplied or the sensor type's fallback
    pub name: String,
    /// Kind of sensor
    pub sensor_type: SensorType,
}

impl DeviceInfo {
    /// Build device info, falling back to the sensor type's default name
    #[must_use]
    pub fn new(name: Option<String>, sensor_type: SensorType) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| sensor_type.fallback_name().to_string());
        Self { name, sensor_type }
    }
}

/// Exponential backoff used when a connected sensor drops off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt in milliseconds
    pub base_delay_ms: u64,
    /// Attempts made before giving up
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Backoff before the given 1-based attempt: `base * 2^(attempt - 1)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_attempts: 5,
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Scan timeout in milliseconds
    pub scan_timeout_ms: u64,
    /// GATT connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Reconnection behaviour after an unexpected disconnect
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 30_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=policy.max_attempts)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis())
            .collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = ReconnectPolicy {
            base_delay_ms: 1_000,
            max_attempts: 200,
        };
        assert_eq!(
            policy.delay_for_attempt(100),
            Duration::from_millis(u64::MAX)
        );
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_connection_params_default() {
        let params = ConnectionParams::default();
        assert_eq!(params.scan_timeout_ms, 10_000);
        assert_eq!(params.connect_timeout_ms, 30_000);
        assert_eq!(params.reconnect.base_delay_ms, 1_000);
        assert_eq!(params.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_device_info_fallback_name() {
        let info = DeviceInfo::new(None, SensorType::Cadence);
        assert_eq!(info.name, "Cadence Sensor");

        let info = DeviceInfo::new(Some("  ".to_string()), SensorType::HeartRate);
        assert_eq!(info.name, "Heart Rate Monitor");

        let info = DeviceInfo::new(Some("Stages".to_string()), SensorType::Power);
        assert_eq!(info.name, "Stages");
    }

    #[test]
    fn test_treadmill_speed_conversion() {
        let sample = TreadmillSample {
            speed_kmh: Some(10.0),
            ..Default::default()
        };
        assert!((sample.speed_in(SpeedUnit::Miles).unwrap() - 6.214).abs() < 0.01);
        assert_eq!(sample.speed_in(SpeedUnit::Kilometers), Some(10.0));
        assert_eq!(TreadmillSample::default().speed_in(SpeedUnit::Miles), None);
    }

    #[test]
    fn test_measurement_accessors() {
        let measurement = Measurement::HeartRate(HeartRateSample {
            timestamp_ms: 42,
            bpm: 150,
        });
        assert_eq!(measurement.timestamp_ms(), 42);
        assert_eq!(measurement.sensor_type(), SensorType::HeartRate);
    }

    #[test]
    fn test_sensor_type_uuids_are_distinct() {
        for (i, a) in SensorType::ALL.iter().enumerate() {
            for b in &SensorType::ALL[i + 1..] {
                assert_ne!(a.service_uuid(), b.service_uuid());
                assert_ne!(a.characteristic_uuid(), b.characteristic_uuid());
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Reconnecting(3).is_terminal());
        assert_eq!(ConnectionStatus::Reconnecting { attempt: 2 }.to_string(), "reconnecting");
    }
}
