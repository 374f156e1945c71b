use crate::{
    error::{Result, SensorError},
    types::{
        CadenceSample, HeartRateSample, Measurement, PowerSample, SensorType, TreadmillSample,
    },
};
use bytes::Buf;

/// Crank event time resolution: ticks per second
pub const CRANK_TIME_TICKS_PER_SECOND: f64 = 1024.0;

/// Cadence readings at or above this value are treated as timing glitches
pub const MAX_PLAUSIBLE_RPM: f64 = 300.0;

/// Heart Rate Measurement flag: value is a u16
const HR_FLAG_VALUE_U16: u8 = 0x01;

/// CSC Measurement flag: wheel revolution data present
const CSC_FLAG_WHEEL_DATA: u8 = 0x01;
/// CSC Measurement flag: crank revolution data present
const CSC_FLAG_CRANK_DATA: u8 = 0x02;
/// Cumulative wheel revolutions (u32) plus last wheel event time (u16)
const CSC_WHEEL_DATA_LEN: usize = 6;

/// Treadmill Data flag: average speed present
const FTMS_FLAG_AVERAGE_SPEED: u16 = 0x0002;
/// Treadmill Data flag: total distance present
const FTMS_FLAG_TOTAL_DISTANCE: u16 = 0x0004;
/// Treadmill Data flag: inclination and ramp angle present
const FTMS_FLAG_INCLINATION: u16 = 0x0008;

/// Converts raw characteristic notifications into measurements
///
/// `Ok(None)` means the payload carried nothing to report. An `Err` means the
/// payload was malformed; callers drop it and keep the connection alive.
pub trait Decoder: Send + 'static {
    /// Sensor type whose measurement characteristic this decoder understands
    fn sensor_type(&self) -> SensorType;

    /// Decode one notification payload
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Parse`] if the payload is truncated in a way the
    /// wire format does not allow.
    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>>;
}

/// Decoder for the Cycling Power Measurement characteristic
///
/// Only the mandatory instantaneous power field is read: i16 little-endian
/// at byte offset 2, after the 16-bit flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerDecoder;

impl Decoder for PowerDecoder {
    fn sensor_type(&self) -> SensorType {
        SensorType::Power
    }

    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>> {
        if data.len() < 4 {
            return Ok(None);
        }

        let mut buf = &data[2..];
        let watts = buf.get_i16_le();

        Ok(Some(Measurement::Power(PowerSample {
            timestamp_ms,
            watts,
        })))
    }
}

/// Decoder for the Heart Rate Measurement characteristic
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartRateDecoder;

impl Decoder for HeartRateDecoder {
    fn sensor_type(&self) -> SensorType {
        SensorType::HeartRate
    }

    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(SensorError::Parse("empty heart rate payload".to_string()));
        }

        let flags = buf.get_u8();
        let bpm = if flags & HR_FLAG_VALUE_U16 != 0 {
            if buf.remaining() < 2 {
                return Err(SensorError::Parse(format!(
                    "heart rate u16 value truncated: {} bytes",
                    data.len()
                )));
            }
            buf.get_u16_le()
        } else {
            if !buf.has_remaining() {
                return Err(SensorError::Parse("heart rate u8 value missing".to_string()));
            }
            u16::from(buf.get_u8())
        };

        Ok(Some(Measurement::HeartRate(HeartRateSample {
            timestamp_ms,
            bpm,
        })))
    }
}

/// Last crank reading seen by a cadence session
///
/// Cadence is derived from the difference between two consecutive cumulative
/// readings, so this state must belong to exactly one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrankCounterState {
    /// Cumulative crank revolutions of the previous reading
    pub last_revolutions: Option<u16>,
    /// Crank event time of the previous reading, in 1/1024 s ticks
    pub last_event_time_ticks: Option<u16>,
}

impl CrankCounterState {
    /// Record a reading and return the cadence it implies, if any
    ///
    /// Both counters are 16-bit and roll over, so deltas are taken modulo
    /// 65536. The state always moves to the new reading, including when the
    /// computed cadence is rejected.
    pub fn update(&mut self, revolutions: u16, event_time_ticks: u16) -> Option<u16> {
        let rpm = match (self.last_revolutions, self.last_event_time_ticks) {
            (Some(last_revs), Some(last_time)) => {
                let rev_delta = revolutions.wrapping_sub(last_revs);
                let time_delta = event_time_ticks.wrapping_sub(last_time);
                cadence_rpm(rev_delta, time_delta)
            }
            _ => None,
        };

        self.last_revolutions = Some(revolutions);
        self.last_event_time_ticks = Some(event_time_ticks);

        rpm
    }
}

fn cadence_rpm(rev_delta: u16, time_delta: u16) -> Option<u16> {
    if time_delta == 0 {
        return None;
    }

    let seconds = f64::from(time_delta) / CRANK_TIME_TICKS_PER_SECOND;
    let rpm = (f64::from(rev_delta) / seconds * 60.0).round();

    if !(0.0..MAX_PLAUSIBLE_RPM).contains(&rpm) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rpm = rpm as u16;
    Some(rpm)
}

/// Decoder for the CSC Measurement characteristic (crank data only)
#[derive(Debug, Clone, Default)]
pub struct CadenceDecoder {
    crank: CrankCounterState,
}

impl CadenceDecoder {
    /// Create a decoder with no previous reading
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rollover tracker
    #[must_use]
    pub const fn crank_state(&self) -> CrankCounterState {
        self.crank
    }
}

impl Decoder for CadenceDecoder {
    fn sensor_type(&self) -> SensorType {
        SensorType::Cadence
    }

    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>> {
        let Some(&flags) = data.first() else {
            return Err(SensorError::Parse("empty CSC payload".to_string()));
        };

        if flags & CSC_FLAG_CRANK_DATA == 0 {
            return Ok(None);
        }

        let offset = if flags & CSC_FLAG_WHEEL_DATA != 0 {
            1 + CSC_WHEEL_DATA_LEN
        } else {
            1
        };

        if data.len() < offset + 4 {
            return Err(SensorError::Parse(format!(
                "CSC crank data truncated: {} bytes, expected {}",
                data.len(),
                offset + 4
            )));
        }

        let mut buf = &data[offset..];
        let revolutions = buf.get_u16_le();
        let event_time = buf.get_u16_le();

        Ok(self
            .crank
            .update(revolutions, event_time)
            .map(|rpm| Measurement::Cadence(CadenceSample { timestamp_ms, rpm })))
    }
}

/// Decoder for the FTMS Treadmill Data characteristic
///
/// Fields follow the flags in a fixed order, each present only when its flag
/// is set, so the cursor advances past every field that was read:
/// - Instantaneous speed: u16, 0.01 km/h (always)
/// - Average speed: u16, 0.01 km/h (bit 1)
/// - Total distance: u24, meters (bit 2)
/// - Inclination: i16, 0.1 % and ramp angle: i16, 0.1 degrees (bit 3)
#[derive(Debug, Clone, Copy, Default)]
pub struct TreadmillDecoder;

impl Decoder for TreadmillDecoder {
    fn sensor_type(&self) -> SensorType {
        SensorType::Treadmill
    }

    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>> {
        if data.len() < 2 {
            return Err(SensorError::Parse(format!(
                "treadmill data too short: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let flags = buf.get_u16_le();

        let mut sample = TreadmillSample {
            timestamp_ms,
            ..Default::default()
        };

        if buf.remaining() >= 2 {
            sample.speed_kmh = Some(f64::from(buf.get_u16_le()) * 0.01);
        }

        if flags & FTMS_FLAG_AVERAGE_SPEED != 0 && buf.remaining() >= 2 {
            sample.average_speed_kmh = Some(f64::from(buf.get_u16_le()) * 0.01);
        }

        if flags & FTMS_FLAG_TOTAL_DISTANCE != 0 && buf.remaining() >= 3 {
            let low = u32::from(buf.get_u16_le());
            let high = u32::from(buf.get_u8());
            sample.total_distance_m = Some(low | (high << 16));
        }

        if flags & FTMS_FLAG_INCLINATION != 0 && buf.remaining() >= 4 {
            sample.incline_percent = Some(f64::from(buf.get_i16_le()) * 0.1);
            sample.ramp_angle_deg = Some(f64::from(buf.get_i16_le()) * 0.1);
        }

        Ok(Some(Measurement::Treadmill(sample)))
    }
}

/// Fresh decoder for the given sensor type
#[must_use]
pub fn decoder_for(sensor_type: SensorType) -> Box<dyn Decoder> {
    match sensor_type {
        SensorType::Power => Box::new(PowerDecoder),
        SensorType::HeartRate => Box::new(HeartRateDecoder),
        SensorType::Cadence => Box::new(CadenceDecoder::new()),
        SensorType::Treadmill => Box::new(TreadmillDecoder),
    }
}

impl Decoder for Box<dyn Decoder> {
    fn sensor_type(&self) -> SensorType {
        (**self).sensor_type()
    }

    fn decode(&mut self, data: &[u8], timestamp_ms: i64) -> Result<Option<Measurement>> {
        (**self).decode(data, timestamp_ms)
    }
}
