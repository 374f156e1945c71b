use std::sync::Arc;
use tracing::info;

use crate::{
    clock::{Clock, MonotonicClock},
    error::Result,
    protocol::{CadenceDecoder, Decoder, HeartRateDecoder, PowerDecoder, TreadmillDecoder},
    session::{CadenceSession, ConnectionSession, HeartRateSession, PowerSession, TreadmillSession},
    transport::{BleTransport, ServiceFilter},
    types::ConnectionParams,
};

/// Discovers sensors and opens sessions on them
///
/// All sessions opened by one factory share the same clock, so their
/// measurement timestamps can be ordered against each other.
pub struct SensorConnectionFactory<T: BleTransport> {
    transport: T,
    params: ConnectionParams,
    clock: Arc<dyn Clock>,
}

impl<T: BleTransport> SensorConnectionFactory<T> {
    /// Create a factory with default connection parameters
    pub fn new(transport: T) -> Self {
        Self::with_params(transport, ConnectionParams::default())
    }

    /// Create a factory with custom connection parameters
    pub fn with_params(transport: T, params: ConnectionParams) -> Self {
        Self {
            transport,
            params,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Replace the timestamp source used by new sessions
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Connection parameters applied to new sessions
    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Find a device for the decoder's sensor type and connect to it
    ///
    /// # Errors
    ///
    /// Returns [`crate::SensorError::DeviceNotFound`] if discovery finds
    /// nothing, or the error from the initial connection attempt.
    pub async fn connect<D: Decoder>(&self, decoder: D) -> Result<ConnectionSession<D>> {
        let sensor_type = decoder.sensor_type();
        info!("Requesting {} sensor", sensor_type);

        let filter = ServiceFilter::service(sensor_type.service_uuid());
        let device = self.transport.request_device(&filter).await?;

        ConnectionSession::connect(device, decoder, self.params, self.clock.clone()).await
    }

    /// Connect to a cycling power meter
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_power(&self) -> Result<PowerSession> {
        self.connect(PowerDecoder).await
    }

    /// Connect to a heart rate monitor
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_heart_rate(&self) -> Result<HeartRateSession> {
        self.connect(HeartRateDecoder).await
    }

    /// Connect to a cadence sensor
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_cadence(&self) -> Result<CadenceSession> {
        self.connect(CadenceDecoder::new()).await
    }

    /// Connect to a treadmill
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_treadmill(&self) -> Result<TreadmillSession> {
        self.connect(TreadmillDecoder).await
    }
}
