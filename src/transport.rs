use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// Services a device must advertise to be picked during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFilter {
    /// Advertised primary service UUIDs
    pub services: Vec<Uuid>,
}

impl ServiceFilter {
    /// Filter matching a single service
    #[must_use]
    pub fn service(uuid: Uuid) -> Self {
        Self {
            services: vec![uuid],
        }
    }
}

/// Characteristic resolved on the current GATT connection
///
/// A handle only stays valid for the connection it was resolved on; after a
/// reconnect it has to be resolved again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    /// Owning primary service
    pub service: Uuid,
    /// Characteristic UUID
    pub uuid: Uuid,
}

/// Event delivered on a notification stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The characteristic value changed
    Value {
        /// Characteristic that notified
        characteristic: Uuid,
        /// Raw payload
        value: Vec<u8>,
    },
    /// The platform reported the link as lost
    Disconnected,
}

/// Events for one subscription; the stream ending also means the link is gone
pub type NotificationStream = BoxStream<'static, DeviceEvent>;

/// Platform discovery capability
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Find a device advertising the filtered services
    ///
    /// # Errors
    ///
    /// Returns [`crate::SensorError::DeviceNotFound`] when nothing matches.
    async fn request_device(&self, filter: &ServiceFilter) -> Result<Arc<dyn BleDevice>>;
}

/// A discovered peripheral
#[async_trait]
pub trait BleDevice: Send + Sync {
    /// Platform-supplied name, if any
    fn name(&self) -> Option<String>;

    /// Open the GATT connection and discover services
    async fn connect(&self) -> Result<()>;

    /// Resolve a characteristic on the current connection
    async fn characteristic(&self, service: Uuid, characteristic: Uuid)
        -> Result<GattCharacteristic>;

    /// Enable notifications and return the event stream for this connection
    async fn start_notifications(
        &self,
        characteristic: &GattCharacteristic,
    ) -> Result<NotificationStream>;

    /// Disable notifications; must tolerate an already closed link
    async fn stop_notifications(&self, characteristic: &GattCharacteristic) -> Result<()>;

    /// Close the GATT connection; must tolerate an already closed link
    async fn disconnect(&self) -> Result<()>;
}

/// Connect, resolve the measurement characteristic and subscribe to it
pub(crate) async fn open_subscription(
    device: &dyn BleDevice,
    service: Uuid,
    characteristic: Uuid,
) -> Result<(GattCharacteristic, NotificationStream)> {
    device.connect().await?;
    let characteristic = device.characteristic(service, characteristic).await?;
    let stream = device.start_notifications(&characteristic).await?;
    Ok((characteristic, stream))
}
