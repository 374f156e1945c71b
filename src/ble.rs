use async_trait::async_trait;
use btleplug::{
    api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter},
    platform::{Adapter, Manager, Peripheral},
};
use futures::stream::{self, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SensorError},
    transport::{
        BleDevice, BleTransport, DeviceEvent, GattCharacteristic, NotificationStream,
        ServiceFilter,
    },
    types::ConnectionParams,
};

/// Transport backed by the host Bluetooth adapter
pub struct BtleplugTransport {
    manager: Manager,
    params: ConnectionParams,
}

impl BtleplugTransport {
    /// Create a transport on the platform Bluetooth stack
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Ble`] if the Bluetooth manager cannot be initialized.
    pub async fn new(params: ConnectionParams) -> Result<Self> {
        let manager = Manager::new().await?;
        Ok(Self { manager, params })
    }

    async fn find_peripheral(adapter: &Adapter, filter: &ServiceFilter) -> Option<Peripheral> {
        let peripherals = match adapter.peripherals().await {
            Ok(peripherals) => peripherals,
            Err(e) => {
                warn!("Failed to query adapter for peripherals: {}", e);
                return None;
            }
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Ok(Some(properties)) => {
                    // Some platforms ignore the scan filter, so check the services again
                    if filter
                        .services
                        .iter()
                        .any(|uuid| properties.services.contains(uuid))
                    {
                        info!(
                            "Found sensor {} ({})",
                            properties.local_name.as_deref().unwrap_or("unnamed"),
                            properties.address
                        );
                        return Some(peripheral);
                    }
                }
                Ok(None) => debug!("Peripheral has no properties"),
                Err(e) => debug!("Could not query peripheral properties: {}", e),
            }
        }

        None
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn request_device(&self, filter: &ServiceFilter) -> Result<Arc<dyn BleDevice>> {
        info!("Scanning for devices advertising {:?}", filter.services);

        let adapters = self.manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(SensorError::DeviceNotFound)?;

        adapter
            .start_scan(ScanFilter {
                services: filter.services.clone(),
            })
            .await?;
        tokio::time::sleep(Duration::from_millis(self.params.scan_timeout_ms)).await;
        adapter.stop_scan().await?;

        let peripheral = Self::find_peripheral(&adapter, filter)
            .await
            .ok_or(SensorError::DeviceNotFound)?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);

        Ok(Arc::new(BtleplugDevice {
            adapter,
            peripheral,
            name,
            connect_timeout_ms: self.params.connect_timeout_ms,
        }))
    }
}

/// A peripheral reached through btleplug
pub struct BtleplugDevice {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    connect_timeout_ms: u64,
}

impl BtleplugDevice {
    fn find_characteristic(&self, characteristic: &GattCharacteristic) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or(SensorError::CharacteristicNotFound(characteristic.uuid))
    }
}

#[async_trait]
impl BleDevice for BtleplugDevice {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<()> {
        let timeout_ms = self.connect_timeout_ms;

        timeout(Duration::from_millis(timeout_ms), self.peripheral.connect())
            .await
            .map_err(|_| SensorError::Timeout { timeout_ms })?
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<GattCharacteristic> {
        let services = self.peripheral.services();
        let found = services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(SensorError::ServiceNotFound(service))?;

        found
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .map(|c| GattCharacteristic {
                service,
                uuid: c.uuid,
            })
            .ok_or(SensorError::CharacteristicNotFound(characteristic))
    }

    async fn start_notifications(
        &self,
        characteristic: &GattCharacteristic,
    ) -> Result<NotificationStream> {
        let target = self.find_characteristic(characteristic)?;

        // Listen for disconnects before subscribing so none is missed
        let peripheral_id = self.peripheral.id();
        let disconnects = self
            .adapter
            .events()
            .await?
            .filter_map(move |event| {
                let lost = matches!(
                    event,
                    CentralEvent::DeviceDisconnected(id) if id == peripheral_id
                );
                async move { lost.then_some(DeviceEvent::Disconnected) }
            });

        let values = self
            .peripheral
            .notifications()
            .await?
            .map(|notification| DeviceEvent::Value {
                characteristic: notification.uuid,
                value: notification.value,
            });

        self.peripheral.subscribe(&target).await?;

        // End with a disconnect event if the notification stream closes first
        let values = values.chain(stream::once(async { DeviceEvent::Disconnected }));
        Ok(stream::select(values, disconnects).boxed())
    }

    async fn stop_notifications(&self, characteristic: &GattCharacteristic) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }
        let target = self.find_characteristic(characteristic)?;
        self.peripheral.unsubscribe(&target).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorType;

    #[test]
    fn test_scan_filter_per_sensor() {
        for sensor_type in SensorType::ALL {
            let filter = ServiceFilter::service(sensor_type.service_uuid());
            assert_eq!(filter.services, vec![sensor_type.service_uuid()]);
        }
    }
}
