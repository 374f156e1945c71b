//! Scripted in-memory BLE device for tests

use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::{Result, SensorError},
    transport::{
        BleDevice, BleTransport, DeviceEvent, GattCharacteristic, NotificationStream,
        ServiceFilter,
    },
};

#[derive(Default)]
struct MockState {
    connected: bool,
    failing_connects: u32,
    connect_delay: Duration,
    hide_characteristic: bool,
    fail_teardown: bool,
    connect_times: Vec<Instant>,
    subscriptions: usize,
    stop_calls: usize,
    disconnect_calls: usize,
    sender: Option<mpsc::UnboundedSender<DeviceEvent>>,
}

pub struct MockDevice {
    name: Option<String>,
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new(name: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: name.map(str::to_string),
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().failing_connects = count;
    }

    /// Make every later connect take `delay` before it resolves
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().unwrap().connect_delay = delay;
    }

    pub fn hide_characteristic(&self) {
        self.state.lock().unwrap().hide_characteristic = true;
    }

    pub fn fail_teardown(&self) {
        self.state.lock().unwrap().fail_teardown = true;
    }

    /// Push a notification; false if nobody is subscribed
    pub fn send_value(&self, characteristic: Uuid, value: &[u8]) -> bool {
        let state = self.state.lock().unwrap();
        state.sender.as_ref().is_some_and(|sender| {
            sender
                .unbounded_send(DeviceEvent::Value {
                    characteristic,
                    value: value.to_vec(),
                })
                .is_ok()
        })
    }

    /// Simulate the peripheral going out of range
    pub fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        if let Some(sender) = state.sender.take() {
            let _ = sender.unbounded_send(DeviceEvent::Disconnected);
        }
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connect_times.len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().connect_times.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().subscriptions
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().unwrap().stop_calls
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnect_calls
    }
}

#[async_trait]
impl BleDevice for MockDevice {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<()> {
        let delay = self.state.lock().unwrap().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.connect_times.push(Instant::now());
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(SensorError::ConnectionFailed("out of range".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<GattCharacteristic> {
        let state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SensorError::Disconnected);
        }
        if state.hide_characteristic {
            return Err(SensorError::CharacteristicNotFound(characteristic));
        }
        Ok(GattCharacteristic {
            service,
            uuid: characteristic,
        })
    }

    async fn start_notifications(
        &self,
        _characteristic: &GattCharacteristic,
    ) -> Result<NotificationStream> {
        let (sender, receiver) = mpsc::unbounded();
        let mut state = self.state.lock().unwrap();
        state.sender = Some(sender);
        state.subscriptions += 1;
        Ok(receiver.boxed())
    }

    async fn stop_notifications(&self, _characteristic: &GattCharacteristic) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stop_calls += 1;
        if state.fail_teardown {
            return Err(SensorError::Disconnected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        state.connected = false;
        state.sender = None;
        if state.fail_teardown {
            return Err(SensorError::Other("link already closed".to_string()));
        }
        Ok(())
    }
}

/// Transport handing out pre-registered mock devices
#[derive(Default)]
pub struct MockTransport {
    devices: Mutex<Vec<(Uuid, Arc<MockDevice>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertise(&self, service: Uuid, device: Arc<MockDevice>) {
        self.devices.lock().unwrap().push((service, device));
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn request_device(&self, filter: &ServiceFilter) -> Result<Arc<dyn BleDevice>> {
        let devices = self.devices.lock().unwrap();
        devices
            .iter()
            .find(|(service, _)| filter.services.contains(service))
            .map(|(_, device)| device.clone() as Arc<dyn BleDevice>)
            .ok_or(SensorError::DeviceNotFound)
    }
}
