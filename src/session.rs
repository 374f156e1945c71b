use futures::StreamExt;
use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::{Notify, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    error::Result,
    listeners::ListenerRegistry,
    protocol::{CadenceDecoder, Decoder, HeartRateDecoder, PowerDecoder, TreadmillDecoder},
    transport::{open_subscription, BleDevice, DeviceEvent, GattCharacteristic, NotificationStream},
    types::{
        ConnectionParams, ConnectionState, ConnectionStatus, DeviceInfo, Measurement,
        ReconnectPolicy, SensorType,
    },
};

/// Session streaming cycling power
pub type PowerSession = ConnectionSession<PowerDecoder>;
/// Session streaming heart rate
pub type HeartRateSession = ConnectionSession<HeartRateDecoder>;
/// Session streaming crank cadence
pub type CadenceSession = ConnectionSession<CadenceDecoder>;
/// Session streaming treadmill data
pub type TreadmillSession = ConnectionSession<TreadmillDecoder>;

/// One live connection to a sensor
///
/// The session owns the device link and drives it through
/// `Connected -> Reconnecting(n) -> Connected | Failed` on a background task.
/// Every notification is decoded with `D` and handed to the measurement
/// listeners; every state change is reported to the status listeners.
///
/// # Examples
///
/// ```no_run
/// use sensorlink::{PowerDecoder, PowerSession, MonotonicClock, ConnectionParams};
/// use sensorlink::transport::BleDevice;
/// use std::sync::Arc;
///
/// async fn watch(device: Arc<dyn BleDevice>) -> sensorlink::Result<()> {
///     let session = PowerSession::connect(
///         device,
///         PowerDecoder,
///         ConnectionParams::default(),
///         Arc::new(MonotonicClock::new()),
///     )
///     .await?;
///
///     session.add_listener(|m| println!("{m:?}"));
///     session.on_status_change(|s| println!("power meter {s}"));
///     Ok(())
/// }
/// ```
pub struct ConnectionSession<D: Decoder> {
    shared: Arc<SessionShared>,
    _decoder: PhantomData<fn() -> D>,
}

struct SessionShared {
    device: Arc<dyn BleDevice>,
    info: DeviceInfo,
    policy: ReconnectPolicy,
    clock: Arc<dyn Clock>,
    state: RwLock<ConnectionState>,
    manual_disconnect: AtomicBool,
    characteristic: Mutex<Option<GattCharacteristic>>,
    shutdown: Notify,
    measurement_listeners: ListenerRegistry<Measurement>,
    status_listeners: ListenerRegistry<ConnectionStatus>,
}

impl<D: Decoder> ConnectionSession<D> {
    /// Connect to `device` and start streaming measurements
    ///
    /// No retry happens here: if the first connection cannot be established
    /// the error is returned and no session exists.
    ///
    /// # Errors
    ///
    /// Returns any error raised while connecting, resolving the measurement
    /// characteristic or enabling notifications.
    pub async fn connect(
        device: Arc<dyn BleDevice>,
        decoder: D,
        params: ConnectionParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let sensor_type = decoder.sensor_type();
        let info = DeviceInfo::new(device.name(), sensor_type);
        info!("Connecting to {} ({})", info.name, sensor_type);

        let shared = Arc::new(SessionShared {
            device,
            info,
            policy: params.reconnect,
            clock,
            state: RwLock::new(ConnectionState::Connecting),
            manual_disconnect: AtomicBool::new(false),
            characteristic: Mutex::new(None),
            shutdown: Notify::new(),
            measurement_listeners: ListenerRegistry::new(),
            status_listeners: ListenerRegistry::new(),
        });

        let (characteristic, stream) = match shared.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Initial connection to {} failed: {}", shared.info.name, e);
                if let Err(close_error) = shared.device.disconnect().await {
                    debug!("Ignoring close error after failed connect: {}", close_error);
                }
                return Err(e);
            }
        };

        *shared.lock_characteristic() = Some(characteristic);
        *shared.state.write().await = ConnectionState::Connected;
        info!("Connected to {}", shared.info.name);

        tokio::spawn(run(shared.clone(), decoder, stream));

        Ok(Self {
            shared,
            _decoder: PhantomData,
        })
    }

    /// Register a callback for decoded measurements
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Measurement) + Send + Sync + 'static,
    {
        self.shared.measurement_listeners.add(listener);
    }

    /// Register a callback for connection status changes
    pub fn on_status_change<F>(&self, listener: F)
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.shared.status_listeners.add(listener);
    }

    /// Stop listening and close the link
    ///
    /// Cancels any pending reconnect. Teardown failures are logged and
    /// ignored. Calling this more than once has no further effect.
    pub async fn disconnect(&self) {
        self.shared.shutdown().await;
    }

    /// Device name, platform-supplied or the sensor type's fallback
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.shared.info.name
    }

    /// Device information
    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.shared.info
    }

    /// Kind of sensor behind this session
    #[must_use]
    pub fn sensor_type(&self) -> SensorType {
        self.shared.info.sensor_type
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// Whether notifications are currently flowing
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }
}

impl<D: Decoder> std::fmt::Debug for ConnectionSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("device", &self.shared.info)
            .finish_non_exhaustive()
    }
}

impl<D: Decoder> Drop for ConnectionSession<D> {
    fn drop(&mut self) {
        if self.shared.is_manual_disconnect() {
            return;
        }

        let shared = self.shared.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { shared.shutdown().await });
        } else {
            shared.manual_disconnect.store(true, Ordering::SeqCst);
            shared.shutdown.notify_one();
        }
    }
}

/// Background task: pump notifications, reconnect when the link drops
async fn run<D: Decoder>(
    shared: Arc<SessionShared>,
    mut decoder: D,
    mut stream: NotificationStream,
) {
    loop {
        shared.pump(&mut decoder, stream).await;

        if shared.is_manual_disconnect() {
            debug!("Notification pump for {} stopped", shared.info.name);
            return;
        }

        warn!("Lost connection to {}", shared.info.name);
        match shared.reconnect().await {
            Some(next) => stream = next,
            None => return,
        }
    }
}

impl SessionShared {
    fn is_manual_disconnect(&self) -> bool {
        self.manual_disconnect.load(Ordering::SeqCst)
    }

    fn lock_characteristic(&self) -> std::sync::MutexGuard<'_, Option<GattCharacteristic>> {
        self.characteristic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn subscribe(&self) -> Result<(GattCharacteristic, NotificationStream)> {
        let sensor_type = self.info.sensor_type;
        open_subscription(
            self.device.as_ref(),
            sensor_type.service_uuid(),
            sensor_type.characteristic_uuid(),
        )
        .await
    }

    /// Deliver notifications until the link drops or a shutdown is requested
    async fn pump<D: Decoder>(&self, decoder: &mut D, mut stream: NotificationStream) {
        let expected = self.info.sensor_type.characteristic_uuid();

        loop {
            tokio::select! {
                () = self.shutdown.notified() => return,
                event = stream.next() => match event {
                    Some(DeviceEvent::Value { characteristic, value }) => {
                        if characteristic == expected {
                            self.handle_notification(decoder, &value);
                        }
                    }
                    Some(DeviceEvent::Disconnected) | None => return,
                },
            }
        }
    }

    fn handle_notification<D: Decoder>(&self, decoder: &mut D, value: &[u8]) {
        debug!("{} notification: {:02X?}", self.info.name, value);

        match decoder.decode(value, self.clock.now_ms()) {
            Ok(Some(measurement)) => {
                self.measurement_listeners.dispatch(&measurement);
            }
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Dropping malformed {} notification {:02X?}: {}",
                    self.info.sensor_type, value, e
                );
            }
            Err(e) => {
                error!(
                    "Decoder for {} failed on {:02X?}: {}",
                    self.info.name, value, e
                );
            }
        }
    }

    /// Retry with exponential backoff; `None` once the session is finished
    async fn reconnect(&self) -> Option<NotificationStream> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            if !self
                .transition(
                    ConnectionState::Reconnecting(attempt),
                    ConnectionStatus::Reconnecting { attempt },
                )
                .await
            {
                return None;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            info!(
                "Reconnecting to {} in {}ms (attempt {}/{})",
                self.info.name,
                delay.as_millis(),
                attempt,
                self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;

            if self.is_manual_disconnect() {
                debug!("Reconnect to {} cancelled", self.info.name);
                return None;
            }

            match self.subscribe().await {
                Ok((characteristic, stream)) => {
                    let mut state = self.state.write().await;
                    if self.is_manual_disconnect() {
                        drop(state);
                        self.close_link(Some(characteristic)).await;
                        return None;
                    }

                    *self.lock_characteristic() = Some(characteristic);
                    self.set_state(
                        &mut state,
                        ConnectionState::Connected,
                        ConnectionStatus::Connected,
                    );
                    info!("Reconnected to {} after {} attempt(s)", self.info.name, attempt);
                    return Some(stream);
                }
                Err(e) => {
                    warn!(
                        "Reconnect attempt {} to {} failed: {}",
                        attempt, self.info.name, e
                    );

                    if attempt >= self.policy.max_attempts {
                        if self
                            .transition(ConnectionState::Failed, ConnectionStatus::Failed)
                            .await
                        {
                            error!(
                                "Giving up on {} after {} attempts",
                                self.info.name, attempt
                            );
                        }
                        return None;
                    }
                }
            }
        }
    }

    /// Change state and notify, unless a manual disconnect got there first
    async fn transition(&self, next: ConnectionState, status: ConnectionStatus) -> bool {
        let mut state = self.state.write().await;
        if self.is_manual_disconnect() {
            return false;
        }
        self.set_state(&mut state, next, status);
        true
    }

    fn set_state(
        &self,
        state: &mut RwLockWriteGuard<'_, ConnectionState>,
        next: ConnectionState,
        status: ConnectionStatus,
    ) {
        **state = next;
        self.status_listeners.dispatch(&status);
    }

    async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if self.manual_disconnect.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Disconnecting from {}", self.info.name);
        self.shutdown.notify_one();

        let characteristic = self.lock_characteristic().take();
        self.close_link(characteristic).await;

        if *state == ConnectionState::Failed {
            return;
        }
        self.set_state(
            &mut state,
            ConnectionState::Disconnected,
            ConnectionStatus::Disconnected,
        );
    }

    async fn close_link(&self, characteristic: Option<GattCharacteristic>) {
        if let Some(characteristic) = characteristic {
            if let Err(e) = self.device.stop_notifications(&characteristic).await {
                debug!("Ignoring stop notifications error: {}", e);
            }
        }
        if let Err(e) = self.device.disconnect().await {
            debug!("Ignoring disconnect error: {}", e);
        }
    }
}
