use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use uuid::Uuid;

use crate::device::constants::{make_led_uuid, make_light_service_uuid, make_mode_uuid, make_speed_uuid, make_status_uuid};
use crate::device::link::{DeviceChooser, GattLink, Notification, NotificationStream};
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCharacteristic {
    pub uuid: Uuid,
    pub notify: bool,
    pub read: bool,
}

#[derive(Default)]
struct MockState {
    connected: bool,
    connects: usize,
    services_discovered: bool,
    characteristics: Vec<MockCharacteristic>,
    values: HashMap<Uuid, Vec<u8>>,
    writes: Vec<(Uuid, String)>,
    reads: usize,
    fail_writes: bool,
    notifier: Option<UnboundedSender<Notification>>,
}

/// In-memory peripheral offering the light service.
#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// `status`: None = no status characteristic, Some(notify) = status characteristic present.
    pub fn light(status: Option<bool>) -> MockLink {
        let mut characteristics = vec![
            MockCharacteristic { uuid: make_mode_uuid(), notify: false, read: true },
            MockCharacteristic { uuid: make_speed_uuid(), notify: false, read: true },
            MockCharacteristic { uuid: make_led_uuid(), notify: false, read: true },
        ];

        if let Some(notify) = status {
            characteristics.push(MockCharacteristic { uuid: make_status_uuid(), notify, read: true });
        }

        let state = MockState { characteristics, ..MockState::default() };
        MockLink { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("Failed to lock MockLink state")
    }

    pub fn remove_characteristic(&self, uuid: Uuid) {
        self.lock().characteristics.retain(|c| c.uuid != uuid);
    }

    pub fn set_readable(&self, uuid: Uuid, read: bool) {
        for characteristic in self.lock().characteristics.iter_mut().filter(|c| c.uuid == uuid) {
            characteristic.read = read;
        }
    }

    pub fn set_value(&self, uuid: Uuid, value: &str) {
        self.lock().values.insert(uuid, value.as_bytes().to_vec());
    }

    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Push a status notification. Returns false if nobody is subscribed.
    pub fn notify(&self, value: &str) -> bool {
        let state = self.lock();
        match &state.notifier {
            Some(notifier) => notifier
                .unbounded_send(Notification { uuid: make_status_uuid(), value: value.as_bytes().to_vec() })
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the peripheral going away.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.notifier = None;
    }

    pub fn is_link_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn writes(&self) -> Vec<(Uuid, String)> {
        self.lock().writes.clone()
    }
}

impl GattLink for MockLink {
    type Characteristic = MockCharacteristic;

    async fn name(&self) -> String {
        "Ampel".to_string()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn discover_services(&self) -> Result<(), DeviceError> {
        self.lock().services_discovered = true;
        Ok(())
    }

    fn has_service(&self, service: Uuid) -> bool {
        self.lock().services_discovered && service == make_light_service_uuid()
    }

    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Option<MockCharacteristic> {
        if !self.has_service(service) {
            return None;
        }
        self.lock().characteristics.iter().find(|c| c.uuid == uuid).cloned()
    }

    fn can_notify(&self, characteristic: &MockCharacteristic) -> bool {
        characteristic.notify
    }

    fn can_read(&self, characteristic: &MockCharacteristic) -> bool {
        characteristic.read
    }

    async fn write(&self, characteristic: &MockCharacteristic, payload: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.fail_writes || !state.connected {
            return Err(DeviceError::from(btleplug::Error::NotConnected));
        }
        state.writes.push((characteristic.uuid, String::from_utf8_lossy(payload).to_string()));
        Ok(())
    }

    async fn read(&self, characteristic: &MockCharacteristic) -> Result<Vec<u8>, DeviceError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(DeviceError::from(btleplug::Error::NotConnected));
        }
        state.reads += 1;
        Ok(state.values.get(&characteristic.uuid).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, _characteristic: &MockCharacteristic) -> Result<NotificationStream, DeviceError> {
        let (sender, receiver) = unbounded::<Notification>();
        self.lock().notifier = Some(sender);
        Ok(Box::pin(receiver))
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(self.lock().connected)
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.connected = false;
        state.notifier = None;
        Ok(())
    }
}

pub struct MockChooser {
    link: Option<MockLink>,
    stalled: bool,
}

impl MockChooser {
    pub fn new(link: MockLink) -> Self {
        MockChooser { link: Some(link), stalled: false }
    }

    /// A chooser where the user never picks a device.
    pub fn empty() -> Self {
        MockChooser { link: None, stalled: false }
    }

    /// A chooser that keeps scanning forever.
    pub fn stalled() -> Self {
        MockChooser { link: None, stalled: true }
    }
}

impl DeviceChooser for MockChooser {
    type Link = MockLink;

    async fn request_device(&self) -> Result<MockLink, DeviceError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.link.clone().ok_or(DeviceError::NoDeviceSelected)
    }
}
