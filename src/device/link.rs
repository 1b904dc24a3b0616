//! The seam between the session state machine and the bluetooth stack.
//!
//! [`DeviceChooser`] finds a peripheral, [`GattLink`] talks GATT to it. The btleplug backed
//! implementation lives in [`crate::device::btle`].

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use futures::Stream;
use uuid::Uuid;

use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

pub trait GattLink: Send + Sync + 'static {
    type Characteristic: Clone + Debug + Send + Sync + 'static;

    fn name(&self) -> impl Future<Output = String> + Send;

    fn connect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn discover_services(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Only meaningful after `discover_services`.
    fn has_service(&self, service: Uuid) -> bool;

    /// Only meaningful after `discover_services`.
    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Option<Self::Characteristic>;

    fn can_notify(&self, characteristic: &Self::Characteristic) -> bool;

    fn can_read(&self, characteristic: &Self::Characteristic) -> bool;

    fn write(&self, characteristic: &Self::Characteristic, payload: &[u8]) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn read(&self, characteristic: &Self::Characteristic) -> impl Future<Output = Result<Vec<u8>, DeviceError>> + Send;

    /// Enable notifications for `characteristic` and return the stream they arrive on.
    fn subscribe(&self, characteristic: &Self::Characteristic) -> impl Future<Output = Result<NotificationStream, DeviceError>> + Send;

    fn is_connected(&self) -> impl Future<Output = Result<bool, DeviceError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;
}

/// Picks the peripheral to connect to, like the device chooser of a browser.
pub trait DeviceChooser: Send + Sync + 'static {
    type Link: GattLink;

    fn request_device(&self) -> impl Future<Output = Result<Self::Link, DeviceError>> + Send;
}
