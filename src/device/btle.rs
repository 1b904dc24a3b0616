use std::time::Duration;
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::config::types::SessionConfig;
use crate::device::constants::{make_light_service_uuid, SCAN_POLL_DELAY};
use crate::device::link::{DeviceChooser, GattLink, Notification, NotificationStream};
use crate::error::DeviceError;

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;
    let light_service_uuid = make_light_service_uuid();

    let filter = ScanFilter {
        services: vec![light_service_uuid],
    };

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

fn name_matches(local_name: Option<&str>, name_filter: Option<&str>) -> bool {
    match name_filter {
        None => true,
        Some(filter) => local_name
            .map(|name| name.to_lowercase().contains(&filter.to_lowercase()))
            .unwrap_or(false),
    }
}

async fn find_peripheral(adapters: &[Adapter], name_filter: Option<&str>) -> Option<Peripheral> {
    let light_service_uuid = make_light_service_uuid();

    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the filter, so make sure to check the service uuid again
                    if properties.services.contains(&light_service_uuid)
                        && name_matches(properties.local_name.as_deref(), name_filter)
                    {
                        info!(
                            "Using peripheral {} {:?} {}",
                            properties.address,
                            properties.address_type,
                            properties.local_name.unwrap_or(String::from("NONE")),
                        );
                        return Some(peripheral);
                    }
                }
            }
        }
    }

    None
}

/// Scans for the first peripheral that advertises the light service.
pub struct BtleChooser {
    name_filter: Option<String>,
    scan_timeout: Duration,
}

impl BtleChooser {
    pub fn new(config: &SessionConfig) -> Self {
        BtleChooser {
            name_filter: config.name_filter.clone(),
            scan_timeout: config.scan_timeout,
        }
    }
}

impl DeviceChooser for BtleChooser {
    type Link = BtleLink;

    async fn request_device(&self) -> Result<BtleLink, DeviceError> {
        let manager = Manager::new().await?;
        let adapters = start_scanning(&manager).await?;
        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter);
        }

        let deadline = Instant::now() + self.scan_timeout;
        let peripheral = loop {
            if let Some(peripheral) = find_peripheral(&adapters, self.name_filter.as_deref()).await {
                break Some(peripheral);
            }

            if Instant::now() >= deadline {
                break None;
            }

            debug!("No peripherals matched");
            sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
        };

        stop_scanning(&adapters).await;

        match peripheral {
            Some(peripheral) => Ok(BtleLink { peripheral }),
            None => Err(DeviceError::NoDeviceSelected),
        }
    }
}

pub struct BtleLink {
    peripheral: Peripheral,
}

impl GattLink for BtleLink {
    type Characteristic = Characteristic;

    async fn name(&self) -> String {
        match self.peripheral.properties().await {
            Ok(Some(properties)) => properties.local_name
                .unwrap_or_else(|| properties.address.to_string()),
            _ => String::from("unnamed"),
        }
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        info!("Connecting to peripheral...");
        self.peripheral.connect().await.map_err(|source| DeviceError::Connect { source })
    }

    async fn discover_services(&self) -> Result<(), DeviceError> {
        info!("Connected; Discovering services...");
        self.peripheral.discover_services().await?;
        Ok(())
    }

    fn has_service(&self, service: Uuid) -> bool {
        self.peripheral.services().iter().any(|s| s.uuid == service)
    }

    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Option<Characteristic> {
        self.peripheral.services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|characteristic| characteristic.uuid == uuid)
    }

    fn can_notify(&self, characteristic: &Characteristic) -> bool {
        characteristic.properties.contains(CharPropFlags::NOTIFY)
    }

    fn can_read(&self, characteristic: &Characteristic) -> bool {
        characteristic.properties.contains(CharPropFlags::READ)
    }

    async fn write(&self, characteristic: &Characteristic, payload: &[u8]) -> Result<(), DeviceError> {
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral.write(characteristic, payload, write_type).await?;
        Ok(())
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, DeviceError> {
        Ok(self.peripheral.read(characteristic).await?)
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<NotificationStream, DeviceError> {
        info!("Subscribing to characteristic {:?}", characteristic.uuid);
        self.peripheral.subscribe(characteristic).await?;

        let notifications = self.peripheral.notifications().await?;
        Ok(Box::pin(notifications.map(|data| Notification { uuid: data.uuid, value: data.value })))
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
