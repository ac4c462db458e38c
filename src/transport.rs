use async_trait::async_trait;
use btleplug::api::{
    CharPropFlags, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::frame::Frame;
use crate::{Error, Result};

/// Write characteristic of the LEDnetWF service
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);
/// Notify characteristic of the LEDnetWF service
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb);

/// Advertised name prefixes of compatible lights
pub const KNOWN_NAME_PREFIXES: &[&str] = &["LEDnetWF", "IOTWF", "IOTB"];

/// Callback receiving raw notification payloads
pub type NotificationHandler = Box<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// Link to a device that accepts compiled frames.
///
/// Frames must be transmitted one at a time and in compile order.
/// Implementations do not retry: a failed write aborts the run.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes one frame and waits for the link to acknowledge it
    async fn transmit(&self, frame: &Frame) -> Result<()>;

    /// Delivers every notification from the device to `on_notification`
    async fn subscribe(&self, on_notification: NotificationHandler) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn transmit(&self, frame: &Frame) -> Result<()> {
        (**self).transmit(frame).await
    }

    async fn subscribe(&self, on_notification: NotificationHandler) -> Result<()> {
        (**self).subscribe(on_notification).await
    }
}

/// Transport that only logs frames, for `--dry-run`
#[derive(Debug, Default)]
pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    async fn transmit(&self, frame: &Frame) -> Result<()> {
        info!("Dry run, not sent: {}", frame);
        Ok(())
    }

    async fn subscribe(&self, _on_notification: NotificationHandler) -> Result<()> {
        Ok(())
    }
}

/// Which peripheral to connect to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// BLE address or platform peripheral id
    pub id: Option<String>,
    /// Advertised name prefix
    pub name: Option<String>,
}

impl DeviceSelector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            id: config.device.id.clone(),
            name: config.device.name.clone(),
        }
    }

    fn matches(&self, address: &str, id: &str, local_name: &str) -> bool {
        if let Some(wanted) = &self.id {
            let wanted = wanted.to_lowercase();
            return address.to_lowercase() == wanted || id.to_lowercase() == wanted;
        }
        match &self.name {
            Some(prefix) => local_name.starts_with(prefix.as_str()),
            None => KNOWN_NAME_PREFIXES
                .iter()
                .any(|prefix| local_name.starts_with(prefix)),
        }
    }
}

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapters = manager.adapters().await?;
    match adapters.into_iter().next() {
        Some(adapter) => {
            debug!("Using Bluetooth adapter");
            Ok(adapter)
        }
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

/// Serializes writes and keeps a minimum gap between them
struct CommandQueue {
    /// Only one write in flight
    semaphore: Semaphore,
    /// Minimum delay between commands
    min_delay: Duration,
    /// Last command timestamp
    last_command: Mutex<std::time::Instant>,
}

impl CommandQueue {
    fn new(min_delay_ms: u64) -> Self {
        Self {
            semaphore: Semaphore::new(1),
            min_delay: Duration::from_millis(min_delay_ms),
            last_command: Mutex::new(std::time::Instant::now() - Duration::from_secs(1)),
        }
    }

    async fn execute<T, F>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>> + Send,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::General(e.to_string()))?;

        let mut last_cmd = self.last_command.lock().await;
        let elapsed = last_cmd.elapsed();
        if elapsed < self.min_delay {
            let wait_time = self.min_delay - elapsed;
            trace!("Rate limiting: waiting {:?} before next command", wait_time);
            time::sleep(wait_time).await;
        }

        let result = future.await;
        *last_cmd = std::time::Instant::now();
        result
    }
}

/// Transport over a BLE GATT connection
pub struct BleTransport {
    peripheral: Peripheral,
    write_characteristic: Characteristic,
    notify_characteristic: Option<Characteristic>,
    command_queue: Arc<CommandQueue>,
    /// Upper bound for a single write, in milliseconds
    pub write_timeout: u64,
}

impl BleTransport {
    /// Minimum gap between two writes, in milliseconds
    pub const COMMAND_DELAY: u64 = 50;
    /// Default write timeout, in milliseconds
    pub const WRITE_TIMEOUT: u64 = 5000;

    /// Scans for a matching peripheral and connects to it
    #[instrument]
    pub async fn connect(selector: &DeviceSelector) -> Result<BleTransport> {
        info!("Initializing BLE LED controller");
        let manager = Manager::new().await?;
        let central = get_central(&manager).await?;

        info!("Scanning for compatible BLE devices...");
        central.start_scan(ScanFilter::default()).await?;

        // Maximum time to wait for device discovery (10 seconds)
        let max_discovery_time = Duration::from_secs(10);
        let start_time = std::time::Instant::now();
        let mut found: Option<Peripheral> = None;

        while found.is_none() && start_time.elapsed() < max_discovery_time {
            let peripherals = central.peripherals().await?;
            debug!("Found {} BLE peripherals so far", peripherals.len());

            for p in peripherals {
                if let Ok(Some(props)) = p.properties().await {
                    let Some(name) = props.local_name else {
                        continue;
                    };
                    let address = p.address().to_string();
                    let id = p.id().to_string();
                    trace!("Found device: {} {} {}", address, id, name);

                    if selector.matches(&address, &id, &name) {
                        info!("Found compatible device: {} ({})", name, address);
                        found = Some(p);
                        break;
                    }
                }
            }

            if found.is_none() {
                let remaining = max_discovery_time
                    .saturating_sub(start_time.elapsed())
                    .as_secs();
                info!(
                    "Still scanning for compatible devices... ({} seconds remaining)",
                    remaining
                );
                time::sleep(Duration::from_millis(500)).await;
            }
        }

        central.stop_scan().await?;
        let Some(peripheral) = found else {
            error!(
                "No compatible LED device found within {} seconds",
                max_discovery_time.as_secs()
            );
            return Err(Error::NoCompatibleDevice);
        };

        info!("Connecting to device...");
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        debug!("Discovering services...");
        peripheral.discover_services().await?;

        let write_characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == WRITE_UUID)
            .ok_or(Error::CharacteristicNotFound(WRITE_UUID.to_string()))?;
        debug!("Found write characteristic: {}", write_characteristic.uuid);

        let notify_characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == NOTIFY_UUID);
        match &notify_characteristic {
            Some(c) => debug!("Found notify characteristic: {}", c.uuid),
            None => debug!("Notify characteristic not found, but this is optional"),
        }

        Ok(BleTransport {
            peripheral,
            write_characteristic,
            notify_characteristic,
            command_queue: Arc::new(CommandQueue::new(Self::COMMAND_DELAY)),
            write_timeout: Self::WRITE_TIMEOUT,
        })
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
            info!("Disconnected");
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for BleTransport {
    #[instrument(skip(self, frame), fields(seq = frame.sequence, len = frame.len()))]
    async fn transmit(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.to_bytes();
        let peripheral = &self.peripheral;
        let characteristic = &self.write_characteristic;
        let timeout = Duration::from_millis(self.write_timeout);

        // Prefer WriteWithResponse when supported so the write is acknowledged
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.command_queue
            .execute(async move {
                trace!("Writing {} bytes", bytes.len());
                match time::timeout(timeout, peripheral.write(characteristic, &bytes, write_type))
                    .await
                {
                    Ok(Ok(())) => {
                        trace!("Frame written");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!("Write failed: {}", e);
                        Err(Error::BleError(e.to_string()))
                    }
                    Err(_) => {
                        error!("Write timed out after {:?}", timeout);
                        Err(Error::CommandTimeout(timeout.as_millis() as u64))
                    }
                }
            })
            .await
    }

    #[instrument(skip(self, on_notification))]
    async fn subscribe(&self, on_notification: NotificationHandler) -> Result<()> {
        let characteristic = self
            .notify_characteristic
            .clone()
            .ok_or(Error::CharacteristicNotFound(NOTIFY_UUID.to_string()))?;

        self.peripheral.subscribe(&characteristic).await?;
        let mut notifications = self.peripheral.notifications().await?;
        debug!("Subscribed to {}", characteristic.uuid);

        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic.uuid {
                    continue;
                }
                trace!("Notification: {:02x?}", notification.value);
                on_notification(notification.value);
            }
            warn!("Notification stream ended");
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_by_id_ignores_name() {
        let selector = DeviceSelector {
            id: Some("AA:BB:CC:DD:EE:FF".into()),
            name: None,
        };
        assert!(selector.matches("aa:bb:cc:dd:ee:ff", "hci0/dev_x", "whatever"));
        assert!(!selector.matches("11:22:33:44:55:66", "hci0/dev_x", "LEDnetWF0201"));
    }

    #[test]
    fn test_selector_by_name_prefix() {
        let selector = DeviceSelector {
            id: None,
            name: Some("Bedroom".into()),
        };
        assert!(selector.matches("", "", "Bedroom lamp"));
        assert!(!selector.matches("", "", "LEDnetWF0201"));

        let any = DeviceSelector::default();
        assert!(any.matches("", "", "LEDnetWF02001A"));
        assert!(any.matches("", "", "IOTB1234"));
        assert!(!any.matches("", "", "ELK-BLEDOM"));
    }

    #[test]
    fn test_characteristic_uuids() {
        assert_eq!(
            WRITE_UUID.to_string(),
            "0000ff01-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            NOTIFY_UUID.to_string(),
            "0000ff02-0000-1000-8000-00805f9b34fb"
        );
    }
}
