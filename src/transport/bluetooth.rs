//! Bluetooth LE transport using BlueZ GATT

use crate::transport::traits::{GattLink, LinkConnector, NotificationReceiver};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, Address, Device};
use droiddepot_shared::{gatt, timing};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace};

/// Buffered notifications before the pump applies backpressure
const NOTIFICATION_BUFFER: usize = 64;

/// Bluetooth connector for establishing a GATT link to a droid
pub struct BluetoothConnector {
    adapter: Adapter,
    address: Address,
    connect_timeout: Duration,
}

impl BluetoothConnector {
    /// Create a new connector for a droid at a known address
    pub fn new(adapter: Adapter, address: Address, connect_timeout: Duration) -> Self {
        Self {
            adapter,
            address,
            connect_timeout,
        }
    }
}

#[async_trait]
impl LinkConnector for BluetoothConnector {
    type Link = BluetoothLink;

    async fn connect(&self) -> Result<(BluetoothLink, NotificationReceiver)> {
        let device = self.adapter.device(self.address)?;

        if !device.is_connected().await? {
            info!("[BT] Connecting to {}", self.address);
            timeout(self.connect_timeout, device.connect())
                .await
                .map_err(|_| anyhow!("Connection to {} timed out", self.address))?
                .with_context(|| format!("GATT connect to {} failed", self.address))?;
        }

        wait_for_services(&device).await?;
        let (command, notify) = find_characteristics(&device).await?;

        let stream = notify
            .notify()
            .await
            .context("Failed to subscribe to droid notifications")?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let address = self.address;
        let notify_task = tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(value) = stream.next().await {
                trace!("[BT] Notification from {}: {:02x?}", address, value);
                if tx.send(value).await.is_err() {
                    break;
                }
            }
            debug!("[BT] Notification stream from {} ended", address);
        });

        info!("[BT] Connected to {}", self.address);
        Ok((
            BluetoothLink {
                device,
                command,
                notify_task,
            },
            rx,
        ))
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}

/// GATT services are resolved asynchronously after the link comes up
async fn wait_for_services(device: &Device) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(timing::CONNECT_SETTLE_TIMEOUT_MS);
    while !device.is_services_resolved().await? {
        if Instant::now() >= deadline {
            return Err(anyhow!("GATT services of {} never resolved", device.address()));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

/// Locate the command and notify characteristics of the droid service
async fn find_characteristics(device: &Device) -> Result<(Characteristic, Characteristic)> {
    for service in device.services().await? {
        if service.uuid().await? != gatt::SERVICE {
            continue;
        }

        let mut command = None;
        let mut notify = None;
        for characteristic in service.characteristics().await? {
            let uuid = characteristic.uuid().await?;
            if uuid == gatt::COMMAND_CHARACTERISTIC {
                command = Some(characteristic);
            } else if uuid == gatt::NOTIFY_CHARACTERISTIC {
                notify = Some(characteristic);
            }
        }

        return match (command, notify) {
            (Some(command), Some(notify)) => Ok((command, notify)),
            _ => Err(anyhow!("Droid service is missing its command or notify characteristic")),
        };
    }

    Err(anyhow!("{} does not expose the droid service", device.address()))
}

/// Live GATT link to a droid
pub struct BluetoothLink {
    device: Device,
    command: Characteristic,
    notify_task: JoinHandle<()>,
}

impl BluetoothLink {
    /// Get the peer Bluetooth address
    pub fn peer_address(&self) -> Address {
        self.device.address()
    }
}

#[async_trait]
impl GattLink for BluetoothLink {
    async fn write(&self, frame: &[u8]) -> Result<()> {
        let request = CharacteristicWriteRequest {
            op_type: WriteOp::Command,
            ..Default::default()
        };
        self.command
            .write_ext(frame, &request)
            .await
            .with_context(|| format!("Write to {} failed", self.peer_address()))
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        self.notify_task.abort();
        self.device.disconnect().await?;
        info!("[BT] Disconnected from {}", self.peer_address());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
