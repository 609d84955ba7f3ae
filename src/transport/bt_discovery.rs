//! Bluetooth LE discovery for finding droids

use anyhow::{anyhow, Result};
use bluer::{Adapter, Address, Device, DiscoveryFilter, DiscoveryTransport};
use droiddepot_shared::hardware::DroidAdvertisement;
use droiddepot_shared::{manufacturer, timing, DROID_DEVICE_NAME};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for droid discovery
#[derive(Debug, Clone)]
pub struct DroidDiscoveryConfig {
    /// How long a single scan runs
    pub scan_duration: Duration,
    /// Keep rescanning until at least one droid is found
    pub retry: bool,
    /// Only accept this droid
    pub address: Option<Address>,
}

impl Default for DroidDiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(5),
            retry: false,
            address: None,
        }
    }
}

/// A droid seen during discovery
#[derive(Debug, Clone)]
pub struct DiscoveredDroid {
    /// Bluetooth MAC address
    pub address: Address,
    /// Signal strength (if available)
    pub rssi: Option<i16>,
    /// Identity from the manufacturer data
    pub advertisement: DroidAdvertisement,
}

impl std::fmt::Display for DiscoveredDroid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rssi={} {} / {}",
            self.address,
            self.rssi.map(|r| r.to_string()).unwrap_or_else(|| "?".into()),
            self.advertisement.personality,
            self.advertisement.affiliation
        )
    }
}

/// Bluetooth droid discovery service
pub struct DroidDiscovery {
    config: DroidDiscoveryConfig,
}

impl DroidDiscovery {
    /// Create a new discovery service
    pub fn new(config: DroidDiscoveryConfig) -> Self {
        Self { config }
    }

    /// Get the default Bluetooth adapter, powered on
    pub async fn get_adapter() -> Result<Adapter> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }

    /// Discover nearby droids, strongest signal first
    pub async fn discover_droids(&self, adapter: &Adapter) -> Result<Vec<DiscoveredDroid>> {
        loop {
            let droids = self.scan_once(adapter).await?;
            if !droids.is_empty() || !self.config.retry {
                for droid in &droids {
                    info!("Droid discovered: [ {} ]", droid);
                }
                return Ok(droids);
            }

            warn!("Droid discovery found nothing. Retrying...");
            tokio::time::sleep(Duration::from_millis(timing::DISCOVERY_RESCAN_MS)).await;
        }
    }

    /// Find the best droid (strongest signal)
    pub async fn find_droid(&self, adapter: &Adapter) -> Result<DiscoveredDroid> {
        self.discover_droids(adapter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No droids found"))
    }

    async fn scan_once(&self, adapter: &Adapter) -> Result<Vec<DiscoveredDroid>> {
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                ..Default::default()
            })
            .await?;

        debug!("Scanning for droids for {:?}", self.config.scan_duration);
        {
            let discover = adapter.discover_devices_with_changes().await?;
            tokio::pin!(discover);
            // Name and manufacturer data often arrive after DeviceAdded, so
            // devices are only inspected once the window has closed
            let _ = timeout(self.config.scan_duration, async {
                while discover.next().await.is_some() {}
            })
            .await;
        }
        debug!("Discovery scan completed");

        let mut droids = Vec::new();
        for address in adapter.device_addresses().await? {
            let Ok(device) = adapter.device(address) else {
                continue;
            };
            if let Some(droid) = self.inspect_device(&device).await {
                droids.push(droid);
            }
        }

        sort_by_signal(&mut droids);
        Ok(droids)
    }

    /// Check if a device is a droid and read its advertisement
    async fn inspect_device(&self, device: &Device) -> Option<DiscoveredDroid> {
        let address = device.address();
        if self.config.address.is_some_and(|wanted| wanted != address) {
            return None;
        }

        let name = device.name().await.ok().flatten();
        let data = device.manufacturer_data().await.ok().flatten()?;
        let advertisement = identify_droid(name.as_deref(), &data)?;

        Some(DiscoveredDroid {
            address,
            rssi: device.rssi().await.ok().flatten(),
            advertisement,
        })
    }
}

/// Droid identity from a device's advertised name and manufacturer data
///
/// Only devices named `DROID` that carry data under the droid manufacturer id
/// qualify.
fn identify_droid(
    name: Option<&str>,
    manufacturer_data: &HashMap<u16, Vec<u8>>,
) -> Option<DroidAdvertisement> {
    if name != Some(DROID_DEVICE_NAME) {
        return None;
    }
    manufacturer_data
        .get(&manufacturer::DROID)
        .and_then(|raw| DroidAdvertisement::parse(raw))
}

/// Strongest signal first, devices without RSSI last
fn sort_by_signal(droids: &mut [DiscoveredDroid]) {
    droids.sort_by_key(|droid| std::cmp::Reverse(droid.rssi.unwrap_or(i16::MIN)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use droiddepot_shared::hardware::Personality;

    #[test]
    fn test_default_config() {
        let config = DroidDiscoveryConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert!(!config.retry);
        assert!(config.address.is_none());
    }

    #[test]
    fn test_display() {
        let droid = DiscoveredDroid {
            address: Address::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            rssi: Some(-61),
            advertisement: DroidAdvertisement::default(),
        };
        let text = droid.to_string();
        assert!(text.starts_with("00:11:22:33:44:55 rssi=-61"));
        assert!(text.contains("R unit"));
    }

    #[test]
    fn test_identify_droid() {
        let mut data = HashMap::new();
        data.insert(manufacturer::DROID, vec![0x03, 0x04, 0x44, 0x81, 0x8a, 0x02]);

        let adv = identify_droid(Some("DROID"), &data).unwrap();
        assert_eq!(adv.personality, Personality::R_UNIT);

        // Name not yet resolved, or some other device
        assert!(identify_droid(None, &data).is_none());
        assert!(identify_droid(Some("Speaker"), &data).is_none());

        let mut other = HashMap::new();
        other.insert(0x004c, vec![0x02, 0x15]);
        assert!(identify_droid(Some("DROID"), &other).is_none());
    }

    #[test]
    fn test_sort_by_signal() {
        let droid = |last: u8, rssi| DiscoveredDroid {
            address: Address::new([0, 0, 0, 0, 0, last]),
            rssi,
            advertisement: DroidAdvertisement::default(),
        };
        let mut droids = vec![droid(1, None), droid(2, Some(-80)), droid(3, Some(-40))];
        sort_by_signal(&mut droids);
        let order: Vec<u8> = droids.iter().map(|d| d.address.0[5]).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }
}
