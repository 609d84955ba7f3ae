//! Location beacon emulation over BlueZ advertising

use anyhow::{Context, Result};
use bluer::adv::{Advertisement, AdvertisementHandle, Type};
use bluer::Adapter;
use droiddepot_shared::beacon::LocationBeacon;
use droiddepot_shared::manufacturer;
use std::collections::BTreeMap;
use tracing::info;

/// Build the advertisement a park beacon sends
pub fn beacon_advertisement(beacon: &LocationBeacon) -> Result<Advertisement> {
    let mut manufacturer_data = BTreeMap::new();
    manufacturer_data.insert(manufacturer::DROID, beacon.encode()?);

    Ok(Advertisement {
        advertisement_type: Type::Broadcast,
        manufacturer_data,
        discoverable: Some(false),
        ..Default::default()
    })
}

/// Advertises a location beacon so nearby droids react to it
pub struct BeaconAdvertiser {
    adapter: Adapter,
}

impl BeaconAdvertiser {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Start advertising; dropping the handle stops it
    pub async fn advertise(&self, beacon: &LocationBeacon) -> Result<AdvertisementHandle> {
        let advertisement = beacon_advertisement(beacon)?;
        let handle = self
            .adapter
            .advertise(advertisement)
            .await
            .context("Failed to register beacon advertisement")?;

        info!(
            "[BEACON] Advertising {} on {}",
            beacon.to_hex()?,
            self.adapter.name()
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertisement_carries_payload() {
        let beacon = LocationBeacon::from_hex("0A040318BA01").unwrap();
        let advertisement = beacon_advertisement(&beacon).unwrap();

        assert_eq!(
            advertisement.manufacturer_data.get(&manufacturer::DROID),
            Some(&vec![0x0a, 0x04, 0x03, 0x18, 0xba, 0x01])
        );
        assert_eq!(advertisement.discoverable, Some(false));
    }

    #[test]
    fn test_invalid_signal_strength_rejected() {
        let beacon = LocationBeacon::new(3, 2, 10, true);
        assert!(beacon_advertisement(&beacon).is_err());
    }
}
