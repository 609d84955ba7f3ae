//! Park location beacons
//!
//! This module handles:
//! - Reacting to location beacons near the droid
//! - Advertising a location beacon from this machine

mod advertiser;
mod reaction;

pub use advertiser::BeaconAdvertiser;
pub use reaction::{BluetoothBeaconSource, ReactionConfig, ReactionScanner};
