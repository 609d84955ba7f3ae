//! Park beacon reactions
//!
//! Runs a background task that scans for location beacons and runs the
//! script a nearby beacon asks for. Each beacon has a reaction window during
//! which it is ignored after triggering a reaction.

use crate::command::ScriptEngine;
use anyhow::Result;
use async_trait::async_trait;
use bluer::{Adapter, Address, DiscoveryFilter, DiscoveryTransport};
use droiddepot_shared::beacon::LocationBeacon;
use droiddepot_shared::{manufacturer, timing};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A location beacon seen during one scan pass
#[derive(Debug, Clone)]
pub struct BeaconSighting {
    pub address: Address,
    pub beacon: LocationBeacon,
    pub rssi: Option<i16>,
}

impl BeaconSighting {
    /// Whether the droid is close enough for the beacon to apply
    pub fn in_range(&self) -> bool {
        self.rssi
            .map(|rssi| rssi >= self.beacon.signal_strength_dbm)
            .unwrap_or(false)
    }
}

/// Source of beacon sightings
#[async_trait]
pub trait BeaconSource: Send + Sync {
    /// Scan for `window` and return the beacons seen
    async fn scan(&self, window: Duration) -> Result<Vec<BeaconSighting>>;
}

/// Beacon source backed by a BlueZ adapter
pub struct BluetoothBeaconSource {
    adapter: Adapter,
}

impl BluetoothBeaconSource {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl BeaconSource for BluetoothBeaconSource {
    async fn scan(&self, window: Duration) -> Result<Vec<BeaconSighting>> {
        self.adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await?;

        {
            let discover = self.adapter.discover_devices_with_changes().await?;
            tokio::pin!(discover);
            // Drain events until the window closes; the results are read below
            let _ = tokio::time::timeout(window, async {
                while discover.next().await.is_some() {}
            })
            .await;
        }

        let mut sightings = Vec::new();
        for address in self.adapter.device_addresses().await? {
            let Ok(device) = self.adapter.device(address) else {
                continue;
            };
            let Ok(Some(data)) = device.manufacturer_data().await else {
                continue;
            };
            let Some(raw) = data.get(&manufacturer::DROID) else {
                continue;
            };
            // Droids advertise under the same id, skip anything else
            let Ok(beacon) = LocationBeacon::decode(raw) else {
                continue;
            };

            sightings.push(BeaconSighting {
                address,
                beacon,
                rssi: device.rssi().await.ok().flatten(),
            });
        }

        Ok(sightings)
    }
}

/// Remembers when each beacon last triggered a reaction
#[derive(Debug, Default)]
pub struct ReactionTracker {
    last_reaction: HashMap<Address, Instant>,
}

impl ReactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the beacon's reaction window has passed
    pub fn can_react(&self, sighting: &BeaconSighting, now: Instant) -> bool {
        match self.last_reaction.get(&sighting.address) {
            Some(last) => {
                let window = Duration::from_secs(sighting.beacon.reaction_window_secs());
                now.duration_since(*last) >= window
            }
            None => true,
        }
    }

    /// In-range sightings allowed to react, strongest signal first
    pub fn eligible(&self, sightings: &[BeaconSighting], now: Instant) -> Vec<BeaconSighting> {
        let mut eligible: Vec<BeaconSighting> = sightings
            .iter()
            .filter(|s| s.in_range() && self.can_react(s, now))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        eligible
    }

    pub fn record(&mut self, address: Address, now: Instant) {
        self.last_reaction.insert(address, now);
    }
}

/// Configuration for beacon reactions
#[derive(Debug, Clone)]
pub struct ReactionConfig {
    /// Length of one scan pass
    pub scan_window: Duration,
    /// Pause after a reaction before scanning again
    pub cooldown: Duration,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(5),
            cooldown: Duration::from_millis(timing::REACTION_COOLDOWN_MS),
        }
    }
}

/// Scans for park beacons and reacts to them
pub struct ReactionScanner<S: BeaconSource> {
    source: Arc<S>,
    scripts: Arc<ScriptEngine>,
    config: ReactionConfig,
    tracker: Arc<RwLock<ReactionTracker>>,
    active: Arc<RwLock<bool>>,
}

impl<S: BeaconSource + 'static> ReactionScanner<S> {
    pub fn new(source: S, scripts: Arc<ScriptEngine>, config: ReactionConfig) -> Self {
        Self {
            source: Arc::new(source),
            scripts,
            config,
            tracker: Arc::new(RwLock::new(ReactionTracker::new())),
            active: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_active(&self) -> bool {
        *self.active.read().await
    }

    /// Start the background scan task
    pub async fn start(&self) -> Result<ReactionHandle> {
        let mut active = self.active.write().await;
        if *active {
            anyhow::bail!("Beacon reactions already active");
        }
        *active = true;
        drop(active);

        let source = self.source.clone();
        let scripts = self.scripts.clone();
        let tracker = self.tracker.clone();
        let active = self.active.clone();
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            info!("[REACT] Beacon reactions started");
            while *active.read().await {
                let sightings = match source.scan(config.scan_window).await {
                    Ok(sightings) => sightings,
                    Err(e) => {
                        error!("[REACT] Beacon scan failed: {}", e);
                        tokio::time::sleep(config.scan_window).await;
                        continue;
                    }
                };
                debug!("[REACT] {} location beacons in view", sightings.len());

                if react_once(&scripts, &tracker, &sightings).await {
                    tokio::time::sleep(config.cooldown).await;
                }
            }
            info!("[REACT] Beacon reactions stopped");
        });

        Ok(ReactionHandle {
            active: self.active.clone(),
            task,
        })
    }

    /// Stop after the current pass
    pub async fn stop(&self) {
        *self.active.write().await = false;
    }
}

/// Run at most one reaction for this pass, returns whether one ran
async fn react_once(
    scripts: &ScriptEngine,
    tracker: &RwLock<ReactionTracker>,
    sightings: &[BeaconSighting],
) -> bool {
    let now = Instant::now();
    let candidates = tracker.read().await.eligible(sightings, now);

    for sighting in candidates {
        match scripts.execute_script(sighting.beacon.script_id).await {
            Ok(()) => {
                info!(
                    "[REACT] Beacon {} triggered script {}",
                    sighting.address, sighting.beacon.script_id
                );
                tracker.write().await.record(sighting.address, now);
                return true;
            }
            Err(e) => warn!(
                "[REACT] Failed to handle location beacon {}: {}",
                sighting.address, e
            ),
        }
    }

    false
}

/// Handle to a running reaction task
pub struct ReactionHandle {
    active: Arc<RwLock<bool>>,
    task: JoinHandle<()>,
}

impl ReactionHandle {
    /// Stop reactions immediately
    pub async fn stop(self) {
        *self.active.write().await = false;
        self.task.abort();
    }
}
