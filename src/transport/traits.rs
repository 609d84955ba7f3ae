//! Transport trait abstraction for pluggable GATT backends

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Raw notification packets pushed by the droid
pub type NotificationReceiver = mpsc::Receiver<Vec<u8>>;

/// An established link to a droid's command characteristic
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Write one command frame without waiting for a response
    async fn write(&self, frame: &[u8]) -> Result<()>;

    /// Whether the link is still up
    async fn is_connected(&self) -> bool;

    /// Close the link
    async fn disconnect(&self) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// Factory for creating droid links
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// The link type this connector produces
    type Link: GattLink + 'static;

    /// Attempt to connect, returning the link and its notification stream
    async fn connect(&self) -> Result<(Self::Link, NotificationReceiver)>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
