//! In-process transport that records frames instead of sending them
//!
//! Used for `--dry-run` and by the controller tests.

use crate::transport::traits::{GattLink, LinkConnector, NotificationReceiver};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use droiddepot_shared::codec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

/// Shared view of everything written to a [`MemoryLink`]
#[derive(Debug, Clone, Default)]
pub struct FrameLog {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FrameLog {
    fn push(&self, frame: &[u8]) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.to_vec());
        }
    }

    /// All frames written so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Frames rendered as lowercase hex
    pub fn hex_frames(&self) -> Vec<String> {
        self.frames().iter().map(|f| codec::to_hex(f)).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
    }
}

/// Link that keeps written frames in memory
pub struct MemoryLink {
    log: FrameLog,
    connected: Arc<AtomicBool>,
    echo: bool,
}

#[async_trait]
impl GattLink for MemoryLink {
    async fn write(&self, frame: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(anyhow!("Memory link is closed"));
        }
        if self.echo {
            info!("[DRY-RUN] {}", codec::to_hex(frame));
        }
        self.log.push(frame);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// Connector producing [`MemoryLink`]s
///
/// Keeps the sending half of the notification channel so callers can inject
/// packets as if the droid had sent them.
pub struct MemoryConnector {
    log: FrameLog,
    connected: Arc<AtomicBool>,
    echo: bool,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            log: FrameLog::default(),
            connected: Arc::new(AtomicBool::new(false)),
            echo: false,
            notify_tx: Mutex::new(None),
        }
    }

    /// Log every frame at info level, for dry runs
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Handle to the frames written by the link
    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }

    /// Sender that delivers notifications to the connected link
    pub fn notifier(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.notify_tx.lock().ok().and_then(|tx| tx.clone())
    }

    /// Simulate the droid dropping the link
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkConnector for MemoryConnector {
    type Link = MemoryLink;

    async fn connect(&self) -> Result<(MemoryLink, NotificationReceiver)> {
        let (tx, rx) = mpsc::channel(16);
        if let Ok(mut slot) = self.notify_tx.lock() {
            *slot = Some(tx);
        }
        self.connected.store(true, Ordering::SeqCst);

        Ok((
            MemoryLink {
                log: self.log.clone(),
                connected: self.connected.clone(),
                echo: self.echo,
            },
            rx,
        ))
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_frames() {
        let connector = MemoryConnector::new();
        let (link, _rx) = connector.connect().await.unwrap();

        link.write(&[0x23, 0x00, 0x0e, 0x40]).await.unwrap();
        assert_eq!(connector.log().hex_frames(), vec!["23000e40".to_string()]);

        link.disconnect().await.unwrap();
        assert!(!link.is_connected().await);
        assert!(link.write(&[0x00]).await.is_err());
    }

    #[tokio::test]
    async fn test_notifier_reaches_receiver() {
        let connector = MemoryConnector::new();
        let (_link, mut rx) = connector.connect().await.unwrap();

        connector.notifier().unwrap().send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
    }
}
