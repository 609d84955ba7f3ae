//! Notification processing for packets pushed by the droid
//!
//! Every packet is decoded, checked against the handlers we know about, and
//! then handed to the oldest caller waiting for that command id.

use droiddepot_shared::codec::{self, NotifyMessage};
use droiddepot_shared::hardware::EXPECTED_FIRMWARE;
use droiddepot_shared::CommandId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Head motor events reported by R-unit droids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MotorEvent {
    MotorStarted = 2,
    MotorMovingRight = 3,
    MotorMovingLeft = 4,
    MotorStopped = 130,
    MotorHitLeftLimit = 131,
    MotorHitRightLimit = 132,
}

impl TryFrom<u8> for MotorEvent {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::MotorStarted),
            3 => Ok(Self::MotorMovingRight),
            4 => Ok(Self::MotorMovingLeft),
            130 => Ok(Self::MotorStopped),
            131 => Ok(Self::MotorHitLeftLimit),
            132 => Ok(Self::MotorHitRightLimit),
            other => Err(other),
        }
    }
}

/// A response some caller is waiting on
pub struct PendingResponse {
    command: CommandId,
    rx: oneshot::Receiver<Vec<u8>>,
}

impl PendingResponse {
    /// Wait for the response data, `None` on timeout
    pub async fn wait(self, limit: Duration) -> Option<Vec<u8>> {
        match timeout(limit, self.rx).await {
            Ok(Ok(data)) => Some(data),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!("No {:?} response within {:?}", self.command, limit);
                None
            }
        }
    }
}

/// Decodes notifications and routes them to waiters and subscribers
pub struct NotificationProcessor {
    waiters: Mutex<HashMap<u8, VecDeque<oneshot::Sender<Vec<u8>>>>>,
    head_events: broadcast::Sender<MotorEvent>,
}

impl NotificationProcessor {
    pub fn new() -> Self {
        let (head_events, _) = broadcast::channel(32);
        Self {
            waiters: Mutex::new(HashMap::new()),
            head_events,
        }
    }

    /// Register interest in the next response with this command id
    ///
    /// Register before sending the request so a fast reply is not missed.
    pub async fn expect_response(&self, command: CommandId) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .entry(command.as_u8())
            .or_default()
            .push_back(tx);
        PendingResponse { command, rx }
    }

    /// Subscribe to R-unit head motor events
    pub fn subscribe_head_events(&self) -> broadcast::Receiver<MotorEvent> {
        self.head_events.subscribe()
    }

    /// Handle one raw notification packet
    pub async fn handle(&self, raw: &[u8]) {
        let message = match codec::decode_notification(raw) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Failed to process notification message with data {}: {}",
                    codec::to_hex(raw),
                    e
                );
                return;
            }
        };

        debug!("Notification: {}", message);

        let Some(command) = message.command() else {
            warn!("Received unknown command {}. Ignoring", message.command_id);
            return;
        };

        match command {
            CommandId::FirmwareInformationResponse => self.verify_firmware(&message),
            CommandId::RUnitHeadEvent => self.dispatch_head_event(&message),
            other => warn!(
                "No handler present for droid command: {:?} ({})",
                other,
                codec::to_hex(&message.data)
            ),
        }

        self.resolve_waiter(message).await;
    }

    fn verify_firmware(&self, message: &NotifyMessage) {
        if message.data != EXPECTED_FIRMWARE {
            warn!(
                "Possibly incompatible droid detected, firmware reports {}",
                codec::to_hex(&message.data)
            );
        }
    }

    fn dispatch_head_event(&self, message: &NotifyMessage) {
        let Some(&event_id) = message.data.get(1) else {
            warn!("Head motor event without an event id");
            return;
        };

        match MotorEvent::try_from(event_id) {
            Ok(event) => {
                debug!("Head motor event: {:?}", event);
                // No subscribers is fine
                let _ = self.head_events.send(event);
            }
            Err(id) => debug!("Unknown head motor event {}", id),
        }
    }

    /// Hand the data to the oldest live waiter for this command id
    async fn resolve_waiter(&self, message: NotifyMessage) {
        let mut waiters = self.waiters.lock().await;
        let Some(queue) = waiters.get_mut(&message.command_id) else {
            return;
        };

        let mut data = message.data;
        while let Some(tx) = queue.pop_front() {
            match tx.send(data) {
                Ok(()) => break,
                // Waiter timed out, try the next one
                Err(returned) => data = returned,
            }
        }
    }
}

impl Default for NotificationProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRMWARE_RESPONSE: &str = "2f008140 4b1001444411110100000000";

    fn packet(hex: &str) -> Vec<u8> {
        codec::from_hex(&hex.replace(' ', "")).unwrap()
    }

    #[tokio::test]
    async fn test_waiter_receives_response() {
        let processor = NotificationProcessor::new();
        let pending = processor
            .expect_response(CommandId::FirmwareInformationResponse)
            .await;

        processor.handle(&packet(FIRMWARE_RESPONSE)).await;

        let data = pending.wait(Duration::from_millis(100)).await.unwrap();
        assert_eq!(data, EXPECTED_FIRMWARE.to_vec());
    }

    #[tokio::test]
    async fn test_waiters_are_fifo() {
        let processor = NotificationProcessor::new();
        let first = processor.expect_response(CommandId::RUnitHeadEvent).await;
        let second = processor.expect_response(CommandId::RUnitHeadEvent).await;

        processor.handle(&packet("250080400082")).await;
        processor.handle(&packet("250080400002")).await;

        assert_eq!(first.wait(Duration::from_millis(100)).await, Some(vec![0x00, 0x82]));
        assert_eq!(second.wait(Duration::from_millis(100)).await, Some(vec![0x00, 0x02]));
    }

    #[tokio::test]
    async fn test_timed_out_waiter_is_skipped() {
        let processor = NotificationProcessor::new();
        let stale = processor
            .expect_response(CommandId::FirmwareInformationResponse)
            .await;
        assert!(stale.wait(Duration::from_millis(10)).await.is_none());

        let fresh = processor
            .expect_response(CommandId::FirmwareInformationResponse)
            .await;
        processor.handle(&packet(FIRMWARE_RESPONSE)).await;
        assert!(fresh.wait(Duration::from_millis(100)).await.is_some());
    }

    #[tokio::test]
    async fn test_head_events_broadcast() {
        let processor = NotificationProcessor::new();
        let mut events = processor.subscribe_head_events();

        processor.handle(&packet("250080400083")).await;
        processor.handle(&packet("250080400004")).await;
        // Unknown event id is dropped
        processor.handle(&packet("250080400063")).await;

        assert_eq!(events.recv().await.unwrap(), MotorEvent::MotorHitLeftLimit);
        assert_eq!(events.recv().await.unwrap(), MotorEvent::MotorMovingLeft);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_packets_are_ignored() {
        let processor = NotificationProcessor::new();
        let pending = processor.expect_response(CommandId::RUnitHeadEvent).await;

        // Size byte claims seven bytes but only six arrived
        processor.handle(&packet("260080400082")).await;
        processor.handle(&[0x21]).await;

        assert!(pending.wait(Duration::from_millis(20)).await.is_none());
    }

    #[test]
    fn test_motor_event_ids() {
        assert_eq!(MotorEvent::try_from(130), Ok(MotorEvent::MotorStopped));
        assert_eq!(MotorEvent::try_from(5), Err(5));
    }
}
