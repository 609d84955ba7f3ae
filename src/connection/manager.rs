//! Droid connection with handshake, heartbeat and notification pump

use crate::connection::notify::{MotorEvent, NotificationProcessor};
use crate::transport::{GattLink, LinkConnector};
use anyhow::{anyhow, bail, Context, Result};
use droiddepot_shared::codec::{self, HANDSHAKE};
use droiddepot_shared::hardware::{DroidAdvertisement, Personality};
use droiddepot_shared::payload::{led_state_payload, script_payload, BuiltinScript, ScriptAction};
use droiddepot_shared::state_machine::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, TransitionResult,
};
use droiddepot_shared::{timing, Affiliation, CommandId, MultipurposeCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Configuration for a droid connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Skip the pairing animation on connect
    pub silent: bool,
    /// Interval between keepalive commands
    pub heartbeat_interval: Duration,
    /// How long to wait for a command response
    pub response_timeout: Duration,
    /// Time the pairing animation takes to finish
    pub pairing_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            silent: false,
            heartbeat_interval: Duration::from_millis(timing::HEARTBEAT_INTERVAL_MS),
            response_timeout: Duration::from_millis(timing::COMMAND_RESPONSE_TIMEOUT_MS),
            pairing_delay: Duration::from_millis(timing::PAIRING_ANIMATION_MS),
        }
    }
}

/// An open connection to a single droid
pub struct DroidConnection {
    link: Arc<dyn GattLink>,
    fsm: Arc<RwLock<ConnectionStateMachine>>,
    identity: DroidAdvertisement,
    notify: Arc<NotificationProcessor>,
    config: ConnectionConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DroidConnection {
    /// Connect, handshake and start the background tasks
    pub async fn connect<C: LinkConnector>(
        connector: &C,
        identity: DroidAdvertisement,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let fsm = Arc::new(RwLock::new(ConnectionStateMachine::new()));
        transition(&fsm, ConnectionEvent::ConnectRequested).await;

        info!("Connecting to droid via {}", connector.name());
        let (link, mut notifications) = match connector.connect().await {
            Ok(connected) => connected,
            Err(e) => {
                transition(&fsm, ConnectionEvent::ConnectFailed).await;
                return Err(e);
            }
        };
        let link: Arc<dyn GattLink> = Arc::new(link);
        transition(&fsm, ConnectionEvent::LinkEstablished).await;

        let notify = Arc::new(NotificationProcessor::new());
        let pump = {
            let notify = notify.clone();
            let fsm = fsm.clone();
            tokio::spawn(async move {
                while let Some(raw) = notifications.recv().await {
                    notify.handle(&raw).await;
                }
                debug!("Notification channel closed");
                mark_link_lost(&fsm).await;
            })
        };

        let connection = Self {
            link,
            fsm,
            identity,
            notify,
            config,
            tasks: Mutex::new(vec![pump]),
        };

        if let Err(e) = connection.handshake().await {
            transition(&connection.fsm, ConnectionEvent::ConnectFailed).await;
            connection.abort_tasks().await;
            let _ = connection.link.disconnect().await;
            return Err(e);
        }

        transition(&connection.fsm, ConnectionEvent::HandshakeComplete).await;
        connection.start_heartbeat().await?;

        info!(
            "Droid ready: {} ({})",
            connection.personality(),
            connection.affiliation()
        );
        Ok(connection)
    }

    async fn handshake(&self) -> Result<()> {
        // Written twice, a single handshake is not always accepted
        for _ in 0..2 {
            self.link
                .write(&HANDSHAKE)
                .await
                .context("Handshake write failed")?;
        }

        if !self.config.silent {
            let payload = script_payload(BuiltinScript::DroidPairingSequence1.id(), ScriptAction::Execute)?;
            self.send_command(CommandId::ScriptAction, &payload).await?;
            tokio::time::sleep(self.config.pairing_delay).await;
        }

        Ok(())
    }

    async fn start_heartbeat(&self) -> Result<()> {
        send_heartbeat(self.link.as_ref()).await?;

        let link = self.link.clone();
        let fsm = self.fsm.clone();
        let period = self.config.heartbeat_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;

                if !fsm.read().await.can_send() {
                    break;
                }

                if !link.is_connected().await {
                    warn!("Link dropped, stopping heartbeat");
                    mark_link_lost(&fsm).await;
                    break;
                }

                if let Err(e) = send_heartbeat(link.as_ref()).await {
                    warn!("Heartbeat failed: {}", e);
                    mark_link_lost(&fsm).await;
                    break;
                }
            }
            debug!("Heartbeat stopped");
        });

        self.tasks.lock().await.push(handle);
        Ok(())
    }

    async fn abort_tasks(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.fsm.read().await.state()
    }

    /// Whether the link is up and commands may be sent
    pub async fn is_connected(&self) -> bool {
        self.fsm.read().await.can_send() && self.link.is_connected().await
    }

    /// Identity parsed from the droid's advertisement
    pub fn advertisement(&self) -> &DroidAdvertisement {
        &self.identity
    }

    pub fn personality(&self) -> Personality {
        self.identity.personality
    }

    pub fn affiliation(&self) -> Affiliation {
        self.identity.affiliation
    }

    /// Subscribe to R-unit head motor events
    pub fn subscribe_head_events(&self) -> broadcast::Receiver<MotorEvent> {
        self.notify.subscribe_head_events()
    }

    /// Frame and send a command
    pub async fn send_command(&self, command: CommandId, data: &[u8]) -> Result<()> {
        {
            let fsm = self.fsm.read().await;
            if !fsm.can_send() {
                bail!("Droid is not connected ({:?})", fsm.state());
            }
        }

        let frame = codec::encode_command(command, data)?;
        debug!("Sending command: {}", codec::to_hex(&frame));
        self.link.write(&frame).await
    }

    /// Send a multipurpose sub-command
    pub async fn send_multipurpose(&self, sub: MultipurposeCommand, data: &[u8]) -> Result<()> {
        let payload = codec::multipurpose_payload(sub, data)?;
        self.send_command(CommandId::Multipurpose, &payload).await
    }

    /// Request the firmware blob
    ///
    /// The format of the blob is unknown; a blob different from the known one
    /// is reported as a warning by the notification processor.
    pub async fn firmware_information(&self) -> Result<Vec<u8>> {
        let pending = self
            .notify
            .expect_response(CommandId::FirmwareInformationResponse)
            .await;
        self.send_command(CommandId::RetrieveFirmwareInformation, &[]).await?;

        pending
            .wait(self.config.response_timeout)
            .await
            .ok_or_else(|| anyhow!("Failed to retrieve firmware information. No response given"))
    }

    pub async fn set_pairing_led(&self, on: bool) -> Result<()> {
        self.send_command(CommandId::SetPairingLedState, &led_state_payload(on))
            .await
    }

    /// Onboard RGB LED; no shipped droid has one
    pub async fn set_rgb_led(&self, on: bool) -> Result<()> {
        self.send_command(CommandId::SetRgbLedState, &led_state_payload(on))
            .await
    }

    /// Flash the pairing LED with a raw pattern
    ///
    /// `020001ff01ff0aff00` flashes ten times at one flash per second.
    pub async fn flash_pairing_led(&self, pattern: &[u8]) -> Result<()> {
        self.send_command(CommandId::FlashPairingLed, pattern).await
    }

    /// Enter the disconnecting state; commands are still accepted
    ///
    /// Returns false when the droid was not connected.
    pub async fn begin_disconnect(&self) -> bool {
        let mut fsm = self.fsm.write().await;
        match fsm.state() {
            ConnectionState::Disconnecting => true,
            ConnectionState::Handshaking | ConnectionState::Ready => {
                fsm.process_event(ConnectionEvent::DisconnectRequested);
                true
            }
            _ => false,
        }
    }

    /// Stop the background tasks and close the link
    pub async fn close(&self) -> Result<()> {
        self.begin_disconnect().await;
        info!("Disconnecting from droid");

        self.abort_tasks().await;
        let result = self.link.disconnect().await;

        let mut fsm = self.fsm.write().await;
        if fsm.state() == ConnectionState::Disconnecting {
            fsm.process_event(ConnectionEvent::LinkClosed);
        }
        result
    }
}

impl Drop for DroidConnection {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn send_heartbeat(link: &dyn GattLink) -> Result<()> {
    let frame = codec::encode_command(CommandId::ConnectionHeartbeat, &[])?;
    link.write(&frame).await
}

/// Move to `Disconnected` after an unrequested link loss
async fn mark_link_lost(fsm: &RwLock<ConnectionStateMachine>) {
    let mut fsm = fsm.write().await;
    if fsm.state() != ConnectionState::Disconnected
        && matches!(fsm.process_event(ConnectionEvent::LinkLost), TransitionResult::Success(_))
    {
        info!("[CONN] Link lost");
    }
}

async fn transition(fsm: &RwLock<ConnectionStateMachine>, event: ConnectionEvent) {
    let mut fsm = fsm.write().await;
    let from = fsm.state();
    match fsm.process_event(event) {
        TransitionResult::Success(to) => debug!("[CONN] {:?} -> {:?}", from, to),
        TransitionResult::Invalid { from, event } => {
            warn!("[CONN] Ignoring {:?} in state {:?}", event, from)
        }
    }
}
