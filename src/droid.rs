//! A connected droid with all of its controllers

use crate::command::{AudioController, MotorController, ScriptEngine, VoiceController};
use crate::connection::{ConnectionConfig, DroidConnection};
use crate::transport::LinkConnector;
use anyhow::Result;
use droiddepot_shared::hardware::DroidAdvertisement;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Droid {
    connection: Arc<DroidConnection>,
    pub audio: AudioController,
    pub motor: MotorController,
    pub script: Arc<ScriptEngine>,
    pub voice: VoiceController,
}

impl Droid {
    /// Connect and wire up the controllers
    pub async fn connect<C: LinkConnector>(
        connector: &C,
        identity: DroidAdvertisement,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let connection = Arc::new(DroidConnection::connect(connector, identity, config).await?);
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Arc<DroidConnection>) -> Self {
        let script = Arc::new(ScriptEngine::new(connection.clone()));
        Self {
            audio: AudioController::new(connection.clone()),
            motor: MotorController::new(connection.clone()),
            voice: VoiceController::new(script.clone(), connection.affiliation()),
            script,
            connection,
        }
    }

    pub fn connection(&self) -> &Arc<DroidConnection> {
        &self.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Play the shutdown clip unless `silent`, then close the link
    ///
    /// The link is closed even when the clip fails; the clip error is
    /// returned afterwards.
    pub async fn disconnect(&self, silent: bool) -> Result<()> {
        if !self.connection.begin_disconnect().await {
            return Ok(());
        }

        let shutdown = if silent {
            Ok(())
        } else {
            self.audio.play_shutdown_audio().await
        };
        if let Err(e) = &shutdown {
            warn!("Shutdown audio failed: {}", e);
        }

        self.connection.close().await?;
        info!("Droid disconnected");
        shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::test_connection;
    use droiddepot_shared::state_machine::ConnectionState;

    #[tokio::test]
    async fn test_disconnect_plays_shutdown_audio() {
        let (connection, connector) = test_connection().await;
        let droid = Droid::from_connection(connection);

        droid.disconnect(false).await.unwrap();

        let frames = connector.log().hex_frames();
        assert_eq!(frames, vec!["27420f4444001f06", "27420f4444001801"]);
        assert_eq!(droid.connection().state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_silent_disconnect() {
        let (connection, connector) = test_connection().await;
        let droid = Droid::from_connection(connection);

        droid.disconnect(true).await.unwrap();
        assert!(connector.log().frames().is_empty());
        assert!(!droid.is_connected().await);

        // Second disconnect is a no-op
        droid.disconnect(false).await.unwrap();
        assert!(connector.log().frames().is_empty());
    }

    #[tokio::test]
    async fn test_controllers_share_connection() {
        let (connection, connector) = test_connection().await;
        let droid = Droid::from_connection(connection);

        droid.audio.set_volume(20).await.unwrap();
        droid.script.execute_script(2).await.unwrap();
        droid.motor.stop_head().await.unwrap();

        assert_eq!(connector.log().frames().len(), 3);
    }
}
