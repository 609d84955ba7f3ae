//! Script engine for the droid's onboard script slots

use crate::connection::DroidConnection;
use anyhow::Result;
use droiddepot_shared::beacon::LocationBeacon;
use droiddepot_shared::payload::{script_payload, ScriptAction};
use droiddepot_shared::CommandId;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ScriptEngine {
    connection: Arc<DroidConnection>,
}

impl ScriptEngine {
    pub fn new(connection: Arc<DroidConnection>) -> Self {
        Self { connection }
    }

    /// Send a script action after validating the slot
    pub async fn send_script_command(&self, script_id: u8, action: ScriptAction) -> Result<()> {
        let payload = script_payload(script_id, action)?;
        debug!("[SCRIPT] {:?} script {}", action, script_id);
        self.connection
            .send_command(CommandId::ScriptAction, &payload)
            .await
    }

    pub async fn execute_script(&self, script_id: u8) -> Result<()> {
        self.send_script_command(script_id, ScriptAction::Execute)
            .await
    }

    /// Open a user script slot for writing; factory slots are refused
    pub async fn open_script(&self, script_id: u8) -> Result<()> {
        self.send_script_command(script_id, ScriptAction::Open)
            .await
    }

    /// Close a script slot, 0 closes whatever is open
    pub async fn close_script(&self, script_id: u8) -> Result<()> {
        self.send_script_command(script_id, ScriptAction::Close)
            .await
    }

    /// Run the script a park location beacon would trigger
    pub async fn execute_location_beacon(&self, payload: &str) -> Result<()> {
        let beacon = LocationBeacon::from_hex(payload)?;
        info!(
            "[SCRIPT] Location beacon {} runs script {}",
            payload, beacon.script_id
        );
        self.execute_script(beacon.script_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::test_connection;

    #[tokio::test]
    async fn test_execute_script() {
        let (connection, connector) = test_connection().await;
        let scripts = ScriptEngine::new(connection);

        scripts.execute_script(11).await.unwrap();
        scripts.execute_script(5).await.unwrap();

        assert_eq!(
            connector.log().hex_frames(),
            vec!["25000c421102", "25000c420502"]
        );
    }

    #[tokio::test]
    async fn test_script_guards() {
        let (connection, connector) = test_connection().await;
        let scripts = ScriptEngine::new(connection);

        assert!(scripts.execute_script(0).await.is_err());
        assert!(scripts.execute_script(13).await.is_err());
        assert!(scripts.open_script(0).await.is_err());
        assert!(scripts.open_script(7).await.is_err());
        assert!(connector.log().frames().is_empty());

        scripts.open_script(18).await.unwrap();
        scripts.close_script(0).await.unwrap();
        assert_eq!(
            connector.log().hex_frames(),
            vec!["25000c421800", "25000c420001"]
        );
    }

    #[tokio::test]
    async fn test_location_beacon() {
        let (connection, connector) = test_connection().await;
        let scripts = ScriptEngine::new(connection);

        scripts.execute_location_beacon("0A040302A601").await.unwrap();
        assert_eq!(connector.log().hex_frames(), vec!["25000c420302"]);

        assert!(scripts.execute_location_beacon("0B0403").await.is_err());
    }
}
