//! Motor controller for the drive motors and the R-unit head

use crate::connection::{DroidConnection, MotorEvent};
use anyhow::Result;
use droiddepot_shared::payload::{
    center_head_payload, motor_speed_payload, HeadDirection, Motor, MotorDirection,
    DEFAULT_RAMP,
};
use droiddepot_shared::{CommandId, MultipurposeCommand};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

pub struct MotorController {
    connection: Arc<DroidConnection>,
}

impl MotorController {
    pub fn new(connection: Arc<DroidConnection>) -> Self {
        Self { connection }
    }

    /// Drive a single motor
    ///
    /// `ramp` is the time in milliseconds to reach `speed`; `delay` holds
    /// the command before it takes effect.
    pub async fn send_motor_speed(
        &self,
        direction: MotorDirection,
        motor: Motor,
        speed: u8,
        ramp: u16,
        delay: u16,
    ) -> Result<()> {
        debug!("[MOTOR] {:?} {:?} speed={} ramp={}", motor, direction, speed, ramp);
        let payload = motor_speed_payload(direction.nibble(), motor, speed, ramp, delay)?;
        self.connection
            .send_command(CommandId::SetMotorSpeed, &payload)
            .await
    }

    /// Drive both wheels in the same direction
    pub async fn set_movement_speed(
        &self,
        direction: MotorDirection,
        speed: u8,
        ramp: u16,
    ) -> Result<()> {
        self.send_motor_speed(direction, Motor::Left, speed, ramp, 0)
            .await?;
        self.send_motor_speed(direction, Motor::Right, speed, ramp, 0)
            .await
    }

    /// Stop both wheels
    pub async fn stop(&self) -> Result<()> {
        self.set_movement_speed(MotorDirection::Forward, 0, DEFAULT_RAMP)
            .await
    }

    pub async fn rotate_head(&self, direction: HeadDirection, speed: u8, ramp: u16) -> Result<()> {
        let payload = motor_speed_payload(direction.nibble(), Motor::Head, speed, ramp, 0)?;
        self.connection
            .send_command(CommandId::SetMotorSpeed, &payload)
            .await
    }

    pub async fn stop_head(&self) -> Result<()> {
        self.rotate_head(HeadDirection::Left, 0, DEFAULT_RAMP).await
    }

    /// Return the R-unit head to its center position
    pub async fn center_head(&self, speed: u8, offset: u8) -> Result<()> {
        self.connection
            .send_multipurpose(
                MultipurposeCommand::CenterRUnitHead,
                &center_head_payload(speed, offset),
            )
            .await
    }

    /// Head motor events, for R-units only
    pub fn subscribe_head_events(&self) -> broadcast::Receiver<MotorEvent> {
        self.connection.subscribe_head_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::test_connection;
    use droiddepot_shared::payload::{DEFAULT_CENTER_SPEED, DEFAULT_DRIVE_SPEED, DEFAULT_MOTOR_SPEED};

    #[tokio::test]
    async fn test_movement_drives_both_wheels() {
        let (connection, connector) = test_connection().await;
        let motor = MotorController::new(connection);

        motor
            .set_movement_speed(MotorDirection::Backward, DEFAULT_DRIVE_SPEED, DEFAULT_RAMP)
            .await
            .unwrap();

        assert_eq!(
            connector.log().hex_frames(),
            vec!["290005468064012c0000", "290005468164012c0000"]
        );
    }

    #[tokio::test]
    async fn test_delay_is_big_endian() {
        let (connection, connector) = test_connection().await;
        let motor = MotorController::new(connection);

        motor
            .send_motor_speed(MotorDirection::Forward, Motor::Left, 100, 300, 1000)
            .await
            .unwrap();

        assert_eq!(connector.log().hex_frames(), vec!["290005460064012c03e8"]);
    }

    #[tokio::test]
    async fn test_head_rotation() {
        let (connection, connector) = test_connection().await;
        let motor = MotorController::new(connection);

        motor
            .rotate_head(HeadDirection::Right, DEFAULT_MOTOR_SPEED, DEFAULT_RAMP)
            .await
            .unwrap();
        motor.stop_head().await.unwrap();
        motor.center_head(DEFAULT_CENTER_SPEED, 0).await.unwrap();

        assert_eq!(
            connector.log().hex_frames(),
            vec![
                "2900054682a0012c0000",
                "290005460200012c0000",
                "27420f444401ff00",
            ]
        );
    }

    #[tokio::test]
    async fn test_head_events_reach_subscribers() {
        let (connection, connector) = test_connection().await;
        let motor = MotorController::new(connection);
        let mut events = motor.subscribe_head_events();

        let packet = droiddepot_shared::codec::from_hex("250080400082").unwrap();
        connector.notifier().unwrap().send(packet).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), MotorEvent::MotorStopped);
    }
}
