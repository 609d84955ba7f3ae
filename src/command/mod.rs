//! Droid controllers built on top of a droid connection
//!
//! This module handles:
//! - Audio playback, volume and head LEDs
//! - Drive and head motors
//! - Script slots and location beacon scripts
//! - Tone based speech animations

mod audio;
mod motor;
mod script;
mod voice;

pub use audio::AudioController;
pub use motor::MotorController;
pub use script::ScriptEngine;
pub use voice::{VoiceController, VoiceTone};

#[cfg(test)]
pub(crate) mod testing {
    use crate::connection::{ConnectionConfig, DroidConnection};
    use crate::transport::MemoryConnector;
    use droiddepot_shared::hardware::DroidAdvertisement;
    use std::sync::Arc;

    /// Connected droid over the memory transport with an empty frame log
    pub async fn test_connection() -> (Arc<DroidConnection>, MemoryConnector) {
        let connector = MemoryConnector::new();
        let config = ConnectionConfig {
            silent: true,
            ..Default::default()
        };
        let connection = DroidConnection::connect(&connector, DroidAdvertisement::default(), config)
            .await
            .unwrap();
        connector.log().clear();
        (Arc::new(connection), connector)
    }
}
