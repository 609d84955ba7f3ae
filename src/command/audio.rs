//! Audio controller: sound banks, playback, volume and head LEDs

use crate::connection::DroidConnection;
use anyhow::{bail, Result};
use droiddepot_shared::hardware::{led, AudioBank};
use droiddepot_shared::payload::{audio_payload, volume_payload, AudioCommand};
use droiddepot_shared::MultipurposeCommand;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct AudioState {
    /// Last bank selected, 1-based
    selected_bank: Option<u8>,
    disabled_leds: BTreeSet<u8>,
    lit_leds: BTreeSet<u8>,
}

/// Controls the droid's speaker and the LEDs wired to the audio board
pub struct AudioController {
    connection: Arc<DroidConnection>,
    state: RwLock<AudioState>,
}

impl AudioController {
    pub fn new(connection: Arc<DroidConnection>) -> Self {
        Self {
            connection,
            state: RwLock::new(AudioState::default()),
        }
    }

    /// Send a raw audio sub-command
    pub async fn execute(&self, command: AudioCommand, argument: u8) -> Result<()> {
        debug!("[AUDIO] {:?} {:#04x}", command, argument);
        self.connection
            .send_multipurpose(MultipurposeCommand::Audio, &audio_payload(command, argument))
            .await
    }

    /// Play a clip
    ///
    /// Sound and bank ids are 1-based. A sound plays that clip from the bank,
    /// otherwise `cycle` steps through the selected bank, otherwise the bank
    /// plays a clip of its own choosing.
    pub async fn play_audio(
        &self,
        sound: Option<u8>,
        bank: Option<u8>,
        cycle: bool,
        volume: Option<u8>,
    ) -> Result<()> {
        if let Some(level) = volume {
            self.set_volume(level).await?;
        }

        if let Some(bank) = bank {
            let current = self.state.read().await.selected_bank;
            if current != Some(bank) {
                self.set_audio_bank(bank).await?;
            }
        }

        if let Some(sound) = sound {
            if sound == 0 {
                bail!("Sound ids start at 1");
            }
            self.execute(AudioCommand::PlayAudioFromSelectedGroup, sound - 1)
                .await
        } else if cycle {
            self.execute(AudioCommand::CycleAudioFromSelectedGroup, 0)
                .await
        } else {
            let group = bank.map(|b| b.saturating_sub(1)).unwrap_or(0);
            self.execute(AudioCommand::PlayAudioFromGroupByValue, group)
                .await
        }
    }

    /// Play the personality specific shutdown clip
    pub async fn play_shutdown_audio(&self) -> Result<()> {
        let (bank, sound) = self.connection.personality().shutdown_track();
        info!("[AUDIO] Playing shutdown audio");
        self.play_audio(Some(sound), Some(bank.id()), true, None)
            .await
    }

    /// Select a sound bank, 1-based
    pub async fn set_audio_bank(&self, bank: u8) -> Result<()> {
        if AudioBank::from_id(bank).is_none() {
            bail!("Unknown audio bank {}", bank);
        }

        self.execute(AudioCommand::SetSelectedSoundBank, bank - 1)
            .await?;
        self.state.write().await.selected_bank = Some(bank);
        Ok(())
    }

    /// Bank selected by the last successful [`Self::set_audio_bank`]
    pub async fn selected_bank(&self) -> Option<u8> {
        self.state.read().await.selected_bank
    }

    pub async fn set_volume(&self, level: u8) -> Result<()> {
        let payload = volume_payload(level)?;
        self.connection
            .send_multipurpose(MultipurposeCommand::Audio, &payload)
            .await
    }

    /// Number of clips this droid has in a bank
    pub fn available_clips(&self, bank: AudioBank) -> u8 {
        self.connection.personality().clips_in_bank(bank)
    }

    /// Re-enable every R-unit head LED
    pub async fn reset_head_leds(&self) -> Result<()> {
        self.enable_head_led(led::R_UNIT_ALL).await
    }

    pub async fn disable_head_led(&self, led: u8) -> Result<()> {
        self.execute(AudioCommand::DisableHeadLeds, led).await?;
        self.state.write().await.disabled_leds.insert(led);
        Ok(())
    }

    pub async fn enable_head_led(&self, led: u8) -> Result<()> {
        self.execute(AudioCommand::EnableHeadLeds, led).await?;
        let mut state = self.state.write().await;
        if led == led::R_UNIT_ALL {
            state.disabled_leds.clear();
        } else {
            state.disabled_leds.remove(&led);
        }
        Ok(())
    }

    pub async fn turn_on_led(&self, led: u8) -> Result<()> {
        self.execute(AudioCommand::SetLedOn, led).await?;
        self.state.write().await.lit_leds.insert(led);
        Ok(())
    }

    pub async fn turn_off_led(&self, led: u8) -> Result<()> {
        self.execute(AudioCommand::SetLedOff, led).await?;
        self.state.write().await.lit_leds.remove(&led);
        Ok(())
    }

    /// LEDs disabled and not re-enabled since
    pub async fn disabled_leds(&self) -> Vec<u8> {
        self.state.read().await.disabled_leds.iter().copied().collect()
    }

    /// LEDs currently switched on
    pub async fn lit_leds(&self) -> Vec<u8> {
        self.state.read().await.lit_leds.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::transport::memory::FrameLog;
    use crate::transport::MemoryConnector;
    use droiddepot_shared::hardware::{DroidAdvertisement, Personality};

    async fn controller(personality: Personality) -> (AudioController, FrameLog) {
        let connector = MemoryConnector::new();
        let identity = DroidAdvertisement {
            personality,
            ..Default::default()
        };
        let config = ConnectionConfig {
            silent: true,
            ..Default::default()
        };
        let connection = DroidConnection::connect(&connector, identity, config)
            .await
            .unwrap();
        let log = connector.log();
        log.clear();
        (AudioController::new(Arc::new(connection)), log)
    }

    #[tokio::test]
    async fn test_play_sound_from_bank() {
        let (audio, log) = controller(Personality::R_UNIT).await;

        audio.play_audio(Some(3), Some(2), false, None).await.unwrap();

        assert_eq!(
            log.hex_frames(),
            vec!["27420f4444001f01", "27420f4444001802"]
        );
    }

    #[tokio::test]
    async fn test_bank_only_switched_when_different() {
        let (audio, log) = controller(Personality::R_UNIT).await;

        audio.play_audio(None, Some(4), false, None).await.unwrap();
        audio.play_audio(None, Some(4), false, None).await.unwrap();

        let frames = log.hex_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], "27420f4444001f03");
        assert_eq!(frames[1], "27420f4444001003");
        assert_eq!(frames[2], "27420f4444001003");
        assert_eq!(audio.selected_bank().await, Some(4));
    }

    #[tokio::test]
    async fn test_cycle_with_volume() {
        let (audio, log) = controller(Personality::R_UNIT).await;

        audio.play_audio(None, None, true, Some(20)).await.unwrap();

        assert_eq!(log.hex_frames(), vec!["27420f4444000e14", "27420f4444001c00"]);
    }

    #[tokio::test]
    async fn test_volume_limit() {
        let (audio, log) = controller(Personality::R_UNIT).await;

        assert!(audio.set_volume(101).await.is_err());
        assert!(log.frames().is_empty());
        audio.set_volume(100).await.unwrap();
        assert_eq!(log.hex_frames(), vec!["27420f4444000e64"]);
    }

    #[tokio::test]
    async fn test_shutdown_audio() {
        let (audio, log) = controller(Personality::R_UNIT).await;

        audio.play_shutdown_audio().await.unwrap();

        let frames = log.hex_frames();
        assert_eq!(frames[0], "27420f4444001f06");
        assert_eq!(frames[1], "27420f4444001801");
    }

    #[tokio::test]
    async fn test_led_tracking() {
        let (audio, _log) = controller(Personality::R_UNIT).await;

        audio.disable_head_led(led::R_UNIT_LEFT_HEAD).await.unwrap();
        audio.disable_head_led(led::R_UNIT_RIGHT_HEAD).await.unwrap();
        audio.enable_head_led(led::R_UNIT_LEFT_HEAD).await.unwrap();
        assert_eq!(audio.disabled_leds().await, vec![led::R_UNIT_RIGHT_HEAD]);

        audio.reset_head_leds().await.unwrap();
        assert!(audio.disabled_leds().await.is_empty());

        audio.turn_on_led(led::R_UNIT_LEFT_ACCESSORY).await.unwrap();
        audio.turn_on_led(led::R_UNIT_RIGHT_ACCESSORY).await.unwrap();
        audio.turn_off_led(led::R_UNIT_LEFT_ACCESSORY).await.unwrap();
        assert_eq!(audio.lit_leds().await, vec![led::R_UNIT_RIGHT_ACCESSORY]);
    }

    #[tokio::test]
    async fn test_invalid_ids() {
        let (audio, _log) = controller(Personality::R_UNIT).await;

        assert!(audio.set_audio_bank(0).await.is_err());
        assert!(audio.set_audio_bank(13).await.is_err());
        assert!(audio.play_audio(Some(0), None, false, None).await.is_err());
    }

    #[tokio::test]
    async fn test_available_clips_follow_personality() {
        let (audio, _log) = controller(Personality::R_UNIT).await;

        assert_eq!(audio.available_clips(AudioBank::Empty), 0);
        assert_eq!(audio.available_clips(AudioBank::GeneralUse), 4);
    }
}
