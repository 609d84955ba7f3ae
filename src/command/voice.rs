//! Voice controller: speech animations picked by tone and affiliation

use crate::command::ScriptEngine;
use anyhow::Result;
use droiddepot_shared::hardware::{AudioBank, TALKING_BANKS};
use droiddepot_shared::Affiliation;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Emotional tone of a spoken line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTone {
    Friendly,
    Indifferent,
    Upset,
}

impl std::str::FromStr for VoiceTone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "friendly" | "1" => Ok(Self::Friendly),
            "indifferent" | "2" => Ok(Self::Indifferent),
            "upset" | "3" => Ok(Self::Upset),
            other => Err(format!("unknown tone '{}'", other)),
        }
    }
}

/// Bank a droid of this affiliation speaks from when friendly
pub fn friendly_bank<R: Rng + ?Sized>(affiliation: Affiliation, rng: &mut R) -> AudioBank {
    match affiliation {
        Affiliation::Resistance => AudioBank::Resistance,
        Affiliation::FirstOrder => AudioBank::FirstOrder,
        Affiliation::Scoundrel => indifferent_bank(affiliation, rng),
    }
}

/// Bank a droid of this affiliation speaks from when upset
pub fn upset_bank<R: Rng + ?Sized>(affiliation: Affiliation, rng: &mut R) -> AudioBank {
    match affiliation {
        Affiliation::Resistance => AudioBank::FirstOrder,
        Affiliation::FirstOrder => AudioBank::Resistance,
        Affiliation::Scoundrel => indifferent_bank(affiliation, rng),
    }
}

/// Random talking bank, never the opposing side's bank
pub fn indifferent_bank<R: Rng + ?Sized>(affiliation: Affiliation, rng: &mut R) -> AudioBank {
    let excluded = match affiliation {
        Affiliation::Resistance => Some(AudioBank::FirstOrder),
        Affiliation::FirstOrder => Some(AudioBank::Resistance),
        Affiliation::Scoundrel => None,
    };

    let options: Vec<AudioBank> = TALKING_BANKS
        .iter()
        .copied()
        .filter(|bank| Some(*bank) != excluded)
        .collect();

    options
        .choose(rng)
        .copied()
        .unwrap_or(AudioBank::DroidDepot)
}

pub struct VoiceController {
    scripts: Arc<ScriptEngine>,
    affiliation: Affiliation,
}

impl VoiceController {
    pub fn new(scripts: Arc<ScriptEngine>, affiliation: Affiliation) -> Self {
        Self {
            scripts,
            affiliation,
        }
    }

    /// Bank used for a tone
    pub fn bank_for(&self, tone: VoiceTone) -> AudioBank {
        let mut rng = rand::thread_rng();
        match tone {
            VoiceTone::Friendly => friendly_bank(self.affiliation, &mut rng),
            VoiceTone::Indifferent => indifferent_bank(self.affiliation, &mut rng),
            VoiceTone::Upset => upset_bank(self.affiliation, &mut rng),
        }
    }

    /// Talk with the matching head and body animation
    ///
    /// The park response scripts share their ids with the talking banks.
    pub async fn talk(&self, tone: VoiceTone) -> Result<()> {
        let bank = self.bank_for(tone);
        debug!("[VOICE] {:?} line from {:?}", tone, bank);
        self.scripts.execute_script(bank.id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::test_connection;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_affiliated_banks() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(friendly_bank(Affiliation::Resistance, &mut rng), AudioBank::Resistance);
        assert_eq!(upset_bank(Affiliation::Resistance, &mut rng), AudioBank::FirstOrder);
        assert_eq!(friendly_bank(Affiliation::FirstOrder, &mut rng), AudioBank::FirstOrder);
        assert_eq!(upset_bank(Affiliation::FirstOrder, &mut rng), AudioBank::Resistance);
    }

    #[test]
    fn test_indifferent_never_picks_opposing_bank() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let bank = indifferent_bank(Affiliation::Resistance, &mut rng);
            assert_ne!(bank, AudioBank::FirstOrder);
            assert!(TALKING_BANKS.contains(&bank));

            let bank = indifferent_bank(Affiliation::FirstOrder, &mut rng);
            assert_ne!(bank, AudioBank::Resistance);
        }
    }

    #[test]
    fn test_tone_parsing() {
        assert_eq!("Friendly".parse::<VoiceTone>(), Ok(VoiceTone::Friendly));
        assert_eq!("3".parse::<VoiceTone>(), Ok(VoiceTone::Upset));
        assert!("grumpy".parse::<VoiceTone>().is_err());
    }

    #[tokio::test]
    async fn test_talk_runs_bank_script() {
        let (connection, connector) = test_connection().await;
        let scripts = Arc::new(ScriptEngine::new(connection));
        let voice = VoiceController::new(scripts, Affiliation::FirstOrder);

        voice.talk(VoiceTone::Friendly).await.unwrap();

        assert_eq!(connector.log().hex_frames(), vec!["25000c420702"]);
    }
}
