//! Droid hardware knowledge: personalities, audio banks, LEDs and firmware

use crate::Affiliation;

/// Firmware information blob returned by every droid tested so far
pub const EXPECTED_FIRMWARE: [u8; 12] = [
    0x4b, 0x10, 0x01, 0x44, 0x44, 0x11, 0x11, 0x01, 0x00, 0x00, 0x00, 0x00,
];

/// Audio banks stored on a droid or its personality chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AudioBank {
    GeneralUse = 1,
    DroidDepot = 2,
    Resistance = 3,
    Unknown = 4,
    DroidDetector = 5,
    DokOndars = 6,
    FirstOrder = 7,
    InitialActivation = 8,
    MotorSound = 9,
    Empty = 10,
    BlasterAccessory = 11,
    ThrusterAccessory = 12,
}

impl AudioBank {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => Self::GeneralUse,
            2 => Self::DroidDepot,
            3 => Self::Resistance,
            4 => Self::Unknown,
            5 => Self::DroidDetector,
            6 => Self::DokOndars,
            7 => Self::FirstOrder,
            8 => Self::InitialActivation,
            9 => Self::MotorSound,
            10 => Self::Empty,
            11 => Self::BlasterAccessory,
            12 => Self::ThrusterAccessory,
            _ => return None,
        })
    }
}

/// Banks holding conversational audio
pub const TALKING_BANKS: [AudioBank; 5] = [
    AudioBank::DroidDepot,
    AudioBank::Resistance,
    AudioBank::Unknown,
    AudioBank::DokOndars,
    AudioBank::FirstOrder,
];

/// Personality of a droid: either the droid body itself or an inserted chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Personality(pub u8);

impl Personality {
    // Droids
    pub const B_UNIT: Self = Self(1);
    pub const R_UNIT: Self = Self(2);
    pub const CB23: Self = Self(9);
    pub const C1_10P: Self = Self(11);
    pub const DO: Self = Self(12);
    pub const BB_UNIT: Self = Self(14);

    // Personality chips
    pub const BLUE: Self = Self(3);
    pub const GRAY: Self = Self(4);
    pub const RED: Self = Self(5);
    pub const ORANGE: Self = Self(6);
    pub const PURPLE: Self = Self(7);
    pub const BLACK: Self = Self(8);
    pub const YELLOW: Self = Self(10);
    /// Shares its id with C1-10P; lookups resolve to C1-10P
    pub const RED2: Self = Self(11);
    pub const DARK_BLUE: Self = Self(13);

    /// Resolve the effective personality from the droid and an optional chip
    pub fn resolve(droid: Personality, chip: Option<Personality>) -> Personality {
        chip.unwrap_or(droid)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "BD unit",
            2 => "R unit",
            3 => "Blue chip",
            4 => "Gray chip",
            5 => "Red chip",
            6 => "Orange chip",
            7 => "Purple chip",
            8 => "Black chip",
            9 => "CB-23",
            10 => "Yellow chip",
            11 => "C1-10P",
            12 => "D-O",
            13 => "Dark blue chip",
            14 => "BB unit",
            _ => "unknown",
        }
    }

    /// Affiliation implied by this personality
    pub fn affiliation(self) -> Affiliation {
        match self.0 {
            1 | 3 | 6 | 10 | 11 | 12 => Affiliation::Resistance,
            5 | 8 => Affiliation::FirstOrder,
            _ => Affiliation::Scoundrel,
        }
    }

    /// `(bank, sound)` played when the droid is put to sleep
    pub fn shutdown_track(self) -> (AudioBank, u8) {
        let sound = match self.0 {
            3 | 5 | 2 => 2,
            4 => 4,
            6 | 14 => 3,
            _ => 1,
        };
        (AudioBank::FirstOrder, sound)
    }

    /// Number of clips available in `bank` for this personality
    pub fn clips_in_bank(self, bank: AudioBank) -> u8 {
        let Some(column) = AUDIO_COLUMNS.iter().position(|p| *p == self.0) else {
            return 0;
        };
        AUDIO_CLIP_COUNT[bank.id() as usize - 1][column]
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Personality ids in [`AUDIO_CLIP_COUNT`] column order
const AUDIO_COLUMNS: [u8; 13] = [3, 4, 5, 6, 7, 8, 9, 11, 10, 13, 1, 2, 14];

/// Clip counts per bank (row, bank id - 1) and personality (column)
const AUDIO_CLIP_COUNT: [[u8; 13]; 12] = [
    [5, 4, 5, 5, 4, 3, 5, 6, 4, 4, 5, 4, 5],
    [5, 5, 5, 5, 4, 6, 5, 13, 5, 4, 6, 4, 3],
    [5, 5, 5, 5, 5, 5, 5, 5, 5, 4, 6, 3, 3],
    [1; 13],
    [1; 13],
    [5, 3, 3, 3, 4, 5, 5, 6, 5, 4, 5, 4, 5],
    [3, 5, 3, 3, 5, 3, 5, 6, 5, 5, 5, 5, 5],
    [1; 13],
    [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 0],
    [0; 13],
    [2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 0, 2, 0],
    [2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 0, 2, 0],
];

/// LED identifiers
pub mod led {
    // R and C units (bit mask)
    pub const R_UNIT_LEFT_HEAD: u8 = 1;
    pub const R_UNIT_MIDDLE_HEAD: u8 = 2;
    pub const R_UNIT_RIGHT_HEAD: u8 = 4;
    pub const R_UNIT_LEFT_ACCESSORY: u8 = 8;
    pub const R_UNIT_RIGHT_ACCESSORY: u8 = 16;
    pub const R_UNIT_ALL: u8 = 31;

    // BB units
    pub const BB_UNIT_HEAD: u8 = 1;

    // BD units. Head LEDs are RGB: base is blue, base + 1 green, base + 2 red
    pub const BD_UNIT_LED_0: u8 = 0;
    pub const BD_UNIT_LED_1: u8 = 3;
    pub const BD_UNIT_LED_2: u8 = 6;
    pub const BD_UNIT_LED_3: u8 = 9;
    pub const BD_UNIT_LEFT_EYE: u8 = 12;
    pub const BD_UNIT_RIGHT_EYE: u8 = 13;
}

/// Identity a droid advertises in its Disney manufacturer data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroidAdvertisement {
    pub personality: Personality,
    pub affiliation: Affiliation,
    pub raw: Vec<u8>,
}

impl DroidAdvertisement {
    /// Parse the manufacturer data, returning `None` if it is too short
    ///
    /// The last byte is the personality id; the one before it encodes the
    /// affiliation as `0x80 + affiliation * 2`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let len = data.len();
        if len < 2 {
            return None;
        }

        let affiliation = data[len - 2].checked_sub(0x80).map(|v| v / 2).unwrap_or_default();

        Some(Self {
            personality: Personality(data[len - 1]),
            affiliation: Affiliation::from_raw(affiliation),
            raw: data.to_vec(),
        })
    }
}

impl Default for DroidAdvertisement {
    fn default() -> Self {
        Self {
            personality: Personality::R_UNIT,
            affiliation: Affiliation::Scoundrel,
            raw: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_counts() {
        assert_eq!(Personality::C1_10P.clips_in_bank(AudioBank::DroidDepot), 13);
        assert_eq!(Personality::R_UNIT.clips_in_bank(AudioBank::Resistance), 3);
        assert_eq!(Personality::B_UNIT.clips_in_bank(AudioBank::BlasterAccessory), 0);
        assert_eq!(Personality::GRAY.clips_in_bank(AudioBank::GeneralUse), 4);
        assert_eq!(Personality::DO.clips_in_bank(AudioBank::GeneralUse), 0);
        assert_eq!(Personality::BLUE.clips_in_bank(AudioBank::Empty), 0);
    }

    #[test]
    fn test_affiliation_table() {
        assert_eq!(Personality::BLUE.affiliation(), Affiliation::Resistance);
        assert_eq!(Personality::BLACK.affiliation(), Affiliation::FirstOrder);
        assert_eq!(Personality::R_UNIT.affiliation(), Affiliation::Scoundrel);
        assert_eq!(Personality::RED2.affiliation(), Affiliation::Resistance);
        assert_eq!(Personality(200).affiliation(), Affiliation::Scoundrel);
    }

    #[test]
    fn test_shutdown_track() {
        assert_eq!(Personality::GRAY.shutdown_track(), (AudioBank::FirstOrder, 4));
        assert_eq!(Personality::R_UNIT.shutdown_track(), (AudioBank::FirstOrder, 2));
        assert_eq!(Personality::BB_UNIT.shutdown_track(), (AudioBank::FirstOrder, 3));
        assert_eq!(Personality(99).shutdown_track(), (AudioBank::FirstOrder, 1));
    }

    #[test]
    fn test_resolve_personality() {
        assert_eq!(Personality::resolve(Personality::R_UNIT, None), Personality::R_UNIT);
        assert_eq!(
            Personality::resolve(Personality::R_UNIT, Some(Personality::BLUE)),
            Personality::BLUE
        );
    }

    #[test]
    fn test_parse_advertisement() {
        let adv = DroidAdvertisement::parse(&[0x03, 0x04, 0x44, 0x81, 0x8a, 0x02]).unwrap();
        assert_eq!(adv.personality, Personality::R_UNIT);
        assert_eq!(adv.affiliation, Affiliation::Resistance);

        let adv = DroidAdvertisement::parse(&[0x92, 0x01]).unwrap();
        assert_eq!(adv.affiliation, Affiliation::FirstOrder);
        assert_eq!(adv.personality, Personality::B_UNIT);

        assert!(DroidAdvertisement::parse(&[0x01]).is_none());
    }

    #[test]
    fn test_bank_ids() {
        assert_eq!(AudioBank::from_id(7), Some(AudioBank::FirstOrder));
        assert_eq!(AudioBank::from_id(13), None);
        assert!(TALKING_BANKS.contains(&AudioBank::DokOndars));
    }
}
