//! Droid Depot Shared Protocol Types
//!
//! This crate provides the wire protocol for talking to Galaxy's Edge Droid
//! Depot droids: command identifiers, the command frame codec, payload
//! builders, hardware lookup tables and park beacon payloads. It performs no
//! I/O so that every byte sent to a droid can be tested in isolation.

pub mod beacon;
pub mod codec;
pub mod hardware;
pub mod payload;
pub mod state_machine;

use uuid::Uuid;

pub use codec::{CodecError, NotifyMessage};
pub use payload::PayloadError;

/// Bluetooth SIG manufacturer identifiers seen in Disney parks
pub mod manufacturer {
    /// Apple iBeacon frames used by park infrastructure
    pub const DISNEY_IBEACON: u16 = 76;

    /// Manufacturer id carried by droids and droid reaction beacons
    pub const DROID: u16 = 387;
}

/// GATT layout exposed by every droid
pub mod gatt {
    use super::Uuid;

    /// Primary droid service
    pub const SERVICE: Uuid = Uuid::from_u128(0x09b600a0_3e42_41fc_b474_e9c0c8f0c801);

    /// Characteristic commands are written to
    pub const COMMAND_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x09b600b1_3e42_41fc_b474_e9c0c8f0c801);

    /// Characteristic the droid notifies responses and events on
    pub const NOTIFY_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x09b600b0_3e42_41fc_b474_e9c0c8f0c801);
}

/// Local name every droid advertises
pub const DROID_DEVICE_NAME: &str = "DROID";

/// Timing parameters for talking to a droid
pub mod timing {
    /// Interval between keep-alive commands
    pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

    /// How long to wait for a notification answering a request
    pub const COMMAND_RESPONSE_TIMEOUT_MS: u64 = 1_000;

    /// Time the pairing animation needs before the droid accepts commands
    pub const PAIRING_ANIMATION_MS: u64 = 4_000;

    /// Upper bound for the link to report connected after connect returns
    pub const CONNECT_SETTLE_TIMEOUT_MS: u64 = 10_000;

    /// Shortest time between two reactions to the same park beacon
    pub const MIN_REACTION_WINDOW_SECS: u64 = 60;

    /// Pause after a beacon reaction so the droid can finish its script
    pub const REACTION_COOLDOWN_MS: u64 = 5_000;

    /// Delay between discovery scans when no droid was found
    pub const DISCOVERY_RESCAN_MS: u64 = 5_000;
}

/// Top level command identifiers understood by the droid firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    RetrieveFirmwareInformation = 1,
    SetPairingLedState = 2,
    SetRgbLedState = 3,
    FlashPairingLed = 4,
    SetMotorSpeed = 5,
    ScriptWrite = 6,
    ScriptAction = 12,
    ScriptDelay = 13,
    ConnectionHeartbeat = 14,
    Multipurpose = 15,

    // Droid -> host
    RUnitHeadEvent = 128,
    FirmwareInformationResponse = 129,
}

impl CommandId {
    /// Raw wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::RetrieveFirmwareInformation,
            2 => Self::SetPairingLedState,
            3 => Self::SetRgbLedState,
            4 => Self::FlashPairingLed,
            5 => Self::SetMotorSpeed,
            6 => Self::ScriptWrite,
            12 => Self::ScriptAction,
            13 => Self::ScriptDelay,
            14 => Self::ConnectionHeartbeat,
            15 => Self::Multipurpose,
            128 => Self::RUnitHeadEvent,
            129 => Self::FirmwareInformationResponse,
            other => return Err(other),
        })
    }
}

/// Sub commands carried inside [`CommandId::Multipurpose`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MultipurposeCommand {
    Audio = 0,
    CenterRUnitHead = 1,
    RotateRUnitHead = 2,
    RotateRUnitHeadWithoutRamp = 3,
    RotateBUnitHead = 4,
    DriveBUnit = 5,
}

/// A droid's allegiance, used for park reactions and voice selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Affiliation {
    #[default]
    Scoundrel = 1,
    Resistance = 5,
    FirstOrder = 9,
}

impl Affiliation {
    /// Map a raw advertisement value, falling back to Scoundrel
    pub fn from_raw(value: u8) -> Self {
        match value {
            5 => Self::Resistance,
            9 => Self::FirstOrder,
            _ => Self::Scoundrel,
        }
    }
}

impl std::fmt::Display for Affiliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Affiliation::Scoundrel => write!(f, "Scoundrel"),
            Affiliation::Resistance => write!(f, "Resistance"),
            Affiliation::FirstOrder => write!(f, "First Order"),
        }
    }
}
