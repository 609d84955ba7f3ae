//! Payload builders for the high level droid commands
//!
//! Each builder validates its arguments and returns the bytes that follow the
//! frame header. Multipurpose builders return the sub command data, to be
//! wrapped with [`crate::codec::encode_multipurpose`].

use thiserror::Error;

use crate::codec::{bcd, CodecError};

/// Default motor speed for single motor commands
pub const DEFAULT_MOTOR_SPEED: u8 = 160;

/// Default speed when driving both wheels
pub const DEFAULT_DRIVE_SPEED: u8 = 100;

/// Default ramp applied to motor speed changes
pub const DEFAULT_RAMP: u16 = 300;

/// Default speed used to re-center an R-unit head
pub const DEFAULT_CENTER_SPEED: u8 = 255;

/// Highest accepted volume level
pub const MAX_VOLUME: u8 = 100;

/// Errors raised while building a payload
#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid script id {0}. Script ids must be larger than 0")]
    InvalidScriptId(u8),

    #[error("Script {0} is a factory test script. Execution denied")]
    DangerousScript(u8),

    #[error("Script {0} is programmed by Disney and cannot be rewritten")]
    ProtectedScript(u8),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Sub commands of the audio controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioCommand {
    RetrieveDroidType = 0x01,
    RetrievePersonalityChip = 0x08,
    RetrieveAffiliation = 0x0a,
    SetVolume = 0x0e,
    Unknown1 = 0x0f,
    PlayAudioFromGroupByValue = 0x10,
    PlayAudioFromGroupByValueWithoutLeds = 0x11,
    PlayAudioFromSelectedGroup = 0x18,
    CycleAudioFromSelectedGroup = 0x1c,
    SetSelectedSoundBank = 0x1f,
    LoopSoundBank = 0x21,
    Unknown2 = 0x42,
    Unknown3 = 0x44,
    FlashHeadLeds = 0x45,
    SetLedOn = 0x48,
    SetLedOff = 0x49,
    DisableHeadLeds = 0x4a,
    EnableHeadLeds = 0x4b,
}

impl TryFrom<u8> for AudioCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use AudioCommand::*;
        [
            RetrieveDroidType,
            RetrievePersonalityChip,
            RetrieveAffiliation,
            SetVolume,
            Unknown1,
            PlayAudioFromGroupByValue,
            PlayAudioFromGroupByValueWithoutLeds,
            PlayAudioFromSelectedGroup,
            CycleAudioFromSelectedGroup,
            SetSelectedSoundBank,
            LoopSoundBank,
            Unknown2,
            Unknown3,
            FlashHeadLeds,
            SetLedOn,
            SetLedOff,
            DisableHeadLeds,
            EnableHeadLeds,
        ]
        .into_iter()
        .find(|command| *command as u8 == value)
        .ok_or(value)
    }
}

/// Audio controller payload: `[command, argument]`
pub fn audio_payload(command: AudioCommand, argument: u8) -> Vec<u8> {
    vec![command as u8, argument]
}

/// Volume payload, level in `0..=100`
pub fn volume_payload(level: u8) -> Result<Vec<u8>, PayloadError> {
    if level > MAX_VOLUME {
        return Err(PayloadError::InvalidArgument(format!(
            "volume {} is outside 0..={}",
            level, MAX_VOLUME
        )));
    }
    Ok(audio_payload(AudioCommand::SetVolume, level))
}

/// On/off payload shared by the pairing and RGB LED commands
pub fn led_state_payload(on: bool) -> Vec<u8> {
    vec![0x00, if on { 0xff } else { 0x00 }]
}

/// Motors addressable with [`crate::CommandId::SetMotorSpeed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Motor {
    Left = 0,
    Right = 1,
    Head = 2,
}

/// Drive direction for the wheel motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Backward,
}

impl MotorDirection {
    /// High nibble of the motor select byte
    pub fn nibble(self) -> u8 {
        match self {
            Self::Forward => 0,
            Self::Backward => 8,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Rotation direction for the head motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadDirection {
    Left,
    Right,
}

impl HeadDirection {
    /// High nibble of the motor select byte
    pub fn nibble(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Right => 8,
        }
    }
}

/// Motor speed payload
///
/// ```text
/// [ direction << 4 | motor ][ speed ][ ramp (u16 BE) ][ delay (u16 BE) ]
/// ```
pub fn motor_speed_payload(
    direction: u8,
    motor: Motor,
    speed: u8,
    ramp: u16,
    delay: u16,
) -> Result<Vec<u8>, PayloadError> {
    if direction != 0 && direction != 8 {
        return Err(PayloadError::InvalidArgument(format!(
            "direction {} is invalid. Expected 0 (forward/left) or 8 (backward/right)",
            direction
        )));
    }

    let mut payload = Vec::with_capacity(6);
    payload.push((direction << 4) | motor as u8);
    payload.push(speed);
    payload.extend_from_slice(&ramp.to_be_bytes());
    payload.extend_from_slice(&delay.to_be_bytes());
    Ok(payload)
}

/// Center head payload (multipurpose `CenterRUnitHead`)
pub fn center_head_payload(speed: u8, offset: u8) -> Vec<u8> {
    vec![speed, offset]
}

/// Scripts built into every droid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BuiltinScript {
    GeneralParkResponse = 1,
    DroidDepotParkResponse = 2,
    ResistanceParkResponse = 3,
    UnknownParkResponse = 4,
    OgasCantinaParkResponse = 5,
    DokOndarsParkResponse = 6,
    FirstOrderParkResponse = 7,
    DroidBayActivationSequence = 8,
    UnknownBUnitScript9 = 9,
    UnknownBUnitScript10 = 10,
    DroidPairingSequence1 = 11,
    DroidPairingSequence2 = 12,
    FullThrottleTest = 13,
}

impl BuiltinScript {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Highest script id reserved for built in scripts
pub const LAST_BUILTIN_SCRIPT: u8 = BuiltinScript::FullThrottleTest as u8;

/// Actions performed on a script slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScriptAction {
    Open = 0,
    Close = 1,
    Execute = 2,
}

/// Script action payload: `[bcd(script_id), bcd(action)]`
///
/// Script 0 is only meaningful when closing. The full throttle test script
/// drives the motors at full power and is always refused.
pub fn script_payload(script_id: u8, action: ScriptAction) -> Result<Vec<u8>, PayloadError> {
    if script_id == 0 && action != ScriptAction::Close {
        return Err(PayloadError::InvalidScriptId(script_id));
    }

    if script_id == BuiltinScript::FullThrottleTest.id() {
        return Err(PayloadError::DangerousScript(script_id));
    }

    if action == ScriptAction::Open && script_id <= LAST_BUILTIN_SCRIPT {
        return Err(PayloadError::ProtectedScript(script_id));
    }

    Ok(vec![bcd(script_id)?, bcd(action as u8)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_command_from_id() {
        assert_eq!(AudioCommand::try_from(0x1f), Ok(AudioCommand::SetSelectedSoundBank));
        assert_eq!(AudioCommand::try_from(0x4b), Ok(AudioCommand::EnableHeadLeds));
        assert_eq!(AudioCommand::try_from(0x02), Err(0x02));
    }

    #[test]
    fn test_volume_bounds() {
        assert_eq!(volume_payload(20).unwrap(), vec![0x0e, 20]);
        assert!(matches!(volume_payload(101), Err(PayloadError::InvalidArgument(_))));
    }

    #[test]
    fn test_motor_speed_layout() {
        let payload =
            motor_speed_payload(MotorDirection::Backward.nibble(), Motor::Right, 100, 300, 0).unwrap();
        assert_eq!(payload, vec![0x81, 100, 0x01, 0x2c, 0x00, 0x00]);

        let head = motor_speed_payload(HeadDirection::Left.nibble(), Motor::Head, 0, 300, 0x1234).unwrap();
        assert_eq!(head, vec![0x02, 0, 0x01, 0x2c, 0x12, 0x34]);
    }

    #[test]
    fn test_motor_speed_rejects_unknown_direction() {
        assert!(matches!(
            motor_speed_payload(4, Motor::Left, 100, 300, 0),
            Err(PayloadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_script_rules() {
        assert_eq!(script_payload(3, ScriptAction::Execute).unwrap(), vec![0x03, 0x02]);
        assert_eq!(script_payload(11, ScriptAction::Execute).unwrap(), vec![0x11, 0x02]);
        assert_eq!(script_payload(0, ScriptAction::Close).unwrap(), vec![0x00, 0x01]);
        assert_eq!(script_payload(20, ScriptAction::Open).unwrap(), vec![0x20, 0x00]);

        assert_eq!(script_payload(0, ScriptAction::Execute), Err(PayloadError::InvalidScriptId(0)));
        assert_eq!(script_payload(13, ScriptAction::Execute), Err(PayloadError::DangerousScript(13)));
        assert_eq!(script_payload(5, ScriptAction::Open), Err(PayloadError::ProtectedScript(5)));
        assert!(matches!(
            script_payload(120, ScriptAction::Execute),
            Err(PayloadError::Codec(CodecError::NotDecimalPackable(120)))
        ));
    }

    #[test]
    fn test_led_state() {
        assert_eq!(led_state_payload(true), vec![0x00, 0xff]);
        assert_eq!(led_state_payload(false), vec![0x00, 0x00]);
    }
}
