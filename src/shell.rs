//! Interactive console
//!
//! Each line names a component, a method and its arguments, separated by
//! commas:
//!
//! ```text
//! audio,play_audio,3,2
//! motor,center_head
//! script,execute_location_beacon,0A040302A601
//! ```

use crate::command::VoiceTone;
use crate::droid::Droid;
use anyhow::{anyhow, bail, Context, Result};
use droiddepot_shared::codec::{from_hex, to_hex};
use droiddepot_shared::payload::{
    AudioCommand, HeadDirection, Motor, MotorDirection, DEFAULT_CENTER_SPEED,
    DEFAULT_MOTOR_SPEED, DEFAULT_RAMP,
};
use std::str::FromStr;
use std::io::BufRead;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const USAGE: &str = "<component>,<method>,<..args>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Connection(ConnectionCall),
    Audio(AudioCall),
    Script(ScriptCall),
    Motor(MotorCall),
    Voice(VoiceTone),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCall {
    State,
    FirmwareInformation,
    SetPairingLed(bool),
    SetRgbLed(bool),
    FlashPairingLed(Vec<u8>),
    Disconnect { silent: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    Execute(u8, u8),
    PlayAudio {
        sound: Option<u8>,
        bank: Option<u8>,
        cycle: bool,
        volume: Option<u8>,
    },
    PlayShutdownAudio,
    SetAudioBank(u8),
    SelectedBank,
    SetVolume(u8),
    ResetHeadLeds,
    EnableHeadLed(u8),
    DisableHeadLed(u8),
    TurnOnLed(u8),
    TurnOffLed(u8),
    Leds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCall {
    Execute(u8),
    Open(u8),
    Close(u8),
    LocationBeacon(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorCall {
    SendMotorSpeed {
        direction: MotorDirection,
        motor: Motor,
        speed: u8,
        ramp: u16,
        delay: u16,
    },
    SetMovementSpeed {
        direction: MotorDirection,
        speed: u8,
        ramp: u16,
    },
    Stop,
    RotateHead {
        direction: HeadDirection,
        speed: u8,
        ramp: u16,
    },
    StopHead,
    CenterHead {
        speed: u8,
        offset: u8,
    },
}

/// Outcome of one console line
#[derive(Debug, PartialEq, Eq)]
pub enum ShellOutcome {
    Continue(Option<String>),
    Quit,
}

impl FromStr for ShellCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            bail!("Invalid arguments supplied. {}", USAGE);
        }

        let args = Args(&parts[2..]);
        match parts[0] {
            "connection" => parse_connection(parts[1], &args).map(Self::Connection),
            "audio" => parse_audio(parts[1], &args).map(Self::Audio),
            "script" => parse_script(parts[1], &args).map(Self::Script),
            "motor" => parse_motor(parts[1], &args).map(Self::Motor),
            "voice" => match parts[1] {
                "talk" => Ok(Self::Voice(args.required("tone")?)),
                other => Err(unknown_method("voice", other)),
            },
            other => bail!("Unknown service component: {}", other),
        }
    }
}

fn unknown_method(component: &str, method: &str) -> anyhow::Error {
    anyhow!("Function name ({}) not found on {}", method, component)
}

fn parse_connection(method: &str, args: &Args) -> Result<ConnectionCall> {
    Ok(match method {
        "state" => ConnectionCall::State,
        "firmware_information" => ConnectionCall::FirmwareInformation,
        "set_pairing_led" => ConnectionCall::SetPairingLed(args.flag(0, "on")?),
        "set_rgb_led" => ConnectionCall::SetRgbLed(args.flag(0, "on")?),
        "flash_pairing_led" => {
            let raw = args.get(0).ok_or_else(|| anyhow!("Missing argument: pattern"))?;
            ConnectionCall::FlashPairingLed(from_hex(raw)?)
        }
        "disconnect" => ConnectionCall::Disconnect {
            silent: args.optional_flag(0)?.unwrap_or(false),
        },
        other => return Err(unknown_method("connection", other)),
    })
}

fn parse_audio(method: &str, args: &Args) -> Result<AudioCall> {
    Ok(match method {
        "execute" => {
            let command: u8 = args.number(0, "command")?;
            AudioCall::Execute(command, args.optional_number(1)?.unwrap_or(0))
        }
        "play_audio" => AudioCall::PlayAudio {
            sound: args.optional_number(0)?,
            bank: args.optional_number(1)?,
            cycle: args.optional_flag(2)?.unwrap_or(false),
            volume: args.optional_number(3)?,
        },
        "play_shutdown_audio" => AudioCall::PlayShutdownAudio,
        "set_audio_bank" => AudioCall::SetAudioBank(args.number(0, "bank")?),
        "selected_bank" => AudioCall::SelectedBank,
        "set_volume" => AudioCall::SetVolume(args.number(0, "level")?),
        "reset_head_leds" => AudioCall::ResetHeadLeds,
        "enable_head_led" => AudioCall::EnableHeadLed(args.number(0, "led")?),
        "disable_head_led" => AudioCall::DisableHeadLed(args.number(0, "led")?),
        "turn_on_led" => AudioCall::TurnOnLed(args.number(0, "led")?),
        "turn_off_led" => AudioCall::TurnOffLed(args.number(0, "led")?),
        "leds" => AudioCall::Leds,
        other => return Err(unknown_method("audio", other)),
    })
}

fn parse_script(method: &str, args: &Args) -> Result<ScriptCall> {
    Ok(match method {
        "execute_script" => ScriptCall::Execute(args.number(0, "script_id")?),
        "open_script" => ScriptCall::Open(args.number(0, "script_id")?),
        "close_script" => ScriptCall::Close(args.optional_number(0)?.unwrap_or(0)),
        "execute_location_beacon" => ScriptCall::LocationBeacon(
            args.get(0)
                .ok_or_else(|| anyhow!("Missing argument: payload"))?
                .to_string(),
        ),
        other => return Err(unknown_method("script", other)),
    })
}

fn parse_motor(method: &str, args: &Args) -> Result<MotorCall> {
    Ok(match method {
        "send_motor_speed" => MotorCall::SendMotorSpeed {
            direction: parse_drive_direction(args.required_str(0, "direction")?)?,
            motor: parse_motor_id(args.required_str(1, "motor")?)?,
            speed: args.number(2, "speed")?,
            ramp: args.optional_number(3)?.unwrap_or(DEFAULT_RAMP),
            delay: args.optional_number(4)?.unwrap_or(0),
        },
        "set_movement_speed" => MotorCall::SetMovementSpeed {
            direction: parse_drive_direction(args.required_str(0, "direction")?)?,
            speed: args.number(1, "speed")?,
            ramp: args.optional_number(2)?.unwrap_or(DEFAULT_RAMP),
        },
        "stop" => MotorCall::Stop,
        "rotate_head" => MotorCall::RotateHead {
            direction: parse_head_direction(args.required_str(0, "direction")?)?,
            speed: args.optional_number(1)?.unwrap_or(DEFAULT_MOTOR_SPEED),
            ramp: args.optional_number(2)?.unwrap_or(DEFAULT_RAMP),
        },
        "stop_head" => MotorCall::StopHead,
        "center_head" => MotorCall::CenterHead {
            speed: args.optional_number(0)?.unwrap_or(DEFAULT_CENTER_SPEED),
            offset: args.optional_number(1)?.unwrap_or(0),
        },
        other => return Err(unknown_method("motor", other)),
    })
}

fn parse_drive_direction(value: &str) -> Result<MotorDirection> {
    match value.to_ascii_lowercase().as_str() {
        "forward" | "0" => Ok(MotorDirection::Forward),
        "backward" | "backwards" | "8" => Ok(MotorDirection::Backward),
        other => bail!("Unknown motor direction '{}'", other),
    }
}

fn parse_head_direction(value: &str) -> Result<HeadDirection> {
    match value.to_ascii_lowercase().as_str() {
        "left" | "0" => Ok(HeadDirection::Left),
        "right" | "8" => Ok(HeadDirection::Right),
        other => bail!("Unknown head direction '{}'", other),
    }
}

fn parse_motor_id(value: &str) -> Result<Motor> {
    match value.to_ascii_lowercase().as_str() {
        "left" | "0" => Ok(Motor::Left),
        "right" | "1" => Ok(Motor::Right),
        "head" | "2" => Ok(Motor::Head),
        other => bail!("Unknown motor '{}'", other),
    }
}

/// Positional arguments of a console line
struct Args<'a>(&'a [&'a str]);

impl<'a> Args<'a> {
    /// Argument at `index`; empty strings and `None` count as absent
    fn get(&self, index: usize) -> Option<&'a str> {
        self.0
            .get(index)
            .copied()
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
    }

    fn required_str(&self, index: usize, name: &str) -> Result<&'a str> {
        self.get(index)
            .ok_or_else(|| anyhow!("Missing argument: {}", name))
    }

    fn required<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required_str(0, name)?;
        raw.parse::<T>()
            .map_err(|e| anyhow!("Invalid {} '{}': {}", name, raw, e))
    }

    fn number<T: Number>(&self, index: usize, name: &str) -> Result<T> {
        let raw = self.required_str(index, name)?;
        T::parse(raw).with_context(|| format!("Invalid {} '{}'", name, raw))
    }

    fn optional_number<T: Number>(&self, index: usize) -> Result<Option<T>> {
        self.get(index)
            .map(|raw| T::parse(raw).with_context(|| format!("Invalid number '{}'", raw)))
            .transpose()
    }

    fn flag(&self, index: usize, name: &str) -> Result<bool> {
        parse_flag(self.required_str(index, name)?)
    }

    fn optional_flag(&self, index: usize) -> Result<Option<bool>> {
        self.get(index).map(parse_flag).transpose()
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        other => bail!("Expected true or false, got '{}'", other),
    }
}

/// Decimal or `0x` prefixed hex
trait Number: Sized {
    fn parse(raw: &str) -> Result<Self>;
}

macro_rules! impl_number {
    ($($ty:ty),*) => {
        $(impl Number for $ty {
            fn parse(raw: &str) -> Result<Self> {
                let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                    Some(hex) => <$ty>::from_str_radix(hex, 16)?,
                    None => raw.parse::<$ty>()?,
                };
                Ok(parsed)
            }
        })*
    };
}

impl_number!(u8, u16);

fn audio_command(id: u8) -> Result<AudioCommand> {
    AudioCommand::try_from(id).map_err(|_| anyhow!("Unknown audio command 0x{:02x}", id))
}

/// Run one parsed command against the droid
pub async fn execute(droid: &Droid, command: ShellCommand) -> Result<ShellOutcome> {
    debug!("[SHELL] {:?}", command);
    let output = match command {
        ShellCommand::Connection(call) => match call {
            ConnectionCall::State => Some(format!("{:?}", droid.connection().state().await)),
            ConnectionCall::FirmwareInformation => {
                Some(to_hex(&droid.connection().firmware_information().await?))
            }
            ConnectionCall::SetPairingLed(on) => {
                droid.connection().set_pairing_led(on).await?;
                None
            }
            ConnectionCall::SetRgbLed(on) => {
                droid.connection().set_rgb_led(on).await?;
                None
            }
            ConnectionCall::FlashPairingLed(pattern) => {
                droid.connection().flash_pairing_led(&pattern).await?;
                None
            }
            ConnectionCall::Disconnect { silent } => {
                droid.disconnect(silent).await?;
                return Ok(ShellOutcome::Quit);
            }
        },
        ShellCommand::Audio(call) => {
            let audio = &droid.audio;
            match call {
                AudioCall::Execute(command, argument) => {
                    audio.execute(audio_command(command)?, argument).await?;
                    None
                }
                AudioCall::PlayAudio { sound, bank, cycle, volume } => {
                    audio.play_audio(sound, bank, cycle, volume).await?;
                    None
                }
                AudioCall::PlayShutdownAudio => {
                    audio.play_shutdown_audio().await?;
                    None
                }
                AudioCall::SetAudioBank(bank) => {
                    audio.set_audio_bank(bank).await?;
                    None
                }
                AudioCall::SelectedBank => Some(
                    audio
                        .selected_bank()
                        .await
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "none".into()),
                ),
                AudioCall::SetVolume(level) => {
                    audio.set_volume(level).await?;
                    None
                }
                AudioCall::ResetHeadLeds => {
                    audio.reset_head_leds().await?;
                    None
                }
                AudioCall::EnableHeadLed(led) => {
                    audio.enable_head_led(led).await?;
                    None
                }
                AudioCall::DisableHeadLed(led) => {
                    audio.disable_head_led(led).await?;
                    None
                }
                AudioCall::TurnOnLed(led) => {
                    audio.turn_on_led(led).await?;
                    None
                }
                AudioCall::TurnOffLed(led) => {
                    audio.turn_off_led(led).await?;
                    None
                }
                AudioCall::Leds => Some(format!(
                    "disabled={:?} lit={:?}",
                    audio.disabled_leds().await,
                    audio.lit_leds().await
                )),
            }
        }
        ShellCommand::Script(call) => {
            match call {
                ScriptCall::Execute(id) => droid.script.execute_script(id).await?,
                ScriptCall::Open(id) => droid.script.open_script(id).await?,
                ScriptCall::Close(id) => droid.script.close_script(id).await?,
                ScriptCall::LocationBeacon(payload) => {
                    droid.script.execute_location_beacon(&payload).await?
                }
            }
            None
        }
        ShellCommand::Motor(call) => {
            let motor = &droid.motor;
            match call {
                MotorCall::SendMotorSpeed { direction, motor: id, speed, ramp, delay } => {
                    motor.send_motor_speed(direction, id, speed, ramp, delay).await?
                }
                MotorCall::SetMovementSpeed { direction, speed, ramp } => {
                    motor.set_movement_speed(direction, speed, ramp).await?
                }
                MotorCall::Stop => motor.stop().await?,
                MotorCall::RotateHead { direction, speed, ramp } => {
                    motor.rotate_head(direction, speed, ramp).await?
                }
                MotorCall::StopHead => motor.stop_head().await?,
                MotorCall::CenterHead { speed, offset } => {
                    motor.center_head(speed, offset).await?
                }
            }
            None
        }
        ShellCommand::Voice(tone) => {
            droid.voice.talk(tone).await?;
            None
        }
    };

    Ok(ShellOutcome::Continue(output))
}

/// Forward stdin lines from a dedicated thread
///
/// A blocking stdin read cannot be cancelled. The thread is left parked in
/// `read_line` when the shell stops and ends with the process.
pub fn stdin_lines() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("shell-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            debug!("stdin reader finished");
        })
        .context("Failed to start stdin reader")?;
    Ok(rx)
}

/// Run commands from `lines` until the channel closes, `quit` or disconnect
pub async fn run(droid: &Droid, mut lines: mpsc::Receiver<String>) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    while droid.is_connected().await {
        stdout.write_all(b"Command: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.recv().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        let command = match line.parse::<ShellCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match execute(droid, command).await {
            Ok(ShellOutcome::Continue(Some(output))) => println!("{}", output),
            Ok(ShellOutcome::Continue(None)) => {}
            Ok(ShellOutcome::Quit) => break,
            Err(e) => {
                warn!("Command failed: {:#}", e);
                println!("{:#}", e);
            }
        }
    }

    Ok(())
}
