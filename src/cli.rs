//! CLI argument parsing using clap v4

use crate::command::VoiceTone;
use clap::{Parser, Subcommand, ValueEnum};
use droiddepot_shared::payload::{
    MotorDirection, DEFAULT_CENTER_SPEED, DEFAULT_DRIVE_SPEED, DEFAULT_MOTOR_SPEED, DEFAULT_RAMP,
};
use std::path::PathBuf;

/// Control Droid Depot droids over Bluetooth LE
#[derive(Parser, Debug)]
#[command(name = "droid-depot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, env = "DROID_DEPOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Connect to this droid instead of the strongest one in range
    #[arg(short, long, env = "DROID_DEPOT_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Skip the pairing and shutdown animations
    #[arg(short, long, global = true)]
    pub silent: bool,

    /// Log frames instead of talking to a droid
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List droids in range
    Scan,

    /// Interactive console: `component,method,args...`
    Shell,

    /// Play a clip
    Play {
        /// Clip number within the bank, starting at 1
        #[arg(long)]
        sound: Option<u8>,

        /// Audio bank, starting at 1
        #[arg(long)]
        bank: Option<u8>,

        /// Cycle through the selected bank
        #[arg(long)]
        cycle: bool,

        /// Volume to set first (0-100)
        #[arg(long)]
        volume: Option<u8>,
    },

    /// Set the speaker volume (0-100)
    Volume { level: u8 },

    /// Script slot actions
    Script {
        #[command(subcommand)]
        action: ScriptSubcommand,
    },

    /// Drive for a while, then stop
    Move {
        #[arg(value_enum)]
        direction: DriveDirection,

        #[arg(long, default_value_t = DEFAULT_DRIVE_SPEED)]
        speed: u8,

        /// Milliseconds to reach full speed
        #[arg(long, default_value_t = DEFAULT_RAMP)]
        ramp: u16,

        /// Milliseconds to drive before stopping
        #[arg(long, default_value_t = 1_000)]
        duration_ms: u64,
    },

    /// R-unit head motor
    Head {
        #[command(subcommand)]
        action: HeadSubcommand,
    },

    /// LEDs
    Led {
        #[command(subcommand)]
        action: LedSubcommand,
    },

    /// Talk with animation
    Talk {
        /// friendly, indifferent or upset
        #[arg(default_value = "indifferent")]
        tone: VoiceTone,
    },

    /// Print the firmware blob
    Firmware,

    /// React to park location beacons
    React {
        /// Stop after this many seconds, runs until Ctrl-C otherwise
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Volume to set before listening
        #[arg(long, default_value_t = 20)]
        volume: u8,
    },

    /// Location beacon tools
    Beacon {
        #[command(subcommand)]
        action: BeaconSubcommand,
    },

    /// Rock the left wheel back and forth
    Spin {
        #[arg(long, default_value_t = DEFAULT_DRIVE_SPEED)]
        speed: u8,

        /// Seconds between direction changes
        #[arg(long, default_value_t = 50)]
        period_secs: u64,
    },

    /// Play random park responses every so often
    AudioDemo {
        #[arg(long, default_value_t = 10)]
        min_secs: u64,

        #[arg(long, default_value_t = 30)]
        max_secs: u64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScriptSubcommand {
    /// Run a script
    Run { id: u8 },

    /// Open a user script slot for writing
    Open { id: u8 },

    /// Close a script slot
    Close {
        #[arg(default_value_t = 0)]
        id: u8,
    },

    /// Run the script a location beacon payload points to
    Beacon { payload: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HeadSubcommand {
    Left {
        #[arg(long, default_value_t = DEFAULT_MOTOR_SPEED)]
        speed: u8,
    },
    Right {
        #[arg(long, default_value_t = DEFAULT_MOTOR_SPEED)]
        speed: u8,
    },
    Stop,
    Center {
        #[arg(long, default_value_t = DEFAULT_CENTER_SPEED)]
        speed: u8,

        #[arg(long, default_value_t = 0)]
        offset: u8,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LedSubcommand {
    /// Pairing LED on the droid's body
    Pairing {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Onboard RGB LED
    Rgb {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Flash the pairing LED with a raw hex pattern
    Flash {
        #[arg(default_value = "020001ff01ff0aff00")]
        pattern: String,
    },
    /// Enable a head LED
    Enable { id: u8 },
    /// Disable a head LED
    Disable { id: u8 },
    /// Switch an LED on
    On { id: u8 },
    /// Switch an LED off
    Off { id: u8 },
    /// Re-enable every R-unit head LED
    Reset,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BeaconSubcommand {
    /// Build a location beacon payload
    Encode {
        script: u8,

        /// Reaction interval, in units of five seconds
        #[arg(long, default_value_t = 2)]
        interval: u8,

        /// Minimum RSSI in dBm
        #[arg(long, default_value_t = -38, allow_hyphen_values = true)]
        signal: i16,

        /// Beacon applies to unpaired droids only
        #[arg(long)]
        unpaired: bool,
    },

    /// Decode a location beacon payload
    Decode { payload: String },

    /// Advertise a location beacon from this machine
    Advertise {
        /// Hex payload or an official location name
        beacon: String,

        /// Stop after this many seconds, runs until Ctrl-C otherwise
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// List the official park locations
    Locations,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDirection {
    Forward,
    Backward,
}

impl From<DriveDirection> for MotorDirection {
    fn from(direction: DriveDirection) -> Self {
        match direction {
            DriveDirection::Forward => MotorDirection::Forward,
            DriveDirection::Backward => MotorDirection::Backward,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play() {
        let cli = Cli::parse_from(["droid-depot", "play", "--bank", "2", "--sound", "3"]);
        match cli.command {
            Commands::Play { sound, bank, cycle, volume } => {
                assert_eq!(sound, Some(3));
                assert_eq!(bank, Some(2));
                assert!(!cycle);
                assert!(volume.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "droid-depot",
            "talk",
            "upset",
            "--dry-run",
            "-s",
            "-vv",
            "--address",
            "E4:DF:6A:12:34:56",
        ]);
        assert!(cli.dry_run);
        assert!(cli.silent);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.address.as_deref(), Some("E4:DF:6A:12:34:56"));
        assert!(matches!(cli.command, Commands::Talk { tone: VoiceTone::Upset }));
    }

    #[test]
    fn test_negative_signal() {
        let cli = Cli::parse_from(["droid-depot", "beacon", "encode", "3", "--signal", "-58"]);
        match cli.command {
            Commands::Beacon {
                action: BeaconSubcommand::Encode { script, signal, .. },
            } => {
                assert_eq!(script, 3);
                assert_eq!(signal, -58);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
