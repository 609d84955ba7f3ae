mod beacon;
mod cli;
mod command;
mod config;
mod connection;
mod droid;
mod shell;
mod transport;

use anyhow::{bail, Context, Result};
use beacon::{BeaconAdvertiser, BluetoothBeaconSource, ReactionScanner};
use clap::Parser;
use cli::{
    BeaconSubcommand, Cli, Commands, ConfigSubcommand, HeadSubcommand, LedSubcommand,
    ScriptSubcommand,
};
use config::AppConfig;
use connection::MotorEvent;
use droid::Droid;
use droiddepot_shared::beacon::{find_location, LocationBeacon, OFFICIAL_LOCATIONS};
use droiddepot_shared::codec::{from_hex, to_hex};
use droiddepot_shared::hardware::{led, DroidAdvertisement};
use droiddepot_shared::payload::{
    HeadDirection, Motor, MotorDirection, DEFAULT_CENTER_SPEED, DEFAULT_RAMP,
};
use rand::Rng;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use transport::{BluetoothConnector, DroidDiscovery, DroidDiscoveryConfig, MemoryConnector};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long a head turn may run before it is stopped
const HEAD_TURN_LIMIT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config, cli.verbose);
    match &config.source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Load the config file and fold the global CLI flags into it
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(address) = &cli.address {
        config.discovery.address = Some(address.clone());
    }
    if cli.silent {
        config.connection.silent = true;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig, verbose: u8) {
    let level = match verbose {
        0 => config
            .logging
            .level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match &cli.command {
        Commands::Config {
            subcommand: ConfigSubcommand::Show,
        } => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Scan => scan(&config).await,
        Commands::Beacon { action } => beacon_tool(action).await,
        _ => with_droid(&cli, &config).await,
    }
}

async fn scan(config: &AppConfig) -> Result<()> {
    let adapter = DroidDiscovery::get_adapter().await?;
    let discovery = DroidDiscovery::new(DroidDiscoveryConfig {
        retry: false,
        ..config.discovery_config()?
    });

    let droids = discovery.discover_droids(&adapter).await?;
    if droids.is_empty() {
        println!("No droids found");
    }
    for droid in droids {
        println!("{}", droid);
    }
    Ok(())
}

async fn beacon_tool(action: &BeaconSubcommand) -> Result<()> {
    match action {
        BeaconSubcommand::Encode {
            script,
            interval,
            signal,
            unpaired,
        } => {
            let beacon = LocationBeacon::new(*script, *interval, *signal, !unpaired);
            println!("{}", beacon.to_hex()?);
        }
        BeaconSubcommand::Decode { payload } => {
            let beacon = LocationBeacon::from_hex(payload)?;
            println!(
                "script={} interval={} ({}s) signal={}dBm paired={}",
                beacon.script_id,
                beacon.reaction_interval,
                beacon.reaction_window_secs(),
                beacon.signal_strength_dbm,
                beacon.droid_paired
            );
        }
        BeaconSubcommand::Locations => {
            for location in OFFICIAL_LOCATIONS {
                println!("{:<26} {}", location.name, location.payload);
            }
        }
        BeaconSubcommand::Advertise {
            beacon,
            duration_secs,
        } => {
            let payload = find_location(beacon)
                .map(|location| location.payload)
                .unwrap_or(beacon.as_str());
            let beacon = LocationBeacon::from_hex(payload)
                .with_context(|| format!("'{}' is neither a location nor a payload", payload))?;

            let adapter = DroidDiscovery::get_adapter().await?;
            let _handle = BeaconAdvertiser::new(adapter).advertise(&beacon).await?;
            wait_until_stopped(None, duration_secs.map(Duration::from_secs)).await;
            info!("[BEACON] Advertising stopped");
        }
    }
    Ok(())
}

/// Connect, run the command, then disconnect
///
/// The connector must outlive the droid: the memory connector owns the
/// notification channel of its link.
async fn with_droid(cli: &Cli, config: &AppConfig) -> Result<()> {
    if cli.dry_run {
        info!("Dry run, frames are logged instead of sent");
        let connector = MemoryConnector::echoing();
        let droid = Droid::connect(
            &connector,
            DroidAdvertisement::default(),
            config.connection_config(),
        )
        .await?;
        return run_and_disconnect(&droid, cli, config).await;
    }

    let adapter = DroidDiscovery::get_adapter().await?;
    let discovery = DroidDiscovery::new(config.discovery_config()?);
    let found = discovery.find_droid(&adapter).await?;
    info!("Connecting to {}", found);

    let connector = BluetoothConnector::new(adapter, found.address, config.connect_timeout());
    let droid = Droid::connect(&connector, found.advertisement, config.connection_config()).await?;
    run_and_disconnect(&droid, cli, config).await
}

async fn run_and_disconnect(droid: &Droid, cli: &Cli, config: &AppConfig) -> Result<()> {
    if let Some(volume) = config.audio.volume {
        droid.audio.set_volume(volume).await?;
    }

    let outcome = run_droid_command(droid, &cli.command, config).await;

    info!("Shutting down.");
    let shutdown = droid.disconnect(config.connection.silent).await;
    outcome.and(shutdown)
}

async fn run_droid_command(droid: &Droid, command: &Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Shell => {
            droid.motor.center_head(DEFAULT_CENTER_SPEED, 0).await?;
            let lines = shell::stdin_lines()?;
            tokio::select! {
                result = shell::run(droid, lines) => result?,
                _ = tokio::signal::ctrl_c() => println!(),
            }
        }
        Commands::Play {
            sound,
            bank,
            cycle,
            volume,
        } => {
            droid.audio.play_audio(*sound, *bank, *cycle, *volume).await?;
        }
        Commands::Volume { level } => droid.audio.set_volume(*level).await?,
        Commands::Script { action } => match action {
            ScriptSubcommand::Run { id } => droid.script.execute_script(*id).await?,
            ScriptSubcommand::Open { id } => droid.script.open_script(*id).await?,
            ScriptSubcommand::Close { id } => droid.script.close_script(*id).await?,
            ScriptSubcommand::Beacon { payload } => {
                droid.script.execute_location_beacon(payload).await?
            }
        },
        Commands::Move {
            direction,
            speed,
            ramp,
            duration_ms,
        } => {
            droid
                .motor
                .set_movement_speed((*direction).into(), *speed, *ramp)
                .await?;
            pause(Duration::from_millis(*duration_ms)).await;
            droid.motor.stop().await?;
        }
        Commands::Head { action } => head(droid, action).await?,
        Commands::Led { action } => led_command(droid, action).await?,
        Commands::Talk { tone } => {
            droid.voice.talk(*tone).await?;
            if pause(Duration::from_secs(2)).await {
                droid.motor.center_head(DEFAULT_CENTER_SPEED, 0).await?;
            }
        }
        Commands::Firmware => {
            let firmware = droid.connection().firmware_information().await?;
            println!("{}", to_hex(&firmware));
        }
        Commands::React {
            duration_secs,
            volume,
        } => {
            droid.audio.set_volume(*volume).await?;
            let adapter = DroidDiscovery::get_adapter().await?;
            let scanner = ReactionScanner::new(
                BluetoothBeaconSource::new(adapter),
                droid.script.clone(),
                config.reaction_config(),
            );
            let handle = scanner.start().await?;
            wait_until_stopped(Some(droid), duration_secs.map(Duration::from_secs)).await;
            handle.stop().await;
        }
        Commands::Spin {
            speed,
            period_secs,
        } => {
            let mut direction = MotorDirection::Forward;
            while droid.is_connected().await {
                droid
                    .motor
                    .send_motor_speed(direction, Motor::Left, *speed, DEFAULT_RAMP, 0)
                    .await?;
                if !pause(Duration::from_secs(*period_secs)).await {
                    break;
                }
                direction = direction.reversed();
            }
            droid.motor.stop().await?;
        }
        Commands::AudioDemo { min_secs, max_secs } => {
            if min_secs > max_secs {
                bail!("--min-secs must not exceed --max-secs");
            }
            droid.audio.set_volume(20).await?;

            let mut sound = 1;
            while droid.is_connected().await {
                info!("Playing sound id {} from bank 1", sound);
                droid.audio.play_audio(Some(sound), Some(1), true, None).await?;

                let wait = rand::thread_rng().gen_range(*min_secs..=*max_secs);
                if !pause(Duration::from_secs(wait)).await {
                    break;
                }
                sound = if sound >= 5 { 1 } else { sound + 1 };
            }
        }
        Commands::Beacon { .. } | Commands::Scan | Commands::Config { .. } => {
            bail!("Command does not need a droid")
        }
    }
    Ok(())
}

/// Turn the head until it reports a limit or the turn times out
async fn head(droid: &Droid, action: &HeadSubcommand) -> Result<()> {
    let (direction, speed) = match action {
        HeadSubcommand::Left { speed } => (HeadDirection::Left, *speed),
        HeadSubcommand::Right { speed } => (HeadDirection::Right, *speed),
        HeadSubcommand::Stop => return droid.motor.stop_head().await,
        HeadSubcommand::Center { speed, offset } => {
            return droid.motor.center_head(*speed, *offset).await
        }
    };

    let mut events = droid.motor.subscribe_head_events();
    droid.motor.rotate_head(direction, speed, DEFAULT_RAMP).await?;

    let limit = tokio::time::timeout(HEAD_TURN_LIMIT, async {
        loop {
            match events.recv().await {
                Ok(event @ (MotorEvent::MotorHitLeftLimit | MotorEvent::MotorHitRightLimit)) => {
                    return Some(event)
                }
                Ok(event) => debug!("[MOTOR] Head event {:?}", event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match limit {
        Ok(Some(event)) => info!("Head stopped: {:?}", event),
        _ => debug!("No head limit reported"),
    }
    droid.motor.stop_head().await
}

async fn led_command(droid: &Droid, action: &LedSubcommand) -> Result<()> {
    let connection = droid.connection();
    match action {
        LedSubcommand::Pairing { state } => connection.set_pairing_led(state.is_on()).await,
        LedSubcommand::Rgb { state } => connection.set_rgb_led(state.is_on()).await,
        LedSubcommand::Flash { pattern } => connection.flash_pairing_led(&from_hex(pattern)?).await,
        LedSubcommand::Enable { id } => droid.audio.enable_head_led(*id).await,
        LedSubcommand::Disable { id } => droid.audio.disable_head_led(*id).await,
        LedSubcommand::On { id } => droid.audio.turn_on_led(*id).await,
        LedSubcommand::Off { id } => droid.audio.turn_off_led(*id).await,
        LedSubcommand::Reset => droid.audio.enable_head_led(led::R_UNIT_ALL).await,
    }
}

/// Sleep, returns false when interrupted with Ctrl-C
async fn pause(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

/// Block until Ctrl-C, the time limit, or the droid dropping the link
async fn wait_until_stopped(droid: Option<&Droid>, limit: Option<Duration>) {
    let deadline = limit.map(|l| tokio::time::Instant::now() + l);
    loop {
        if let Some(droid) = droid {
            if !droid.is_connected().await {
                warn!("Droid disconnected");
                return;
            }
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            return;
        }
        if !pause(Duration::from_secs(1)).await {
            return;
        }
    }
}
