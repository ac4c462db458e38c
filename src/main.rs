use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use magic_led_controller::alarm::{self, AlarmKind};
use magic_led_controller::*;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/magic-led/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// BLE address or id of the light, overrides the config file
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Print frames instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Compute checksums as the byte sum of the command (unverified)
    #[arg(long, global = true)]
    sum_checksum: bool,

    /// Insert the 0x10 marker into effect frames (unverified)
    #[arg(long, global = true)]
    effect_marker: bool,

    /// Store effect alarms with action types from 0x38 up (unverified)
    #[arg(long, global = true)]
    alarm_effect_offset: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Set a static color (defaults to the configured color)
    Color {
        red: Option<u8>,
        green: Option<u8>,
        blue: Option<u8>,
    },
    /// Run a built-in effect
    Effect {
        /// Effect alias or part of its name (see `effects`)
        name: String,
        /// Effect speed (1-100)
        #[arg(short, long, default_value_t = 50)]
        speed: u32,
        /// Brightness (1-100)
        #[arg(short, long, default_value_t = 100)]
        brightness: u32,
    },
    /// Flickering candle mode
    Candle {
        /// Flicker amplitude (1-3)
        #[arg(short, long, default_value_t = 2)]
        amplitude: u32,
        /// Flicker speed (1-100)
        #[arg(short, long, default_value_t = 50)]
        speed: u32,
        /// Brightness (1-100)
        #[arg(short, long, default_value_t = 100)]
        brightness: u32,
        /// Candle color as R,G,B (defaults to the configured color)
        #[arg(short, long, value_parser = parse_rgb)]
        color: Option<(u8, u8, u8)>,
    },
    /// Set the device clock to local time
    SyncTime,
    /// Program power-on alarms: "HH:MM[/days|/once][#brightness][%speed];..."
    AlarmOn {
        spec: Option<String>,
        /// Day mask applied to every entry (binary, decimal, 0x hex or names)
        #[arg(long)]
        days: Option<DayMask>,
    },
    /// Program power-off alarms: "HH:MM[/days|/once];..."
    AlarmOff {
        spec: Option<String>,
        #[arg(long)]
        days: Option<DayMask>,
    },
    /// Program color alarms: "HH:MM,R,G,B[/days|/once][#brightness];..."
    AlarmRgb {
        spec: Option<String>,
        #[arg(long)]
        days: Option<DayMask>,
    },
    /// Program effect alarms: "HH:MM,effect[:R,G,B][/days|/once][#brightness][%speed];..."
    AlarmEffect {
        spec: Option<String>,
        #[arg(long)]
        days: Option<DayMask>,
    },
    /// Clear both alarm tables
    ClearAlarms,
    /// List the built-in effects
    Effects,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("magic_led_controller=info,mlc=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    if let Commands::Effects = cli.command {
        for effect in effects::list() {
            println!("{:<14} {:#04x}  {}", effect.alias, effect.id, effect.name);
        }
        return Ok(());
    }

    let config = Config::load_or_default(cli.config.as_deref())?;
    let ops = build_operations(&cli.command, &config)?;
    if ops.is_empty() {
        return Ok(());
    }

    let quirks = ProtocolQuirks {
        checksum: if cli.sum_checksum {
            ChecksumMode::PayloadSum
        } else {
            ChecksumMode::SequenceBias
        },
        effect_speed_marker: cli.effect_marker,
        effect_alarm_offset: cli.alarm_effect_offset,
    };
    let compiler = FrameCompiler::new().with_quirks(quirks);

    let transport: Box<dyn Transport> = if cli.dry_run {
        Box::new(DryRunTransport)
    } else {
        let mut selector = DeviceSelector::from_config(&config);
        if let Some(id) = cli.device {
            selector.id = Some(id);
        }
        match BleTransport::connect(&selector).await {
            Ok(transport) => Box::new(transport),
            Err(e) => {
                error!("Failed to initialize device: {}", e);
                return Err(e.into());
            }
        }
    };

    let mut controller = Controller::with_compiler(transport, compiler);
    let frames = controller.execute_batch(&ops).await?;
    if cli.dry_run {
        for frame in &frames {
            println!("{}", frame);
        }
    }
    info!("Done");
    Ok(())
}

/// Turns a subcommand into the ordered operations it stands for
fn build_operations(command: &Commands, config: &Config) -> Result<Vec<Operation>> {
    let [r, g, b] = config.defaults.rgb;
    let ops = match command {
        Commands::On => vec![Operation::Power { on: true }],
        Commands::Off => vec![Operation::Power { on: false }],
        Commands::Color { red, green, blue } => vec![
            Operation::Power { on: true },
            Operation::rgb(red.unwrap_or(r), green.unwrap_or(g), blue.unwrap_or(b)),
        ],
        Commands::Effect {
            name,
            speed,
            brightness,
        } => {
            let id = effects::lookup(name)?;
            debug!("Using effect code: {:#04x}", id);
            vec![
                Operation::Power { on: true },
                Operation::effect(id, *speed, *brightness),
            ]
        }
        Commands::Candle {
            amplitude,
            speed,
            brightness,
            color,
        } => vec![
            Operation::Power { on: true },
            Operation::candle(*amplitude, *speed, *brightness, color.unwrap_or((r, g, b))),
        ],
        Commands::SyncTime => vec![Operation::time_sync_now()],
        Commands::AlarmOn { spec, days } => {
            vec![alarm_operation(AlarmKind::On, spec, *days, config)?]
        }
        Commands::AlarmOff { spec, days } => {
            vec![alarm_operation(AlarmKind::Off, spec, *days, config)?]
        }
        Commands::AlarmRgb { spec, days } => {
            vec![alarm_operation(AlarmKind::Rgb, spec, *days, config)?]
        }
        Commands::AlarmEffect { spec, days } => {
            vec![alarm_operation(AlarmKind::Effect, spec, *days, config)?]
        }
        Commands::ClearAlarms => vec![
            Operation::BasicAlarmTable(Vec::new()),
            Operation::EffectAlarmTable(Vec::new()),
        ],
        Commands::Effects => Vec::new(),
    };
    Ok(ops)
}

/// Parses an alarm list, falling back to the configured default, and
/// applies a command-line day mask to every entry.
#[instrument(skip(config))]
fn alarm_operation(
    kind: AlarmKind,
    spec: &Option<String>,
    days: Option<DayMask>,
    config: &Config,
) -> Result<Operation> {
    let spec = spec
        .as_deref()
        .or_else(|| config.defaults.alarms.for_kind(kind))
        .ok_or_else(|| eyre!("no {:?} alarm given and none configured", kind))?;

    let mut table = alarm::parse(spec, kind)?;
    if let Some(days) = days {
        debug!("Overriding days with {}", days);
        match &mut table {
            alarm::AlarmTable::Basic(entries) => entries.iter_mut().for_each(|e| e.days = days),
            alarm::AlarmTable::Effect(entries) => entries.iter_mut().for_each(|e| e.days = days),
        }
    }
    Ok(table.into_operation())
}

fn parse_rgb(s: &str) -> std::result::Result<(u8, u8, u8), String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [r, g, b] => {
            let channel = |v: &str| v.parse::<u8>().map_err(|e| format!("'{}': {}", v, e));
            Ok((channel(r)?, channel(g)?, channel(b)?))
        }
        _ => Err("expected R,G,B".to_string()),
    }
}
