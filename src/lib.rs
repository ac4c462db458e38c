/*!
 # LEDnetWF Bluetooth LED Controller Library

 A Rust library for driving LEDnetWF-family ("Magic Home" BLE) LED lights.
 Every user-level intent is compiled into one byte-exact, checksummed frame
 and handed to a transport that writes it to the device.

 ## Features

 * Power on/off control
 * RGB color control
 * Built-in effect modes (fade, strobe, jump) addressed by alias
 * Candle mode
 * Clock synchronization
 * On-device alarm tables, described with a small textual DSL

 ## Example

 ```rust,no_run
 use magic_led_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     tracing_subscriber::fmt::init();

     let transport = BleTransport::connect(&DeviceSelector::default()).await?;
     let mut controller = Controller::new(transport);

     controller
         .execute_batch(&[Operation::Power { on: true }, Operation::rgb(255, 0, 0)])
         .await?;

     let alarms = alarm::parse_effect_alarms("07:00,fade7/0011111%30")?;
     controller.execute(&Operation::EffectAlarmTable(alarms)).await?;

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// An alarm specification could not be parsed; the whole batch is rejected
    #[error("Malformed alarm '{fragment}': {reason}")]
    MalformedAlarmSyntax { fragment: String, reason: String },

    /// Effect name did not match any known alias
    #[error("Unknown effect '{name}'. Valid effects: {}", .valid.join(", "))]
    UnknownEffectAlias { name: String, valid: Vec<String> },

    /// Alarm table holds more entries than the device has slots
    #[error("Alarm table has {count} entries, the device holds at most {max}")]
    TableOverflow { count: usize, max: usize },

    /// Day mask argument could not be understood
    #[error("Invalid day mask: {0}")]
    InvalidDayMask(String),

    /// Configuration file problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// No compatible LED device found
    #[error("No compatible LED device found")]
    NoCompatibleDevice,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// BLE communication error
    #[error("BLE communication error: {0}")]
    BleError(String),

    /// Command timeout
    #[error("Command timed out after {0} ms")]
    CommandTimeout(u64),

    /// General error
    #[error("Error: {0}")]
    General(String),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),

    /// TOML parse error
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod alarm;
pub mod config;
pub mod controller;
pub mod effects;
pub mod frame;
pub mod operation;
pub mod schedule;
pub mod table;
pub mod transport;

// Re-export key types
pub use alarm::{AlarmKind, BasicAlarmEntry, EffectAlarmEntry};
pub use config::Config;
pub use controller::Controller;
pub use effects::{Effect, EFFECTS};
pub use frame::{ChecksumMode, CommandFamily, Frame, FrameCompiler, ProtocolQuirks, SequenceCounter};
pub use operation::Operation;
pub use schedule::{DayMask, WEEK_DAYS};
pub use transport::{BleTransport, DeviceSelector, DryRunTransport, Transport};
