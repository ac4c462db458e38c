/*!
 # Operations

 The closed set of intents that can be compiled into a frame. Values are
 clamped into their documented ranges on construction, never rejected.
*/

use chrono::{Local, NaiveTime};
use tracing::warn;

use crate::alarm::{BasicAlarmEntry, EffectAlarmEntry};
use crate::{Error, Result};

/// Number of slots the device keeps per alarm table
pub const MAX_ALARM_SLOTS: usize = 16;

/// One command intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Power {
        on: bool,
    },
    Rgb {
        r: u8,
        g: u8,
        b: u8,
    },
    Effect {
        id: u8,
        /// 1-100
        speed: u8,
        /// 1-100
        brightness: u8,
    },
    Candle {
        /// 1-3
        amplitude: u8,
        /// 1-100, higher is faster
        speed: u8,
        /// 1-100
        brightness: u8,
        r: u8,
        g: u8,
        b: u8,
    },
    TimeSync(NaiveTime),
    BasicAlarmTable(Vec<BasicAlarmEntry>),
    EffectAlarmTable(Vec<EffectAlarmEntry>),
}

impl Operation {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Operation::Rgb { r, g, b }
    }

    pub fn effect(id: u8, speed: u32, brightness: u32) -> Self {
        Operation::Effect {
            id,
            speed: clamp_percent(speed, "effect speed"),
            brightness: clamp_percent(brightness, "effect brightness"),
        }
    }

    pub fn candle(amplitude: u32, speed: u32, brightness: u32, (r, g, b): (u8, u8, u8)) -> Self {
        Operation::Candle {
            amplitude: clamp(amplitude, 1, 3, "candle amplitude"),
            speed: clamp_percent(speed, "candle speed"),
            brightness: clamp_percent(brightness, "candle brightness"),
            r,
            g,
            b,
        }
    }

    /// Time sync carrying the current local wall-clock time
    pub fn time_sync_now() -> Self {
        Operation::TimeSync(Local::now().time())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Power { .. } => "power",
            Operation::Rgb { .. } => "rgb",
            Operation::Effect { .. } => "effect",
            Operation::Candle { .. } => "candle",
            Operation::TimeSync(_) => "time-sync",
            Operation::BasicAlarmTable(_) => "basic-alarm-table",
            Operation::EffectAlarmTable(_) => "effect-alarm-table",
        }
    }

    /// Checks constraints that cannot be fixed by clamping
    pub fn validate(&self) -> Result<()> {
        let count = match self {
            Operation::BasicAlarmTable(entries) => entries.len(),
            Operation::EffectAlarmTable(entries) => entries.len(),
            _ => return Ok(()),
        };
        if count > MAX_ALARM_SLOTS {
            return Err(Error::TableOverflow {
                count,
                max: MAX_ALARM_SLOTS,
            });
        }
        Ok(())
    }
}

/// Clamps `value` into `[min, max]`, warning when it had to be limited
pub fn clamp(value: u32, min: u8, max: u8, what: &str) -> u8 {
    let limited = value.clamp(min as u32, max as u32) as u8;
    if limited as u32 != value {
        warn!(
            "{} {} out of range ({}-{}), limiting to {}",
            what, value, min, max, limited
        );
    }
    limited
}

/// Clamps into the 1-100 percentage range used for speed and brightness
pub fn clamp_percent(value: u32, what: &str) -> u8 {
    clamp(value, 1, 100, what)
}
