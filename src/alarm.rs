/*!
 # Alarm specifications

 Parses the textual alarm syntax into table entries:

 ```text
 HH:MM[,param,...][/days|/once][#brightness][%speed]
 ```

 Several entries are joined with `;`. `#` and `%` may appear anywhere in an
 entry. Days are a 7-digit binary string or the word `once`; without a day
 modifier the alarm fires every day. A single malformed entry rejects the
 whole batch.
*/

use tracing::{debug, instrument, trace};

use crate::effects;
use crate::operation::{clamp_percent, Operation};
use crate::schedule::DayMask;
use crate::{Error, Result};

pub const DEFAULT_BRIGHTNESS: u8 = 100;
pub const DEFAULT_SPEED: u8 = 50;

/// Action type byte for a static color slot
pub const ACTION_RGB: u8 = 0x0f;
/// Action type byte for a power-off slot
pub const ACTION_POWER_OFF: u8 = 0xf0;
/// First action type byte of the effect alarm range
pub const ACTION_EFFECT_BASE: u8 = 0x38;

/// Which family of alarm a specification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    /// Power on, stored in the basic timer table
    On,
    /// Power off, stored in the effect timer table
    Off,
    /// Static color, stored in the effect timer table
    Rgb,
    /// Animated effect, stored in the effect timer table
    Effect,
}

/// One slot of the basic (power-on) timer table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicAlarmEntry {
    pub days: DayMask,
    pub hour: u8,
    pub minute: u8,
    pub brightness: u8,
    pub speed: u8,
}

/// What an effect timer slot does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    Rgb { r: u8, g: u8, b: u8, brightness: u8 },
    PowerOff,
    Effect { id: u8, speed: u8, brightness: u8 },
}

impl AlarmAction {
    /// The action type byte stored at offset 3 of an effect timer record.
    /// Effect slots carry the effect command id.
    pub fn action_type(&self) -> u8 {
        self.action_type_with(false)
    }

    /// Like [`action_type`](Self::action_type), but with `effect_offset` set
    /// an effect slot stores its id shifted into the range starting at
    /// [`ACTION_EFFECT_BASE`] (`fade7` 0x25 becomes 0x38, `jump7` 0x38 becomes 0x4b).
    pub fn action_type_with(&self, effect_offset: bool) -> u8 {
        match *self {
            AlarmAction::Rgb { .. } => ACTION_RGB,
            AlarmAction::PowerOff => ACTION_POWER_OFF,
            AlarmAction::Effect { id, .. } if effect_offset => id
                .wrapping_sub(effects::FIRST_EFFECT_ID)
                .wrapping_add(ACTION_EFFECT_BASE),
            AlarmAction::Effect { id, .. } => id,
        }
    }

    /// The four parameter bytes stored at offsets 4..8
    pub fn params(&self) -> [u8; 4] {
        match *self {
            AlarmAction::Rgb { r, g, b, brightness } => [r, g, b, brightness],
            AlarmAction::PowerOff => [0; 4],
            AlarmAction::Effect {
                speed, brightness, ..
            } => [speed, brightness, 0, 0],
        }
    }
}

/// One slot of the effect timer table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectAlarmEntry {
    pub days: DayMask,
    pub hour: u8,
    pub minute: u8,
    pub action: AlarmAction,
}

impl EffectAlarmEntry {
    pub fn action_type(&self) -> u8 {
        self.action.action_type()
    }

    pub fn action_type_with(&self, effect_offset: bool) -> u8 {
        self.action.action_type_with(effect_offset)
    }
}

/// Parsed alarms, already sorted into the table they belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmTable {
    Basic(Vec<BasicAlarmEntry>),
    Effect(Vec<EffectAlarmEntry>),
}

impl AlarmTable {
    pub fn len(&self) -> usize {
        match self {
            AlarmTable::Basic(entries) => entries.len(),
            AlarmTable::Effect(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_operation(self) -> Operation {
        match self {
            AlarmTable::Basic(entries) => Operation::BasicAlarmTable(entries),
            AlarmTable::Effect(entries) => Operation::EffectAlarmTable(entries),
        }
    }
}

/// Parses a `;`-separated list of alarms of one kind
#[instrument]
pub fn parse(input: &str, kind: AlarmKind) -> Result<AlarmTable> {
    let table = match kind {
        AlarmKind::On => AlarmTable::Basic(parse_on_alarms(input)?),
        AlarmKind::Off => AlarmTable::Effect(parse_off_alarms(input)?),
        AlarmKind::Rgb => AlarmTable::Effect(parse_rgb_alarms(input)?),
        AlarmKind::Effect => AlarmTable::Effect(parse_effect_alarms(input)?),
    };
    debug!("Parsed {} {:?} alarm(s)", table.len(), kind);
    Ok(table)
}

/// `HH:MM[/days][#brightness][%speed]`
pub fn parse_on_alarms(input: &str) -> Result<Vec<BasicAlarmEntry>> {
    entries(input)
        .map(|raw| {
            let parts = AlarmParts::split(raw)?;
            parts.reject_params()?;
            Ok(BasicAlarmEntry {
                days: parts.days,
                hour: parts.hour,
                minute: parts.minute,
                brightness: parts.brightness,
                speed: parts.speed,
            })
        })
        .collect()
}

/// `HH:MM[/days]`
pub fn parse_off_alarms(input: &str) -> Result<Vec<EffectAlarmEntry>> {
    entries(input)
        .map(|raw| {
            let parts = AlarmParts::split(raw)?;
            parts.reject_params()?;
            Ok(parts.entry(AlarmAction::PowerOff))
        })
        .collect()
}

/// `HH:MM,R,G,B[/days][#brightness]`
pub fn parse_rgb_alarms(input: &str) -> Result<Vec<EffectAlarmEntry>> {
    entries(input)
        .map(|raw| {
            let parts = AlarmParts::split(raw)?;
            let (r, g, b) = parse_rgb(raw, parts.params.as_deref().unwrap_or(""))?;
            Ok(parts.entry(AlarmAction::Rgb {
                r,
                g,
                b,
                brightness: parts.brightness,
            }))
        })
        .collect()
}

/// `HH:MM,effect[:R,G,B][/days][#brightness][%speed]`
pub fn parse_effect_alarms(input: &str) -> Result<Vec<EffectAlarmEntry>> {
    entries(input)
        .map(|raw| {
            let parts = AlarmParts::split(raw)?;
            let params = parts.params.as_deref().unwrap_or("");
            let (name, color) = match params.split_once(':') {
                Some((name, color)) => (name.trim(), Some(color)),
                None => (params, None),
            };
            if name.is_empty() {
                return Err(malformed(raw, "missing effect name"));
            }
            let id = effects::lookup(name)?;

            let action = match color {
                Some(color) => {
                    let (r, g, b) = parse_rgb(raw, color)?;
                    trace!("Effect '{}' overridden by color ({}, {}, {})", name, r, g, b);
                    AlarmAction::Rgb {
                        r,
                        g,
                        b,
                        brightness: parts.brightness,
                    }
                }
                None => AlarmAction::Effect {
                    id,
                    speed: parts.speed,
                    brightness: parts.brightness,
                },
            };
            Ok(parts.entry(action))
        })
        .collect()
}

fn entries(input: &str) -> impl Iterator<Item = &str> {
    input.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn malformed(fragment: &str, reason: impl Into<String>) -> Error {
    Error::MalformedAlarmSyntax {
        fragment: fragment.to_string(),
        reason: reason.into(),
    }
}

/// The kind-independent pieces of one alarm entry
#[derive(Debug)]
struct AlarmParts<'a> {
    raw: &'a str,
    hour: u8,
    minute: u8,
    params: Option<String>,
    days: DayMask,
    brightness: u8,
    speed: u8,
}

impl<'a> AlarmParts<'a> {
    fn split(raw: &'a str) -> Result<AlarmParts<'a>> {
        let (rest, brightness) = take_modifier(raw, raw, '#')?;
        let (rest, speed) = take_modifier(raw, &rest, '%')?;

        let mut parts = rest.split('/');
        // split always yields at least one item
        let head = parts.next().unwrap_or_default().trim();

        let mut days = DayMask::default();
        let mut once = false;
        for modifier in parts {
            let modifier = modifier.trim();
            if modifier.eq_ignore_ascii_case("once") {
                once = true;
            } else if let Some(mask) = DayMask::from_binary(modifier) {
                days = mask;
            } else {
                return Err(malformed(
                    raw,
                    format!("days must be 7 binary digits or 'once', got '{}'", modifier),
                ));
            }
        }
        if once {
            days = DayMask::ONCE;
        }

        let (time, params) = match head.split_once(',') {
            Some((time, params)) => (time.trim(), Some(params.trim().to_string())),
            None => (head, None),
        };
        let (hour, minute) = parse_time(raw, time)?;

        Ok(AlarmParts {
            raw,
            hour,
            minute,
            params,
            days,
            brightness: brightness
                .map(|v| clamp_percent(v, "alarm brightness"))
                .unwrap_or(DEFAULT_BRIGHTNESS),
            speed: speed
                .map(|v| clamp_percent(v, "alarm speed"))
                .unwrap_or(DEFAULT_SPEED),
        })
    }

    fn reject_params(&self) -> Result<()> {
        match &self.params {
            Some(p) => Err(malformed(
                self.raw,
                format!("unexpected parameters '{}'", p),
            )),
            None => Ok(()),
        }
    }

    fn entry(&self, action: AlarmAction) -> EffectAlarmEntry {
        EffectAlarmEntry {
            days: self.days,
            hour: self.hour,
            minute: self.minute,
            action,
        }
    }
}

/// Removes every `<marker>N` from `text`, returning the remainder and the
/// last value seen.
fn take_modifier(raw: &str, text: &str, marker: char) -> Result<(String, Option<u32>)> {
    let mut rest = String::with_capacity(text.len());
    let mut value = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != marker {
            rest.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        if digits.is_empty() {
            return Err(malformed(
                raw,
                format!("'{}' must be followed by a number", marker),
            ));
        }
        // Anything too long for u32 is far out of range and clamps anyway.
        value = Some(digits.parse::<u32>().unwrap_or(u32::MAX));
    }
    Ok((rest, value))
}

fn parse_time(raw: &str, token: &str) -> Result<(u8, u8)> {
    let bad = || malformed(raw, format!("time must look like HH:MM, got '{}'", token));

    let (h, m) = token.split_once(':').ok_or_else(bad)?;
    if h.is_empty()
        || h.len() > 2
        || m.len() != 2
        || !h.bytes().all(|b| b.is_ascii_digit())
        || !m.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(bad());
    }
    let hour: u8 = h.parse().map_err(|_| bad())?;
    let minute: u8 = m.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(malformed(
            raw,
            format!("time '{}' is not a valid clock time", token),
        ));
    }
    Ok((hour, minute))
}

fn parse_rgb(raw: &str, params: &str) -> Result<(u8, u8, u8)> {
    let values = params
        .split(',')
        .map(str::trim)
        .map(|v| {
            v.parse::<u32>()
                .map(|n| n.min(255) as u8)
                .map_err(|_| malformed(raw, format!("'{}' is not a color value", v)))
        })
        .collect::<Result<Vec<u8>>>()?;

    match values.as_slice() {
        [r, g, b] => Ok((*r, *g, *b)),
        _ => Err(malformed(
            raw,
            format!("expected R,G,B, got {} value(s)", values.len()),
        )),
    }
}
