/*!
 # Scheduling functionality for LED lights

 Day-of-week masks used by both alarm tables. Bits 0-6 map Monday..Sunday,
 bit 7 marks a one-shot alarm that the device clears after firing.
*/

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use tracing::{debug, trace};

use crate::Error;

/// Represents days of the week for scheduling
#[derive(Debug, Clone, Copy)]
pub struct Days {
    /// Monday (0x01)
    pub monday: u8,
    /// Tuesday (0x02)
    pub tuesday: u8,
    /// Wednesday (0x04)
    pub wednesday: u8,
    /// Thursday (0x08)
    pub thursday: u8,
    /// Friday (0x10)
    pub friday: u8,
    /// Saturday (0x20)
    pub saturday: u8,
    /// Sunday (0x40)
    pub sunday: u8,
    /// All days (0x7F)
    pub all: u8,
    /// Week days (Monday-Friday, 0x1F)
    pub week_days: u8,
    /// Weekend days (Saturday-Sunday, 0x60)
    pub weekend_days: u8,
    /// One-shot marker (0x80)
    pub once: u8,
    /// No days, slot disabled (0x00)
    pub none: u8,
}

/// Predefined day constants for scheduling
pub const WEEK_DAYS: Days = Days {
    monday: 0x01,
    tuesday: 0x02,
    wednesday: 0x04,
    thursday: 0x08,
    friday: 0x10,
    saturday: 0x20,
    sunday: 0x40,
    all: 0x01 + 0x02 + 0x04 + 0x08 + 0x10 + 0x20 + 0x40,
    week_days: 0x01 + 0x02 + 0x04 + 0x08 + 0x10,
    weekend_days: 0x20 + 0x40,
    once: 0x80,
    none: 0x00,
};

const WEEKDAY_ORDER: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// An 8-bit day-of-week mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayMask(pub u8);

impl DayMask {
    pub const EVERY_DAY: DayMask = DayMask(WEEK_DAYS.all);
    pub const ONCE: DayMask = DayMask(WEEK_DAYS.once);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    /// The recurring days set in this mask, Monday first
    pub fn days(self) -> Vec<Weekday> {
        WEEKDAY_ORDER
            .iter()
            .copied()
            .filter(|d| self.contains(*d))
            .collect()
    }

    /// Parses the DSL's 7-character `[01]{7}` form.
    ///
    /// The string is read as a plain base-2 number into the low seven bits,
    /// so the rightmost digit is bit 0 (Monday) and `"0011111"` selects
    /// Monday through Friday.
    pub fn from_binary(s: &str) -> Option<DayMask> {
        if s.len() != 7 || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return None;
        }
        u8::from_str_radix(s, 2).ok().map(DayMask)
    }

    fn from_name(name: &str) -> Option<u8> {
        let value = match name {
            "mon" | "monday" => WEEK_DAYS.monday,
            "tue" | "tuesday" => WEEK_DAYS.tuesday,
            "wed" | "wednesday" => WEEK_DAYS.wednesday,
            "thu" | "thursday" => WEEK_DAYS.thursday,
            "fri" | "friday" => WEEK_DAYS.friday,
            "sat" | "saturday" => WEEK_DAYS.saturday,
            "sun" | "sunday" => WEEK_DAYS.sunday,
            "all" | "daily" => WEEK_DAYS.all,
            "weekdays" => WEEK_DAYS.week_days,
            "weekend" => WEEK_DAYS.weekend_days,
            "once" => WEEK_DAYS.once,
            "none" | "off" => WEEK_DAYS.none,
            _ => return None,
        };
        Some(value)
    }
}

impl Default for DayMask {
    fn default() -> Self {
        DayMask::EVERY_DAY
    }
}

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Command-line spelling of a day mask: binary, `once`, decimal, `0x` hex,
/// day names, or a comma-separated list of names.
impl FromStr for DayMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        debug!("Parsing days string: {}", s);

        if let Some(mask) = DayMask::from_binary(&s) {
            return Ok(mask);
        }
        if let Some(hex) = s.strip_prefix("0x") {
            return u8::from_str_radix(hex, 16)
                .map(DayMask)
                .map_err(|_| Error::InvalidDayMask(s.clone()));
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u8>()
                .map(DayMask)
                .map_err(|_| Error::InvalidDayMask(s.clone()));
        }

        let mut combined = 0;
        for day in s.split(',') {
            let value = DayMask::from_name(day.trim())
                .ok_or_else(|| Error::InvalidDayMask(s.clone()))?;
            trace!("  Day '{}' = {:#04x}", day, value);
            combined |= value;
        }
        Ok(DayMask(combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_weekdays_round_trip() {
        let mask = DayMask::from_binary("0011111").unwrap();
        assert_eq!(mask.bits(), 0x1f);
        assert_eq!(
            mask.days(),
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri
            ]
        );
        assert!(!mask.contains(Weekday::Sat));
        assert!(!mask.contains(Weekday::Sun));
        assert_ne!(mask, DayMask::ONCE);
    }

    #[test]
    fn test_binary_rejects_bad_shapes() {
        assert!(DayMask::from_binary("001111").is_none());
        assert!(DayMask::from_binary("00111112").is_none());
        assert!(DayMask::from_binary("abcdefg").is_none());
    }

    #[test]
    fn test_cli_spellings() {
        assert_eq!("31".parse::<DayMask>().unwrap(), DayMask(0x1f));
        assert_eq!("0x1F".parse::<DayMask>().unwrap(), DayMask(0x1f));
        assert_eq!("weekdays".parse::<DayMask>().unwrap(), DayMask(0x1f));
        assert_eq!("sat,sun".parse::<DayMask>().unwrap(), DayMask(0x60));
        assert_eq!("once".parse::<DayMask>().unwrap(), DayMask::ONCE);
        assert_eq!("1111111".parse::<DayMask>().unwrap(), DayMask::EVERY_DAY);
        assert!("300".parse::<DayMask>().is_err());
        assert!("someday".parse::<DayMask>().is_err());
    }

    #[test]
    fn test_default_is_every_day() {
        assert_eq!(DayMask::default().bits(), 0x7f);
        assert_eq!(DayMask::default().days().len(), 7);
        assert_eq!(DayMask::ONCE.to_string(), "0x80");
    }
}
