/*!
 # Frame compiler

 Turns one [`Operation`] into one wire frame:

 ```text
 00 | SEQ | 80 00 00 <family header> | payload | CHK
 ```

 The compiler owns the sequence counter. Every call to
 [`FrameCompiler::compile`] consumes exactly one sequence number, so frames
 must be compiled in the order they are going to be written.
*/

use std::fmt;

use chrono::Timelike;
use tracing::{debug, instrument};

use crate::operation::{clamp, clamp_percent, Operation};
use crate::table::{encode_basic_table, encode_effect_table};

pub const PREAMBLE: u8 = 0x00;
pub const HEADER_PREFIX: [u8; 3] = [0x80, 0x00, 0x00];
/// Longest frame any fixed-shape command produces (power on/off)
pub const MAX_FIXED_FRAME_LEN: usize = 21;

/// Checksum bias of the power and basic timer families
pub const POWER_BIAS: u8 = 0x26;
/// Checksum bias of every other family
pub const DEFAULT_BIAS: u8 = 0x38;

/// Extra byte some captures show between effect speed and brightness
pub const EFFECT_SPEED_MARKER: u8 = 0x10;

/// Command family, identified on the wire by its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    Power,
    Rgb,
    Effect,
    Candle,
    Time,
    BasicTimer,
    EffectTimer,
}

const FAMILIES: [CommandFamily; 7] = [
    CommandFamily::Power,
    CommandFamily::Rgb,
    CommandFamily::Effect,
    CommandFamily::Candle,
    CommandFamily::Time,
    CommandFamily::BasicTimer,
    CommandFamily::EffectTimer,
];

impl CommandFamily {
    /// Header bytes following the `80 00 00` prefix
    pub fn header(self) -> &'static [u8] {
        match self {
            CommandFamily::Power => &[0x0d, 0x0e, 0x0b, 0x3b],
            CommandFamily::Rgb => &[0x08, 0x09, 0x0b, 0x31],
            CommandFamily::Effect => &[0x05, 0x06, 0x0b, 0x38],
            CommandFamily::Candle => &[0x09, 0x0a, 0x0b, 0x39, 0xd1],
            CommandFamily::Time => &[0x04, 0x05, 0x0a],
            CommandFamily::BasicTimer => &[0x0c, 0x0d, 0x0b],
            CommandFamily::EffectTimer => &[0x58, 0x59, 0x0b],
        }
    }

    pub fn bias(self) -> u8 {
        match self {
            CommandFamily::Power | CommandFamily::BasicTimer => POWER_BIAS,
            CommandFamily::Rgb
            | CommandFamily::Effect
            | CommandFamily::Candle
            | CommandFamily::Time
            | CommandFamily::EffectTimer => DEFAULT_BIAS,
        }
    }

    /// Identifies the family of a frame's bytes, starting at the prefix
    pub fn from_header(bytes: &[u8]) -> Option<CommandFamily> {
        let rest = bytes.strip_prefix(&HEADER_PREFIX[..])?;
        FAMILIES
            .iter()
            .copied()
            .find(|family| rest.starts_with(family.header()))
    }

    pub fn for_operation(op: &Operation) -> CommandFamily {
        match op {
            Operation::Power { .. } => CommandFamily::Power,
            Operation::Rgb { .. } => CommandFamily::Rgb,
            Operation::Effect { .. } => CommandFamily::Effect,
            Operation::Candle { .. } => CommandFamily::Candle,
            Operation::TimeSync(_) => CommandFamily::Time,
            Operation::BasicAlarmTable(_) => CommandFamily::BasicTimer,
            Operation::EffectAlarmTable(_) => CommandFamily::EffectTimer,
        }
    }

    /// Header bytes after the two length bytes and the type byte
    fn command_bytes(self) -> &'static [u8] {
        &self.header()[3..]
    }
}

/// How the trailing checksum byte is derived.
///
/// Captured traffic is not consistent here: the power capture matches
/// `SequenceBias`, while the static-color capture only matches `PayloadSum`.
/// Until this is checked against hardware both are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumMode {
    /// `(sequence + family bias) mod 256`
    #[default]
    SequenceBias,
    /// Sum of the command bytes and payload, mod 256
    PayloadSum,
}

/// Protocol details that are not confirmed on hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolQuirks {
    pub checksum: ChecksumMode,
    /// Insert [`EFFECT_SPEED_MARKER`] between effect speed and brightness
    pub effect_speed_marker: bool,
    /// Store effect alarm slots with action types shifted to start at 0x38
    /// instead of the effect command id
    pub effect_alarm_offset: bool,
}

/// Computes the checksum byte for a frame
pub fn checksum(mode: ChecksumMode, family: CommandFamily, sequence: u8, payload: &[u8]) -> u8 {
    match mode {
        ChecksumMode::SequenceBias => sequence.wrapping_add(family.bias()),
        ChecksumMode::PayloadSum => family
            .command_bytes()
            .iter()
            .chain(payload)
            .fold(0u8, |acc, b| acc.wrapping_add(*b)),
    }
}

/// 8-bit frame sequence number. Starts at 0 for every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceCounter(u8);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn starting_at(value: u8) -> Self {
        Self(value)
    }

    /// The value the next frame will carry
    pub fn current(&self) -> u8 {
        self.0
    }

    /// Returns the current value and moves the counter on by one, wrapping
    pub fn advance(&mut self) -> u8 {
        let value = self.0;
        self.0 = self.0.wrapping_add(1);
        value
    }
}

/// One complete unit written to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub family: CommandFamily,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Frame {
    pub fn len(&self) -> usize {
        2 + HEADER_PREFIX.len() + self.family.header().len() + self.payload.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.push(PREAMBLE);
        bytes.push(self.sequence);
        bytes.extend_from_slice(&HEADER_PREFIX);
        bytes.extend_from_slice(self.family.header());
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.checksum);
        bytes
    }

    /// Splits captured bytes back into a frame, if the header is known
    pub fn parse(bytes: &[u8]) -> Option<Frame> {
        let (&preamble, rest) = bytes.split_first()?;
        let (&sequence, rest) = rest.split_first()?;
        if preamble != PREAMBLE {
            return None;
        }
        let family = CommandFamily::from_header(rest)?;
        let body = &rest[HEADER_PREFIX.len() + family.header().len()..];
        let (&checksum, payload) = body.split_last()?;
        Some(Frame {
            sequence,
            family,
            payload: payload.to_vec(),
            checksum,
        })
    }

}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Stateful compiler from operations to frames
#[derive(Debug, Default)]
pub struct FrameCompiler {
    counter: SequenceCounter,
    quirks: ProtocolQuirks,
}

impl FrameCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(counter: SequenceCounter) -> Self {
        Self {
            counter,
            ..Self::default()
        }
    }

    pub fn with_quirks(mut self, quirks: ProtocolQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn counter(&self) -> SequenceCounter {
        self.counter
    }

    /// Compiles one operation, consuming one sequence number
    #[instrument(skip(self, op), fields(op = op.name()))]
    pub fn compile(&mut self, op: &Operation) -> Frame {
        let family = CommandFamily::for_operation(op);
        let payload = self.payload(op);
        let sequence = self.counter.advance();
        let checksum = checksum(self.quirks.checksum, family, sequence, &payload);

        let frame = Frame {
            sequence,
            family,
            payload,
            checksum,
        };
        debug!("Compiled {:?} frame: {}", family, frame);
        frame
    }

    /// Recomputes the checksum of captured bytes under this compiler's mode
    pub fn verify(&self, bytes: &[u8]) -> bool {
        match Frame::parse(bytes) {
            Some(f) => {
                f.checksum == checksum(self.quirks.checksum, f.family, f.sequence, &f.payload)
            }
            None => false,
        }
    }

    fn payload(&self, op: &Operation) -> Vec<u8> {
        match op {
            Operation::Power { on } => {
                let mut payload = vec![0u8; 11];
                payload[0] = if *on { 0x23 } else { 0x24 };
                payload
            }
            Operation::Rgb { r, g, b } => vec![*r, *g, *b, 0x00, 0x00, 0x0f],
            Operation::Effect {
                id,
                speed,
                brightness,
            } => {
                let speed = clamp_percent(*speed as u32, "effect speed");
                let brightness = clamp_percent(*brightness as u32, "effect brightness");
                if self.quirks.effect_speed_marker {
                    vec![*id, speed, EFFECT_SPEED_MARKER, brightness]
                } else {
                    vec![*id, speed, brightness]
                }
            }
            Operation::Candle {
                amplitude,
                speed,
                brightness,
                r,
                g,
                b,
            } => {
                let speed = clamp_percent(*speed as u32, "candle speed");
                vec![
                    *r,
                    *g,
                    *b,
                    101 - speed,
                    clamp_percent(*brightness as u32, "candle brightness"),
                    clamp(*amplitude as u32, 1, 3, "candle amplitude"),
                ]
            }
            Operation::TimeSync(time) => vec![
                time.hour() as u8 | 0x80,
                time.minute() as u8 | 0x80,
                time.second() as u8 | 0x80,
            ],
            Operation::BasicAlarmTable(entries) => encode_basic_table(entries),
            Operation::EffectAlarmTable(entries) => {
                encode_effect_table(entries, self.quirks.effect_alarm_offset)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn bytes(hex: &str) -> Vec<u8> {
        hex.split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect()
    }

    #[test]
    fn test_power_on_matches_capture() {
        let mut compiler = FrameCompiler::with_counter(SequenceCounter::starting_at(0x19));
        let frame = compiler.compile(&Operation::Power { on: true });
        assert_eq!(
            frame.to_bytes(),
            bytes("00 19 80 00 00 0D 0E 0B 3B 23 00 00 00 00 00 00 00 00 00 00 3F")
        );
        assert_eq!(frame.len(), MAX_FIXED_FRAME_LEN);
    }

    #[test]
    fn test_power_off() {
        let mut compiler = FrameCompiler::new();
        let frame = compiler.compile(&Operation::Power { on: false });
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.payload[0], 0x24);
        assert_eq!(frame.checksum, 0x26);
    }

    #[test]
    fn test_rgb_frame_layout() {
        let mut compiler = FrameCompiler::with_counter(SequenceCounter::starting_at(0x22));
        let frame = compiler.compile(&Operation::rgb(255, 0, 255));
        let wire = frame.to_bytes();
        assert_eq!(
            &wire[..wire.len() - 1],
            &bytes("00 22 80 00 00 08 09 0B 31 FF 00 FF 00 00 0F")[..]
        );
        assert_eq!(frame.checksum, 0x22u8.wrapping_add(0x38));
    }

    #[test]
    fn test_rgb_capture_under_payload_sum() {
        let quirks = ProtocolQuirks {
            checksum: ChecksumMode::PayloadSum,
            ..ProtocolQuirks::default()
        };
        let mut compiler =
            FrameCompiler::with_counter(SequenceCounter::starting_at(0x22)).with_quirks(quirks);
        let frame = compiler.compile(&Operation::rgb(255, 0, 255));
        assert_eq!(
            frame.to_bytes(),
            bytes("00 22 80 00 00 08 09 0B 31 FF 00 FF 00 00 0F 3E")
        );
        assert!(compiler.verify(&frame.to_bytes()));
    }

    #[test]
    fn test_checksum_law_for_every_sequence() {
        for family in FAMILIES {
            for s in 0..=255u8 {
                let expected = ((s as u16 + family.bias() as u16) % 256) as u8;
                assert_eq!(
                    checksum(ChecksumMode::SequenceBias, family, s, &[]),
                    expected
                );
            }
        }
    }

    #[test]
    fn test_counter_wraps() {
        let mut counter = SequenceCounter::starting_at(0xfe);
        assert_eq!(counter.advance(), 0xfe);
        assert_eq!(counter.advance(), 0xff);
        assert_eq!(counter.advance(), 0x00);

        let start = counter;
        for _ in 0..256 {
            counter.advance();
        }
        assert_eq!(counter, start);
    }

    #[test]
    fn test_consecutive_frames_use_consecutive_sequences() {
        let mut compiler = FrameCompiler::new();
        let seqs: Vec<u8> = (0..300)
            .map(|_| compiler.compile(&Operation::Power { on: true }).sequence)
            .collect();
        for (i, s) in seqs.iter().enumerate() {
            assert_eq!(*s, (i % 256) as u8);
        }
        assert_eq!(compiler.counter().current(), (300 % 256) as u8);
    }

    #[test]
    fn test_effect_payload() {
        let mut compiler = FrameCompiler::new();
        let frame = compiler.compile(&Operation::effect(0x25, 40, 90));
        assert_eq!(frame.payload, vec![0x25, 40, 90]);
        assert_eq!(
            frame.to_bytes(),
            bytes("00 00 80 00 00 05 06 0B 38 25 28 5A 38")
        );

        let mut compiler = FrameCompiler::new().with_quirks(ProtocolQuirks {
            effect_speed_marker: true,
            ..ProtocolQuirks::default()
        });
        let frame = compiler.compile(&Operation::effect(0x25, 40, 90));
        assert_eq!(frame.payload, vec![0x25, 40, 0x10, 90]);
    }

    #[test]
    fn test_candle_inverts_speed() {
        let mut compiler = FrameCompiler::new();
        let frame = compiler.compile(&Operation::candle(2, 100, 75, (255, 120, 10)));
        assert_eq!(frame.family, CommandFamily::Candle);
        assert_eq!(frame.payload, vec![255, 120, 10, 1, 75, 2]);

        let frame = compiler.compile(&Operation::candle(1, 1, 75, (0, 0, 0)));
        assert_eq!(frame.payload[3], 100);
        assert_eq!(
            &frame.to_bytes()[..10],
            &bytes("00 01 80 00 00 09 0A 0B 39 D1")[..]
        );
        assert!(frame.len() <= MAX_FIXED_FRAME_LEN);
    }

    #[test]
    fn test_time_sync_sets_top_bits() {
        let mut compiler = FrameCompiler::new();
        let time = NaiveTime::from_hms_opt(13, 7, 0).unwrap();
        let frame = compiler.compile(&Operation::TimeSync(time));
        assert_eq!(
            frame.to_bytes(),
            bytes("00 00 80 00 00 04 05 0A 8D 87 80 38")
        );
    }

    #[test]
    fn test_alarm_tables_use_timer_families() {
        let mut compiler = FrameCompiler::with_counter(SequenceCounter::starting_at(0x10));
        let basic = compiler.compile(&Operation::BasicAlarmTable(vec![]));
        assert_eq!(basic.family, CommandFamily::BasicTimer);
        assert_eq!(basic.payload, vec![0x14, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(basic.checksum, 0x36);

        let effect = compiler.compile(&Operation::EffectAlarmTable(vec![]));
        assert_eq!(effect.family, CommandFamily::EffectTimer);
        assert_eq!(effect.payload, vec![0; 16]);
        assert_eq!(effect.checksum, 0x49);
        assert_eq!(&effect.to_bytes()[2..8], &[0x80, 0x00, 0x00, 0x58, 0x59, 0x0b]);
    }

    #[test]
    fn test_effect_alarm_action_type_quirk() {
        let alarms = crate::alarm::parse_effect_alarms("06:30,fade7").unwrap();
        let op = Operation::EffectAlarmTable(alarms);

        let frame = FrameCompiler::new().compile(&op);
        assert_eq!(
            frame.to_bytes(),
            bytes("00 00 80 00 00 58 59 0B 7F 06 1E 25 32 64 00 00 00 00 00 00 00 00 00 F0 38")
        );

        let mut compiler = FrameCompiler::new().with_quirks(ProtocolQuirks {
            effect_alarm_offset: true,
            ..ProtocolQuirks::default()
        });
        let frame = compiler.compile(&op);
        assert_eq!(frame.payload[3], 0x38);
        assert_eq!(frame.checksum, 0x38);
    }

    #[test]
    fn test_parse_and_verify_round_trip() {
        let mut compiler = FrameCompiler::with_counter(SequenceCounter::starting_at(0x41));
        let frame = compiler.compile(&Operation::effect(0x30, 10, 20));
        let parsed = Frame::parse(&frame.to_bytes()).unwrap();
        assert_eq!(parsed, frame);
        assert!(compiler.verify(&frame.to_bytes()));

        let mut corrupted = frame.to_bytes();
        *corrupted.last_mut().unwrap() ^= 0xff;
        assert!(!compiler.verify(&corrupted));
        assert!(Frame::parse(&[0x00, 0x01, 0x12, 0x34]).is_none());
    }
}
