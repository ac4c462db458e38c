/*!
 # Alarm table encoding

 Fixed-layout payloads for the two timer command families. The whole table
 is rewritten on every transmission; an empty table is sent as a single
 all-zero record, which clears every slot on the device.
*/

use tracing::trace;

use crate::alarm::{BasicAlarmEntry, EffectAlarmEntry};

/// Leading marker byte of a basic timer table
pub const BASIC_TABLE_MARKER: u8 = 0x14;
pub const BASIC_RECORD_LEN: usize = 8;
pub const EFFECT_RECORD_LEN: usize = 16;
/// Last byte of every populated effect timer record
pub const EFFECT_RECORD_END: u8 = 0xf0;

/// Encodes the basic timer table: marker, then one 8-byte record per entry
pub fn encode_basic_table(entries: &[BasicAlarmEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + BASIC_RECORD_LEN * entries.len().max(1));
    out.push(BASIC_TABLE_MARKER);

    if entries.is_empty() {
        out.extend_from_slice(&[0; BASIC_RECORD_LEN]);
    }
    for entry in entries {
        out.extend_from_slice(&basic_record(entry));
    }

    trace!("Encoded {} basic alarm record(s)", entries.len());
    out
}

/// Encodes the effect timer table: one 16-byte record per entry, no marker.
///
/// `effect_offset` selects how effect slots store their action type, see
/// [`EffectAlarmEntry::action_type_with`].
pub fn encode_effect_table(entries: &[EffectAlarmEntry], effect_offset: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(EFFECT_RECORD_LEN * entries.len().max(1));

    if entries.is_empty() {
        out.extend_from_slice(&[0; EFFECT_RECORD_LEN]);
    }
    for entry in entries {
        out.extend_from_slice(&effect_record(entry, effect_offset));
    }

    trace!("Encoded {} effect alarm record(s)", entries.len());
    out
}

fn basic_record(entry: &BasicAlarmEntry) -> [u8; BASIC_RECORD_LEN] {
    [
        entry.days.bits(),
        entry.hour,
        entry.minute,
        entry.brightness,
        entry.speed,
        0x00,
        0x0f,
        0x00,
    ]
}

fn effect_record(entry: &EffectAlarmEntry, effect_offset: bool) -> [u8; EFFECT_RECORD_LEN] {
    let mut record = [0u8; EFFECT_RECORD_LEN];
    record[0] = entry.days.bits();
    record[1] = entry.hour;
    record[2] = entry.minute;
    record[3] = entry.action_type_with(effect_offset);
    record[4..8].copy_from_slice(&entry.action.params());
    record[EFFECT_RECORD_LEN - 1] = EFFECT_RECORD_END;
    record
}
