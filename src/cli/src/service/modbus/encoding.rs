// NOTE: inverters report 0xFFFF (and 0x7FFF for signed values) when a
// register has no data, those decode to zero

pub(crate) const SENTINEL: u16 = 0xFFFF;
pub(crate) const SIGNED_SENTINEL: u16 = 0x7FFF;

const SIGN_THRESHOLD: u16 = 32767;
const WORD: i64 = 0x1_0000;
const DOUBLE_WORD: i64 = 0x1_0000_0000;

pub(crate) fn decode_u16(raw: u16, mask: Option<u16>) -> i64 {
  match mask {
    Some(mask) => i64::from((raw & mask) != 0),
    None if raw == SENTINEL => 0,
    None => i64::from(raw),
  }
}

pub(crate) fn decode_s16(raw: u16) -> i64 {
  if raw == SENTINEL || raw == SIGNED_SENTINEL {
    return 0;
  }

  if raw >= SIGN_THRESHOLD {
    i64::from(raw) - WORD
  } else {
    i64::from(raw)
  }
}

pub(crate) fn decode_u32(low: u16, high: u16) -> i64 {
  if low == SENTINEL && high == SENTINEL {
    return 0;
  }

  combine(low, high)
}

pub(crate) fn decode_s32(low: u16, high: u16) -> i64 {
  if low == SENTINEL && (high == SENTINEL || high == SIGNED_SENTINEL) {
    return 0;
  }

  if high >= SIGN_THRESHOLD {
    combine(low, high) - DOUBLE_WORD
  } else {
    combine(low, high)
  }
}

fn combine(low: u16, high: u16) -> i64 {
  i64::from(low) + i64::from(high) * WORD
}
