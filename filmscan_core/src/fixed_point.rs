//! Tenths-of-a-count helpers for the PT envelope.
//!
//! Operating in tenths (`i32`) lets the envelope decay by fractions of a
//! count per sample without floating point in the control loop.

/// Raw ADC count to tenths.
#[inline]
pub fn to_tenths(level: u16) -> i32 {
    i32::from(level) * 10
}

/// Tenths back to a raw count, truncating and clamping to the `u16` range.
#[inline]
pub fn from_tenths(tenths: i32) -> u16 {
    let v = tenths / 10;
    if v <= 0 {
        0
    } else if v >= i32::from(u16::MAX) {
        u16::MAX
    } else {
        v as u16
    }
}

/// `value * pct / 100`, truncating like an `int(value * ratio)` cast.
#[inline]
pub fn percent_of(value: u32, pct: u32) -> u32 {
    ((u64::from(value) * u64::from(pct)) / 100) as u32
}
