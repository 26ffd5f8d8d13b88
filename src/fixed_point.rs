//! Decimal values with one fractional digit, held as integer tenths.

use std::fmt;

use crate::error::MalformedRecord;

/// Parses `-?digits(.digit)?` into tenths without touching floating point.
///
/// The decimal point is skipped, not interpreted: digits on both sides of it
/// accumulate into one integer, which is exact as long as the source carries
/// exactly one fractional digit.
#[inline(always)]
pub fn parse_tenths(bytes: &[u8]) -> Result<i16, MalformedRecord> {
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, bytes),
    };

    let mut value: i16 = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for &b in digits {
        match b {
            b'0'..=b'9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add((b - b'0') as i16))
                    .ok_or(MalformedRecord::OutOfRange)?;
                seen_digit = true;
            }
            b'.' if !seen_dot => seen_dot = true,
            b'.' => return Err(MalformedRecord::ExtraDecimalPoint),
            other => return Err(MalformedRecord::InvalidByte(other)),
        }
    }

    if !seen_digit {
        return Err(MalformedRecord::EmptyValue);
    }

    Ok(if negative { -value } else { value })
}

#[inline(always)]
pub fn branchless_min(a: i16, b: i16) -> i16 {
    let diff = b as i32 - a as i32;
    (a as i32 + (diff & (diff >> 31))) as i16
}

#[inline(always)]
pub fn branchless_max(a: i16, b: i16) -> i16 {
    let diff = a as i32 - b as i32;
    (a as i32 - (diff & (diff >> 31))) as i16
}

/// Mean in tenths, truncated toward zero.
#[inline]
pub fn mean_tenths(sum: i64, count: u64) -> i64 {
    sum / count as i64
}

/// Renders tenths as `[-]int.frac`.
///
/// The sign lives on the integer part; when that part is zero the sign is
/// still printed, so `-5` renders as `-0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenths(pub i64);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let int = (self.0 / 10).unsigned_abs();
        let frac = (self.0 % 10).unsigned_abs();
        write!(f, "{sign}{int}.{frac}")
    }
}
