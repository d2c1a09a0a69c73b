//! Compact timeout encoding: `<integer><unit>`.
//!
//! Units: `H` hours, `M` minutes, `S` seconds, `m` milliseconds,
//! `u` microseconds, `n` nanoseconds.

use std::time::Duration;

use super::{HeaderError, HEADER_TIMEOUT};

/// Longest integer part emitted by [`encode_timeout`].
const MAX_DIGITS_VALUE: u128 = 99_999_999;

const UNITS: [(char, u128); 6] = [
    ('H', 3_600_000_000_000),
    ('M', 60_000_000_000),
    ('S', 1_000_000_000),
    ('m', 1_000_000),
    ('u', 1_000),
    ('n', 1),
];

/// Parses a timeout header value.
pub fn decode_timeout(value: &str) -> Result<Duration, HeaderError> {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return Err(HeaderError::new(HEADER_TIMEOUT, "value is empty"));
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    let Some(&(_, unit_nanos)) = UNITS.iter().find(|(u, _)| *u == unit) else {
        return Err(HeaderError::new(
            HEADER_TIMEOUT,
            format!("unit is not recognized: {:?}", unit.to_string()),
        ));
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeaderError::new(
            HEADER_TIMEOUT,
            format!("invalid duration value: {digits:?}"),
        ));
    }

    let count: u128 = digits
        .parse()
        .map_err(|e| HeaderError::new(HEADER_TIMEOUT, format!("invalid duration value: {e}")))?;
    let nanos = count
        .checked_mul(unit_nanos)
        .ok_or_else(|| HeaderError::new(HEADER_TIMEOUT, "duration is too large"))?;

    let secs = u64::try_from(nanos / 1_000_000_000)
        .map_err(|_| HeaderError::new(HEADER_TIMEOUT, "duration is too large"))?;
    Ok(Duration::new(secs, (nanos % 1_000_000_000) as u32))
}

/// Encodes a timeout using the coarsest unit that represents it exactly,
/// rounding up when no unit fits in eight digits.
pub fn encode_timeout(timeout: Duration) -> String {
    let nanos = timeout.as_nanos();

    for (unit, unit_nanos) in UNITS {
        if nanos % unit_nanos == 0 && nanos / unit_nanos <= MAX_DIGITS_VALUE {
            return format!("{}{}", nanos / unit_nanos, unit);
        }
    }

    for (unit, unit_nanos) in UNITS.iter().rev() {
        let count = nanos.div_ceil(*unit_nanos);
        if count <= MAX_DIGITS_VALUE {
            return format!("{count}{unit}");
        }
    }
    format!("{MAX_DIGITS_VALUE}H")
}
