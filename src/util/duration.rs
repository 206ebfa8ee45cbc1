use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Digits of a fractional component beyond this add nothing at nanosecond
/// resolution and would overflow the scale factor.
const MAX_FRACTION_DIGITS: usize = 18;

/// Errors produced while parsing a polling interval.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration \"{0}\"")]
    Invalid(String),

    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),

    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },

    /// Zero and negative intervals cannot drive a ticker.
    #[error("duration \"{0}\" must be greater than zero")]
    NotPositive(String),

    #[error("duration \"{0}\" is too large")]
    Overflow(String),
}

/// Parses a duration string such as `"30s"`, `"1m"`, `"1h30m"` or `"1.5s"`.
///
/// Accepts a sequence of decimal numbers, each with an optional fraction and
/// a mandatory unit suffix: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A
/// leading `+` is allowed. The result must be strictly positive.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gator::util::parse_duration;
///
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("10").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(DurationError::NotPositive(input.to_string()));
    }
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest == "0" {
        return Err(DurationError::NotPositive(input.to_string()));
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (int_part, after) = rest.split_at(int_end);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(stripped) => {
                let frac_end = stripped
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(stripped.len());
                stripped.split_at(frac_end)
            }
            None => ("", after),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_end);

        let unit_nanos = match unit_nanos(unit) {
            Some(n) => n,
            None if unit.is_empty() => return Err(DurationError::MissingUnit(input.to_string())),
            None => {
                return Err(DurationError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })
            }
        };

        let overflow = || DurationError::Overflow(input.to_string());

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
            let fraction: u128 = digits.parse().map_err(|_| overflow())?;
            let scale = 10u128.pow(digits.len() as u32);
            value = value
                .checked_add(fraction * unit_nanos / scale)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(value).ok_or_else(overflow)?;
        rest = tail;
    }

    if total == 0 {
        return Err(DurationError::NotPositive(input.to_string()));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| DurationError::Overflow(input.to_string()))?;
    // Remainder is always below one billion
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(60 * 60 * NANOS_PER_SEC),
        _ => None,
    }
}
