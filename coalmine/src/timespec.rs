//! Graphite-style time expressions.
//!
//! Accepted forms:
//!
//! - `now`
//! - a relative offset: an optional sign followed by one or more
//!   `<number><unit>` segments, e.g. `-24h`, `-1d12h`, `+30min`, `1d`
//! - an absolute unix timestamp in seconds, e.g. `1700000000`
//!
//! Units: `s`/`sec`/`seconds`, `min`/`minutes`, `h`/`hours`, `d`/`days`,
//! `w`/`weeks`, `mon`/`months` (30 days), `y`/`years` (365 days).

use crate::error::ConfigError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Resolves `expr` to unix seconds relative to `now`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTime`] for malformed expressions, unknown
/// units and results outside the unsigned 64-bit range.
///
/// # Examples
///
/// ```rust
/// use coalmine::timespec::parse_time;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// assert_eq!(parse_time("now", 100_000)?, 100_000);
/// assert_eq!(parse_time("-1d", 100_000)?, 13_600);
/// assert_eq!(parse_time("-1h30min", 100_000)?, 94_600);
/// # Ok(())
/// # }
/// ```
pub fn parse_time(expr: &str, now: u64) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTime {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty expression"));
    }
    if trimmed == "now" {
        return Ok(now);
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse()
            .map_err(|_| invalid("timestamp out of range"));
    }

    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let offset = parse_offset(body).map_err(|reason| invalid(&reason))?;

    let resolved = if negative {
        now.checked_sub(offset)
    } else {
        now.checked_add(offset)
    };
    resolved.ok_or_else(|| invalid("resolves outside the unix time range"))
}

/// Sums a chain of `<number><unit>` segments into seconds.
fn parse_offset(body: &str) -> Result<u64, String> {
    if body.is_empty() {
        return Err("missing offset after sign".to_string());
    }

    let mut total = 0u64;
    let mut rest = body;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(format!("expected a number at '{rest}'"));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("number '{}' is too large", &rest[..digits]))?;
        rest = &rest[digits..];

        let letters = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        let unit = &rest[..letters];
        rest = &rest[letters..];
        let scale = unit_seconds(unit).ok_or_else(|| {
            if unit.is_empty() {
                format!("missing unit after {amount}")
            } else {
                format!("unknown unit '{unit}'")
            }
        })?;

        total = amount
            .checked_mul(scale)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(|| "offset is too large".to_string())?;
    }
    Ok(total)
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let seconds = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => 7 * DAY,
        "mon" | "month" | "months" => 30 * DAY,
        "y" | "year" | "years" => 365 * DAY,
        _ => return None,
    };
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_now() {
        assert_eq!(parse_time("now", NOW).unwrap(), NOW);
        assert_eq!(parse_time("  now ", NOW).unwrap(), NOW);
    }

    #[test]
    fn test_relative_offsets() {
        assert_eq!(parse_time("-24h", NOW).unwrap(), NOW - 86_400);
        assert_eq!(parse_time("-2d", NOW).unwrap(), NOW - 2 * 86_400);
        assert_eq!(parse_time("+10s", NOW).unwrap(), NOW + 10);
        assert_eq!(parse_time("1d", NOW).unwrap(), NOW + 86_400);
        assert_eq!(parse_time("-1w", NOW).unwrap(), NOW - 604_800);
        assert_eq!(parse_time("-1mon", NOW).unwrap(), NOW - 30 * 86_400);
        assert_eq!(parse_time("-1y", NOW).unwrap(), NOW - 365 * 86_400);
        assert_eq!(parse_time("-5minutes", NOW).unwrap(), NOW - 300);
    }

    #[test]
    fn test_chained_offsets() {
        assert_eq!(parse_time("-1d12h", NOW).unwrap(), NOW - 129_600);
        assert_eq!(parse_time("-1h30min15s", NOW).unwrap(), NOW - 5_415);
    }

    #[test]
    fn test_absolute_timestamp() {
        assert_eq!(parse_time("1600000000", NOW).unwrap(), 1_600_000_000);
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "-", "yesterday", "-1", "-1x", "-h", "-1d-2h", "1.5h"] {
            let err = parse_time(expr, NOW).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidTime { .. }),
                "{expr:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_out_of_range() {
        assert!(parse_time("-1d", 10).is_err());
        assert!(parse_time("+99999999999999999y", NOW).is_err());
        assert!(parse_time("99999999999999999999999", NOW).is_err());
    }
}
