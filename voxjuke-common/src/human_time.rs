//! Human-readable time formatting and parsing
//!
//! Timestamps are shown the way chat users type them: `M:SS` below one hour,
//! `H:MM:SS` above. The same shapes (plus bare seconds) are accepted as seek
//! positions.

use crate::{Error, Result};
use std::time::Duration;

/// Format seconds as a player timestamp.
///
/// # Examples
///
/// ```
/// use voxjuke_common::human_time::format_timestamp;
///
/// assert_eq!(format_timestamp(5), "0:05");
/// assert_eq!(format_timestamp(212), "3:32");
/// assert_eq!(format_timestamp(3661), "1:01:01");
/// ```
pub fn format_timestamp(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    // Minutes are zero-padded only when an hour field precedes them
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Parse a user-supplied timestamp (`SS`, `M:SS` or `H:MM:SS`).
///
/// Fields after the first must be below 60.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use voxjuke_common::human_time::parse_timestamp;
///
/// assert_eq!(parse_timestamp("90").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_timestamp("1:30").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_timestamp("1:00:05").unwrap(), Duration::from_secs(3605));
/// assert!(parse_timestamp("1:75").is_err());
/// ```
pub fn parse_timestamp(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("empty timestamp".to_string()));
    }

    let fields: Vec<&str> = trimmed.split(':').collect();
    if fields.len() > 3 {
        return Err(Error::InvalidInput(format!("too many fields in '{}'", trimmed)));
    }

    let mut total: u64 = 0;
    for (i, field) in fields.iter().enumerate() {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!("'{}' is not a timestamp", trimmed)));
        }
        let value: u64 = field
            .parse()
            .map_err(|_| Error::InvalidInput(format!("'{}' is out of range", field)))?;
        if i > 0 && value >= 60 {
            return Err(Error::InvalidInput(format!(
                "field '{}' in '{}' must be below 60",
                field, trimmed
            )));
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| Error::InvalidInput(format!("'{}' is out of range", trimmed)))?;
    }

    Ok(Duration::from_secs(total))
}

/// Parse an ISO-8601 duration as returned by the YouTube Data API.
///
/// Accepts `P[nD][T[nH][nM][nS]]`. Live streams report `P0D`, which parses to
/// zero; callers decide what zero means.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration> {
    let invalid = || Error::InvalidInput(format!("'{}' is not an ISO-8601 duration", input));

    let rest = input.strip_prefix('P').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid());
            }
            (date, Some(time))
        }
        None => (rest, None),
    };

    let mut total: u64 = 0;
    // Adds `value` units of `scale` seconds, rejecting anything past u64
    let mut add = |value: &str, scale: u64| -> Result<()> {
        let value: u64 = value.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        Ok(())
    };

    let mut number = String::new();
    for c in date_part.chars() {
        match c {
            '0'..='9' => number.push(c),
            'D' => {
                add(&number, 86_400)?;
                number.clear();
            }
            'W' => {
                add(&number, 7 * 86_400)?;
                number.clear();
            }
            _ => return Err(invalid()),
        }
    }
    if !number.is_empty() {
        return Err(invalid());
    }

    if let Some(time) = time_part {
        for c in time.chars() {
            match c {
                '0'..='9' => number.push(c),
                'H' | 'M' | 'S' => {
                    let scale = match c {
                        'H' => 3600,
                        'M' => 60,
                        _ => 1,
                    };
                    add(&number, scale)?;
                    number.clear();
                }
                _ => return Err(invalid()),
            }
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }

    Ok(Duration::from_secs(total))
}
