//! Parsers for human-written config values.

use crate::utils::errors::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A config value that may be written either as a bare number or as text
/// (`maxupload = 1000` and `maxupload = "10M"` are both accepted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl fmt::Display for NumberOrText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrText::Number(n) => write!(f, "{}", n),
            NumberOrText::Text(s) => f.write_str(s),
        }
    }
}

/// Parse `100`, `10k`, `100M`, `1G` into bytes using decimal multipliers.
pub fn parse_byte_size(value: &NumberOrText) -> Result<i64> {
    let text = match value {
        NumberOrText::Number(n) => return Ok(*n),
        NumberOrText::Text(s) => s.trim(),
    };

    let invalid = || SyncError::Config(format!("Invalid byte size '{}'", text));

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<i64>().map_err(|_| invalid());
    }

    let mut chars = text.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let multiplier: i64 = match unit.to_ascii_lowercase() {
        'k' => 1_000,
        'm' => 1_000_000,
        'g' => 1_000_000_000,
        _ => return Err(invalid()),
    };
    let number: i64 = chars.as_str().trim().parse().map_err(|_| invalid())?;
    number.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parse a frequency as `H:MM` or bare minutes. Empty means unset.
pub fn parse_frequency(value: &NumberOrText) -> Result<Option<u32>> {
    let text = match value {
        NumberOrText::Number(n) => {
            return u32::try_from(*n)
                .map(Some)
                .map_err(|_| SyncError::Config(format!("Invalid frequency '{}'", n)));
        }
        NumberOrText::Text(s) => s.trim(),
    };
    if text.is_empty() {
        return Ok(None);
    }

    let invalid = || {
        SyncError::Config(format!("Invalid frequency '{}', expected H:MM or minutes", text))
    };

    match text.split_once(':') {
        Some((hours, minutes)) => {
            let hours: u32 = hours.trim().parse().map_err(|_| invalid())?;
            let minutes: u32 = minutes.trim().parse().map_err(|_| invalid())?;
            if minutes >= 60 {
                return Err(invalid());
            }
            hours
                .checked_mul(60)
                .and_then(|h| h.checked_add(minutes))
                .map(Some)
                .ok_or_else(invalid)
        }
        None => text.parse::<u32>().map(Some).map_err(|_| invalid()),
    }
}
