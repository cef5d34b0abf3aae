//! Time utilities shared across the workspace.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Number of whole UTC days since the Unix epoch for a millisecond timestamp.
///
/// Used by the risk accounting to detect UTC day rollover without pulling in
/// a full calendar library.
pub fn utc_day(ts_ms: u64) -> u64 {
    ts_ms / 86_400_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_day_rolls_at_midnight() {
        let day0_last_ms = 86_400_000 - 1;
        assert_eq!(utc_day(day0_last_ms), 0);
        assert_eq!(utc_day(day0_last_ms + 1), 1);
    }
}
