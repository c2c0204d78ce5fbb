// Small timing helpers shared by the logging macros
//
// Austin Shafer - 2020
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch
///
/// Used to prefix log lines with a wall clock timestamp. Not meant
/// for anything more precise than human-readable logs.
pub fn get_current_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
