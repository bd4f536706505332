//! Wall-clock helpers shared by the backends

use chrono::Utc;

/// Current unix time in whole seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Current unix time in milliseconds
pub fn unix_now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current unix time in fractional seconds with microsecond precision
pub fn precise_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
