//! Microsecond-since-epoch timestamps, the unit every entity in §3 uses.

/// Current time as unsigned-integer microseconds since epoch UTC.
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Convert a duration in milliseconds to whole microseconds.
pub fn ms_to_us(ms: i64) -> i64 {
    ms * 1_000
}
