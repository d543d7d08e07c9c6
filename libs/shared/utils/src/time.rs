use chrono::{DateTime, FixedOffset, Utc};

/// The platform operates in a single region on UTC+1 with no daylight
/// saving. Wall-clock decisions (queues, debt deadlines) must use this
/// offset, never naive UTC.
pub const REGIONAL_UTC_OFFSET_SECS: i32 = 3600;

pub fn regional_offset() -> FixedOffset {
    FixedOffset::east_opt(REGIONAL_UTC_OFFSET_SECS).expect("offset in range")
}

pub fn regional_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&regional_offset())
}

pub fn to_regional(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&regional_offset())
}
