use time::OffsetDateTime;

pub mod health;
pub mod phase;
pub mod room;
pub mod validation;
pub mod ws;

/// Current wall-clock time as Unix milliseconds, the timestamp format used on the wire.
pub fn unix_millis_now() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
