//! Timestamp normalization for stored records
//!
//! Devices send either plain `YYYY-MM-DD HH:MM:SS` strings or ISO 8601
//! with `T`/`Z` markers. Stored records always carry the plain form,
//! rendered in a fixed UTC+5 civil zone (the fleet's operating region;
//! no DST).

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Offset of the storage zone from UTC, in hours
pub const STORAGE_UTC_OFFSET_HOURS: i32 = 5;

/// Format of stored (and device-native) timestamps
pub const POINT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn storage_offset() -> FixedOffset {
    // Static in-range constant
    FixedOffset::east_opt(STORAGE_UTC_OFFSET_HOURS * 3600).expect("valid fixed offset")
}

/// Current instant in the storage zone
pub fn storage_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&storage_offset())
}

/// RFC 3339 stamp in the storage zone, used in confirmation payloads
pub fn storage_now_rfc3339() -> String {
    storage_now().to_rfc3339()
}

/// Normalize a raw device timestamp for storage.
///
/// Strings containing `T` or `Z` are treated as ISO 8601 and converted to
/// the storage zone; anything else passes through unchanged. Unparseable
/// ISO strings fall back to the current time, so a record is never stored
/// with a timestamp in the wrong zone.
pub fn normalize_timestamp(raw: &str) -> String {
    if raw.contains('T') || raw.contains('Z') {
        to_storage_zone(raw)
    } else {
        raw.to_string()
    }
}

fn to_storage_zone(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&storage_offset()).format(POINT_TIMESTAMP_FORMAT).to_string();
    }
    // Offset-less ISO form; taken as UTC
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive
            .and_utc()
            .with_timezone(&storage_offset())
            .format(POINT_TIMESTAMP_FORMAT)
            .to_string();
    }
    storage_now().format(POINT_TIMESTAMP_FORMAT).to_string()
}

/// Parse a plain device timestamp for interval arithmetic.
///
/// Only the plain form parses; ISO strings return None and callers fall
/// back to their own interval default.
pub fn parse_point_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, POINT_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_timestamp_passes_through() {
        assert_eq!(normalize_timestamp("2024-05-01 08:30:00"), "2024-05-01 08:30:00");
    }

    #[test]
    fn test_zulu_timestamp_converted() {
        // 10:00 UTC is 15:00 in the storage zone
        assert_eq!(normalize_timestamp("2024-05-01T10:00:00Z"), "2024-05-01 15:00:00");
    }

    #[test]
    fn test_offset_timestamp_converted() {
        assert_eq!(normalize_timestamp("2024-05-01T10:00:00+02:00"), "2024-05-01 13:00:00");
    }

    #[test]
    fn test_naive_iso_taken_as_utc() {
        assert_eq!(normalize_timestamp("2024-05-01T10:00:00"), "2024-05-01 15:00:00");
    }

    #[test]
    fn test_unparseable_iso_falls_back_to_now() {
        let normalized = normalize_timestamp("2024-13-99T99:99:99Z");
        // Can't pin the value, but it must be in the plain stored form
        assert!(parse_point_timestamp(&normalized).is_some());
    }

    #[test]
    fn test_parse_point_timestamp() {
        let parsed = parse_point_timestamp("2024-05-01 08:30:00").unwrap();
        assert_eq!(parsed.format(POINT_TIMESTAMP_FORMAT).to_string(), "2024-05-01 08:30:00");

        assert!(parse_point_timestamp("2024-05-01T08:30:00Z").is_none());
        assert!(parse_point_timestamp("garbage").is_none());
    }
}
