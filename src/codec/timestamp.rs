//! Timestamp formats found in documents.
//!
//! Current documents use RFC 3339 with millisecond precision. Older documents
//! carry a locale-style `YYYY/MM/DD HH:MM:SS` in local time.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};

const LOCALE_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Drop sub-millisecond precision so a timestamp survives a document round-trip.
pub fn to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(3)
}

/// Current time at document precision.
pub fn now_millis() -> DateTime<Utc> {
    to_millis(Utc::now())
}

/// `2026-10-17T10:00:00.000Z`
pub fn format_iso(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Local-time rendering used by legacy documents.
pub fn format_locale(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format(LOCALE_FORMATS[0])
        .to_string()
}

/// Parse either supported format. Surrounding quotes and whitespace are ignored.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_matches(['"', '\'']).trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    LOCALE_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(raw, format).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_iso_millis() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();
        assert_eq!(format_iso(&ts), "2026-10-17T10:00:00.000Z");
    }

    #[test]
    fn test_parse_iso() {
        let parsed = parse_timestamp("2026-10-17T10:00:00.000Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap());

        let offset = parse_timestamp("\"2026-10-17T12:00:00+02:00\"").unwrap();
        assert_eq!(offset, parsed);
    }

    #[test]
    fn test_parse_locale_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let rendered = format_locale(&ts);
        assert_eq!(parse_timestamp(&rendered), Some(ts));
    }

    #[test]
    fn test_parse_locale_components() {
        let parsed = parse_timestamp("2024/01/02 03:04:05").unwrap();
        let local = parsed.with_timezone(&Local);
        assert_eq!(local.format("%Y/%m/%d %H:%M:%S").to_string(), "2024/01/02 03:04:05");
    }

    #[test]
    fn test_now_millis_survives_format() {
        let now = now_millis();
        assert_eq!(parse_timestamp(&format_iso(&now)), Some(now));

        let precise = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(889_592_586);
        assert_eq!(format_iso(&to_millis(precise)), "2026-10-17T10:00:00.889Z");
        assert_eq!(to_millis(precise).timestamp_subsec_nanos(), 889_000_000);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024/13/45 99:00:00").is_none());
    }
}
