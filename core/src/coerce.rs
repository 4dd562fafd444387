//! Best-effort coercion of free-form plugin script payloads into typed
//! columns. Plugin scripts emit heterogeneous ad-hoc text — counters, ISO
//! dates, epoch seconds — and reporting needs typed columns to sort and
//! filter on without rejecting malformed input. Nothing in this module ever
//! returns an error to the caller; failures degrade to a default value.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse the payload as a base-10 integer; `0` if absent or unparseable.
pub fn coerce_int(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0)
}

/// Stringify the payload. Always succeeds; an absent payload becomes the
/// empty string, so the string column cannot distinguish absent from
/// explicitly empty. The raw payload column stays NULL for absent, which is
/// where that distinction lives.
pub fn coerce_string(raw: Option<&str>) -> String {
    raw.unwrap_or_default().to_string()
}

/// Best-effort datetime coercion, in this fallback order:
///
/// 1. Naive `T`-separated ISO datetimes ("2021-01-01T00:00:00"), taken as
///    UTC. The general parser below does not accept these, and they are the
///    single most common shape agents emit.
/// 2. General date/time parsing of the string, accepting a broad range of
///    human and machine formats.
/// 3. Integer parsing of the string. A nonzero integer is interpreted as a
///    Unix epoch timestamp in seconds, UTC.
/// 4. Otherwise `None`. A terminal outcome, not an error.
pub fn coerce_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    if let Ok(parsed) = dateparser::parse_with_timezone(s, &Utc) {
        return Some(parsed);
    }

    match s.parse::<i64>() {
        Ok(0) | Err(_) => {
            tracing::debug!(payload = s, "date coercion found no usable value");
            None
        }
        Ok(secs) => DateTime::from_timestamp(secs, 0),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn int_parses_base_10() {
        assert_eq!(coerce_int(Some("42")), 42);
        assert_eq!(coerce_int(Some("-7")), -7);
        assert_eq!(coerce_int(Some(" 13 ")), 13);
    }

    #[test]
    fn int_degrades_to_zero() {
        assert_eq!(coerce_int(Some("abc")), 0);
        assert_eq!(coerce_int(Some("4.5")), 0);
        assert_eq!(coerce_int(Some("")), 0);
        assert_eq!(coerce_int(None), 0);
    }

    #[test]
    fn string_always_succeeds() {
        assert_eq!(coerce_string(Some("hello")), "hello");
        assert_eq!(coerce_string(None), "");
    }

    #[test]
    fn date_parses_iso_without_zone_as_utc() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(coerce_date(Some("2021-01-01T00:00:00")), Some(expected));
        assert_eq!(
            coerce_date(Some("2021-01-01T00:00:00.250")),
            Some(expected + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn date_respects_explicit_offset() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(
            coerce_date(Some("2021-01-01T00:00:00-05:00")),
            Some(expected)
        );
    }

    #[test]
    fn date_falls_back_to_epoch_seconds() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(coerce_date(Some("1609459200")), Some(expected));
        // Small integers are not recognized as timestamps by the general
        // parser, so they land in the epoch fallback too.
        assert_eq!(
            coerce_date(Some("42")),
            Some(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 42).unwrap())
        );
    }

    #[test]
    fn date_zero_and_garbage_are_none() {
        assert_eq!(coerce_date(Some("0")), None);
        assert_eq!(coerce_date(Some("not a date")), None);
        assert_eq!(coerce_date(Some("")), None);
        assert_eq!(coerce_date(None), None);
    }
}
