//! Opaque pagination cursors: base64("rfc3339-timestamp\0row-id"). Stable
//! for iteration over growing tables because listings order by
//! (timestamp DESC, id DESC) and the cursor compares on the same pair.

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::AppError;

pub fn encode(timestamp: &DateTime<Utc>, id: &str) -> String {
    let raw = format!("{}\0{}", timestamp.to_rfc3339(), id);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

pub fn decode(cursor: &str) -> Result<(DateTime<Utc>, String), AppError> {
    let invalid = |message: &str| AppError::Validation {
        message: message.to_string(),
        field: Some("cursor".to_string()),
        received: Some(serde_json::Value::String(cursor.to_string())),
        docs_hint: Some("Use the next_cursor value from a previous response".to_string()),
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| invalid("Invalid cursor format"))?;
    let s = String::from_utf8(bytes).map_err(|_| invalid("Invalid cursor encoding"))?;

    let (ts, id) = s
        .split_once('\0')
        .ok_or_else(|| invalid("Invalid cursor structure"))?;
    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid("Invalid cursor timestamp"))?;

    Ok((timestamp, id.to_string()))
}

/// Decode a cursor whose row id is a UUID.
pub fn decode_uuid(cursor: &str) -> Result<(DateTime<Utc>, uuid::Uuid), AppError> {
    let (timestamp, id) = decode(cursor)?;
    let id = uuid::Uuid::parse_str(&id).map_err(|_| AppError::Validation {
        message: "Invalid cursor id".to_string(),
        field: Some("cursor".to_string()),
        received: None,
        docs_hint: None,
    })?;
    Ok((timestamp, id))
}

/// Decode a cursor whose row id is a bigint.
pub fn decode_i64(cursor: &str) -> Result<(DateTime<Utc>, i64), AppError> {
    let (timestamp, id) = decode(cursor)?;
    let id = id.parse::<i64>().map_err(|_| AppError::Validation {
        message: "Invalid cursor id".to_string(),
        field: Some("cursor".to_string()),
        received: None,
        docs_hint: None,
    })?;
    Ok((timestamp, id))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn uuid_cursor_round_trips() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let id = Uuid::now_v7();
        let (decoded_ts, decoded_id) = decode_uuid(&encode(&ts, &id.to_string())).unwrap();
        assert_eq!(decoded_ts, ts);
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn i64_cursor_round_trips() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let (decoded_ts, decoded_id) = decode_i64(&encode(&ts, "991")).unwrap();
        assert_eq!(decoded_ts, ts);
        assert_eq!(decoded_id, 991);
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert!(decode("not base64!!").is_err());
        let no_separator =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("missing-separator");
        assert!(decode(&no_separator).is_err());
    }
}
