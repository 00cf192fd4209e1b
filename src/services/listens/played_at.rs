use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Formats accepted for instants that carry no offset. They are taken to be UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unrecognized timestamp: {raw:?}")]
pub struct PlayedAtError {
    pub raw: String,
}

/// Parse a played-at instant into UTC.
///
/// Offsets other than UTC are converted; instants without any offset are assumed to
/// already be UTC.
pub fn normalize_played_at(raw: &str) -> Result<DateTime<Utc>, PlayedAtError> {
    let trimmed = raw.trim();

    if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(aware.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PlayedAtError {
            raw: raw.to_string(),
        })
}

/// Canonical stored form: RFC 3339, UTC, microseconds, `Z` suffix.
pub fn format_played_at(played_at: &DateTime<Utc>) -> String {
    played_at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
