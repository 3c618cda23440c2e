//! Date normalization to Peru time (UTC-05:00).
//!
//! Sites publish dates either as `DD/MM/YYYY[ HH:MM]` or as ISO-8601
//! date-times with an arbitrary zone. Both are rewritten to
//! `YYYY-MM-DDTHH:MM:SS-05:00`. The zone is relabelled, not converted:
//! the wall-clock digits are kept as published.

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Offset applied to every normalized date.
pub const PERU_OFFSET: &str = "-05:00";

static LOCAL_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})/(\d{2})/(\d{4})(?:\s+(\d{2}):(\d{2}))?").unwrap());
static ISO_DATE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap());
static TRAILING_ZONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([+-]\d{2}:\d{2}|Z)$").unwrap());

/// Normalize a site date string.
///
/// Anything that is neither shape is returned unchanged. The function is
/// idempotent.
///
/// ```ignore
/// assert_eq!(normalize("24/04/2025 22:07"), "2025-04-24T22:07:00-05:00");
/// assert_eq!(normalize("2025-04-24T10:00:00Z"), "2025-04-24T10:00:00-05:00");
/// ```
pub fn normalize(raw: &str) -> String {
    if let Some(caps) = LOCAL_DATE.captures(raw) {
        let hh = caps.get(4).map_or("00", |m| m.as_str());
        let min = caps.get(5).map_or("00", |m| m.as_str());
        return format!(
            "{}-{}-{}T{}:{}:00{}",
            &caps[3], &caps[2], &caps[1], hh, min, PERU_OFFSET
        );
    }
    if ISO_DATE_TIME.is_match(raw) {
        return TRAILING_ZONE.replace(raw, PERU_OFFSET).into_owned();
    }
    raw.to_string()
}

/// Normalize an optional date, leaving absent dates absent.
pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.map(normalize)
}

/// Current time in Peru, with millisecond precision.
pub fn now_peru() -> String {
    let local = Utc::now() - Duration::hours(5);
    format!("{}{}", local.format("%Y-%m-%dT%H:%M:%S%.3f"), PERU_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_date_with_time() {
        assert_eq!(normalize("24/04/2025 22:07"), "2025-04-24T22:07:00-05:00");
    }

    #[test]
    fn test_local_date_without_time() {
        assert_eq!(normalize("24/04/2025"), "2025-04-24T00:00:00-05:00");
    }

    #[test]
    fn test_local_date_inside_text() {
        assert_eq!(
            normalize("Publicado: 01/12/2024 08:30 hrs"),
            "2024-12-01T08:30:00-05:00"
        );
    }

    #[test]
    fn test_zone_replacement() {
        assert_eq!(normalize("2025-04-24T10:00:00Z"), "2025-04-24T10:00:00-05:00");
        assert_eq!(
            normalize("2025-04-24T10:00:00+03:00"),
            "2025-04-24T10:00:00-05:00"
        );
        assert_eq!(
            normalize("2025-04-24T10:00:00.000Z"),
            "2025-04-24T10:00:00.000-05:00"
        );
    }

    #[test]
    fn test_iso_without_zone_is_kept() {
        assert_eq!(normalize("2025-04-24T10:00:00"), "2025-04-24T10:00:00");
    }

    #[test]
    fn test_pass_through() {
        assert_eq!(normalize("not a date"), "not a date");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("Hace 2 horas"), "Hace 2 horas");
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "24/04/2025 22:07",
            "24/04/2025",
            "2025-04-24T10:00:00Z",
            "2025-04-24T10:00:00+03:00",
            "not a date",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_normalize_opt() {
        assert_eq!(normalize_opt(None), None);
        assert_eq!(
            normalize_opt(Some("24/04/2025")).as_deref(),
            Some("2025-04-24T00:00:00-05:00")
        );
    }

    #[test]
    fn test_now_peru_carries_offset() {
        let now = now_peru();
        assert!(now.ends_with("-05:00"), "{now}");
        assert_eq!(normalize(&now), now);
    }
}
