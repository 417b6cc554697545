use chrono::{DateTime, Duration, Utc};

// Timestamps at or past now + this window are treated as clock skew.
const SAFETY_WINDOW_HOURS: i64 = 1;

pub fn safety_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(SAFETY_WINDOW_HOURS)
}

/// Resolve the "as of" time for a batch fetched at `now`.
///
/// Takes the newest valid timestamp strictly before `now + 1h`. Missing or
/// future-skewed values are ignored; if nothing qualifies the result is `now`.
pub fn resolve_as_of(
    timestamps: impl IntoIterator<Item = Option<DateTime<Utc>>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let boundary = safety_boundary(now);
    let mut latest: Option<DateTime<Utc>> = None;
    for ts in timestamps.into_iter().flatten() {
        if ts >= boundary {
            continue;
        }
        if latest.map_or(true, |max| ts > max) {
            latest = Some(ts);
        }
    }
    latest.unwrap_or(now)
}

/// Lenient timestamp parsing for store values. Unparseable input is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres text form: "2026-03-02 08:30:00+00" / "2026-03-02 08:30:00.123+00:00".
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    None
}
