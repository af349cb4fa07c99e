//! Relative-time labels for chapter timestamps.
//!
//! Pure functions: callers pass "now" so labels can be recomputed on a tick
//! and tested against a fixed clock.
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt;
use std::str::FromStr;

/// Layouts tried for naive date-times, in order. Naive values are local time.
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const ABSOLUTE_DATETIME: &str = "%Y-%m-%d %H:%M";
const ABSOLUTE_DATE: &str = "%Y-%m-%d";

// ============================================================================
// Preference
// ============================================================================

/// When timestamps are shown relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeTimeMode {
    Off,
    #[default]
    Today,
    Week,
    Month,
    Always,
}

impl RelativeTimeMode {
    pub const ALL: [RelativeTimeMode; 5] = [
        RelativeTimeMode::Off,
        RelativeTimeMode::Today,
        RelativeTimeMode::Week,
        RelativeTimeMode::Month,
        RelativeTimeMode::Always,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelativeTimeMode::Off => "off",
            RelativeTimeMode::Today => "today",
            RelativeTimeMode::Week => "week",
            RelativeTimeMode::Month => "month",
            RelativeTimeMode::Always => "always",
        }
    }

    /// Parse a stored value, falling back to `Today` for anything outside the set.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    /// Relative phrasing window beyond Today/Yesterday. `None` means unbounded.
    fn relative_window(&self) -> Option<Option<Duration>> {
        match self {
            RelativeTimeMode::Off | RelativeTimeMode::Today => None,
            RelativeTimeMode::Week => Some(Some(Duration::days(7))),
            RelativeTimeMode::Month => Some(Some(Duration::days(31))),
            RelativeTimeMode::Always => Some(None),
        }
    }
}

impl FromStr for RelativeTimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RelativeTimeMode::Off),
            "today" => Ok(RelativeTimeMode::Today),
            "week" => Ok(RelativeTimeMode::Week),
            "month" => Ok(RelativeTimeMode::Month),
            "always" => Ok(RelativeTimeMode::Always),
            other => Err(format!("unknown relative time mode '{}'", other)),
        }
    }
}

impl fmt::Display for RelativeTimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Labels
// ============================================================================

/// A rendered timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeLabel {
    pub text: String,
    pub is_relative: bool,
    /// Absolute date, present whenever the input parsed.
    pub reference: Option<String>,
}

impl TimeLabel {
    fn fallback(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_relative: false,
            reference: None,
        }
    }

    /// Companion tooltip text: the absolute date, only when the label is relative.
    pub fn tooltip(&self) -> Option<&str> {
        if self.is_relative {
            self.reference.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Parsed {
    At(DateTime<Local>),
    Day(NaiveDate),
}

impl Parsed {
    fn instant(&self) -> Option<DateTime<Local>> {
        match self {
            Parsed::At(t) => Some(*t),
            Parsed::Day(d) => local_from_naive(d.and_hms_opt(0, 0, 0)?),
        }
    }

    fn day(&self) -> NaiveDate {
        match self {
            Parsed::At(t) => t.date_naive(),
            Parsed::Day(d) => *d,
        }
    }

    fn absolute(&self) -> String {
        match self {
            Parsed::At(t) => t.format(ABSOLUTE_DATETIME).to_string(),
            Parsed::Day(d) => d.format(ABSOLUTE_DATE).to_string(),
        }
    }
}

fn local_from_naive(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    // DST gaps have no local mapping; skipped hours resolve to the earliest valid instant.
    Local.from_local_datetime(&naive).earliest()
}

/// True for inputs that mean "no timestamp".
fn is_missing(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => true,
        Some(s) => s.is_empty() || s.eq_ignore_ascii_case("unknown"),
    }
}

fn parse_timestamp(raw: &str) -> Option<Parsed> {
    let raw = raw.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(Parsed::At(t.with_timezone(&Local)));
    }
    for layout in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            if let Some(t) = local_from_naive(naive) {
                return Some(Parsed::At(t));
            }
        }
    }
    for layout in DATE_LAYOUTS {
        if let Ok(day) = NaiveDate::parse_from_str(raw, layout) {
            return Some(Parsed::Day(day));
        }
    }
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|t| Parsed::At(t.with_timezone(&Local)))
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// "3 days ago" / "in 2 hours" phrasing for a signed distance `now - then`.
pub fn relative_phrase(elapsed: Duration) -> String {
    let future = elapsed < Duration::zero();
    let secs = elapsed.num_seconds().abs();
    if secs < 60 {
        return "just now".to_string();
    }
    let amount = if secs < 3_600 {
        plural(secs / 60, "minute")
    } else if secs < 86_400 {
        plural(secs / 3_600, "hour")
    } else {
        let days = secs / 86_400;
        if days < 30 {
            plural(days, "day")
        } else if days < 365 {
            plural(days / 30, "month")
        } else {
            plural(days / 365, "year")
        }
    };
    if future {
        format!("in {}", amount)
    } else {
        format!("{} ago", amount)
    }
}

/// Render `raw` for display under `mode`, relative to `now`.
///
/// Empty, missing, `unknown` (any case) and unparseable inputs yield
/// `fallback` with `is_relative == false`.
pub fn format_timestamp(
    raw: Option<&str>,
    fallback: &str,
    mode: RelativeTimeMode,
    now: DateTime<Local>,
) -> TimeLabel {
    if is_missing(raw) {
        return TimeLabel::fallback(fallback);
    }
    let Some(parsed) = raw.and_then(parse_timestamp) else {
        tracing::debug!(raw = ?raw, "Unparseable timestamp, using fallback label");
        return TimeLabel::fallback(fallback);
    };

    let absolute = parsed.absolute();
    let absolute_label = |reference: String| TimeLabel {
        text: reference.clone(),
        is_relative: false,
        reference: Some(reference),
    };
    let relative_label = |text: String| TimeLabel {
        text,
        is_relative: true,
        reference: Some(absolute.clone()),
    };

    if mode == RelativeTimeMode::Off {
        return absolute_label(absolute.clone());
    }

    let today = now.date_naive();
    let day = parsed.day();
    if day == today {
        return relative_label("Today".to_string());
    }
    if today.pred_opt() == Some(day) {
        return relative_label("Yesterday".to_string());
    }

    let Some(window) = mode.relative_window() else {
        return absolute_label(absolute.clone());
    };
    let Some(instant) = parsed.instant() else {
        return absolute_label(absolute.clone());
    };
    let elapsed = now.signed_duration_since(instant);
    match window {
        Some(limit) if elapsed.abs() >= limit => absolute_label(absolute.clone()),
        _ => relative_label(relative_phrase(elapsed)),
    }
}

/// [`format_timestamp`] against the wall clock.
pub fn format_now(raw: Option<&str>, fallback: &str, mode: RelativeTimeMode) -> TimeLabel {
    format_timestamp(raw, fallback, mode, Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Mid-June noon avoids DST transitions in every common zone.
    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 6, 15, 12, 0, 0)
            .single()
            .unwrap()
    }

    fn ago(d: Duration) -> String {
        (now() - d).to_rfc3339()
    }

    #[test]
    fn test_now_is_today() {
        let label = format_timestamp(Some(&ago(Duration::zero())), "-", RelativeTimeMode::Today, now());
        assert_eq!(label.text, "Today");
        assert!(label.is_relative);
        assert_eq!(label.tooltip(), Some("2026-06-15 12:00"));
    }

    #[test]
    fn test_24h_ago_is_yesterday() {
        let label = format_timestamp(Some(&ago(Duration::hours(24))), "-", RelativeTimeMode::Today, now());
        assert_eq!(label.text, "Yesterday");
    }

    #[test]
    fn test_ten_days_ago_week_is_absolute() {
        let label = format_timestamp(Some(&ago(Duration::days(10))), "-", RelativeTimeMode::Week, now());
        assert_eq!(label.text, "2026-06-05 12:00");
        assert!(!label.is_relative);
        assert_eq!(label.tooltip(), None);
    }

    #[test]
    fn test_ten_days_ago_month_is_relative() {
        let label = format_timestamp(Some(&ago(Duration::days(10))), "-", RelativeTimeMode::Month, now());
        assert_eq!(label.text, "10 days ago");
        assert!(label.is_relative);
    }

    #[test]
    fn test_three_days_ago_week_is_relative() {
        let label = format_timestamp(Some(&ago(Duration::days(3))), "-", RelativeTimeMode::Week, now());
        assert_eq!(label.text, "3 days ago");
    }

    #[test]
    fn test_today_mode_older_is_absolute() {
        let label = format_timestamp(Some(&ago(Duration::days(3))), "-", RelativeTimeMode::Today, now());
        assert!(!label.is_relative);
    }

    #[test]
    fn test_always_mode_far_past() {
        let label = format_timestamp(Some(&ago(Duration::days(800))), "-", RelativeTimeMode::Always, now());
        assert_eq!(label.text, "2 years ago");
    }

    #[test]
    fn test_off_mode_never_relative() {
        let label = format_timestamp(Some(&ago(Duration::zero())), "-", RelativeTimeMode::Off, now());
        assert_eq!(label.text, "2026-06-15 12:00");
        assert!(!label.is_relative);
    }

    #[test]
    fn test_missing_inputs_use_fallback() {
        for raw in [None, Some(""), Some("   "), Some("unknown"), Some("UNKNOWN")] {
            for mode in RelativeTimeMode::ALL {
                let label = format_timestamp(raw, "Never", mode, now());
                assert_eq!(label.text, "Never");
                assert!(!label.is_relative);
                assert_eq!(label.reference, None);
            }
        }
    }

    #[test]
    fn test_unparseable_uses_fallback() {
        let label = format_timestamp(Some("last tuesday"), "N/A", RelativeTimeMode::Always, now());
        assert_eq!(label.text, "N/A");
        assert!(!label.is_relative);
    }

    #[test]
    fn test_tolerant_layouts() {
        let inputs = [
            "2026-06-01T09:30:00.123456",
            "2026-06-01 09:30:00",
            "2026-06-01T09:30",
            "2026/06/01 09:30:00",
            "2026/06/01 09:30",
        ];
        for raw in inputs {
            let label = format_timestamp(Some(raw), "-", RelativeTimeMode::Off, now());
            assert_eq!(label.text, "2026-06-01 09:30", "layout {}", raw);
        }
    }

    #[test]
    fn test_date_only_inputs() {
        let label = format_timestamp(Some("2026/06/14"), "-", RelativeTimeMode::Today, now());
        assert_eq!(label.text, "Yesterday");
        assert_eq!(label.tooltip(), Some("2026-06-14"));

        let label = format_timestamp(Some("2026-05-01"), "-", RelativeTimeMode::Off, now());
        assert_eq!(label.text, "2026-05-01");
    }

    #[test]
    fn test_invalid_mode_defaults_to_today() {
        assert_eq!(RelativeTimeMode::parse_or_default("sometimes"), RelativeTimeMode::Today);
        assert_eq!(RelativeTimeMode::parse_or_default(" Week "), RelativeTimeMode::Week);
    }

    #[test]
    fn test_mode_round_trips_through_str() {
        for mode in RelativeTimeMode::ALL {
            assert_eq!(mode.as_str().parse::<RelativeTimeMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_relative_phrase_units() {
        assert_eq!(relative_phrase(Duration::seconds(30)), "just now");
        assert_eq!(relative_phrase(Duration::minutes(1)), "1 minute ago");
        assert_eq!(relative_phrase(Duration::hours(5)), "5 hours ago");
        assert_eq!(relative_phrase(Duration::days(45)), "1 month ago");
        assert_eq!(relative_phrase(Duration::days(-2)), "in 2 days");
    }
}
