//! Elapsed time between account creation and the last closed position

use chrono::{DateTime, Utc};

/// Rendered when there is no valid creation/close pair
pub const ZERO_PERIOD: &str = "00D-00H-00M";

fn valid_span(created: Option<DateTime<Utc>>, closed: Option<DateTime<Utc>>) -> Option<chrono::Duration> {
    match (created, closed) {
        (Some(created), Some(closed)) if closed >= created => Some(closed - created),
        _ => None,
    }
}

/// Exact hours from creation to last close, 0 when there is no valid pair
pub fn time_taken_hours(created: Option<DateTime<Utc>>, closed: Option<DateTime<Utc>>) -> f64 {
    valid_span(created, closed)
        .map(|span| span.num_milliseconds() as f64 / 3_600_000.0)
        .unwrap_or(0.0)
}

/// Renders the span as e.g. `01D-02H-30M`: days, hours and minutes padded
/// to two digits, seconds dropped
pub fn format_period(created: Option<DateTime<Utc>>, closed: Option<DateTime<Utc>>) -> String {
    let Some(span) = valid_span(created, closed) else {
        return ZERO_PERIOD.to_string();
    };

    let total_minutes = span.num_minutes();
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    format!("{:02}D-{:02}H-{:02}M", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_format_period() {
        let closed = created() + Duration::hours(26) + Duration::minutes(30);
        assert_eq!(format_period(Some(created()), Some(closed)), "01D-02H-30M");
    }

    #[test]
    fn test_format_period_zero_cases() {
        let before = created() - Duration::minutes(1);
        assert_eq!(format_period(Some(created()), Some(before)), ZERO_PERIOD);
        assert_eq!(format_period(Some(created()), None), ZERO_PERIOD);
        assert_eq!(format_period(None, Some(created())), ZERO_PERIOD);
        assert_eq!(format_period(Some(created()), Some(created())), ZERO_PERIOD);
    }

    #[test]
    fn test_format_period_truncates_seconds_and_widens_days() {
        let closed = created() + Duration::days(123) + Duration::seconds(59);
        assert_eq!(format_period(Some(created()), Some(closed)), "123D-00H-00M");
    }

    #[test]
    fn test_time_taken_hours() {
        let closed = created() + Duration::hours(26) + Duration::minutes(30);
        assert_eq!(time_taken_hours(Some(created()), Some(closed)), 26.5);
        assert_eq!(
            time_taken_hours(Some(created()), Some(created() - Duration::hours(1))),
            0.0
        );
        assert_eq!(time_taken_hours(Some(created()), None), 0.0);
    }
}
