//! Wall-clock schedule arithmetic (UTC).
//!
//! Two triggers share one worker: a weekly baseline anchored on a weekday
//! and hour, and a refresh aligned to multiples of the cadence within each
//! day (00:00, 02:00, 04:00, ... for a 2 hour cadence).

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use std::fmt;

/// Why a cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Immediate run at process start
    Startup,
    /// Weekly baseline reseed
    Baseline,
    /// Periodic refresh tick
    Refresh,
    /// Operator request
    Manual,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Startup => "startup",
                Self::Baseline => "baseline",
                Self::Refresh => "refresh",
                Self::Manual => "manual",
            }
        )
    }
}

/// Schedule parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub baseline_weekday: Weekday,
    pub baseline_hour: u32,
    /// Hours between refresh ticks, 1..=24
    pub refresh_hours: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            baseline_weekday: Weekday::Mon,
            baseline_hour: 12,
            refresh_hours: 2,
        }
    }
}

/// Next fire time and the trigger it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    pub at: DateTime<Utc>,
    pub trigger: CycleTrigger,
}

fn at_hour(date: chrono::NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}

impl Schedule {
    /// This week's baseline anchor for the week containing `now`
    pub fn week_anchor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let back = (today.weekday().num_days_from_monday() + 7
            - self.baseline_weekday.num_days_from_monday())
            % 7;
        at_hour(today - Duration::days(i64::from(back)), self.baseline_hour)
    }

    /// Whether the baseline for the current week is still outstanding
    pub fn needs_baseline(&self, last_baseline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_baseline {
            None => true,
            Some(last) => last < self.week_anchor(now),
        }
    }

    /// When the baseline should next fire. Overdue baselines fire at `now`.
    pub fn next_baseline(&self, last_baseline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let anchor = self.week_anchor(now);
        if now < anchor {
            anchor
        } else if self.needs_baseline(last_baseline, now) {
            now
        } else {
            anchor + Duration::weeks(1)
        }
    }

    /// Next refresh boundary strictly after `now`
    pub fn next_refresh(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.refresh_hours.clamp(1, 24);
        let next_hour = (now.hour() / step + 1) * step;
        let today = now.date_naive();
        if next_hour >= 24 {
            at_hour(today + Duration::days(1), 0)
        } else {
            at_hour(today, next_hour)
        }
    }

    /// The nearer of the two next fire times; the baseline wins ties
    pub fn next_wake(&self, last_baseline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Wake {
        let baseline = self.next_baseline(last_baseline, now);
        let refresh = self.next_refresh(now);
        if baseline <= refresh {
            Wake {
                at: baseline,
                trigger: CycleTrigger::Baseline,
            }
        } else {
            Wake {
                at: refresh,
                trigger: CycleTrigger::Refresh,
            }
        }
    }
}
