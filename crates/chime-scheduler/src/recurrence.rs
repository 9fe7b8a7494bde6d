//! Next-occurrence arithmetic.
//!
//! Intervals are applied to the wall clock of the reminder's own time zone:
//! a 09:00 daily reminder stays at 09:00 local time across DST changes, and a
//! monthly reminder on the 31st lands on the last day of shorter months.

use chime_core::{Recurrence, RecurrenceInterval, Reminder, ReminderStatus};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::{
    error::{Result, SchedulerError},
    types::NextState,
};

/// Parse an IANA zone name such as `Europe/Paris`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidReminder(format!("unknown time zone: {name}")))
}

/// State after one occurrence has been attempted.
///
/// An occurrence counts as attempted once the router has run, whatever the
/// per-channel outcomes were.
pub fn next_state(reminder: &Reminder) -> NextState {
    let finalize = NextState {
        status: ReminderStatus::Dispatched,
        trigger_at: reminder.trigger_at,
        recurrence: reminder.recurrence.clone(),
    };
    let Some(rule) = reminder.recurrence.as_ref() else {
        return finalize;
    };
    if rule.occurrences_sent + 1 >= rule.occurrences_total {
        return NextState {
            recurrence: Some(Recurrence {
                occurrences_sent: rule.occurrences_total,
                ..rule.clone()
            }),
            ..finalize
        };
    }

    let tz = parse_timezone(&reminder.timezone).unwrap_or_else(|e| {
        warn!(reminder_id = %reminder.id, error = %e, "falling back to UTC");
        Tz::UTC
    });
    let local_time = rule
        .local_time
        .unwrap_or_else(|| reminder.trigger_at.with_timezone(&tz).time());
    NextState {
        status: ReminderStatus::Pending,
        trigger_at: advance(reminder.trigger_at, rule.interval, tz, local_time),
        recurrence: Some(Recurrence {
            occurrences_sent: rule.occurrences_sent + 1,
            local_time: Some(local_time),
            ..rule.clone()
        }),
    }
}

/// Advance `at` by one `interval` on the wall clock of `tz`.
pub fn add_interval(at: DateTime<Utc>, interval: RecurrenceInterval, tz: Tz) -> DateTime<Utc> {
    advance(at, interval, tz, at.with_timezone(&tz).time())
}

/// Advance the local date of `at` by one `interval` and place the result at
/// `local_time` on that date.
fn advance(
    at: DateTime<Utc>,
    interval: RecurrenceInterval,
    tz: Tz,
    local_time: NaiveTime,
) -> DateTime<Utc> {
    let date = at.with_timezone(&tz).date_naive();
    let target = match interval {
        RecurrenceInterval::Daily => date.checked_add_days(Days::new(1)),
        RecurrenceInterval::Weekly => date.checked_add_days(Days::new(7)),
        RecurrenceInterval::Monthly => add_month_clamped(date),
    };
    let fallback = match interval {
        RecurrenceInterval::Daily => at + chrono::Duration::days(1),
        RecurrenceInterval::Weekly => at + chrono::Duration::days(7),
        RecurrenceInterval::Monthly => at + chrono::Duration::days(30),
    };
    target
        .and_then(|d| resolve_local(tz, d.and_time(local_time)))
        .unwrap_or(fallback)
}

/// Same day of the following month, clamped to that month's last day.
fn add_month_clamped(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let day = date.day().min(days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt().map(|d| d.day())
}

/// Map a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// spring-forward gap move forward by the length of the gap.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=3).find_map(|hours| {
        tz.from_local_datetime(&(naive + chrono::Duration::hours(hours)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pending;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn monthly_clamps_to_end_of_february() {
        let jan31 = utc(2026, 1, 31, 9, 0);
        assert_eq!(
            add_interval(jan31, RecurrenceInterval::Monthly, Tz::UTC),
            utc(2026, 2, 28, 9, 0)
        );
        let leap = utc(2028, 1, 31, 9, 0);
        assert_eq!(
            add_interval(leap, RecurrenceInterval::Monthly, Tz::UTC),
            utc(2028, 2, 29, 9, 0)
        );
    }

    #[test]
    fn monthly_rolls_over_the_year() {
        assert_eq!(
            add_interval(utc(2026, 12, 15, 8, 30), RecurrenceInterval::Monthly, Tz::UTC),
            utc(2027, 1, 15, 8, 30)
        );
    }

    #[test]
    fn daily_keeps_wall_clock_across_spring_forward() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 09:00 EST on the Saturday before DST starts (2026-03-08).
        let sat = utc(2026, 3, 7, 14, 0);
        // 09:00 EDT is 13:00 UTC: 23 hours later, not 24.
        assert_eq!(
            add_interval(sat, RecurrenceInterval::Daily, tz),
            utc(2026, 3, 8, 13, 0)
        );
    }

    #[test]
    fn weekly_keeps_wall_clock_across_fall_back() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 09:00 EDT, 2026-10-31; DST ends 2026-11-01.
        let before = utc(2026, 10, 31, 13, 0);
        assert_eq!(
            add_interval(before, RecurrenceInterval::Weekly, tz),
            utc(2026, 11, 7, 14, 0)
        );
    }

    #[test]
    fn nonexistent_local_time_moves_past_the_gap() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 02:30 EST on 2026-03-07; 02:30 does not exist on 2026-03-08.
        let at = utc(2026, 3, 7, 7, 30);
        assert_eq!(
            add_interval(at, RecurrenceInterval::Daily, tz),
            utc(2026, 3, 8, 7, 30)
        );
    }

    #[test]
    fn gap_shift_does_not_stick_to_later_occurrences() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 02:30 EST on 2026-03-07. 02:30 is skipped on 2026-03-08.
        let mut r = pending("r-1", "owner-1", utc(2026, 3, 7, 7, 30));
        r.timezone = "America/New_York".into();
        r.recurrence = Some(Recurrence::new(RecurrenceInterval::Daily, 5));

        let first = next_state(&r);
        let local = first.trigger_at.with_timezone(&tz);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-03-08 03:30");
        let rule = first.recurrence.clone().unwrap();
        assert_eq!(rule.local_time, NaiveTime::from_hms_opt(2, 30, 0));

        r.trigger_at = first.trigger_at;
        r.recurrence = first.recurrence;
        let second = next_state(&r);
        let local = second.trigger_at.with_timezone(&tz);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-03-09 02:30");
        assert_eq!(second.trigger_at, utc(2026, 3, 9, 6, 30));
    }

    #[test]
    fn no_recurrence_finalizes() {
        let r = pending("r-1", "owner-1", utc(2026, 1, 31, 9, 0));
        let next = next_state(&r);
        assert_eq!(next.status, ReminderStatus::Dispatched);
        assert_eq!(next.trigger_at, r.trigger_at);
        assert!(next.recurrence.is_none());
    }

    #[test]
    fn daily_three_occurrences_then_final() {
        let t = utc(2026, 1, 31, 9, 0);
        let mut r = pending("r-1", "owner-1", t);
        r.recurrence = Some(Recurrence::new(RecurrenceInterval::Daily, 3));

        let first = next_state(&r);
        assert_eq!(first.status, ReminderStatus::Pending);
        assert_eq!(first.trigger_at, t + chrono::Duration::days(1));
        assert_eq!(first.recurrence.as_ref().unwrap().occurrences_sent, 1);

        r.trigger_at = first.trigger_at;
        r.recurrence = first.recurrence;
        let second = next_state(&r);
        assert_eq!(second.status, ReminderStatus::Pending);
        assert_eq!(second.recurrence.as_ref().unwrap().occurrences_sent, 2);

        r.trigger_at = second.trigger_at;
        r.recurrence = second.recurrence;
        let third = next_state(&r);
        assert_eq!(third.status, ReminderStatus::Dispatched);
        assert_eq!(third.trigger_at, r.trigger_at);
        assert_eq!(third.recurrence.unwrap().occurrences_sent, 3);
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
        assert_eq!(parse_timezone("Europe/Paris").unwrap(), chrono_tz::Europe::Paris);
    }
}
