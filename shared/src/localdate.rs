//! "Day" in this engine always means a participant's own local calendar
//! date, derived from their snapshotted UTC offset. Two participants of the
//! same Pact can be on different dates at the same instant; nothing here may
//! ever collapse their days into a shared UTC day.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// The calendar date currently in effect on a clock offset from UTC by
/// `utc_offset_minutes`.
pub fn local_date(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (now + Duration::minutes(utc_offset_minutes as i64)).date_naive()
}

/// The UTC instant at which `date` ends for a participant: their local
/// midnight rolling over into the next day.
pub fn day_close(date: NaiveDate, utc_offset_minutes: i32) -> DateTime<Utc> {
    let next_local_midnight = date
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(next_local_midnight - Duration::minutes(utc_offset_minutes as i64)))
}

/// Whether `date` has fully elapsed on the participant's clock.
pub fn is_day_closed(date: NaiveDate, utc_offset_minutes: i32, now: DateTime<Utc>) -> bool {
    now >= day_close(date, utc_offset_minutes)
}

/// The instant past which a missing or unmet report for `date` stops being
/// "not yet reported" and becomes a miss.
pub fn grace_deadline(
    date: NaiveDate,
    utc_offset_minutes: i32,
    grace_hours: u32,
) -> DateTime<Utc> {
    day_close(date, utc_offset_minutes) + Duration::hours(grace_hours as i64)
}

pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}
