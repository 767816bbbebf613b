use chrono::{DateTime, NaiveDate, Utc};

use shared::{grace_deadline, is_day_closed, LedgerEntry, Pact, UserId};

/// Outcome of inspecting one candidate date for one Pact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayVerdict {
    /// The date has not yet ended on both participants' clocks.
    Open,
    /// Closed, but at least one participant without a met entry is still
    /// inside their grace window; no decision may be made yet.
    Pending,
    /// Both entries exist and both met the target.
    Qualified,
    /// Every participant short of the target is past their grace deadline.
    Missed { missed_by: Vec<UserId> },
}

/// Decides one date from the ledger alone. Both participants' entries are
/// inspected together before any verdict; there is no path that judges a
/// day from a single side.
pub fn decide_day(
    pact: &Pact,
    date: NaiveDate,
    entries: &[LedgerEntry],
    grace_hours: u32,
    now: DateTime<Utc>,
) -> DayVerdict {
    let participants = pact.participants();

    if !participants
        .iter()
        .all(|p| is_day_closed(date, p.utc_offset_minutes, now))
    {
        return DayVerdict::Open;
    }

    let met = |user_id: &str| {
        entries
            .iter()
            .find(|e| e.participant_id == user_id && e.date == date)
            .map(|e| e.met_target)
    };

    let unmet: Vec<_> = participants
        .into_iter()
        .filter(|p| met(&p.user_id) != Some(true))
        .collect();

    if unmet.is_empty() {
        return DayVerdict::Qualified;
    }

    // A qualifying day never waits on grace, but a miss verdict waits for
    // every short participant's own deadline: a report (or a late telemetry
    // sync) may still arrive.
    if unmet
        .iter()
        .all(|p| now >= grace_deadline(date, p.utc_offset_minutes, grace_hours))
    {
        DayVerdict::Missed {
            missed_by: unmet.into_iter().map(|p| p.user_id.clone()).collect(),
        }
    } else {
        DayVerdict::Pending
    }
}
