//! Fetch window arithmetic: backlog caps and the daily statistics anchor.

use chrono::{DateTime, Days, FixedOffset, Local, NaiveTime, TimeDelta, TimeZone, Utc};

/// How many days back [`anchor_date`] looks for a representable boundary.
const ANCHOR_SEARCH_DAYS: u64 = 2;

/// Start of the window when no cursor exists: the later of `origin` and
/// `now - max_backlog`.
#[must_use]
pub fn default_start(
    now: DateTime<Utc>,
    origin: DateTime<Utc>,
    max_backlog: TimeDelta,
) -> DateTime<Utc> {
    origin.max(backlog_floor(now, max_backlog))
}

/// Caps a stored timestamp cursor so at most `max_backlog` is ever re-read.
#[must_use]
pub fn clamp_to_backlog(
    stored: DateTime<Utc>,
    now: DateTime<Utc>,
    max_backlog: TimeDelta,
) -> DateTime<Utc> {
    stored.max(backlog_floor(now, max_backlog))
}

fn backlog_floor(now: DateTime<Utc>, max_backlog: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(max_backlog)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The most recent instant at or before `now` whose wall-clock time in `tz`
/// is `hour:00:00`.
///
/// Days where that wall-clock time does not exist (a DST gap) are skipped.
/// Returns `None` if no boundary is found within the search range or `hour`
/// is not a valid hour.
pub fn anchor_date<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz, hour: u32) -> Option<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let today = now.with_timezone(tz).date_naive();

    (0..=ANCHOR_SEARCH_DAYS)
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate <= now)
}

/// Calendar used to place the daily statistics anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Device local time, including its DST transitions.
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl Calendar {
    /// [`anchor_date`] in this calendar.
    pub fn anchor_date(&self, now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
        match self {
            Calendar::Local => anchor_date(now, &Local, hour),
            Calendar::Fixed(offset) => anchor_date(now, offset, hour),
        }
    }
}
