use chrono::{
    DateTime, FixedOffset, Local, MappedLocalTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone,
    Utc,
};
use healthsync_sync::window::{Calendar, anchor_date, clamp_to_backlog, default_start};
use proptest::prelude::*;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

// ── Backlog cap ─────────────────────────────────────────────────

#[test]
fn old_origin_is_capped_to_two_weeks() {
    let now = utc(2026, 3, 10, 12, 0);
    let origin = utc(2024, 1, 30, 0, 0);
    assert_eq!(
        default_start(now, origin, TimeDelta::days(14)),
        now - TimeDelta::days(14)
    );
}

#[test]
fn recent_origin_is_kept() {
    let now = utc(2026, 3, 10, 12, 0);
    let origin = utc(2026, 3, 5, 0, 0);
    assert_eq!(default_start(now, origin, TimeDelta::days(14)), origin);
}

#[test]
fn stale_stored_cursor_is_clamped() {
    let now = utc(2026, 3, 10, 12, 0);
    let stored = utc(2026, 1, 1, 0, 0);
    assert_eq!(
        clamp_to_backlog(stored, now, TimeDelta::days(14)),
        now - TimeDelta::days(14)
    );
}

#[test]
fn fresh_stored_cursor_is_kept() {
    let now = utc(2026, 3, 10, 12, 0);
    let stored = utc(2026, 3, 10, 11, 0);
    assert_eq!(clamp_to_backlog(stored, now, TimeDelta::days(14)), stored);
}

proptest! {
    #[test]
    fn default_start_never_precedes_origin_or_backlog(
        now_secs in 1_600_000_000i64..2_000_000_000,
        origin_secs in 1_500_000_000i64..2_000_000_000,
        days in 1i64..60,
    ) {
        let now = Utc.timestamp_opt(now_secs, 0).unwrap();
        let origin = Utc.timestamp_opt(origin_secs, 0).unwrap();
        let backlog = TimeDelta::days(days);

        let start = default_start(now, origin, backlog);
        prop_assert!(start >= origin);
        prop_assert!(start >= now - backlog);
        prop_assert!(start == origin || start == now - backlog);
    }
}

// ── Statistics anchor ───────────────────────────────────────────

#[test]
fn anchor_is_today_after_three_am() {
    let now = utc(2026, 3, 10, 12, 0);
    assert_eq!(anchor_date(now, &Utc, 3), Some(utc(2026, 3, 10, 3, 0)));
}

#[test]
fn anchor_is_yesterday_before_three_am() {
    let now = utc(2026, 3, 10, 2, 59);
    assert_eq!(anchor_date(now, &Utc, 3), Some(utc(2026, 3, 9, 3, 0)));
}

#[test]
fn anchor_at_exact_boundary_is_now() {
    let now = utc(2026, 3, 10, 3, 0);
    assert_eq!(anchor_date(now, &Utc, 3), Some(now));
}

#[test]
fn anchor_uses_the_given_calendar() {
    // 03:00 at UTC+02:00 is 01:00 UTC.
    let tz = FixedOffset::east_opt(2 * 3600).unwrap();
    let now = utc(2026, 3, 10, 12, 0);
    assert_eq!(anchor_date(now, &tz, 3), Some(utc(2026, 3, 10, 1, 0)));

    // At 00:30 UTC it is 02:30 local, so the anchor is yesterday's.
    let now = utc(2026, 3, 10, 0, 30);
    assert_eq!(anchor_date(now, &tz, 3), Some(utc(2026, 3, 9, 1, 0)));
}

#[test]
fn invalid_hour_has_no_anchor() {
    assert_eq!(anchor_date(utc(2026, 3, 10, 12, 0), &Utc, 24), None);
}

// ── Daylight saving ─────────────────────────────────────────────

/// Eastern European time around the 2026 spring transition: +02:00 until
/// 01:00 UTC on March 29, +03:00 after. Local 03:00..04:00 that day does
/// not exist.
#[derive(Debug, Clone, Copy)]
struct Helsinki;

impl Helsinki {
    fn winter() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn summer() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn switch_utc() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 29).unwrap().and_hms_opt(1, 0, 0).unwrap()
    }
}

impl TimeZone for Helsinki {
    type Offset = FixedOffset;

    fn from_offset(_offset: &FixedOffset) -> Self {
        Helsinki
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> MappedLocalTime<FixedOffset> {
        self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> MappedLocalTime<FixedOffset> {
        let gap_start = Helsinki::switch_utc() + TimeDelta::hours(2);
        let gap_end = gap_start + TimeDelta::hours(1);
        if *local < gap_start {
            MappedLocalTime::Single(Helsinki::winter())
        } else if *local >= gap_end {
            MappedLocalTime::Single(Helsinki::summer())
        } else {
            MappedLocalTime::None
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        if *utc < Helsinki::switch_utc() {
            Helsinki::winter()
        } else {
            Helsinki::summer()
        }
    }
}

#[test]
fn anchor_before_spring_forward_keeps_winter_offset() {
    // 02:00 local on the switch day is still +02:00, i.e. 00:00 UTC.
    let now = utc(2026, 3, 29, 10, 0);
    assert_eq!(anchor_date(now, &Helsinki, 2), Some(utc(2026, 3, 29, 0, 0)));
}

#[test]
fn anchor_after_spring_forward_uses_summer_offset() {
    let now = utc(2026, 3, 29, 10, 0);
    assert_eq!(anchor_date(now, &Helsinki, 5), Some(utc(2026, 3, 29, 2, 0)));
}

#[test]
fn anchor_inside_dst_gap_falls_back_to_previous_day() {
    let now = utc(2026, 3, 29, 10, 0);
    assert_eq!(anchor_date(now, &Helsinki, 3), Some(utc(2026, 3, 28, 1, 0)));
}

#[test]
fn anchor_is_not_shifted_by_the_offset_in_effect_now() {
    // Flattening the zone to the offset at `now` (+03:00) would place the
    // 02:00 boundary an hour early.
    let now = utc(2026, 3, 29, 10, 0);
    let flattened = anchor_date(now, &Helsinki::summer(), 2);
    assert_eq!(flattened, Some(utc(2026, 3, 28, 23, 0)));
    assert_ne!(anchor_date(now, &Helsinki, 2), flattened);
}

#[test]
fn calendar_delegates_to_its_zone() {
    let now = utc(2026, 3, 10, 12, 0);
    let offset = FixedOffset::east_opt(90 * 60).unwrap();
    assert_eq!(
        Calendar::Fixed(offset).anchor_date(now, 3),
        anchor_date(now, &offset, 3)
    );
    assert_eq!(
        Calendar::Local.anchor_date(now, 3),
        anchor_date(now, &Local, 3)
    );
}

proptest! {
    #[test]
    fn anchor_is_within_a_day_before_now(
        secs in 1_600_000_000i64..2_000_000_000,
        offset_hours in -12i32..=14,
        hour in 0u32..24,
    ) {
        let now = Utc.timestamp_opt(secs, 0).unwrap();
        let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        let anchor = anchor_date(now, &tz, hour).unwrap();
        prop_assert!(anchor <= now);
        prop_assert!(now - anchor < TimeDelta::days(1));
    }
}
