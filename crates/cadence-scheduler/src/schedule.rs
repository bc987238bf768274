use chrono::{DateTime, Duration, Utc};

use crate::types::TriggerSpec;

/// Nominal fire time `n` of an interval trigger: `start + n * every_secs`.
///
/// `None` once the grid runs past the representable date range.
pub fn nth_fire(start: DateTime<Utc>, every_secs: i64, n: i64) -> Option<DateTime<Utc>> {
    let offset = every_secs.checked_mul(n).and_then(Duration::try_seconds)?;
    start.checked_add_signed(offset)
}

/// First point on the `start + n * every_secs` grid strictly after `after`.
///
/// Computed from the nominal grid, never from the previous run's end, so a
/// slow execution cannot shift later fire times. `None` when that point is
/// out of range.
pub fn next_on_grid(
    start: DateTime<Utc>,
    every_secs: i64,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if after < start {
        return Some(start);
    }
    let elapsed = (after - start).num_seconds();
    let n = elapsed / every_secs + 1;
    let candidate = nth_fire(start, every_secs, n)?;
    // Sub-second remainders can leave the candidate one step behind.
    if candidate <= after {
        nth_fire(start, every_secs, n.checked_add(1)?)
    } else {
        Some(candidate)
    }
}

/// Fire time that follows a fire nominally due at `fired_for`, observed at `now`.
///
/// Returns `None` for one-shot triggers, and for intervals whose grid has
/// run out of representable time. Otherwise the result is the next grid
/// point after both `fired_for` and `now`; missed grid points in between are
/// coalesced into the fire that just happened.
pub fn following_fire(
    trigger: &TriggerSpec,
    fired_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match trigger {
        TriggerSpec::OneShot { .. } => None,
        TriggerSpec::Interval { every_secs, start } => {
            next_on_grid(*start, *every_secs, fired_for.max(now))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HOUR: i64 = 3_600;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 29, 0, 30, 0).single().expect("valid time")
    }

    #[test]
    fn grid_is_anchored_on_start() {
        assert_eq!(nth_fire(t0(), HOUR, 0), Some(t0()));
        assert_eq!(nth_fire(t0(), HOUR, 5), Some(t0() + Duration::hours(5)));
    }

    #[test]
    fn next_on_grid_before_start_is_start() {
        assert_eq!(next_on_grid(t0(), HOUR, t0() - Duration::days(1)), Some(t0()));
    }

    #[test]
    fn next_on_grid_on_a_grid_point_moves_forward() {
        let at = t0() + Duration::hours(2);
        assert_eq!(next_on_grid(t0(), HOUR, at), Some(t0() + Duration::hours(3)));
    }

    #[test]
    fn next_on_grid_with_subsecond_offset() {
        let at = t0() + Duration::hours(2) + Duration::milliseconds(250);
        assert_eq!(next_on_grid(t0(), HOUR, at), Some(t0() + Duration::hours(3)));
    }

    #[test]
    fn slow_run_does_not_drift() {
        let trigger = TriggerSpec::Interval { every_secs: HOUR, start: t0() };
        // Fire for T0 finished 40 minutes late.
        let next = following_fire(&trigger, t0(), t0() + Duration::minutes(40));
        assert_eq!(next, Some(t0() + Duration::hours(1)));
    }

    #[test]
    fn stalled_dispatch_coalesces_missed_points() {
        let trigger = TriggerSpec::Interval { every_secs: HOUR, start: t0() };
        let next = following_fire(&trigger, t0(), t0() + Duration::minutes(185));
        assert_eq!(next, Some(t0() + Duration::hours(4)));
    }

    #[test]
    fn one_shot_has_no_following_fire() {
        let trigger = TriggerSpec::OneShot { at: t0() };
        assert_eq!(following_fire(&trigger, t0(), t0()), None);
    }

    #[test]
    fn grid_past_the_date_range_is_none() {
        assert_eq!(nth_fire(t0(), i64::MAX / 2, 3), None);
        assert_eq!(nth_fire(t0(), 1_000_000_000_000_000, 1), None);

        let near_end = DateTime::<Utc>::MAX_UTC - Duration::minutes(90);
        assert_eq!(next_on_grid(near_end, HOUR, near_end), Some(near_end + Duration::hours(1)));
        assert_eq!(next_on_grid(near_end, HOUR, near_end + Duration::hours(1)), None);
    }

    #[test]
    fn huge_period_has_no_following_fire() {
        let trigger = TriggerSpec::Interval { every_secs: i64::MAX, start: t0() };
        assert_eq!(following_fire(&trigger, t0(), t0()), None);
    }
}
