//! SM-2 spaced repetition update rule.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation
//!
//! Everything here is pure: no clock, no store. [`super::scheduler`] supplies
//! `now` and persists the result.

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::types::{Quality, Sm2State, MIN_EASE};

/// Interval after the first successful repetition.
const FIRST_INTERVAL: u32 = 1;
/// Interval after the second consecutive successful repetition.
const SECOND_INTERVAL: u32 = 3;
/// Interval after any failure.
const RELEARN_INTERVAL: u32 = 1;

/// Compute the next ease, interval and repetition count.
///
/// `interval` is the interval that was just completed; from the third
/// success on, the new interval is `floor(interval × new_ease)`.
pub fn compute_next_review(ease: f64, interval: u32, repetitions: u32, quality: Quality) -> Sm2State {
    // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
    let miss = (Quality::MAX - quality.value()) as f64;
    let new_ease = (ease + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE);

    if !quality.is_success() {
        return Sm2State {
            ease: new_ease,
            interval_days: RELEARN_INTERVAL,
            repetitions: 0,
        };
    }

    let new_repetitions = repetitions.saturating_add(1);
    let new_interval = match new_repetitions {
        1 => FIRST_INTERVAL,
        2 => SECOND_INTERVAL,
        _ => {
            let grown = (interval as f64 * new_ease).floor();
            if grown >= u32::MAX as f64 {
                u32::MAX
            } else {
                grown as u32
            }
        }
    };

    Sm2State {
        ease: new_ease,
        interval_days: new_interval,
        repetitions: new_repetitions,
    }
}

/// Convenience wrapper over [`compute_next_review`] for a stored state.
pub fn next_state(state: Sm2State, quality: Quality) -> Sm2State {
    compute_next_review(state.ease, state.interval_days, state.repetitions, quality)
}

/// Due timestamp for an interval starting at `now`.
///
/// Capped at the end of year 9999 so the stored RFC 3339 text keeps a
/// four-digit year and still sorts chronologically.
pub fn due_after(now: DateTime<Utc>, interval_days: u32) -> DateTime<Utc> {
    let latest = Utc
        .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    now.checked_add_signed(Duration::days(interval_days as i64))
        .map_or(latest, |due| due.min(latest))
}
