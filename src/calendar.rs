use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

/// A 7-day inclusive span, Monday through Sunday when ISO-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    fn starting(start: NaiveDate) -> Self {
        WeekWindow {
            start,
            end: start + Duration::days(6),
        }
    }
}

fn monday_of(reference: NaiveDate) -> NaiveDate {
    reference - Duration::days(reference.weekday().num_days_from_monday() as i64)
}

/// ISO-week mode: the Monday-Sunday window holding `reference` and the window
/// of the immediately preceding ISO week.
///
/// When the reference sits in ISO week 1, the prior window is the last ISO
/// week of the previous ISO year (week 52 or 53; December 28 always falls in
/// it). Both windows come from day arithmetic on the current week's Monday,
/// so the year rollover can never produce an invalid range.
pub fn iso_week_windows(reference: NaiveDate) -> (WeekWindow, WeekWindow) {
    let current_start = monday_of(reference);
    let prior_start = current_start - Duration::days(7);
    (
        WeekWindow::starting(current_start),
        WeekWindow::starting(prior_start),
    )
}

/// Rolling mode: earliest date inside the trailing 14 calendar days,
/// inclusive of the reference day itself.
pub fn rolling_cutoff(reference: NaiveDate) -> NaiveDate {
    reference - Duration::days(13)
}

/// Rolling mode: partition rows ordered most-recent-first into "this week"
/// (first 7 rows) and "last week" (next 7). Not calendar-aligned; the split
/// drifts daily instead of resetting on Mondays. Rows past the 14th are
/// dropped.
pub fn split_recent<T>(mut rows: Vec<T>) -> (Vec<T>, Vec<T>) {
    rows.truncate(14);
    let cut = rows.len().min(7);
    let prior = rows.split_off(cut);
    (rows, prior)
}

const BELL_TABLE: [(u8, (u32, u32), (u32, u32)); 8] = [
    (1, (8, 20), (9, 0)),
    (2, (9, 0), (10, 0)),
    (3, (10, 0), (11, 0)),
    (4, (11, 15), (12, 15)),
    (5, (13, 15), (13, 45)),
    (6, (13, 45), (14, 45)),
    (7, (14, 45), (15, 45)),
    (8, (16, 0), (17, 50)),
];

/// Which of the 8 daily periods a clock time falls in; None outside the
/// bell table (breaks, before and after school).
pub fn period_at(time: NaiveTime) -> Option<u8> {
    for (period, (sh, sm), (eh, em)) in BELL_TABLE {
        let start = NaiveTime::from_hms_opt(sh, sm, 0)?;
        let end = NaiveTime::from_hms_opt(eh, em, 0)?;
        if start <= time && time < end {
            return Some(period);
        }
    }
    None
}
