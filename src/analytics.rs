use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Normalized register status. Matching is case-insensitive and tolerates
/// the single-letter abbreviations the register screens write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Unrecognized,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => AttendanceStatus::Present,
            "absent" | "a" => AttendanceStatus::Absent,
            "late" | "l" => AttendanceStatus::Late,
            _ => AttendanceStatus::Unrecognized,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

impl AttendanceCounts {
    /// Rows whose status matched none of the three recognized values. They
    /// count toward `total` only.
    #[allow(dead_code)]
    pub fn unrecognized(&self) -> usize {
        self.total - self.present - self.absent - self.late
    }
}

pub fn count_attendance(rows: &[AttendanceRow]) -> AttendanceCounts {
    let mut counts = AttendanceCounts {
        total: rows.len(),
        ..AttendanceCounts::default()
    };
    for row in rows {
        match AttendanceStatus::parse(&row.status) {
            AttendanceStatus::Present => counts.present += 1,
            AttendanceStatus::Absent => counts.absent += 1,
            AttendanceStatus::Late => counts.late += 1,
            AttendanceStatus::Unrecognized => {}
        }
    }
    counts
}

/// Closed enumeration behind the behaviour_types table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BehaviourKind {
    HousePoint,
    Demerit,
    Detention,
    Withdrawal,
}

impl BehaviourKind {
    /// Kinds the comparative analytics consume. Demerits are recorded and
    /// listed but stay out of the week-over-week breakdowns.
    pub const TRACKED: [BehaviourKind; 3] = [
        BehaviourKind::HousePoint,
        BehaviourKind::Detention,
        BehaviourKind::Withdrawal,
    ];

    pub fn from_type_id(type_id: i64) -> Option<Self> {
        match type_id {
            1 => Some(BehaviourKind::HousePoint),
            2 => Some(BehaviourKind::Demerit),
            3 => Some(BehaviourKind::Detention),
            4 => Some(BehaviourKind::Withdrawal),
            _ => None,
        }
    }

    pub fn type_id(self) -> i64 {
        match self {
            BehaviourKind::HousePoint => 1,
            BehaviourKind::Demerit => 2,
            BehaviourKind::Detention => 3,
            BehaviourKind::Withdrawal => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BehaviourKind::HousePoint => "Housepoint",
            BehaviourKind::Demerit => "Demerit",
            BehaviourKind::Detention => "Detention",
            BehaviourKind::Withdrawal => "Withdrawal",
        }
    }

    /// Lowercase plural used in narrative text.
    pub fn plural(self) -> &'static str {
        match self {
            BehaviourKind::HousePoint => "house points",
            BehaviourKind::Demerit => "demerits",
            BehaviourKind::Detention => "detentions",
            BehaviourKind::Withdrawal => "withdrawals",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BehaviourRow {
    pub date: NaiveDate,
    pub period: Option<u8>,
    pub type_id: i64,
}

/// Per-window behaviour aggregate. `by_kind` is restricted to the tracked
/// kinds; `by_period` covers every row with a known period. BTreeMap keys
/// keep iteration order deterministic.
#[derive(Debug, Clone, Default)]
pub struct BehaviourTally {
    pub total: usize,
    pub by_kind: BTreeMap<BehaviourKind, usize>,
    pub by_period: BTreeMap<u8, usize>,
}

impl BehaviourTally {
    pub fn kind_count(&self, kind: BehaviourKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

pub fn tally_behaviour(rows: &[BehaviourRow]) -> BehaviourTally {
    let mut tally = BehaviourTally {
        total: rows.len(),
        ..BehaviourTally::default()
    };
    for row in rows {
        if let Some(kind) = BehaviourKind::from_type_id(row.type_id) {
            if BehaviourKind::TRACKED.contains(&kind) {
                *tally.by_kind.entry(kind).or_insert(0) += 1;
            }
        }
        if let Some(period) = row.period {
            *tally.by_period.entry(period).or_insert(0) += 1;
        }
    }
    tally
}

/// Period with the strict maximum incident count in the current window.
/// Ties resolve to the lowest period number; ascending BTreeMap iteration
/// plus a strict `>` makes that the contract rather than an accident.
pub fn worst_period(tally: &BehaviourTally) -> Option<u8> {
    let mut best: Option<(u8, usize)> = None;
    for (&period, &count) in &tally.by_period {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((period, count)),
        }
    }
    best.map(|(period, _)| period)
}

/// One window's worth of dashboard numbers: raw counts only, percentages
/// are the view's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub attendance: AttendanceCounts,
    pub house_points: usize,
    pub detentions: usize,
    pub withdrawals: usize,
}

pub fn snapshot_window(attendance: &[AttendanceRow], behaviour: &[BehaviourRow]) -> WindowSnapshot {
    let tally = tally_behaviour(behaviour);
    WindowSnapshot {
        attendance: count_attendance(attendance),
        house_points: tally.kind_count(BehaviourKind::HousePoint),
        detentions: tally.kind_count(BehaviourKind::Detention),
        withdrawals: tally.kind_count(BehaviourKind::Withdrawal),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekComparison {
    pub current: WindowSnapshot,
    pub prior: WindowSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(statuses: &[&str]) -> Vec<AttendanceRow> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| AttendanceRow {
                date: NaiveDate::from_ymd_opt(2026, 5, 1 + i as u32).expect("test date"),
                status: s.to_string(),
            })
            .collect()
    }

    fn beh(rows: &[(Option<u8>, i64)]) -> Vec<BehaviourRow> {
        rows.iter()
            .map(|&(period, type_id)| BehaviourRow {
                date: NaiveDate::from_ymd_opt(2026, 5, 4).expect("test date"),
                period,
                type_id,
            })
            .collect()
    }

    #[test]
    fn status_parse_tolerates_case_and_abbreviations() {
        assert_eq!(AttendanceStatus::parse("Present"), AttendanceStatus::Present);
        assert_eq!(AttendanceStatus::parse("p"), AttendanceStatus::Present);
        assert_eq!(AttendanceStatus::parse(" A "), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::parse("LATE"), AttendanceStatus::Late);
        assert_eq!(AttendanceStatus::parse("excused"), AttendanceStatus::Unrecognized);
        assert_eq!(AttendanceStatus::parse(""), AttendanceStatus::Unrecognized);
    }

    #[test]
    fn counts_match_week_over_week_example() {
        let this_week = att(&["Present", "Present", "Absent", "Late", "Present", "Present", "Present"]);
        let last_week = att(&["Present", "Absent", "Absent", "Present", "Present", "Late", "Present"]);
        assert_eq!(
            count_attendance(&this_week),
            AttendanceCounts { total: 7, present: 5, absent: 1, late: 1 }
        );
        assert_eq!(
            count_attendance(&last_week),
            AttendanceCounts { total: 7, present: 4, absent: 2, late: 1 }
        );
    }

    #[test]
    fn unrecognized_statuses_count_toward_total_only() {
        let rows = att(&["p", "sick?", "present", ""]);
        let counts = count_attendance(&rows);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.present, 2);
        assert_eq!(counts.absent, 0);
        assert_eq!(counts.late, 0);
        assert_eq!(counts.unrecognized(), 2);
        assert_eq!(
            counts.present + counts.absent + counts.late + counts.unrecognized(),
            counts.total
        );
    }

    #[test]
    fn empty_window_counts_to_zero() {
        assert_eq!(count_attendance(&[]), AttendanceCounts::default());
        let tally = tally_behaviour(&[]);
        assert_eq!(tally.total, 0);
        assert!(tally.by_kind.is_empty());
        assert_eq!(worst_period(&tally), None);
    }

    #[test]
    fn tally_restricts_kinds_to_tracked_set() {
        let rows = beh(&[(Some(1), 1), (Some(2), 2), (Some(2), 3), (None, 4), (Some(3), 9)]);
        let tally = tally_behaviour(&rows);
        assert_eq!(tally.total, 5);
        assert_eq!(tally.kind_count(BehaviourKind::HousePoint), 1);
        assert_eq!(tally.kind_count(BehaviourKind::Detention), 1);
        assert_eq!(tally.kind_count(BehaviourKind::Withdrawal), 1);
        // Demerits and unknown ids never reach the tracked breakdown.
        assert_eq!(tally.by_kind.values().sum::<usize>(), 3);
    }

    #[test]
    fn worst_period_finds_strict_maximum() {
        // Two detentions in period 3 outweigh one house point in period 5.
        let rows = beh(&[(Some(3), 3), (Some(3), 3), (Some(5), 1)]);
        assert_eq!(worst_period(&tally_behaviour(&rows)), Some(3));
    }

    #[test]
    fn worst_period_tie_goes_to_lowest_period() {
        let rows = beh(&[(Some(6), 3), (Some(2), 1), (Some(6), 1), (Some(2), 3)]);
        assert_eq!(worst_period(&tally_behaviour(&rows)), Some(2));
    }

    #[test]
    fn rows_without_period_stay_out_of_the_trend() {
        let rows = beh(&[(None, 3), (None, 3), (Some(4), 1)]);
        assert_eq!(worst_period(&tally_behaviour(&rows)), Some(4));
    }

    #[test]
    fn snapshot_pairs_attendance_with_tracked_kinds() {
        let attendance = att(&["present", "l"]);
        let behaviour = beh(&[(Some(1), 3), (Some(2), 3), (Some(1), 1), (Some(4), 2)]);
        let snap = snapshot_window(&attendance, &behaviour);
        assert_eq!(snap.attendance.present, 1);
        assert_eq!(snap.attendance.late, 1);
        assert_eq!(snap.house_points, 1);
        assert_eq!(snap.detentions, 2);
        assert_eq!(snap.withdrawals, 0);
    }
}
