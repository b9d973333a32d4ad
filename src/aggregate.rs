use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::models::{
    AttendanceMark, AttendanceRecord, AttendanceStatus, Lecture, LectureType, LowAttendanceAlert,
    SubjectSummary,
};

pub const TARGET_PERCENT: f64 = 75.0;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    present: u32,
    total: u32,
}

impl Tally {
    fn add(&mut self, status: AttendanceStatus) {
        self.total += 1;
        if status == AttendanceStatus::Present {
            self.present += 1;
        }
    }
}

/// Groups records by (subject, type) and computes one summary per group.
/// Records with no lecture attached are skipped.
pub fn summarize_by_subject(records: &[AttendanceRecord]) -> Vec<SubjectSummary> {
    let mut groups: BTreeMap<(String, LectureType), Tally> = BTreeMap::new();

    for record in records {
        let Some(lecture) = &record.lecture else {
            continue;
        };
        groups
            .entry((lecture.subject.clone(), lecture.lecture_type))
            .or_default()
            .add(record.status);
    }

    groups
        .into_iter()
        .map(|((subject, lecture_type), tally)| SubjectSummary {
            subject,
            lecture_type,
            present: tally.present,
            absent: tally.total - tally.present,
            total_lectures: tally.total,
            attendance_score: percentage(tally.present, tally.total),
            lectures_needed_for_75: lectures_needed_for_75(tally.present, tally.total),
        })
        .collect()
}

/// Per-lecture check used by the home view: every scheduled lecture is its own
/// bucket, and lectures strictly below the target are flagged.
pub fn low_attendance_alerts(
    lectures: &[Lecture],
    marks: &[AttendanceMark],
) -> Vec<LowAttendanceAlert> {
    let mut tallies: HashMap<Uuid, Tally> = lectures
        .iter()
        .map(|lecture| (lecture.id, Tally::default()))
        .collect();

    for mark in marks {
        if let Some(tally) = mark.lecture_id.and_then(|id| tallies.get_mut(&id)) {
            tally.add(mark.status);
        }
    }

    lectures
        .iter()
        .filter_map(|lecture| {
            let tally = tallies.get(&lecture.id)?;
            if tally.total == 0 {
                return None;
            }
            let raw = tally.present as f64 / tally.total as f64 * 100.0;
            (raw < TARGET_PERCENT).then(|| LowAttendanceAlert {
                lecture_id: lecture.id,
                subject: lecture.subject.clone(),
                lecture_type: lecture.lecture_type,
                percentage: round2(raw),
            })
        })
        .collect()
}

pub fn percentage(present: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(present as f64 / total as f64 * 100.0)
}

/// Rounds half away from zero at the second decimal.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `max(0, ceil(0.75 * total) - present)`, measured against the current total.
/// Kept for report compatibility; it ignores that each extra session also
/// grows the total. See `sessions_needed_for_target`.
pub fn lectures_needed_for_75(present: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let required = (3 * total).div_ceil(4);
    required.saturating_sub(present)
}

/// Smallest `k` such that `(present + k) / (total + k) >= 0.75`, i.e. the
/// number of consecutive present sessions that brings the ratio to target.
pub fn sessions_needed_for_target(present: u32, total: u32) -> u32 {
    (3 * total).saturating_sub(4 * present)
}
