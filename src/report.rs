use std::fmt::Write;

use chrono::{Duration, NaiveDate, Utc};

use crate::aggregate;
use crate::models::{AttendanceRecord, LowAttendanceAlert, SubjectSummary};

pub const WEEKLY_WINDOW_DAYS: i64 = 7;
pub const NO_DATA_MESSAGE: &str = "No attendance data for the last week.";

/// Outcome of a weekly report. An empty window is a distinct outcome, not an
/// empty list of summaries.
#[derive(Debug, Clone, PartialEq)]
pub enum WeeklyReport {
    NoData,
    Summaries(Vec<SubjectSummary>),
}

impl WeeklyReport {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        if records.is_empty() {
            WeeklyReport::NoData
        } else {
            WeeklyReport::Summaries(aggregate::summarize_by_subject(records))
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            WeeklyReport::NoData => serde_json::json!({ "message": NO_DATA_MESSAGE }),
            WeeklyReport::Summaries(summaries) => serde_json::json!(summaries),
        }
    }
}

/// First calendar day included in a trailing window of `days` days.
pub fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.max(1))
}

pub fn weekly_window_start() -> NaiveDate {
    window_start(Utc::now().date_naive(), WEEKLY_WINDOW_DAYS)
}

pub fn build_report(
    user_id: &str,
    since: NaiveDate,
    records: &[AttendanceRecord],
    alerts: &[LowAttendanceAlert],
) -> String {
    let report = WeeklyReport::from_records(records);
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(output, "Generated for {} (attendance since {})", user_id, since);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    match &report {
        WeeklyReport::NoData => {
            let _ = writeln!(output, "{NO_DATA_MESSAGE}");
        }
        WeeklyReport::Summaries(summaries) => {
            for summary in summaries {
                let _ = writeln!(
                    output,
                    "- {} ({}): {}/{} present, {:.2}%",
                    summary.subject,
                    summary.lecture_type,
                    summary.present,
                    summary.total_lectures,
                    summary.attendance_score
                );
                let needed =
                    aggregate::sessions_needed_for_target(summary.present, summary.total_lectures);
                if needed > 0 {
                    let _ = writeln!(
                        output,
                        "  - attend the next {needed} sessions to reach {:.0}%",
                        aggregate::TARGET_PERCENT
                    );
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Low Attendance Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "Every scheduled lecture is at or above target.");
    } else {
        for alert in alerts {
            let _ = writeln!(
                output,
                "- {} ({}): {:.2}% attendance. Consider attending more classes!",
                alert.subject, alert.lecture_type, alert.percentage
            );
        }
    }

    if let Some(latest) = records.iter().map(|record| record.date).max() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Latest mark recorded on {latest}.");
    }

    output
}
