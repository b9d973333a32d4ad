use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LectureType {
    Lecture,
    Lab,
    Tutorial,
}

impl LectureType {
    pub fn as_str(self) -> &'static str {
        match self {
            LectureType::Lecture => "Lecture",
            LectureType::Lab => "Lab",
            LectureType::Tutorial => "Tutorial",
        }
    }
}

impl fmt::Display for LectureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LectureType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Lecture" => Ok(LectureType::Lecture),
            "Lab" => Ok(LectureType::Lab),
            "Tutorial" => Ok(LectureType::Tutorial),
            other => Err(format!("unknown lecture type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    /// Maps a stored status to the closed enum. Only the literal `Present`
    /// counts as present; anything else (`Excused`, typos) is absent.
    pub fn from_stored(value: &str) -> Self {
        if value == "Present" {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("status must be Present or Absent, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    pub id: Uuid,
    pub subject: String,
    #[serde(rename = "type")]
    pub lecture_type: LectureType,
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

/// Form payload for scheduling a lecture. Times stay as text until
/// `schedule::validate` accepts them.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLecture {
    pub subject: String,
    #[serde(rename = "type")]
    pub lecture_type: LectureType,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LectureRef {
    pub id: Uuid,
    pub subject: String,
    pub lecture_type: LectureType,
}

/// One attendance row joined with its lecture, as read for the weekly report.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub status: AttendanceStatus,
    pub date: NaiveDate,
    pub lecture: Option<LectureRef>,
}

/// One attendance row keyed by lecture id, as read for the home view.
#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub lecture_id: Option<Uuid>,
    pub status: AttendanceStatus,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    #[serde(rename = "type")]
    pub lecture_type: LectureType,
    pub present: u32,
    pub absent: u32,
    pub total_lectures: u32,
    pub attendance_score: f64,
    #[serde(rename = "lecturesNeededFor75")]
    pub lectures_needed_for_75: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowAttendanceAlert {
    pub lecture_id: Uuid,
    pub subject: String,
    #[serde(rename = "type")]
    pub lecture_type: LectureType,
    pub percentage: f64,
}

pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_literal_present_counts_as_present() {
        assert_eq!(AttendanceStatus::from_stored("Present"), AttendanceStatus::Present);
        assert_eq!(AttendanceStatus::from_stored("Absent"), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::from_stored("Excused"), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::from_stored("present"), AttendanceStatus::Absent);
    }

    #[test]
    fn summary_serializes_with_report_field_names() {
        let summary = SubjectSummary {
            subject: "Maths".to_string(),
            lecture_type: LectureType::Lecture,
            present: 3,
            absent: 1,
            total_lectures: 4,
            attendance_score: 75.0,
            lectures_needed_for_75: 0,
        };
        let value = serde_json::to_value(&summary).expect("serialize summary");
        assert_eq!(value["type"], "Lecture");
        assert_eq!(value["totalLectures"], 4);
        assert_eq!(value["attendanceScore"], 75.0);
        assert_eq!(value["lecturesNeededFor75"], 0);
    }

    #[test]
    fn lecture_times_use_hour_minute_text() {
        let lecture = Lecture {
            id: Uuid::nil(),
            subject: "Physics".to_string(),
            lecture_type: LectureType::Lab,
            day_of_week: 2,
            start_time: NaiveTime::from_hms_opt(9, 5, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).expect("valid time"),
        };
        let value = serde_json::to_value(&lecture).expect("serialize lecture");
        assert_eq!(value["start_time"], "09:05");
        assert_eq!(value["end_time"], "10:30");
        let back: Lecture = serde_json::from_value(value).expect("deserialize lecture");
        assert_eq!(back, lecture);
    }
}
