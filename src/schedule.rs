use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::AppError;
use crate::models::{hhmm, Lecture, LectureType, NewLecture};

/// A scheduled lecture that passed validation, ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidLecture {
    pub subject: String,
    pub lecture_type: LectureType,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

pub fn validate(lecture: &NewLecture) -> Result<ValidLecture, AppError> {
    let subject = lecture.subject.trim();
    if subject.is_empty() {
        return Err(AppError::Validation("subject is required".to_string()));
    }
    if lecture.day_of_week > 6 {
        return Err(AppError::Validation(format!(
            "day_of_week must be between 0 (Sunday) and 6, got {}",
            lecture.day_of_week
        )));
    }
    let start_time = parse_time("start_time", &lecture.start_time)?;
    let end_time = parse_time("end_time", &lecture.end_time)?;
    if end_time < start_time {
        return Err(AppError::Validation(format!(
            "end_time {} is before start_time {}",
            lecture.end_time, lecture.start_time
        )));
    }

    Ok(ValidLecture {
        subject: subject.to_string(),
        lecture_type: lecture.lecture_type,
        day_of_week: lecture.day_of_week,
        start_time,
        end_time,
    })
}

pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value.trim(), hhmm::FORMAT)
        .map_err(|_| AppError::Validation(format!("{field} must be HH:MM, got `{value}`")))
}

pub fn day_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

pub fn day_name(day_of_week: u8) -> &'static str {
    match day_of_week {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "Unknown",
    }
}

/// First lecture running on `day_of_week` at `time`. Both ends of the window
/// are inclusive, at minute precision.
pub fn active_lecture(lectures: &[Lecture], day_of_week: u8, time: NaiveTime) -> Option<&Lecture> {
    let minute = truncate_to_minute(time);
    lectures.iter().find(|lecture| {
        lecture.day_of_week == day_of_week
            && lecture.start_time <= minute
            && minute <= lecture.end_time
    })
}

pub fn active_lecture_at(lectures: &[Lecture], now: NaiveDateTime) -> Option<&Lecture> {
    active_lecture(lectures, day_index(now.weekday()), now.time())
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
