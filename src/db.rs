use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    hhmm, AttendanceMark, AttendanceRecord, AttendanceStatus, Lecture, LectureRef, LectureType,
};
use crate::schedule::ValidLecture;

pub const DEMO_USER: &str = "demo-user";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let lectures = vec![
        (
            Uuid::parse_str("6b1f6d0e-3c1b-4a57-9a4e-1f1c0c7e2a10")?,
            "Maths",
            LectureType::Lecture,
            1,
            "09:00",
            "10:00",
        ),
        (
            Uuid::parse_str("a4f0c2d9-5e7b-4f43-8d2a-77c9b0e6d311")?,
            "Physics",
            LectureType::Lab,
            3,
            "14:00",
            "16:00",
        ),
        (
            Uuid::parse_str("f2d8e4b1-0a6c-4e2f-b3d7-9c5a1e8f4b12")?,
            "Chemistry",
            LectureType::Tutorial,
            4,
            "11:00",
            "12:00",
        ),
    ];

    for (id, subject, lecture_type, day_of_week, start, end) in &lectures {
        sqlx::query(
            r#"
            INSERT INTO attendance_tracker.lectures
            (id, user_id, subject, type, day_of_week, start_time, end_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET subject = EXCLUDED.subject, type = EXCLUDED.type,
                day_of_week = EXCLUDED.day_of_week,
                start_time = EXCLUDED.start_time, end_time = EXCLUDED.end_time
            "#,
        )
        .bind(id)
        .bind(DEMO_USER)
        .bind(subject)
        .bind(lecture_type.as_str())
        .bind(*day_of_week as i16)
        .bind(NaiveTime::parse_from_str(start, hhmm::FORMAT).context("invalid seed time")?)
        .bind(NaiveTime::parse_from_str(end, hhmm::FORMAT).context("invalid seed time")?)
        .execute(pool)
        .await?;
    }

    let today = Utc::now().date_naive();
    let marks = vec![
        ("seed-001", 0usize, 1i64, "Present"),
        ("seed-002", 0, 3, "Present"),
        ("seed-003", 0, 5, "Absent"),
        ("seed-004", 1, 2, "Absent"),
        ("seed-005", 1, 4, "Present"),
        ("seed-006", 1, 6, "Absent"),
        ("seed-007", 2, 1, "Excused"),
        ("seed-008", 2, 2, "Present"),
    ];

    let mut inserted = 0usize;
    for (source_key, lecture_index, days_ago, status) in marks {
        let lecture_id = lectures[lecture_index].0;
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_tracker.attendance
            (id, lecture_id, user_id, date, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lecture_id)
        .bind(DEMO_USER)
        .bind(today - Duration::days(days_ago))
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Attendance rows for `user_id` dated on or after `since`, joined with their
/// lecture. Rows whose lecture was deleted come back with `lecture: None`.
pub async fn fetch_attendance_since(
    pool: &PgPool,
    user_id: &str,
    since: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT a.status, a.date, l.id AS lecture_id, l.subject, l.type \
         FROM attendance_tracker.attendance a \
         LEFT JOIN attendance_tracker.lectures l ON l.id = a.lecture_id \
         WHERE a.user_id = $1 AND a.date >= $2 \
         ORDER BY a.date",
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let lecture_id: Option<Uuid> = row.get("lecture_id");
        let lecture = match lecture_id {
            Some(id) => Some(LectureRef {
                id,
                subject: row.get("subject"),
                lecture_type: lecture_type(&row)?,
            }),
            None => None,
        };
        let status: String = row.get("status");
        records.push(AttendanceRecord {
            status: AttendanceStatus::from_stored(&status),
            date: row.get("date"),
            lecture,
        });
    }

    Ok(records)
}

pub async fn fetch_lectures(pool: &PgPool, user_id: &str) -> anyhow::Result<Vec<Lecture>> {
    let rows = sqlx::query(
        "SELECT id, subject, type, day_of_week, start_time, end_time \
         FROM attendance_tracker.lectures \
         WHERE user_id = $1 \
         ORDER BY day_of_week, start_time, created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(lecture_from_row).collect()
}

pub async fn fetch_attendance_marks(
    pool: &PgPool,
    user_id: &str,
) -> anyhow::Result<Vec<AttendanceMark>> {
    let rows = sqlx::query(
        "SELECT lecture_id, status, date \
         FROM attendance_tracker.attendance \
         WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut marks = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        marks.push(AttendanceMark {
            lecture_id: row.get("lecture_id"),
            status: AttendanceStatus::from_stored(&status),
            date: row.get("date"),
        });
    }

    Ok(marks)
}

pub async fn insert_lecture(
    pool: &PgPool,
    user_id: &str,
    lecture: &ValidLecture,
) -> anyhow::Result<Lecture> {
    let row = sqlx::query(
        r#"
        INSERT INTO attendance_tracker.lectures
        (id, user_id, subject, type, day_of_week, start_time, end_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, subject, type, day_of_week, start_time, end_time
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&lecture.subject)
    .bind(lecture.lecture_type.as_str())
    .bind(lecture.day_of_week as i16)
    .bind(lecture.start_time)
    .bind(lecture.end_time)
    .fetch_one(pool)
    .await?;

    lecture_from_row(&row)
}

/// Records one mark per lecture, user and date; marking again overwrites the
/// status. Returns false when the lecture does not belong to the user.
pub async fn upsert_attendance(
    pool: &PgPool,
    user_id: &str,
    lecture_id: Uuid,
    date: NaiveDate,
    status: AttendanceStatus,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_tracker.attendance (id, lecture_id, user_id, date, status)
        SELECT $1, l.id, l.user_id, $4, $5
        FROM attendance_tracker.lectures l
        WHERE l.id = $2 AND l.user_id = $3
        ON CONFLICT (lecture_id, user_id, date) DO UPDATE
        SET status = EXCLUDED.status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(lecture_id)
    .bind(user_id)
    .bind(date)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_id: String,
        lecture_id: Uuid,
        date: NaiveDate,
        status: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_tracker.attendance
            (id, lecture_id, user_id, date, status, source_key)
            SELECT $1, l.id, $3, $4, $5, $6
            FROM attendance_tracker.lectures l
            WHERE l.id = $2 AND l.user_id = $3
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.lecture_id)
        .bind(&row.user_id)
        .bind(row.date)
        .bind(row.status.trim())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        } else {
            tracing::debug!(
                lecture_id = %row.lecture_id,
                user_id = %row.user_id,
                date = %row.date,
                "skipped duplicate or unknown-lecture row"
            );
        }
    }

    Ok(inserted)
}

fn lecture_type(row: &PgRow) -> anyhow::Result<LectureType> {
    let raw: String = row.get("type");
    raw.parse::<LectureType>().map_err(anyhow::Error::msg)
}

fn lecture_from_row(row: &PgRow) -> anyhow::Result<Lecture> {
    let day_of_week: i16 = row.get("day_of_week");
    Ok(Lecture {
        id: row.get("id"),
        subject: row.get("subject"),
        lecture_type: lecture_type(row)?,
        day_of_week: u8::try_from(day_of_week).context("day_of_week out of range")?,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
    })
}
