use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::models::{AttendanceMark, AttendanceRecord, AttendanceStatus, Lecture};
use crate::schedule::ValidLecture;

/// Everything the handlers need from the hosted record store. Each call
/// returns an owned snapshot; aggregation runs on it afterwards.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn attendance_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AppError>;

    async fn lectures(&self, user_id: &str) -> Result<Vec<Lecture>, AppError>;

    async fn attendance_marks(&self, user_id: &str) -> Result<Vec<AttendanceMark>, AppError>;

    async fn insert_lecture(&self, user_id: &str, lecture: &ValidLecture)
        -> Result<Lecture, AppError>;

    async fn record_attendance(
        &self,
        user_id: &str,
        lecture_id: Uuid,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(err: anyhow::Error) -> AppError {
    AppError::Store(format!("{err:#}"))
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn attendance_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        db::fetch_attendance_since(&self.pool, user_id, since)
            .await
            .map_err(store_error)
    }

    async fn lectures(&self, user_id: &str) -> Result<Vec<Lecture>, AppError> {
        db::fetch_lectures(&self.pool, user_id)
            .await
            .map_err(store_error)
    }

    async fn attendance_marks(&self, user_id: &str) -> Result<Vec<AttendanceMark>, AppError> {
        db::fetch_attendance_marks(&self.pool, user_id)
            .await
            .map_err(store_error)
    }

    async fn insert_lecture(
        &self,
        user_id: &str,
        lecture: &ValidLecture,
    ) -> Result<Lecture, AppError> {
        db::insert_lecture(&self.pool, user_id, lecture)
            .await
            .map_err(store_error)
    }

    async fn record_attendance(
        &self,
        user_id: &str,
        lecture_id: Uuid,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<(), AppError> {
        let recorded = db::upsert_attendance(&self.pool, user_id, lecture_id, date, status)
            .await
            .map_err(store_error)?;
        if recorded {
            Ok(())
        } else {
            Err(AppError::Validation(format!("no lecture {lecture_id} for this user")))
        }
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;
    use crate::models::LectureRef;

    #[derive(Debug, Clone)]
    struct Row {
        user_id: String,
        lecture_id: Option<Uuid>,
        date: NaiveDate,
        status: String,
    }

    /// In-memory store for handler tests. `failing` makes every read fail the
    /// way an unreachable database would.
    #[derive(Default)]
    pub struct MemoryStore {
        lectures: Mutex<Vec<(String, Lecture)>>,
        attendance: Mutex<Vec<Row>>,
        failing: bool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub async fn add_lecture(&self, user_id: &str, lecture: Lecture) {
            self.lectures
                .lock()
                .await
                .push((user_id.to_string(), lecture));
        }

        pub async fn add_raw_mark(
            &self,
            user_id: &str,
            lecture_id: Option<Uuid>,
            date: NaiveDate,
            status: &str,
        ) {
            self.attendance.lock().await.push(Row {
                user_id: user_id.to_string(),
                lecture_id,
                date,
                status: status.to_string(),
            });
        }

        pub async fn marks_for(&self, user_id: &str) -> Vec<(Option<Uuid>, NaiveDate, String)> {
            self.attendance
                .lock()
                .await
                .iter()
                .filter(|row| row.user_id == user_id)
                .map(|row| (row.lecture_id, row.date, row.status.clone()))
                .collect()
        }

        fn check(&self) -> Result<(), AppError> {
            if self.failing {
                Err(AppError::Store("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl AttendanceStore for MemoryStore {
        async fn attendance_since(
            &self,
            user_id: &str,
            since: NaiveDate,
        ) -> Result<Vec<AttendanceRecord>, AppError> {
            self.check()?;
            let lectures: HashMap<Uuid, Lecture> = self
                .lectures
                .lock()
                .await
                .iter()
                .map(|(_, lecture)| (lecture.id, lecture.clone()))
                .collect();
            Ok(self
                .attendance
                .lock()
                .await
                .iter()
                .filter(|row| row.user_id == user_id && row.date >= since)
                .map(|row| AttendanceRecord {
                    status: AttendanceStatus::from_stored(&row.status),
                    date: row.date,
                    lecture: row
                        .lecture_id
                        .and_then(|id| lectures.get(&id))
                        .map(|lecture| LectureRef {
                            id: lecture.id,
                            subject: lecture.subject.clone(),
                            lecture_type: lecture.lecture_type,
                        }),
                })
                .collect())
        }

        async fn lectures(&self, user_id: &str) -> Result<Vec<Lecture>, AppError> {
            self.check()?;
            Ok(self
                .lectures
                .lock()
                .await
                .iter()
                .filter(|(owner, _)| owner == user_id)
                .map(|(_, lecture)| lecture.clone())
                .collect())
        }

        async fn attendance_marks(&self, user_id: &str) -> Result<Vec<AttendanceMark>, AppError> {
            self.check()?;
            Ok(self
                .attendance
                .lock()
                .await
                .iter()
                .filter(|row| row.user_id == user_id)
                .map(|row| AttendanceMark {
                    lecture_id: row.lecture_id,
                    status: AttendanceStatus::from_stored(&row.status),
                    date: row.date,
                })
                .collect())
        }

        async fn insert_lecture(
            &self,
            user_id: &str,
            lecture: &ValidLecture,
        ) -> Result<Lecture, AppError> {
            self.check()?;
            let stored = Lecture {
                id: Uuid::new_v4(),
                subject: lecture.subject.clone(),
                lecture_type: lecture.lecture_type,
                day_of_week: lecture.day_of_week,
                start_time: lecture.start_time,
                end_time: lecture.end_time,
            };
            self.add_lecture(user_id, stored.clone()).await;
            Ok(stored)
        }

        async fn record_attendance(
            &self,
            user_id: &str,
            lecture_id: Uuid,
            date: NaiveDate,
            status: AttendanceStatus,
        ) -> Result<(), AppError> {
            self.check()?;
            let owned = self
                .lectures
                .lock()
                .await
                .iter()
                .any(|(owner, lecture)| owner == user_id && lecture.id == lecture_id);
            if !owned {
                return Err(AppError::Validation(format!(
                    "no lecture {lecture_id} for this user"
                )));
            }

            let mut rows = self.attendance.lock().await;
            match rows.iter_mut().find(|row| {
                row.user_id == user_id && row.lecture_id == Some(lecture_id) && row.date == date
            }) {
                Some(row) => row.status = status.as_str().to_string(),
                None => rows.push(Row {
                    user_id: user_id.to_string(),
                    lecture_id: Some(lecture_id),
                    date,
                    status: status.as_str().to_string(),
                }),
            }
            Ok(())
        }
    }
}
