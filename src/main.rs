use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod aggregate;
mod config;
mod db;
mod error;
mod models;
mod report;
mod schedule;
mod server;
mod store;

use crate::config::Config;
use crate::models::{AttendanceStatus, LectureType, NewLecture};
use crate::report::WeeklyReport;
use crate::store::{AttendanceStore, PgStore};

#[derive(Parser)]
#[command(name = "attendance-tracker")]
#[command(about = "Lecture attendance tracker with weekly reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo timetable and attendance marks
    Seed,
    /// Import attendance marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Schedule a recurring lecture
    Schedule {
        #[arg(long)]
        user: String,
        #[arg(long)]
        subject: String,
        #[arg(long = "type", value_parser = parse_lecture_type)]
        lecture_type: LectureType,
        /// Day of week, 0 = Sunday
        #[arg(long)]
        day: u8,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// End time, HH:MM
        #[arg(long)]
        end: String,
    },
    /// Mark attendance for a lecture
    Mark {
        #[arg(long)]
        user: String,
        #[arg(long)]
        lecture: Uuid,
        #[arg(long, value_parser = parse_status)]
        status: AttendanceStatus,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the lecture in progress and optionally mark it
    Prompt {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<AttendanceStatus>,
    },
    /// Generate an attendance report
    Report {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = report::WEEKLY_WINDOW_DAYS)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Print the weekly report JSON instead of writing markdown
        #[arg(long)]
        json: bool,
    },
    /// List lectures below the attendance target
    Alerts {
        #[arg(long)]
        user: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
}

fn parse_lecture_type(value: &str) -> Result<LectureType, String> {
    value.parse()
}

fn parse_status(value: &str) -> Result<AttendanceStatus, String> {
    value.parse()
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool).await?;
            println!(
                "Seed data inserted for {} ({inserted} new attendance marks).",
                db::DEMO_USER
            );
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} attendance marks from {}.", csv.display());
        }
        Commands::Schedule {
            user,
            subject,
            lecture_type,
            day,
            start,
            end,
        } => {
            let valid = schedule::validate(&NewLecture {
                subject,
                lecture_type,
                day_of_week: day,
                start_time: start,
                end_time: end,
            })?;
            let lecture = store.insert_lecture(&user, &valid).await?;
            println!(
                "Scheduled {} ({}) on {} {}-{} as {}.",
                lecture.subject,
                lecture.lecture_type,
                schedule::day_name(lecture.day_of_week),
                lecture.start_time.format(models::hhmm::FORMAT),
                lecture.end_time.format(models::hhmm::FORMAT),
                lecture.id
            );
        }
        Commands::Mark {
            user,
            lecture,
            status,
            date,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            store.record_attendance(&user, lecture, date, status).await?;
            println!("Attendance recorded as {status} on {date}.");
        }
        Commands::Prompt { user, status } => {
            let lectures = store.lectures(&user).await?;
            let now = Local::now().naive_local();
            let Some(active) = schedule::active_lecture_at(&lectures, now) else {
                println!("No lecture in progress.");
                return Ok(());
            };

            println!("Lecture in progress!");
            println!(
                "{} ({}) {} - {}",
                active.subject,
                active.lecture_type,
                active.start_time.format(models::hhmm::FORMAT),
                active.end_time.format(models::hhmm::FORMAT)
            );
            match status {
                Some(status) => {
                    let today = Utc::now().date_naive();
                    store
                        .record_attendance(&user, active.id, today, status)
                        .await?;
                    println!("Attendance recorded as {status} for {}.", active.subject);
                }
                None => println!("Mark it with --status Present or --status Absent."),
            }
        }
        Commands::Report {
            user,
            since_days,
            out,
            json,
        } => {
            let since = report::window_start(Utc::now().date_naive(), since_days);
            let records = store.attendance_since(&user, since).await?;

            if json {
                let weekly = WeeklyReport::from_records(&records);
                println!("{}", serde_json::to_string_pretty(&weekly.to_json())?);
                return Ok(());
            }

            let lectures = store.lectures(&user).await?;
            let marks = store.attendance_marks(&user).await?;
            let alerts = aggregate::low_attendance_alerts(&lectures, &marks);
            let markdown = report::build_report(&user, since, &records, &alerts);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Alerts { user } => {
            let lectures = store.lectures(&user).await?;
            let marks = store.attendance_marks(&user).await?;
            let alerts = aggregate::low_attendance_alerts(&lectures, &marks);

            if alerts.is_empty() {
                println!("No lectures below {:.0}% attendance.", aggregate::TARGET_PERCENT);
                return Ok(());
            }

            println!("Low attendance alert!");
            for alert in &alerts {
                println!(
                    "- {} ({}): {:.2}% attendance. Consider attending more classes!",
                    alert.subject, alert.lecture_type, alert.percentage
                );
            }
        }
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or(config.bind_addr);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            server::serve(server::AppState::new(Arc::new(store)), listener).await?;
        }
    }

    Ok(())
}
