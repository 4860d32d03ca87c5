//! Timetable slots and QR attendance sessions.

use std::net::IpAddr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog;
use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult, RuleViolation, StateViolation};
use crate::model::{AttendanceStatus, DayOfWeek};
use crate::people;
use crate::teaching;

/// How long a session token stays usable after it is issued.
pub fn session_lifetime() -> Duration {
    Duration::hours(3)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    pub id: String,
    pub programme_id: String,
    pub course_id: String,
    pub academic_year_id: String,
    pub semester_id: String,
    pub year: i64,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub venue: String,
    pub lecturer_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSlot {
    pub programme_id: String,
    pub course_id: String,
    pub semester_id: String,
    pub year: i64,
    pub day_of_week: DayOfWeek,
    /// `HH:MM` or `HH:MM:SS`.
    pub start_time: String,
    pub end_time: String,
    pub venue: String,
    #[serde(default)]
    pub lecturer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub timetable_id: String,
    pub lecturer_id: String,
    pub session_token: String,
    pub session_date: NaiveDate,
    pub week_number: i64,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub is_active: bool,
}

impl Session {
    pub fn open_at(&self, now: NaiveDateTime) -> bool {
        self.is_active && now <= self.expires_at
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub timetable_id: String,
    pub week_number: i64,
    pub session_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    pub id: String,
    pub student_id: String,
    pub session_id: String,
    pub status: AttendanceStatus,
    pub marked_via_qr: bool,
    pub ip_address: Option<String>,
    pub marked_at: NaiveDateTime,
    pub marked_by: Option<String>,
    pub remarks: Option<String>,
}

const SLOT_COLS: &str = "id, programme_id, course_id, academic_year_id, semester_id, year,
    day_of_week, start_time, end_time, venue, lecturer_id, is_active";

const SESSION_COLS: &str = "id, timetable_id, lecturer_id, session_token, session_date,
    week_number, created_at, expires_at, is_active";

const MARK_COLS: &str = "id, student_id, session_id, status, marked_via_qr, ip_address,
    marked_at, marked_by, remarks";

fn slot_from_row(r: &Row<'_>) -> rusqlite::Result<TimetableSlot> {
    Ok(TimetableSlot {
        id: r.get(0)?,
        programme_id: r.get(1)?,
        course_id: r.get(2)?,
        academic_year_id: r.get(3)?,
        semester_id: r.get(4)?,
        year: r.get(5)?,
        day_of_week: r.get(6)?,
        start_time: r.get(7)?,
        end_time: r.get(8)?,
        venue: r.get(9)?,
        lecturer_id: r.get(10)?,
        is_active: r.get(11)?,
    })
}

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: r.get(0)?,
        timetable_id: r.get(1)?,
        lecturer_id: r.get(2)?,
        session_token: r.get(3)?,
        session_date: r.get(4)?,
        week_number: r.get(5)?,
        created_at: r.get(6)?,
        expires_at: r.get(7)?,
        is_active: r.get(8)?,
    })
}

fn mark_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceMark> {
    Ok(AttendanceMark {
        id: r.get(0)?,
        student_id: r.get(1)?,
        session_id: r.get(2)?,
        status: r.get(3)?,
        marked_via_qr: r.get(4)?,
        ip_address: r.get(5)?,
        marked_at: r.get(6)?,
        marked_by: r.get(7)?,
        remarks: r.get(8)?,
    })
}

fn parse_time(field: &str, raw: &str) -> ErpResult<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| ErpError::validation(field, "expected HH:MM"))
}

pub fn slot(conn: &Connection, id: &str) -> ErpResult<TimetableSlot> {
    conn.query_row(&format!("SELECT {SLOT_COLS} FROM timetables WHERE id = ?"), [id], slot_from_row)
        .optional()?
        .ok_or_else(|| ErpError::not_found("timetable slot", id))
}

pub fn create_slot(conn: &Connection, now: NaiveDateTime, input: NewSlot) -> ErpResult<TimetableSlot> {
    let programme = catalog::programme(conn, &input.programme_id)?;
    let course = catalog::course(conn, &input.course_id)?;
    let sem = catalog::semester(conn, &input.semester_id)?;
    if !(1..=programme.duration_years).contains(&input.year) {
        return Err(ErpError::validation(
            "year",
            format!("must be between 1 and {}", programme.duration_years),
        ));
    }
    let start = parse_time("startTime", &input.start_time)?;
    let end = parse_time("endTime", &input.end_time)?;
    if start >= end {
        return Err(ErpError::validation("endTime", "must be after startTime"));
    }
    if input.venue.trim().is_empty() {
        return Err(ErpError::validation("venue", "required"));
    }
    if let Some(lecturer) = &input.lecturer_id {
        people::lecturer(conn, lecturer)?;
    }

    let id = db::new_id();
    conn.execute(
        "INSERT INTO timetables(id, programme_id, course_id, academic_year_id, semester_id, year,
            day_of_week, start_time, end_time, venue, lecturer_id, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        params![
            id,
            programme.id,
            course.id,
            sem.academic_year_id,
            sem.id,
            input.year,
            input.day_of_week,
            start,
            end,
            input.venue.trim(),
            input.lecturer_id,
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "timetable slot",
            key: format!("{} {} Y{}", programme.code, course.code, input.year),
        })
    })?;
    slot(conn, &id)
}

pub fn session(conn: &Connection, id: &str) -> ErpResult<Session> {
    conn.query_row(
        &format!("SELECT {SESSION_COLS} FROM attendance_sessions WHERE id = ?"),
        [id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("attendance session", id))
}

fn session_by_token(conn: &Connection, token: &str) -> ErpResult<Option<Session>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLS} FROM attendance_sessions WHERE session_token = ?"),
            [token],
            session_from_row,
        )
        .optional()?)
}

/// 256 random-looking bits as 64 lowercase hex characters.
fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Issues a session token for a timetable slot. An expired session for the
/// same (slot, week, date) is closed and replaced; a live one is a conflict.
pub fn create_session(
    conn: &mut Connection,
    now: NaiveDateTime,
    lecturer_id: &str,
    input: NewSession,
) -> ErpResult<Session> {
    if !(1..=12).contains(&input.week_number) {
        return Err(ErpError::validation("weekNumber", "must be between 1 and 12"));
    }
    let tx = db::immediate(conn)?;
    let slot = slot(&tx, &input.timetable_id)?;
    if !slot.is_active {
        return Err(StateViolation::Other("timetable slot is inactive".to_string()).into());
    }
    teaching::require_teaching(&tx, lecturer_id, &slot.course_id, &slot.semester_id)?;

    let previous: Option<Session> = tx
        .query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM attendance_sessions
                 WHERE timetable_id = ? AND week_number = ? AND session_date = ? AND is_active = 1"
            ),
            params![slot.id, input.week_number, input.session_date],
            session_from_row,
        )
        .optional()?;
    if let Some(prev) = previous {
        if prev.open_at(now) {
            return Err(Conflict::SessionAlreadyOpen { session_id: prev.id }.into());
        }
        tx.execute(
            "UPDATE attendance_sessions SET is_active = 0 WHERE id = ?",
            [&prev.id],
        )?;
    }

    let id = db::new_id();
    tx.execute(
        "INSERT INTO attendance_sessions(id, timetable_id, lecturer_id, session_token,
            session_date, week_number, created_at, expires_at, is_active)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1)",
        params![
            id,
            slot.id,
            lecturer_id,
            new_token(),
            input.session_date,
            input.week_number,
            now,
            now + session_lifetime()
        ],
    )?;
    let out = session(&tx, &id)?;
    tx.commit()?;
    info!(session_id = %out.id, week = out.week_number, "attendance session opened");
    Ok(out)
}

fn enrolled_for_slot(conn: &Connection, student_id: &str, slot: &TimetableSlot) -> ErpResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM enrollments
            WHERE student_id = ? AND course_id = ? AND semester_id = ? AND is_active = 1)",
        params![student_id, slot.course_id, slot.semester_id],
        |r| r.get(0),
    )?)
}

fn mark_for(conn: &Connection, student_id: &str, session_id: &str) -> ErpResult<AttendanceMark> {
    conn.query_row(
        &format!("SELECT {MARK_COLS} FROM attendance WHERE student_id = ? AND session_id = ?"),
        params![student_id, session_id],
        mark_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("attendance", session_id))
}

/// Self-service mark through a scanned token.
pub fn mark(
    conn: &Connection,
    now: NaiveDateTime,
    token: &str,
    student_id: &str,
    ip_address: Option<&str>,
) -> ErpResult<AttendanceMark> {
    let ip = match ip_address.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<IpAddr>()
                .map_err(|_| ErpError::validation("ipAddress", "not an IP address"))?
                .to_string(),
        ),
        None => None,
    };
    let session = match session_by_token(conn, token)? {
        Some(s) if s.open_at(now) => s,
        _ => return Err(StateViolation::SessionClosed.into()),
    };
    let slot = slot(conn, &session.timetable_id)?;
    people::student(conn, student_id)?;
    if !enrolled_for_slot(conn, student_id, &slot)? {
        return Err(RuleViolation::NotEnrolled.into());
    }

    conn.execute(
        "INSERT INTO attendance(id, student_id, session_id, status, marked_via_qr, ip_address,
            marked_at)
         VALUES(?, ?, ?, 'present', 1, ?, ?)",
        params![db::new_id(), student_id, session.id, ip, now],
    )
    .map_err(|e| map_unique(e, || Conflict::AlreadyMarked))?;
    mark_for(conn, student_id, &session.id)
}

/// Lecturer-entered status. Skips the token but keeps one row per student.
pub fn override_mark(
    conn: &Connection,
    now: NaiveDateTime,
    lecturer_id: &str,
    session_id: &str,
    student_id: &str,
    status: AttendanceStatus,
    remarks: Option<&str>,
) -> ErpResult<AttendanceMark> {
    let session = session(conn, session_id)?;
    let slot = slot(conn, &session.timetable_id)?;
    teaching::require_teaching(conn, lecturer_id, &slot.course_id, &slot.semester_id)?;
    people::student(conn, student_id)?;
    if !enrolled_for_slot(conn, student_id, &slot)? {
        return Err(RuleViolation::NotEnrolled.into());
    }
    conn.execute(
        "INSERT INTO attendance(id, student_id, session_id, status, marked_via_qr, marked_at,
            marked_by, remarks)
         VALUES(?, ?, ?, ?, 0, ?, ?, ?)
         ON CONFLICT(student_id, session_id) DO UPDATE SET
            status = excluded.status,
            marked_via_qr = 0,
            ip_address = NULL,
            marked_at = excluded.marked_at,
            marked_by = excluded.marked_by,
            remarks = excluded.remarks",
        params![db::new_id(), student_id, session.id, status, now, lecturer_id, remarks],
    )?;
    info!(session_id, student_id, status = %status, "attendance overridden");
    mark_for(conn, student_id, &session.id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterLine {
    pub student_id: String,
    pub student_number: String,
    pub full_name: String,
    pub status: AttendanceStatus,
    pub marked: bool,
    pub marked_via_qr: bool,
    pub marked_at: Option<NaiveDateTime>,
}

/// Every student enrolled in the session's course, unmarked ones as absent.
pub fn roster(conn: &Connection, session_id: &str) -> ErpResult<Vec<RosterLine>> {
    let session = session(conn, session_id)?;
    let slot = slot(conn, &session.timetable_id)?;
    let mut stmt = conn.prepare(
        "SELECT st.id, st.student_id, u.first_name || ' ' || u.last_name,
                a.status, a.marked_via_qr, a.marked_at
         FROM enrollments e
         JOIN students st ON st.id = e.student_id
         JOIN users u ON u.id = st.user_id
         LEFT JOIN attendance a ON a.student_id = st.id AND a.session_id = ?1
         WHERE e.course_id = ?2 AND e.semester_id = ?3 AND e.is_active = 1
         ORDER BY st.student_id",
    )?;
    let rows = stmt
        .query_map(params![session.id, slot.course_id, slot.semester_id], |r| {
            let status: Option<AttendanceStatus> = r.get(3)?;
            Ok(RosterLine {
                student_id: r.get(0)?,
                student_number: r.get(1)?,
                full_name: r.get(2)?,
                marked: status.is_some(),
                status: status.unwrap_or(AttendanceStatus::Absent),
                marked_via_qr: r.get::<_, Option<bool>>(4)?.unwrap_or(false),
                marked_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn close_session(conn: &Connection, lecturer_id: &str, session_id: &str) -> ErpResult<Session> {
    let s = session(conn, session_id)?;
    if s.lecturer_id != lecturer_id {
        warn!(session_id, lecturer_id, "close refused, not the session owner");
        return Err(ErpError::PermissionDenied(
            "only the lecturer who opened the session can close it".to_string(),
        ));
    }
    conn.execute(
        "UPDATE attendance_sessions SET is_active = 0 WHERE id = ?",
        [session_id],
    )?;
    session(conn, session_id)
}
