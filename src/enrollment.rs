use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{self, CurriculumEntry};
use crate::db;
use crate::error::{Conflict, ErpError, ErpResult, RuleViolation, StateViolation};
use crate::model::StudentStatus;
use crate::people;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub course_code: String,
    pub credit_hours: i64,
    pub semester_id: String,
    pub lecturer_id: Option<String>,
    pub enrollment_date: NaiveDate,
    pub is_active: bool,
    pub is_repeat: bool,
    pub is_audit: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteReport {
    pub course_id: String,
    pub course_code: String,
    pub satisfied: bool,
    pub missing: Vec<String>,
}

const ENROLLMENT_COLS: &str = "e.id, e.student_id, e.course_id, c.code, c.credit_hours,
    e.semester_id, e.lecturer_id, e.enrollment_date, e.is_active, e.is_repeat, e.is_audit";

fn enrollment_from_row(r: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        course_id: r.get(2)?,
        course_code: r.get(3)?,
        credit_hours: r.get(4)?,
        semester_id: r.get(5)?,
        lecturer_id: r.get(6)?,
        enrollment_date: r.get(7)?,
        is_active: r.get(8)?,
        is_repeat: r.get(9)?,
        is_audit: r.get(10)?,
    })
}

pub fn enrollment(conn: &Connection, id: &str) -> ErpResult<Enrollment> {
    conn.query_row(
        &format!(
            "SELECT {ENROLLMENT_COLS} FROM enrollments e JOIN courses c ON c.id = e.course_id
             WHERE e.id = ?"
        ),
        [id],
        enrollment_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("enrollment", id))
}

fn find(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    semester_id: &str,
) -> ErpResult<Option<Enrollment>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ENROLLMENT_COLS} FROM enrollments e JOIN courses c ON c.id = e.course_id
                 WHERE e.student_id = ? AND e.course_id = ? AND e.semester_id = ?"
            ),
            params![student_id, course_id, semester_id],
            enrollment_from_row,
        )
        .optional()?)
}

/// Whether the student has any enrollment for the course outside `semester_id`.
fn enrolled_elsewhere(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    semester_id: &str,
    active_only: bool,
) -> ErpResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments
             WHERE student_id = ?1 AND course_id = ?2 AND semester_id <> ?3
               AND (?4 = 0 OR is_active = 1)
             LIMIT 1",
            params![student_id, course_id, semester_id, active_only],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn missing_prerequisites(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    semester_id: &str,
) -> ErpResult<Vec<String>> {
    let mut missing = Vec::new();
    for (prereq_id, code) in catalog::prerequisites(conn, course_id)? {
        if !enrolled_elsewhere(conn, student_id, &prereq_id, semester_id, true)? {
            missing.push(code);
        }
    }
    Ok(missing)
}

/// Creates the enrollment, or reactivates the inactive row already held for
/// the same (student, course, semester). Returns `None` when an active row
/// already exists.
pub(crate) fn upsert_enrollment(
    conn: &Connection,
    now: NaiveDateTime,
    student_id: &str,
    course_id: &str,
    semester_id: &str,
    is_audit: bool,
    force_repeat: bool,
) -> ErpResult<Option<String>> {
    let is_repeat = force_repeat || enrolled_elsewhere(conn, student_id, course_id, semester_id, false)?;
    match find(conn, student_id, course_id, semester_id)? {
        Some(existing) if existing.is_active => Ok(None),
        Some(existing) => {
            conn.execute(
                "UPDATE enrollments
                 SET is_active = 1, is_repeat = ?, is_audit = ?, updated_at = ?
                 WHERE id = ?",
                params![is_repeat, is_audit, now, existing.id],
            )?;
            Ok(Some(existing.id))
        }
        None => {
            let id = db::new_id();
            conn.execute(
                "INSERT INTO enrollments(id, student_id, course_id, semester_id, enrollment_date,
                    is_active, is_repeat, is_audit, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, 1, ?, ?, ?, ?)",
                params![id, student_id, course_id, semester_id, now.date(), is_repeat, is_audit, now, now],
            )?;
            Ok(Some(id))
        }
    }
}

fn dedup(course_ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(course_ids.len());
    for id in course_ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// Registers a student for courses in one semester. All courses succeed or
/// none do.
pub fn register(
    conn: &mut Connection,
    now: NaiveDateTime,
    student_id: &str,
    semester_id: &str,
    course_ids: &[String],
    is_audit: bool,
) -> ErpResult<Vec<Enrollment>> {
    let course_ids = dedup(course_ids);
    if course_ids.is_empty() {
        return Err(ErpError::validation("courseIds", "at least one course is required"));
    }
    let tx = db::immediate(conn)?;
    let student = people::student(&tx, student_id)?;
    if student.status != StudentStatus::Active {
        return Err(StateViolation::Other(format!(
            "student {} is {}",
            student.student_id, student.status
        ))
        .into());
    }
    let sem = catalog::semester(&tx, semester_id)?;
    if !sem.registration_open_at(now) {
        warn!(student = %student.student_id, semester_id, "registration outside window");
        return Err(StateViolation::RegistrationWindowClosed.into());
    }

    let mut created = Vec::with_capacity(course_ids.len());
    for course_id in &course_ids {
        let course = catalog::course(&tx, course_id)?;
        if !catalog::in_curriculum(&tx, &student.programme_id, &course.id)? {
            return Err(RuleViolation::CourseNotInCurriculum {
                course_code: course.code,
            }
            .into());
        }
        let missing = missing_prerequisites(&tx, &student.id, &course.id, &sem.id)?;
        if !missing.is_empty() {
            return Err(RuleViolation::PrerequisiteNotSatisfied {
                course_code: course.code,
                missing,
            }
            .into());
        }
        match upsert_enrollment(&tx, now, &student.id, &course.id, &sem.id, is_audit, false)? {
            Some(id) => created.push(id),
            None => {
                return Err(Conflict::DuplicateEnrollment {
                    course_code: course.code,
                }
                .into())
            }
        }
    }

    let rows = created
        .iter()
        .map(|id| enrollment(&tx, id))
        .collect::<ErpResult<Vec<_>>>()?;
    tx.commit()?;
    info!(
        student = %student.student_id,
        semester_id,
        courses = rows.len(),
        "registered"
    );
    Ok(rows)
}

pub fn list(
    conn: &Connection,
    student_id: &str,
    semester_id: Option<&str>,
    include_inactive: bool,
) -> ErpResult<Vec<Enrollment>> {
    people::student(conn, student_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENROLLMENT_COLS}
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         JOIN semesters s ON s.id = e.semester_id
         WHERE e.student_id = ?1
           AND (?2 IS NULL OR e.semester_id = ?2)
           AND (?3 = 1 OR e.is_active = 1)
         ORDER BY s.start_date, c.code"
    ))?;
    let rows = stmt
        .query_map(params![student_id, semester_id, include_inactive], enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn deactivate(conn: &Connection, now: NaiveDateTime, enrollment_id: &str) -> ErpResult<Enrollment> {
    let e = enrollment(conn, enrollment_id)?;
    if e.is_active {
        conn.execute(
            "UPDATE enrollments SET is_active = 0, updated_at = ? WHERE id = ?",
            params![now, e.id],
        )?;
        info!(enrollment_id, course = %e.course_code, "enrollment deactivated");
    }
    enrollment(conn, enrollment_id)
}

pub fn check_prerequisites(
    conn: &Connection,
    student_id: &str,
    semester_id: &str,
    course_ids: &[String],
) -> ErpResult<Vec<PrerequisiteReport>> {
    let student = people::student(conn, student_id)?;
    let sem = catalog::semester(conn, semester_id)?;
    dedup(course_ids)
        .iter()
        .map(|course_id| {
            let course = catalog::course(conn, course_id)?;
            let missing = missing_prerequisites(conn, &student.id, &course.id, &sem.id)?;
            Ok(PrerequisiteReport {
                course_id: course.id,
                course_code: course.code,
                satisfied: missing.is_empty(),
                missing,
            })
        })
        .collect()
}

/// Curriculum courses for the student's current slot not yet actively held
/// in `semester_id`.
pub fn available(conn: &Connection, student_id: &str, semester_id: &str) -> ErpResult<Vec<CurriculumEntry>> {
    let student = people::student(conn, student_id)?;
    let sem = catalog::semester(conn, semester_id)?;
    let slot = catalog::curriculum(
        conn,
        &student.programme_id,
        Some((student.current_year, student.current_semester)),
    )?;
    let mut out = Vec::with_capacity(slot.len());
    for entry in slot {
        match find(conn, &student.id, &entry.course_id, &sem.id)? {
            Some(e) if e.is_active => {}
            _ => out.push(entry),
        }
    }
    Ok(out)
}
