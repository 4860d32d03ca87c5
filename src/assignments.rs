//! Coursework set by a lecturer and the students' submissions against it.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::error::{Conflict, ErpError, ErpResult, RuleViolation, StateViolation};
use crate::model::{GradingStatus, SubmissionFormat, SubmissionStatus};
use crate::money;
use crate::people;
use crate::teaching::{self, TeachingAssignment};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub lecturer_course_id: String,
    pub title: String,
    pub description: String,
    pub due_date: NaiveDateTime,
    pub total_marks: Decimal,
    pub weight_percentage: Decimal,
    pub submission_format: SubmissionFormat,
    pub max_file_size_mb: i64,
    pub late_submission_allowed: bool,
    pub is_published: bool,
}

fn default_total() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn default_weight() -> Decimal {
    Decimal::TEN
}

fn default_max_size() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub course_id: String,
    pub semester_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: NaiveDateTime,
    #[serde(default = "default_total")]
    pub total_marks: Decimal,
    #[serde(default = "default_weight")]
    pub weight_percentage: Decimal,
    #[serde(default = "default_format")]
    pub submission_format: SubmissionFormat,
    #[serde(default = "default_max_size")]
    pub max_file_size_mb: i64,
    #[serde(default)]
    pub late_submission_allowed: bool,
}

fn default_format() -> SubmissionFormat {
    SubmissionFormat::Any
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub file_ref: String,
    pub original_filename: String,
    pub file_size_bytes: i64,
    pub is_submitted: bool,
    pub submitted_date: Option<NaiveDateTime>,
    pub is_late: bool,
    pub status: SubmissionStatus,
    pub marks_obtained: Option<Decimal>,
    pub percentage: Option<Decimal>,
    pub feedback: Option<String>,
    pub grading_status: GradingStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub assignment_id: String,
    pub student_id: String,
    /// Opaque handle of the stored upload.
    pub file_ref: String,
    pub original_filename: String,
    pub file_size_bytes: i64,
}

const ASSIGNMENT_COLS: &str = "id, lecturer_course_id, title, description, due_date, total_marks,
    weight_percentage, submission_format, max_file_size_mb, late_submission_allowed, is_published";

const SUBMISSION_COLS: &str = "s.id, s.assignment_id, s.student_id, s.file_ref, s.original_filename,
    s.file_size_bytes, s.is_submitted, s.submitted_date, s.is_late, s.status, s.marks_obtained,
    s.feedback, s.grading_status, a.total_marks";

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: r.get(0)?,
        lecturer_course_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        due_date: r.get(4)?,
        total_marks: money::col(r, 5)?,
        weight_percentage: money::col(r, 6)?,
        submission_format: r.get(7)?,
        max_file_size_mb: r.get(8)?,
        late_submission_allowed: r.get(9)?,
        is_published: r.get(10)?,
    })
}

pub fn percentage(marks: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    money::round2(marks * Decimal::ONE_HUNDRED / total)
}

fn submission_from_row(r: &Row<'_>) -> rusqlite::Result<Submission> {
    let marks = money::opt_col(r, 10)?;
    let total = money::col(r, 13)?;
    Ok(Submission {
        id: r.get(0)?,
        assignment_id: r.get(1)?,
        student_id: r.get(2)?,
        file_ref: r.get(3)?,
        original_filename: r.get(4)?,
        file_size_bytes: r.get(5)?,
        is_submitted: r.get(6)?,
        submitted_date: r.get(7)?,
        is_late: r.get(8)?,
        status: r.get(9)?,
        percentage: marks.map(|m| percentage(m, total)),
        marks_obtained: marks,
        feedback: r.get(11)?,
        grading_status: r.get(12)?,
    })
}

pub fn assignment(conn: &Connection, id: &str) -> ErpResult<Assignment> {
    conn.query_row(
        &format!("SELECT {ASSIGNMENT_COLS} FROM assignments WHERE id = ?"),
        [id],
        assignment_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("assignment", id))
}

pub fn submission(conn: &Connection, id: &str) -> ErpResult<Submission> {
    conn.query_row(
        &format!(
            "SELECT {SUBMISSION_COLS} FROM assignment_submissions s
             JOIN assignments a ON a.id = s.assignment_id
             WHERE s.id = ?"
        ),
        [id],
        submission_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("submission", id))
}

fn submission_of(conn: &Connection, assignment_id: &str, student_id: &str) -> ErpResult<Option<Submission>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SUBMISSION_COLS} FROM assignment_submissions s
                 JOIN assignments a ON a.id = s.assignment_id
                 WHERE s.assignment_id = ? AND s.student_id = ?"
            ),
            params![assignment_id, student_id],
            submission_from_row,
        )
        .optional()?)
}

/// Loads the assignment and checks that `lecturer_id` holds its active
/// course allocation.
fn owned(conn: &Connection, lecturer_id: &str, assignment_id: &str) -> ErpResult<(Assignment, TeachingAssignment)> {
    let a = assignment(conn, assignment_id)?;
    let lca = teaching::teaching_assignment(conn, &a.lecturer_course_id)?;
    if lca.lecturer_id != lecturer_id || !lca.is_active {
        return Err(ErpError::PermissionDenied(
            "assignment belongs to another lecturer's course".to_string(),
        ));
    }
    Ok((a, lca))
}

pub fn create(conn: &Connection, now: NaiveDateTime, lecturer_id: &str, input: NewAssignment) -> ErpResult<Assignment> {
    let lca = teaching::require_teaching(conn, lecturer_id, &input.course_id, &input.semester_id)?;
    let title = input.title.trim();
    if title.is_empty() {
        return Err(ErpError::validation("title", "required"));
    }
    if input.total_marks <= Decimal::ZERO {
        return Err(ErpError::validation("totalMarks", "must be greater than zero"));
    }
    if input.weight_percentage < Decimal::ZERO || input.weight_percentage > Decimal::ONE_HUNDRED {
        return Err(ErpError::validation("weightPercentage", "must be between 0 and 100"));
    }
    if !(1..=100).contains(&input.max_file_size_mb) {
        return Err(ErpError::validation("maxFileSizeMb", "must be between 1 and 100"));
    }

    let id = db::new_id();
    conn.execute(
        "INSERT INTO assignments(id, lecturer_course_id, title, description, due_date, total_marks,
            weight_percentage, submission_format, max_file_size_mb, late_submission_allowed,
            is_published, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        params![
            id,
            lca.id,
            title,
            input.description,
            input.due_date,
            money::to_sql(input.total_marks),
            money::to_sql(input.weight_percentage),
            input.submission_format,
            input.max_file_size_mb,
            input.late_submission_allowed,
            now,
            now
        ],
    )?;
    info!(assignment_id = %id, course = %lca.course_code, "assignment created");
    assignment(conn, &id)
}

pub fn publish(
    conn: &Connection,
    now: NaiveDateTime,
    lecturer_id: &str,
    assignment_id: &str,
    published: bool,
) -> ErpResult<Assignment> {
    owned(conn, lecturer_id, assignment_id)?;
    conn.execute(
        "UPDATE assignments SET is_published = ?, updated_at = ? WHERE id = ?",
        params![published, now, assignment_id],
    )?;
    assignment(conn, assignment_id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAssignment {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub course_code: String,
    pub submission: Option<Submission>,
}

/// Published assignments of the courses the student actively takes.
pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    semester_id: Option<&str>,
) -> ErpResult<Vec<StudentAssignment>> {
    people::student(conn, student_id)?;
    let cols = ASSIGNMENT_COLS
        .split(',')
        .map(|c| format!("a.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {cols}, c.code
         FROM assignments a
         JOIN lecturer_course_assignments l ON l.id = a.lecturer_course_id
         JOIN courses c ON c.id = l.course_id
         JOIN enrollments e ON e.course_id = l.course_id AND e.semester_id = l.semester_id
         WHERE e.student_id = ?1 AND e.is_active = 1 AND a.is_published = 1
           AND (?2 IS NULL OR l.semester_id = ?2)
         ORDER BY a.due_date, a.title"
    ))?;
    let rows = stmt
        .query_map(params![student_id, semester_id], |r| {
            Ok((assignment_from_row(r)?, r.get::<_, String>(11)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (assignment, course_code) in rows {
        let submission = submission_of(conn, &assignment.id, student_id)?;
        out.push(StudentAssignment {
            assignment,
            course_code,
            submission,
        });
    }
    Ok(out)
}

fn enrolled(conn: &Connection, student_id: &str, lca: &TeachingAssignment) -> ErpResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM enrollments
            WHERE student_id = ? AND course_id = ? AND semester_id = ? AND is_active = 1)",
        params![student_id, lca.course_id, lca.semester_id],
        |r| r.get(0),
    )?)
}

/// Accepts a file for the assignment. Checks run in order: enrollment,
/// deadline, prior submission, then file size and format.
pub fn submit(conn: &Connection, now: NaiveDateTime, input: SubmissionInput) -> ErpResult<Submission> {
    let a = assignment(conn, &input.assignment_id)?;
    if !a.is_published {
        return Err(ErpError::not_found("assignment", &input.assignment_id));
    }
    let lca = teaching::teaching_assignment(conn, &a.lecturer_course_id)?;
    people::student(conn, &input.student_id)?;
    if !enrolled(conn, &input.student_id, &lca)? {
        return Err(RuleViolation::NotEnrolled.into());
    }
    let late = now > a.due_date;
    if late && !a.late_submission_allowed {
        return Err(StateViolation::AssignmentDeadlinePassed.into());
    }
    let existing = submission_of(conn, &a.id, &input.student_id)?;
    if existing.as_ref().is_some_and(|s| s.is_submitted) {
        return Err(Conflict::AlreadySubmitted.into());
    }
    if input.file_size_bytes <= 0 {
        return Err(ErpError::validation("fileSizeBytes", "file is empty"));
    }
    if input.file_size_bytes > a.max_file_size_mb * 1024 * 1024 {
        return Err(ErpError::validation(
            "fileSizeBytes",
            format!("file exceeds {} MB", a.max_file_size_mb),
        ));
    }
    if !a.submission_format.accepts(&input.original_filename) {
        return Err(ErpError::validation(
            "originalFilename",
            format!("{} submissions only", a.submission_format),
        ));
    }

    let status = if late { SubmissionStatus::Late } else { SubmissionStatus::Submitted };
    let id = existing.map(|s| s.id).unwrap_or_else(db::new_id);
    conn.execute(
        "INSERT INTO assignment_submissions(id, assignment_id, student_id, file_ref,
            original_filename, file_size_bytes, is_submitted, submitted_date, is_late, status,
            grading_status)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, 'pending')
         ON CONFLICT(assignment_id, student_id) DO UPDATE SET
            file_ref = excluded.file_ref,
            original_filename = excluded.original_filename,
            file_size_bytes = excluded.file_size_bytes,
            is_submitted = 1,
            submitted_date = excluded.submitted_date,
            is_late = excluded.is_late,
            status = excluded.status,
            grading_status = 'pending'",
        params![
            id,
            a.id,
            input.student_id,
            input.file_ref,
            input.original_filename,
            input.file_size_bytes,
            now,
            late,
            status
        ],
    )?;
    info!(assignment_id = %a.id, student_id = %input.student_id, late, "submission received");
    submission(conn, &id)
}

pub fn grade(
    conn: &Connection,
    now: NaiveDateTime,
    lecturer_id: &str,
    submission_id: &str,
    marks: Decimal,
    feedback: Option<&str>,
) -> ErpResult<Submission> {
    let sub = submission(conn, submission_id)?;
    let (a, _) = owned(conn, lecturer_id, &sub.assignment_id)?;
    if !sub.is_submitted {
        return Err(StateViolation::Other("nothing has been submitted yet".to_string()).into());
    }
    if marks < Decimal::ZERO || marks > a.total_marks {
        return Err(ErpError::validation(
            "marksObtained",
            format!("must be between 0 and {}", a.total_marks),
        ));
    }
    if sub.grading_status == GradingStatus::Returned {
        return Err(StateViolation::InvalidTransition {
            entity: "submission",
            from: sub.grading_status.to_string(),
            to: GradingStatus::Graded.to_string(),
        }
        .into());
    }
    conn.execute(
        "UPDATE assignment_submissions
         SET marks_obtained = ?, feedback = COALESCE(?, feedback), grading_status = 'graded',
             graded_by = ?, graded_at = ?
         WHERE id = ?",
        params![money::to_sql(marks), feedback, lecturer_id, now, submission_id],
    )?;
    submission(conn, submission_id)
}

/// Hands a graded submission back to the student with optional feedback.
pub fn return_submission(
    conn: &Connection,
    lecturer_id: &str,
    submission_id: &str,
    feedback: Option<&str>,
) -> ErpResult<Submission> {
    let sub = submission(conn, submission_id)?;
    owned(conn, lecturer_id, &sub.assignment_id)?;
    if sub.grading_status != GradingStatus::Graded {
        return Err(StateViolation::InvalidTransition {
            entity: "submission",
            from: sub.grading_status.to_string(),
            to: GradingStatus::Returned.to_string(),
        }
        .into());
    }
    conn.execute(
        "UPDATE assignment_submissions
         SET grading_status = 'returned', feedback = COALESCE(?, feedback)
         WHERE id = ?",
        params![feedback, submission_id],
    )?;
    submission(conn, submission_id)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStats {
    pub total_students: i64,
    pub submitted: i64,
    pub pending: i64,
    pub late: i64,
    pub graded: i64,
}

pub fn stats(conn: &Connection, lecturer_id: &str, assignment_id: &str) -> ErpResult<AssignmentStats> {
    let (a, lca) = owned(conn, lecturer_id, assignment_id)?;
    let total_students: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT student_id) FROM enrollments
         WHERE course_id = ? AND semester_id = ? AND is_active = 1",
        params![lca.course_id, lca.semester_id],
        |r| r.get(0),
    )?;
    let (submitted, late, graded): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(is_late), 0),
                COALESCE(SUM(CASE WHEN grading_status <> 'pending' THEN 1 ELSE 0 END), 0)
         FROM assignment_submissions
         WHERE assignment_id = ? AND is_submitted = 1",
        [&a.id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(AssignmentStats {
        total_students,
        submitted,
        pending: (total_students - submitted).max(0),
        late,
        graded,
    })
}
