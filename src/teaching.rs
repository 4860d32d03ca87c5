use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog;
use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult};
use crate::people;

/// Binds a lecturer to a course for one semester. Authoring assignments,
/// grading submissions and running attendance all hang off an active one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingAssignment {
    pub id: String,
    pub lecturer_id: String,
    pub course_id: String,
    pub course_code: String,
    pub academic_year_id: String,
    pub semester_id: String,
    pub assigned_by: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeachingAssignment {
    pub lecturer_id: String,
    pub course_id: String,
    pub semester_id: String,
    #[serde(default)]
    pub assigned_by: Option<String>,
}

const LCA_COLS: &str = "l.id, l.lecturer_id, l.course_id, c.code, l.academic_year_id,
    l.semester_id, l.assigned_by, l.is_active";

fn from_row(r: &Row<'_>) -> rusqlite::Result<TeachingAssignment> {
    Ok(TeachingAssignment {
        id: r.get(0)?,
        lecturer_id: r.get(1)?,
        course_id: r.get(2)?,
        course_code: r.get(3)?,
        academic_year_id: r.get(4)?,
        semester_id: r.get(5)?,
        assigned_by: r.get(6)?,
        is_active: r.get(7)?,
    })
}

pub fn teaching_assignment(conn: &Connection, id: &str) -> ErpResult<TeachingAssignment> {
    conn.query_row(
        &format!(
            "SELECT {LCA_COLS} FROM lecturer_course_assignments l
             JOIN courses c ON c.id = l.course_id
             WHERE l.id = ?"
        ),
        [id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("lecturer course assignment", id))
}

/// Creates the allocation, or reactivates a deactivated one for the same slot.
pub fn assign(conn: &Connection, now: NaiveDateTime, input: NewTeachingAssignment) -> ErpResult<TeachingAssignment> {
    let lecturer = people::lecturer(conn, &input.lecturer_id)?;
    let course = catalog::course(conn, &input.course_id)?;
    let sem = catalog::semester(conn, &input.semester_id)?;

    let existing: Option<(String, bool)> = conn
        .query_row(
            "SELECT id, is_active FROM lecturer_course_assignments
             WHERE lecturer_id = ? AND course_id = ? AND academic_year_id = ? AND semester_id = ?",
            params![lecturer.id, course.id, sem.academic_year_id, sem.id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let id = match existing {
        Some((_, true)) => {
            return Err(Conflict::Duplicate {
                entity: "lecturer course assignment",
                key: format!("{} {}", lecturer.employee_number, course.code),
            }
            .into())
        }
        Some((id, false)) => {
            conn.execute(
                "UPDATE lecturer_course_assignments SET is_active = 1, assigned_by = ? WHERE id = ?",
                params![input.assigned_by, id],
            )?;
            id
        }
        None => {
            let id = db::new_id();
            conn.execute(
                "INSERT INTO lecturer_course_assignments(id, lecturer_id, course_id,
                    academic_year_id, semester_id, assigned_by, is_active, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, 1, ?)",
                params![id, lecturer.id, course.id, sem.academic_year_id, sem.id, input.assigned_by, now],
            )
            .map_err(|e| {
                map_unique(e, || Conflict::Duplicate {
                    entity: "lecturer course assignment",
                    key: format!("{} {}", lecturer.employee_number, course.code),
                })
            })?;
            id
        }
    };
    info!(lecturer = %lecturer.employee_number, course = %course.code, "course allocated");
    teaching_assignment(conn, &id)
}

pub fn deactivate(conn: &Connection, id: &str) -> ErpResult<TeachingAssignment> {
    teaching_assignment(conn, id)?;
    conn.execute(
        "UPDATE lecturer_course_assignments SET is_active = 0 WHERE id = ?",
        [id],
    )?;
    teaching_assignment(conn, id)
}

pub fn list(
    conn: &Connection,
    lecturer_id: Option<&str>,
    semester_id: Option<&str>,
    include_inactive: bool,
) -> ErpResult<Vec<TeachingAssignment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LCA_COLS} FROM lecturer_course_assignments l
         JOIN courses c ON c.id = l.course_id
         WHERE (?1 IS NULL OR l.lecturer_id = ?1)
           AND (?2 IS NULL OR l.semester_id = ?2)
           AND (?3 = 1 OR l.is_active = 1)
         ORDER BY c.code, l.created_at"
    ))?;
    let rows = stmt
        .query_map(params![lecturer_id, semester_id, include_inactive], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The lecturer's active allocation for a course in a semester, or
/// `PermissionDenied`.
pub fn require_teaching(
    conn: &Connection,
    lecturer_id: &str,
    course_id: &str,
    semester_id: &str,
) -> ErpResult<TeachingAssignment> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM lecturer_course_assignments
             WHERE lecturer_id = ? AND course_id = ? AND semester_id = ? AND is_active = 1",
            params![lecturer_id, course_id, semester_id],
            |r| r.get(0),
        )
        .optional()?;
    match id {
        Some(id) => teaching_assignment(conn, &id),
        None => Err(ErpError::PermissionDenied(
            "lecturer is not assigned to this course for the semester".to_string(),
        )),
    }
}
