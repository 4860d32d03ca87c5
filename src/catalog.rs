use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub year: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub id: String,
    pub academic_year_id: String,
    pub semester_number: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_start_date: NaiveDate,
    pub registration_end_date: NaiveDate,
    pub is_current: bool,
}

impl Semester {
    /// Registration is open from the first instant of the start date through
    /// the last instant of the end date.
    pub fn registration_open_at(&self, now: NaiveDateTime) -> bool {
        let opens = self.registration_start_date.and_time(chrono::NaiveTime::MIN);
        match self.registration_end_date.succ_opt() {
            Some(closes) => now >= opens && now < closes.and_time(chrono::NaiveTime::MIN),
            None => now >= opens,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Programme {
    pub id: String,
    pub code: String,
    pub name: String,
    pub department_id: String,
    pub level: String,
    pub duration_years: i64,
    pub semesters_per_year: i64,
    pub total_semesters: i64,
    pub credit_hours_required: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub department_id: Option<String>,
    pub credit_hours: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumEntry {
    pub id: String,
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub credit_hours: i64,
    pub year: i64,
    pub semester: i64,
    pub is_mandatory: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAcademicYear {
    pub year: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSemester {
    pub academic_year_id: String,
    pub semester_number: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub registration_start_date: NaiveDate,
    pub registration_end_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProgramme {
    pub code: String,
    pub name: String,
    pub department_id: String,
    #[serde(default = "default_level")]
    pub level: String,
    pub duration_years: i64,
    pub semesters_per_year: i64,
    #[serde(default)]
    pub credit_hours_required: Option<i64>,
}

fn default_level() -> String {
    "bachelor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub department_id: Option<String>,
    pub credit_hours: i64,
}

const AY_COLS: &str = "id, year, start_date, end_date, is_current";
const SEMESTER_COLS: &str = "id, academic_year_id, semester_number, start_date, end_date,
    registration_start_date, registration_end_date, is_current";
const PROGRAMME_COLS: &str = "id, code, name, department_id, level, duration_years,
    semesters_per_year, total_semesters, credit_hours_required, is_active";
const COURSE_COLS: &str = "id, code, name, department_id, credit_hours, is_active";

fn academic_year_from_row(r: &Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: r.get(0)?,
        year: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        is_current: r.get(4)?,
    })
}

fn semester_from_row(r: &Row<'_>) -> rusqlite::Result<Semester> {
    Ok(Semester {
        id: r.get(0)?,
        academic_year_id: r.get(1)?,
        semester_number: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        registration_start_date: r.get(5)?,
        registration_end_date: r.get(6)?,
        is_current: r.get(7)?,
    })
}

fn programme_from_row(r: &Row<'_>) -> rusqlite::Result<Programme> {
    Ok(Programme {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        department_id: r.get(3)?,
        level: r.get(4)?,
        duration_years: r.get(5)?,
        semesters_per_year: r.get(6)?,
        total_semesters: r.get(7)?,
        credit_hours_required: r.get(8)?,
        is_active: r.get(9)?,
    })
}

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        department_id: r.get(3)?,
        credit_hours: r.get(4)?,
        is_active: r.get(5)?,
    })
}

fn required(field: &str, value: &str) -> ErpResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ErpError::validation(field, "must not be empty"));
    }
    Ok(v.to_string())
}

pub fn academic_year(conn: &Connection, id: &str) -> ErpResult<AcademicYear> {
    conn.query_row(
        &format!("SELECT {AY_COLS} FROM academic_years WHERE id = ?"),
        [id],
        academic_year_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("academic year", id))
}

/// The academic year that starts soonest after `ay` ends.
pub fn next_academic_year(conn: &Connection, ay: &AcademicYear) -> ErpResult<Option<AcademicYear>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {AY_COLS} FROM academic_years
                 WHERE start_date > ?
                 ORDER BY start_date
                 LIMIT 1"
            ),
            [ay.end_date],
            academic_year_from_row,
        )
        .optional()?)
}

pub fn semester(conn: &Connection, id: &str) -> ErpResult<Semester> {
    conn.query_row(
        &format!("SELECT {SEMESTER_COLS} FROM semesters WHERE id = ?"),
        [id],
        semester_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("semester", id))
}

pub fn semester_by_number(
    conn: &Connection,
    academic_year_id: &str,
    number: i64,
) -> ErpResult<Option<Semester>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SEMESTER_COLS} FROM semesters
                 WHERE academic_year_id = ? AND semester_number = ?"
            ),
            params![academic_year_id, number],
            semester_from_row,
        )
        .optional()?)
}

pub fn programme(conn: &Connection, id: &str) -> ErpResult<Programme> {
    conn.query_row(
        &format!("SELECT {PROGRAMME_COLS} FROM programmes WHERE id = ?"),
        [id],
        programme_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("programme", id))
}

pub fn course(conn: &Connection, id: &str) -> ErpResult<Course> {
    conn.query_row(
        &format!("SELECT {COURSE_COLS} FROM courses WHERE id = ?"),
        [id],
        course_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("course", id))
}

pub fn create_academic_year(
    conn: &Connection,
    now: NaiveDateTime,
    input: NewAcademicYear,
) -> ErpResult<AcademicYear> {
    let year = required("year", &input.year)?;
    if input.start_date >= input.end_date {
        return Err(ErpError::validation("endDate", "must be after startDate"));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO academic_years(id, year, start_date, end_date, is_current, created_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        params![id, year, input.start_date, input.end_date, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "academic year",
            key: year.clone(),
        })
    })?;
    academic_year(conn, &id)
}

/// Clears every other current flag and sets this one, in one transaction.
pub fn set_current_academic_year(conn: &mut Connection, id: &str) -> ErpResult<AcademicYear> {
    let tx = db::immediate(conn)?;
    academic_year(&tx, id)?;
    tx.execute("UPDATE academic_years SET is_current = 0 WHERE is_current = 1", [])?;
    tx.execute("UPDATE academic_years SET is_current = 1 WHERE id = ?", [id])?;
    let ay = academic_year(&tx, id)?;
    tx.commit()?;
    info!(academic_year = %ay.year, "current academic year set");
    Ok(ay)
}

pub fn create_semester(
    conn: &Connection,
    now: NaiveDateTime,
    input: NewSemester,
) -> ErpResult<Semester> {
    let ay = academic_year(conn, &input.academic_year_id)?;
    if !(1..=3).contains(&input.semester_number) {
        return Err(ErpError::validation("semesterNumber", "must be 1, 2 or 3"));
    }
    if input.start_date > input.end_date {
        return Err(ErpError::validation("endDate", "must not precede startDate"));
    }
    if input.registration_start_date > input.registration_end_date {
        return Err(ErpError::validation(
            "registrationEndDate",
            "must not precede registrationStartDate",
        ));
    }
    if input.registration_end_date > input.end_date {
        return Err(ErpError::validation(
            "registrationEndDate",
            "must fall within the semester",
        ));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO semesters(id, academic_year_id, semester_number, start_date, end_date,
            registration_start_date, registration_end_date, is_current, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 0, ?)",
        params![
            id,
            ay.id,
            input.semester_number,
            input.start_date,
            input.end_date,
            input.registration_start_date,
            input.registration_end_date,
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "semester",
            key: format!("{} semester {}", ay.year, input.semester_number),
        })
    })?;
    semester(conn, &id)
}

pub fn set_current_semester(conn: &mut Connection, id: &str) -> ErpResult<Semester> {
    let tx = db::immediate(conn)?;
    semester(&tx, id)?;
    tx.execute("UPDATE semesters SET is_current = 0 WHERE is_current = 1", [])?;
    tx.execute("UPDATE semesters SET is_current = 1 WHERE id = ?", [id])?;
    let sem = semester(&tx, id)?;
    tx.commit()?;
    info!(semester_id = %sem.id, number = sem.semester_number, "current semester set");
    Ok(sem)
}

pub fn current(conn: &Connection) -> ErpResult<(Option<AcademicYear>, Option<Semester>)> {
    let ay = conn
        .query_row(
            &format!("SELECT {AY_COLS} FROM academic_years WHERE is_current = 1"),
            [],
            academic_year_from_row,
        )
        .optional()?;
    let sem = conn
        .query_row(
            &format!("SELECT {SEMESTER_COLS} FROM semesters WHERE is_current = 1"),
            [],
            semester_from_row,
        )
        .optional()?;
    Ok((ay, sem))
}

pub fn create_faculty(
    conn: &Connection,
    now: NaiveDateTime,
    code: &str,
    name: &str,
) -> ErpResult<String> {
    let code = required("code", code)?;
    let name = required("name", name)?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO faculties(id, code, name, created_at) VALUES(?, ?, ?, ?)",
        params![id, code, name, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "faculty",
            key: code.clone(),
        })
    })?;
    Ok(id)
}

pub fn create_department(
    conn: &Connection,
    now: NaiveDateTime,
    faculty_id: &str,
    code: &str,
    name: &str,
) -> ErpResult<String> {
    let code = required("code", code)?;
    let name = required("name", name)?;
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM faculties WHERE id = ?", [faculty_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ErpError::not_found("faculty", faculty_id));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO departments(id, faculty_id, code, name, created_at) VALUES(?, ?, ?, ?, ?)",
        params![id, faculty_id, code, name, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "department",
            key: code.clone(),
        })
    })?;
    Ok(id)
}

fn department_exists(conn: &Connection, id: &str) -> ErpResult<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM departments WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

pub fn create_programme(
    conn: &Connection,
    now: NaiveDateTime,
    input: NewProgramme,
) -> ErpResult<Programme> {
    let code = required("code", &input.code)?;
    let name = required("name", &input.name)?;
    if !(1..=8).contains(&input.duration_years) {
        return Err(ErpError::validation("durationYears", "must be between 1 and 8"));
    }
    if !(2..=3).contains(&input.semesters_per_year) {
        return Err(ErpError::validation("semestersPerYear", "must be 2 or 3"));
    }
    if !department_exists(conn, &input.department_id)? {
        return Err(ErpError::not_found("department", &input.department_id));
    }
    let credit_hours_required = input.credit_hours_required.unwrap_or(0);
    if credit_hours_required < 0 {
        return Err(ErpError::validation("creditHoursRequired", "must not be negative"));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO programmes(id, code, name, department_id, level, duration_years,
            semesters_per_year, total_semesters, credit_hours_required, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        params![
            id,
            code,
            name,
            input.department_id,
            input.level,
            input.duration_years,
            input.semesters_per_year,
            input.duration_years * input.semesters_per_year,
            credit_hours_required,
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "programme",
            key: code.clone(),
        })
    })?;
    programme(conn, &id)
}

pub fn create_course(conn: &Connection, now: NaiveDateTime, input: NewCourse) -> ErpResult<Course> {
    let code = required("code", &input.code)?;
    let name = required("name", &input.name)?;
    if !(1..=15).contains(&input.credit_hours) {
        return Err(ErpError::validation("creditHours", "must be between 1 and 15"));
    }
    if let Some(dept) = input.department_id.as_deref() {
        if !department_exists(conn, dept)? {
            return Err(ErpError::not_found("department", dept));
        }
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO courses(id, code, name, department_id, credit_hours, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        params![id, code, name, input.department_id, input.credit_hours, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "course",
            key: code.clone(),
        })
    })?;
    course(conn, &id)
}

/// True when `from` already depends on `target`, directly or transitively.
fn depends_on(conn: &Connection, from: &str, target: &str) -> ErpResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "WITH RECURSIVE reach(id) AS (
                SELECT prerequisite_id FROM course_prerequisites WHERE course_id = ?1
                UNION
                SELECT cp.prerequisite_id
                FROM course_prerequisites cp
                JOIN reach r ON cp.course_id = r.id
             )
             SELECT 1 FROM reach WHERE id = ?2 LIMIT 1",
            params![from, target],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn add_prerequisite(conn: &mut Connection, course_id: &str, prerequisite_id: &str) -> ErpResult<()> {
    let tx = db::immediate(conn)?;
    let c = course(&tx, course_id)?;
    let p = course(&tx, prerequisite_id)?;
    if c.id == p.id {
        return Err(ErpError::validation("prerequisiteId", "a course cannot require itself"));
    }
    if depends_on(&tx, &p.id, &c.id)? {
        return Err(ErpError::validation(
            "prerequisiteId",
            format!("{} already depends on {}; adding it would form a cycle", p.code, c.code),
        ));
    }
    tx.execute(
        "INSERT INTO course_prerequisites(course_id, prerequisite_id) VALUES(?, ?)
         ON CONFLICT(course_id, prerequisite_id) DO NOTHING",
        params![c.id, p.id],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn remove_prerequisite(conn: &Connection, course_id: &str, prerequisite_id: &str) -> ErpResult<bool> {
    let n = conn.execute(
        "DELETE FROM course_prerequisites WHERE course_id = ? AND prerequisite_id = ?",
        params![course_id, prerequisite_id],
    )?;
    Ok(n > 0)
}

/// Direct prerequisites of a course as (id, code).
pub fn prerequisites(conn: &Connection, course_id: &str) -> ErpResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.code
         FROM course_prerequisites cp
         JOIN courses c ON c.id = cp.prerequisite_id
         WHERE cp.course_id = ?
         ORDER BY c.code",
    )?;
    let rows = stmt
        .query_map([course_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn add_programme_course(
    conn: &Connection,
    programme_id: &str,
    course_id: &str,
    year: i64,
    semester: i64,
    is_mandatory: bool,
) -> ErpResult<String> {
    let prog = programme(conn, programme_id)?;
    let c = course(conn, course_id)?;
    if year < 1 || year > prog.duration_years {
        return Err(ErpError::validation(
            "year",
            format!("must be between 1 and {}", prog.duration_years),
        ));
    }
    if semester < 1 || semester > prog.semesters_per_year {
        return Err(ErpError::validation(
            "semester",
            format!("must be between 1 and {}", prog.semesters_per_year),
        ));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO programme_courses(id, programme_id, course_id, year, semester, is_mandatory)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![id, prog.id, c.id, year, semester, is_mandatory],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "programme course",
            key: format!("{} Y{}S{}", c.code, year, semester),
        })
    })?;
    Ok(id)
}

pub fn curriculum(
    conn: &Connection,
    programme_id: &str,
    slot: Option<(i64, i64)>,
) -> ErpResult<Vec<CurriculumEntry>> {
    programme(conn, programme_id)?;
    let (year, semester) = match slot {
        Some((y, s)) => (Some(y), Some(s)),
        None => (None, None),
    };
    let mut stmt = conn.prepare(
        "SELECT pc.id, c.id, c.code, c.name, c.credit_hours, pc.year, pc.semester, pc.is_mandatory
         FROM programme_courses pc
         JOIN courses c ON c.id = pc.course_id
         WHERE pc.programme_id = ?1
           AND (?2 IS NULL OR pc.year = ?2)
           AND (?3 IS NULL OR pc.semester = ?3)
         ORDER BY pc.year, pc.semester, c.code",
    )?;
    let rows = stmt
        .query_map(params![programme_id, year, semester], |r| {
            Ok(CurriculumEntry {
                id: r.get(0)?,
                course_id: r.get(1)?,
                course_code: r.get(2)?,
                course_name: r.get(3)?,
                credit_hours: r.get(4)?,
                year: r.get(5)?,
                semester: r.get(6)?,
                is_mandatory: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn in_curriculum(conn: &Connection, programme_id: &str, course_id: &str) -> ErpResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM programme_courses WHERE programme_id = ? AND course_id = ? LIMIT 1",
            params![programme_id, course_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}
