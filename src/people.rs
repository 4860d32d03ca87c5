use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog;
use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult};
use crate::model::{Gender, SponsorType, StudentStatus, UserType};
use crate::money;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub gender: Option<Gender>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub user_id: String,
    pub student_id: String,
    pub full_name: String,
    pub gender: Option<Gender>,
    pub programme_id: String,
    pub current_year: i64,
    pub current_semester: i64,
    pub status: StudentStatus,
    pub sponsor_type: SponsorType,
    pub admission_date: NaiveDate,
    pub expected_graduation_date: Option<NaiveDate>,
    pub cumulative_gpa: Decimal,
    pub total_credit_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub user_id: String,
    pub student_id: String,
    pub programme_id: String,
    pub sponsor_type: SponsorType,
    pub admission_date: NaiveDate,
    #[serde(default = "first")]
    pub current_year: i64,
    #[serde(default = "first")]
    pub current_semester: i64,
}

fn first() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
    pub id: String,
    pub user_id: String,
    pub employee_number: String,
    pub department_id: String,
    pub academic_rank: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLecturer {
    pub user_id: String,
    pub employee_number: String,
    pub department_id: String,
    #[serde(default = "default_rank")]
    pub academic_rank: String,
}

fn default_rank() -> String {
    "lecturer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaff {
    pub user_id: String,
    pub employee_number: String,
    #[serde(default)]
    pub department_id: Option<String>,
    pub position: String,
}

const STUDENT_COLS: &str = "s.id, s.user_id, s.student_id, u.first_name || ' ' || u.last_name,
    u.gender, s.programme_id, s.current_year, s.current_semester, s.status, s.sponsor_type,
    s.admission_date, s.expected_graduation_date, s.cumulative_gpa, s.total_credit_hours";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        user_id: r.get(1)?,
        student_id: r.get(2)?,
        full_name: r.get(3)?,
        gender: r.get(4)?,
        programme_id: r.get(5)?,
        current_year: r.get(6)?,
        current_semester: r.get(7)?,
        status: r.get(8)?,
        sponsor_type: r.get(9)?,
        admission_date: r.get(10)?,
        expected_graduation_date: r.get(11)?,
        cumulative_gpa: money::col(r, 12)?,
        total_credit_hours: r.get(13)?,
    })
}

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        email: r.get(2)?,
        first_name: r.get(3)?,
        last_name: r.get(4)?,
        user_type: r.get(5)?,
        gender: r.get(6)?,
        national_id: r.get(7)?,
        phone: r.get(8)?,
        is_active: r.get(9)?,
    })
}

pub fn user(conn: &Connection, id: &str) -> ErpResult<User> {
    conn.query_row(
        "SELECT id, username, email, first_name, last_name, user_type, gender, national_id,
                phone, is_active
         FROM users WHERE id = ?",
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("user", id))
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn create_user(conn: &Connection, now: NaiveDateTime, input: NewUser) -> ErpResult<User> {
    let username = input.username.trim().to_string();
    if username.is_empty() {
        return Err(ErpError::validation("username", "must not be empty"));
    }
    if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
        return Err(ErpError::validation("firstName", "names must not be empty"));
    }
    let national_id = blank_to_none(input.national_id);
    let id = db::new_id();
    conn.execute(
        "INSERT INTO users(id, username, email, first_name, last_name, user_type, gender,
            national_id, phone, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        params![
            id,
            username,
            blank_to_none(input.email),
            input.first_name.trim(),
            input.last_name.trim(),
            input.user_type,
            input.gender,
            national_id,
            blank_to_none(input.phone),
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "user",
            key: match &national_id {
                Some(nid) => format!("{username} / national id {nid}"),
                None => username.clone(),
            },
        })
    })?;
    user(conn, &id)
}

fn require_user_type(u: &User, allowed: &[UserType]) -> ErpResult<()> {
    if allowed.contains(&u.user_type) {
        Ok(())
    } else {
        Err(ErpError::validation(
            "userId",
            format!("user {} is a {} account", u.username, u.user_type),
        ))
    }
}

pub fn student(conn: &Connection, id: &str) -> ErpResult<Student> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLS} FROM students s JOIN users u ON u.id = s.user_id WHERE s.id = ?"),
        [id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("student", id))
}

pub fn create_student(conn: &Connection, now: NaiveDateTime, input: NewStudent) -> ErpResult<Student> {
    let u = user(conn, &input.user_id)?;
    require_user_type(&u, &[UserType::Student])?;
    let student_no = input.student_id.trim().to_string();
    if student_no.is_empty() {
        return Err(ErpError::validation("studentId", "must not be empty"));
    }
    let prog = catalog::programme(conn, &input.programme_id)?;
    if input.current_year < 1 || input.current_year > prog.duration_years {
        return Err(ErpError::validation(
            "currentYear",
            format!("must be between 1 and {}", prog.duration_years),
        ));
    }
    if input.current_semester < 1 || input.current_semester > prog.semesters_per_year {
        return Err(ErpError::validation(
            "currentSemester",
            format!("must be between 1 and {}", prog.semesters_per_year),
        ));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO students(id, user_id, student_id, programme_id, current_year, current_semester,
            status, sponsor_type, admission_date, cumulative_gpa, total_credit_hours,
            created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, '0.00', 0, ?, ?)",
        params![
            id,
            u.id,
            student_no,
            prog.id,
            input.current_year,
            input.current_semester,
            StudentStatus::Active,
            input.sponsor_type,
            input.admission_date,
            now,
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "student",
            key: student_no.clone(),
        })
    })?;
    info!(student = %student_no, programme = %prog.code, "student admitted");
    student(conn, &id)
}

pub fn set_student_status(
    conn: &Connection,
    now: NaiveDateTime,
    id: &str,
    status: StudentStatus,
) -> ErpResult<Student> {
    let before = student(conn, id)?;
    conn.execute(
        "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
        params![status, now, id],
    )?;
    info!(student = %before.student_id, from = %before.status, to = %status, "student status changed");
    student(conn, id)
}

pub fn lecturer(conn: &Connection, id: &str) -> ErpResult<Lecturer> {
    conn.query_row(
        "SELECT id, user_id, employee_number, department_id, academic_rank, is_active
         FROM lecturers WHERE id = ?",
        [id],
        |r| {
            Ok(Lecturer {
                id: r.get(0)?,
                user_id: r.get(1)?,
                employee_number: r.get(2)?,
                department_id: r.get(3)?,
                academic_rank: r.get(4)?,
                is_active: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("lecturer", id))
}

pub fn create_lecturer(conn: &Connection, now: NaiveDateTime, input: NewLecturer) -> ErpResult<Lecturer> {
    let u = user(conn, &input.user_id)?;
    require_user_type(&u, &[UserType::Lecturer, UserType::Professor])?;
    let emp = input.employee_number.trim().to_string();
    if emp.is_empty() {
        return Err(ErpError::validation("employeeNumber", "must not be empty"));
    }
    let dept: Option<i64> = conn
        .query_row("SELECT 1 FROM departments WHERE id = ?", [&input.department_id], |r| r.get(0))
        .optional()?;
    if dept.is_none() {
        return Err(ErpError::not_found("department", &input.department_id));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO lecturers(id, user_id, employee_number, department_id, academic_rank,
            is_active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        params![id, u.id, emp, input.department_id, input.academic_rank, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "lecturer",
            key: emp.clone(),
        })
    })?;
    lecturer(conn, &id)
}

pub fn create_staff(conn: &Connection, now: NaiveDateTime, input: NewStaff) -> ErpResult<String> {
    let u = user(conn, &input.user_id)?;
    require_user_type(
        &u,
        &[
            UserType::Staff,
            UserType::Admin,
            UserType::Registrar,
            UserType::Dean,
            UserType::Hod,
            UserType::HostelWarden,
        ],
    )?;
    let emp = input.employee_number.trim().to_string();
    if emp.is_empty() {
        return Err(ErpError::validation("employeeNumber", "must not be empty"));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO staff(id, user_id, employee_number, department_id, position, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![id, u.id, emp, input.department_id, input.position.trim(), now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "staff",
            key: emp.clone(),
        })
    })?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Campus;

    #[test]
    fn student_profile_requires_student_account() {
        let campus = Campus::new();
        let u = create_user(
            &campus.conn,
            campus.now(),
            NewUser {
                username: "jkamau".into(),
                email: None,
                first_name: "Joseph".into(),
                last_name: "Kamau".into(),
                user_type: UserType::Lecturer,
                gender: Some(Gender::Male),
                national_id: None,
                phone: None,
            },
        )
        .expect("user");
        let e = create_student(
            &campus.conn,
            campus.now(),
            NewStudent {
                user_id: u.id,
                student_id: "CS/001/2024".into(),
                programme_id: campus.programme.clone(),
                sponsor_type: SponsorType::Government,
                admission_date: campus.now().date(),
                current_year: 1,
                current_semester: 1,
            },
        )
        .expect_err("lecturer account");
        assert_eq!(e.kind(), "ValidationError");
    }

    #[test]
    fn new_student_starts_active_in_first_slot() {
        let campus = Campus::new();
        let id = campus.add_student("CS/010/2024", Gender::Female, SponsorType::SelfSponsored);
        let s = student(&campus.conn, &id).expect("student");
        assert_eq!(s.status, StudentStatus::Active);
        assert_eq!((s.current_year, s.current_semester), (1, 1));
        assert_eq!(s.cumulative_gpa.to_string(), "0.00");
        assert_eq!(s.gender, Some(Gender::Female));
    }

    #[test]
    fn duplicate_student_number_conflicts() {
        let campus = Campus::new();
        campus.add_student("CS/011/2024", Gender::Male, SponsorType::Government);
        let u = campus.add_user("other", UserType::Student, Gender::Male);
        let e = create_student(
            &campus.conn,
            campus.now(),
            NewStudent {
                user_id: u,
                student_id: "CS/011/2024".into(),
                programme_id: campus.programme.clone(),
                sponsor_type: SponsorType::Government,
                admission_date: campus.now().date(),
                current_year: 1,
                current_semester: 1,
            },
        )
        .expect_err("duplicate");
        assert_eq!(e.code(), "conflict");
    }
}
