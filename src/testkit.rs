//! Seeded in-memory campus shared by the unit tests.
//!
//! Calendar: three academic years (2024/2025 current, 2025/2026, 2026/2027),
//! two semesters each. One department runs BSCS, a 3-year programme with two
//! semesters per year. Y1S1 carries CS101..CS104, every later slot two courses.
//! The clock is pinned to 2025-01-10 10:00, inside the 2024/2025 S1
//! registration window.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::catalog::{self, NewAcademicYear, NewCourse, NewProgramme, NewSemester};
use crate::clock::Clock;
use crate::db;
use crate::model::{Gender, SponsorType, UserType};
use crate::people::{self, NewLecturer, NewStudent, NewUser};

pub struct Campus {
    pub conn: Connection,
    pub clock: Clock,
    pub department: String,
    pub programme: String,
    pub ay1: String,
    pub ay2: String,
    pub ay3: String,
    pub ay1_s1: String,
    pub ay1_s2: String,
    pub ay2_s1: String,
    pub ay2_s2: String,
    pub ay3_s1: String,
    pub ay3_s2: String,
    /// Y1S1 curriculum, CS101..CS104.
    pub course_ids: Vec<String>,
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).expect("valid time")
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

impl Campus {
    pub fn new() -> Self {
        Self::seed(db::open_in_memory().expect("in-memory db"))
    }

    /// Same campus in a workspace directory, for tests that need a second
    /// connection.
    pub fn on_disk(dir: &Path) -> Self {
        Self::seed(db::open_db(dir).expect("workspace db"))
    }

    fn seed(conn: Connection) -> Self {
        let clock = Clock::Fixed(at(2025, 1, 10, 10, 0));
        let now = clock.now();

        let mut years = Vec::new();
        let mut sems = Vec::new();
        for start in [2024, 2025, 2026] {
            let ay = catalog::create_academic_year(
                &conn,
                now,
                NewAcademicYear {
                    year: format!("{}/{}", start, start + 1),
                    start_date: date(start, 9, 1),
                    end_date: date(start + 1, 8, 31),
                },
            )
            .expect("academic year");
            let s1 = catalog::create_semester(
                &conn,
                now,
                NewSemester {
                    academic_year_id: ay.id.clone(),
                    semester_number: 1,
                    start_date: date(start, 9, 2),
                    end_date: date(start + 1, 1, 31),
                    registration_start_date: date(start, 9, 2),
                    registration_end_date: date(start + 1, 1, 20),
                },
            )
            .expect("semester 1");
            let s2 = catalog::create_semester(
                &conn,
                now,
                NewSemester {
                    academic_year_id: ay.id.clone(),
                    semester_number: 2,
                    start_date: date(start + 1, 2, 1),
                    end_date: date(start + 1, 6, 30),
                    registration_start_date: date(start + 1, 2, 1),
                    registration_end_date: date(start + 1, 2, 20),
                },
            )
            .expect("semester 2");
            years.push(ay.id);
            sems.push((s1.id, s2.id));
        }

        let faculty = catalog::create_faculty(&conn, now, "FCI", "Computing and Informatics")
            .expect("faculty");
        let department = catalog::create_department(&conn, now, &faculty, "CS", "Computer Science")
            .expect("department");
        let programme = catalog::create_programme(
            &conn,
            now,
            NewProgramme {
                code: "BSCS".into(),
                name: "BSc Computer Science".into(),
                department_id: department.clone(),
                level: "bachelor".into(),
                duration_years: 3,
                semesters_per_year: 2,
                credit_hours_required: Some(120),
            },
        )
        .expect("programme")
        .id;

        let mut campus = Campus {
            conn,
            clock,
            department,
            programme,
            ay1: years[0].clone(),
            ay2: years[1].clone(),
            ay3: years[2].clone(),
            ay1_s1: sems[0].0.clone(),
            ay1_s2: sems[0].1.clone(),
            ay2_s1: sems[1].0.clone(),
            ay2_s2: sems[1].1.clone(),
            ay3_s1: sems[2].0.clone(),
            ay3_s2: sems[2].1.clone(),
            course_ids: Vec::new(),
        };

        let slots: [(&[&str], i64, i64); 6] = [
            (&["CS101", "CS102", "CS103", "CS104"], 1, 1),
            (&["CS151", "CS152"], 1, 2),
            (&["CS201", "CS202"], 2, 1),
            (&["CS251", "CS252"], 2, 2),
            (&["CS301", "CS302"], 3, 1),
            (&["CS351", "CS352"], 3, 2),
        ];
        for (codes, year, sem) in slots {
            for code in codes {
                let id = campus.add_course(code, 3);
                catalog::add_programme_course(&campus.conn, &campus.programme, &id, year, sem, true)
                    .expect("curriculum slot");
                if (year, sem) == (1, 1) {
                    campus.course_ids.push(id);
                }
            }
        }

        let ay1 = campus.ay1.clone();
        let s1 = campus.ay1_s1.clone();
        catalog::set_current_academic_year(&mut campus.conn, &ay1).expect("current year");
        catalog::set_current_semester(&mut campus.conn, &s1).expect("current semester");
        campus
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn pin(&mut self, t: NaiveDateTime) {
        self.clock = Clock::Fixed(t);
    }

    pub fn add_course(&self, code: &str, credits: i64) -> String {
        catalog::create_course(
            &self.conn,
            self.now(),
            NewCourse {
                code: code.into(),
                name: format!("{code} course"),
                department_id: Some(self.department.clone()),
                credit_hours: credits,
            },
        )
        .expect("course")
        .id
    }

    pub fn course_id(&self, code: &str) -> String {
        self.conn
            .query_row("SELECT id FROM courses WHERE code = ?", [code], |r| r.get(0))
            .expect("course by code")
    }

    pub fn add_user(&self, username: &str, user_type: UserType, gender: Gender) -> String {
        people::create_user(
            &self.conn,
            self.now(),
            NewUser {
                username: username.into(),
                email: None,
                first_name: username.into(),
                last_name: "Test".into(),
                user_type,
                gender: Some(gender),
                national_id: None,
                phone: None,
            },
        )
        .expect("user")
        .id
    }

    pub fn add_student(&self, student_no: &str, gender: Gender, sponsor: SponsorType) -> String {
        let username = student_no.replace('/', "").to_lowercase();
        let user_id = self.add_user(&username, UserType::Student, gender);
        people::create_student(
            &self.conn,
            self.now(),
            NewStudent {
                user_id,
                student_id: student_no.into(),
                programme_id: self.programme.clone(),
                sponsor_type: sponsor,
                admission_date: date(2024, 9, 2),
                current_year: 1,
                current_semester: 1,
            },
        )
        .expect("student")
        .id
    }

    pub fn add_lecturer(&self, employee_number: &str) -> String {
        let username = employee_number.to_lowercase();
        let user_id = self.add_user(&username, UserType::Lecturer, Gender::Female);
        people::create_lecturer(
            &self.conn,
            self.now(),
            NewLecturer {
                user_id,
                employee_number: employee_number.into(),
                department_id: self.department.clone(),
                academic_rank: "senior_lecturer".into(),
            },
        )
        .expect("lecturer")
        .id
    }

    /// Fresh directory under the system temp dir.
    pub fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", db::new_id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    /// Moves a student to another (year, semester) slot without going through
    /// progression.
    pub fn place(&self, student_id: &str, year: i64, semester: i64) {
        self.conn
            .execute(
                "UPDATE students SET current_year = ?, current_semester = ? WHERE id = ?",
                params![year, semester, student_id],
            )
            .expect("place student");
    }

    /// Inserts an active enrollment directly, bypassing registration checks.
    pub fn enroll_raw(&self, student_id: &str, course_id: &str, semester_id: &str) -> String {
        let id = db::new_id();
        self.conn
            .execute(
                "INSERT INTO enrollments(id, student_id, course_id, semester_id, enrollment_date,
                    is_active, is_repeat, is_audit, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, 1, 0, 0, ?, ?)",
                params![id, student_id, course_id, semester_id, self.now().date(), self.now(), self.now()],
            )
            .expect("raw enrollment");
        id
    }
}
