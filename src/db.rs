use anyhow::Context;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "unierp.sqlite3";

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Starts a transaction that takes the write lock before its first read.
pub fn immediate(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    create_catalog_tables(conn).context("catalog schema")?;
    create_people_tables(conn).context("people schema")?;
    create_academic_tables(conn).context("academic schema")?;
    create_fee_tables(conn).context("fee schema")?;
    create_hostel_tables(conn).context("hostel schema")?;
    create_attendance_tables(conn).context("attendance schema")?;
    create_teaching_tables(conn).context("teaching schema")?;
    create_library_tables(conn).context("library schema")?;

    // Older workspaces predate deep links on notifications.
    ensure_notifications_related_url(conn)?;
    Ok(())
}

fn create_catalog_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            year TEXT NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK(start_date < end_date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_current
            ON academic_years(is_current) WHERE is_current = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            academic_year_id TEXT NOT NULL,
            semester_number INTEGER NOT NULL CHECK(semester_number BETWEEN 1 AND 3),
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            registration_start_date TEXT NOT NULL,
            registration_end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(academic_year_id, semester_number),
            CHECK(start_date <= end_date),
            CHECK(registration_start_date <= registration_end_date),
            CHECK(registration_end_date <= end_date),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_semesters_current
            ON semesters(is_current) WHERE is_current = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculties(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            faculty_id TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(faculty_id) REFERENCES faculties(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS programmes(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            level TEXT NOT NULL,
            duration_years INTEGER NOT NULL CHECK(duration_years BETWEEN 1 AND 8),
            semesters_per_year INTEGER NOT NULL CHECK(semesters_per_year BETWEEN 2 AND 3),
            total_semesters INTEGER NOT NULL,
            credit_hours_required INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department_id TEXT,
            credit_hours INTEGER NOT NULL CHECK(credit_hours BETWEEN 1 AND 15),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_prerequisites(
            course_id TEXT NOT NULL,
            prerequisite_id TEXT NOT NULL,
            PRIMARY KEY(course_id, prerequisite_id),
            CHECK(course_id <> prerequisite_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(prerequisite_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS programme_courses(
            id TEXT PRIMARY KEY,
            programme_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            is_mandatory INTEGER NOT NULL DEFAULT 1,
            UNIQUE(programme_id, course_id, year, semester),
            FOREIGN KEY(programme_id) REFERENCES programmes(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_programme_courses_slot
            ON programme_courses(programme_id, year, semester)",
        [],
    )?;
    Ok(())
}

fn create_people_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            user_type TEXT NOT NULL,
            gender TEXT,
            national_id TEXT,
            phone TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_national_id
            ON users(national_id) WHERE national_id IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            student_id TEXT NOT NULL UNIQUE,
            programme_id TEXT NOT NULL,
            current_year INTEGER NOT NULL DEFAULT 1,
            current_semester INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL,
            sponsor_type TEXT NOT NULL,
            admission_date TEXT NOT NULL,
            expected_graduation_date TEXT,
            progressed_through TEXT,
            cumulative_gpa TEXT NOT NULL DEFAULT '0.00',
            total_credit_hours INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(programme_id) REFERENCES programmes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecturers(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            employee_number TEXT NOT NULL UNIQUE,
            department_id TEXT NOT NULL,
            academic_rank TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            employee_number TEXT NOT NULL UNIQUE,
            department_id TEXT,
            position TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    Ok(())
}

fn create_academic_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            lecturer_id TEXT,
            enrollment_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_repeat INTEGER NOT NULL DEFAULT 0,
            is_audit INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, course_id, semester_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_semester ON enrollments(semester_id, course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL UNIQUE,
            continuous_assessment TEXT NOT NULL,
            final_exam TEXT NOT NULL,
            practical_marks TEXT,
            project_marks TEXT,
            total_marks TEXT NOT NULL,
            grade TEXT NOT NULL,
            grade_points TEXT NOT NULL,
            quality_points TEXT NOT NULL,
            is_passed INTEGER NOT NULL,
            remarks TEXT,
            graded_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_notifications(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_student
            ON student_notifications(student_id, is_read)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS progression_failures(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            grade_id TEXT,
            error TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1,
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    Ok(())
}

fn create_fee_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id TEXT PRIMARY KEY,
            programme_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            tuition_fee TEXT NOT NULL,
            registration_fee TEXT NOT NULL,
            examination_fee TEXT NOT NULL,
            other_fees TEXT NOT NULL,
            government_subsidy TEXT NOT NULL,
            scholarship_amount TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(programme_id, academic_year_id, year, semester),
            FOREIGN KEY(programme_id) REFERENCES programmes(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_payments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_structure_id TEXT NOT NULL,
            amount_paid TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            receipt_number TEXT NOT NULL UNIQUE,
            transaction_reference TEXT,
            allocation TEXT NOT NULL,
            source_receipt TEXT,
            recorded_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(fee_structure_id) REFERENCES fee_structures(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_payments_ledger
            ON fee_payments(student_id, fee_structure_id, payment_status)",
        [],
    )?;
    Ok(())
}

fn create_hostel_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostels(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            hostel_type TEXT NOT NULL,
            warden_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY(warden_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            hostel_id TEXT NOT NULL,
            room_number TEXT NOT NULL,
            floor INTEGER NOT NULL,
            capacity INTEGER NOT NULL CHECK(capacity BETWEEN 1 AND 8),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            UNIQUE(hostel_id, room_number),
            FOREIGN KEY(hostel_id) REFERENCES hostels(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS beds(
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            bed_position INTEGER NOT NULL,
            bed_number TEXT NOT NULL,
            is_available INTEGER NOT NULL DEFAULT 1,
            maintenance_status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(room_id, academic_year_id, bed_position),
            FOREIGN KEY(room_id) REFERENCES rooms(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostel_bookings(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            bed_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            booking_status TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            booking_fee TEXT NOT NULL,
            amount_paid TEXT NOT NULL DEFAULT '0.00',
            booking_date TEXT NOT NULL,
            approved_by TEXT,
            approval_date TEXT,
            check_in_date TEXT,
            check_out_date TEXT,
            remarks TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(bed_id) REFERENCES beds(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_hostel_bookings_live
            ON hostel_bookings(student_id, academic_year_id)
            WHERE booking_status NOT IN ('rejected', 'cancelled')",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_hostel_bookings_bed_held
            ON hostel_bookings(bed_id)
            WHERE booking_status IN ('approved', 'checked_in')",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostel_payments(
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            receipt_number TEXT NOT NULL UNIQUE,
            transaction_reference TEXT,
            received_by TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(booking_id) REFERENCES hostel_bookings(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipt_sequences(
            name TEXT NOT NULL,
            period TEXT NOT NULL,
            last_value INTEGER NOT NULL,
            PRIMARY KEY(name, period)
        )",
        [],
    )?;
    Ok(())
}

fn create_attendance_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetables(
            id TEXT PRIMARY KEY,
            programme_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            day_of_week TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            venue TEXT NOT NULL,
            lecturer_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            UNIQUE(programme_id, course_id, academic_year_id, semester_id, year),
            CHECK(start_time < end_time),
            FOREIGN KEY(programme_id) REFERENCES programmes(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_sessions(
            id TEXT PRIMARY KEY,
            timetable_id TEXT NOT NULL,
            lecturer_id TEXT NOT NULL,
            session_token TEXT NOT NULL UNIQUE,
            session_date TEXT NOT NULL,
            week_number INTEGER NOT NULL CHECK(week_number BETWEEN 1 AND 12),
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(timetable_id) REFERENCES timetables(id),
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_sessions_open
            ON attendance_sessions(timetable_id, week_number, session_date)
            WHERE is_active = 1",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            status TEXT NOT NULL,
            marked_via_qr INTEGER NOT NULL DEFAULT 0,
            ip_address TEXT,
            marked_at TEXT NOT NULL,
            marked_by TEXT,
            remarks TEXT,
            UNIQUE(student_id, session_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(session_id) REFERENCES attendance_sessions(id)
        )",
        [],
    )?;
    Ok(())
}

fn create_teaching_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecturer_course_assignments(
            id TEXT PRIMARY KEY,
            lecturer_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            assigned_by TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            UNIQUE(lecturer_id, course_id, academic_year_id, semester_id),
            FOREIGN KEY(lecturer_id) REFERENCES lecturers(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            lecturer_course_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            due_date TEXT NOT NULL,
            total_marks TEXT NOT NULL,
            weight_percentage TEXT NOT NULL,
            submission_format TEXT NOT NULL,
            max_file_size_mb INTEGER NOT NULL CHECK(max_file_size_mb BETWEEN 1 AND 100),
            late_submission_allowed INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(lecturer_course_id) REFERENCES lecturer_course_assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            file_ref TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_size_bytes INTEGER NOT NULL,
            is_submitted INTEGER NOT NULL DEFAULT 0,
            submitted_date TEXT,
            is_late INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            marks_obtained TEXT,
            feedback TEXT,
            grading_status TEXT NOT NULL,
            graded_by TEXT,
            graded_at TEXT,
            UNIQUE(assignment_id, student_id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    Ok(())
}

fn create_library_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS library_resources(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT,
            isbn TEXT,
            resource_type TEXT NOT NULL,
            total_copies INTEGER NOT NULL CHECK(total_copies >= 0),
            available_copies INTEGER NOT NULL CHECK(available_copies >= 0),
            created_at TEXT NOT NULL,
            CHECK(available_copies <= total_copies)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_library_resources_isbn
            ON library_resources(isbn) WHERE isbn IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS library_loans(
            id TEXT PRIMARY KEY,
            resource_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            borrowed_on TEXT NOT NULL,
            due_date TEXT NOT NULL,
            returned_on TEXT,
            renewals INTEGER NOT NULL DEFAULT 0,
            fine_amount TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL,
            FOREIGN KEY(resource_id) REFERENCES library_resources(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    Ok(())
}

fn ensure_notifications_related_url(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "student_notifications", "related_url")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE student_notifications ADD COLUMN related_url TEXT",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "student_notifications", "related_url").expect("probe"));
    }

    #[test]
    fn national_id_unique_only_when_present() {
        let conn = open_in_memory().expect("open");
        let insert = |id: &str, username: &str, nid: Option<&str>| {
            conn.execute(
                "INSERT INTO users(id, username, first_name, last_name, user_type, national_id, created_at)
                 VALUES(?, ?, 'A', 'B', 'student', ?, '2025-01-01 00:00:00')",
                rusqlite::params![id, username, nid],
            )
        };
        insert("u1", "a", None).expect("first null");
        insert("u2", "b", None).expect("second null");
        insert("u3", "c", Some("12345678")).expect("first value");
        let dup = insert("u4", "d", Some("12345678")).expect_err("duplicate national id");
        assert!(crate::error::is_unique_violation(&dup));
    }

    #[test]
    fn only_one_current_academic_year() {
        let conn = open_in_memory().expect("open");
        conn.execute(
            "INSERT INTO academic_years(id, year, start_date, end_date, is_current, created_at)
             VALUES('a', '2024/2025', '2024-09-01', '2025-08-31', 1, '2024-01-01 00:00:00')",
            [],
        )
        .expect("first");
        let e = conn
            .execute(
                "INSERT INTO academic_years(id, year, start_date, end_date, is_current, created_at)
                 VALUES('b', '2025/2026', '2025-09-01', '2026-08-31', 1, '2024-01-01 00:00:00')",
                [],
            )
            .expect_err("second current");
        assert!(crate::error::is_unique_violation(&e));
    }
}
