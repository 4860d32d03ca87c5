//! Promotion, repeat and graduation decisions taken when a student's year of
//! grades is complete.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::{self, AcademicYear, Semester};
use crate::db;
use crate::enrollment;
use crate::error::{ErpError, ErpResult, StateViolation};
use crate::fees;
use crate::grading::Letter;
use crate::model::{NotificationKind, StudentStatus};
use crate::notifications;
use crate::people::{self, Student};

const MAX_FAILED_UNITS: usize = 2;

/// Shortfall tolerated when deciding whether a year's fees are cleared.
pub fn fee_tolerance() -> Decimal {
    Decimal::new(10000, 2)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Student is not active; nothing evaluated.
    Skipped,
    /// Some enrollment of the year still lacks a grade.
    Incomplete,
    /// This semester was already decided for the student.
    AlreadyDecided,
    Promoted { year: i64, semester: i64 },
    Repeat { year: i64, semester: i64 },
    Graduated { on: NaiveDate },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionOutcome {
    pub student_id: String,
    #[serde(flatten)]
    pub decision: Decision,
    pub failed_units: usize,
    pub fee_cleared: bool,
    pub enrollments_created: Vec<String>,
}

impl ProgressionOutcome {
    fn bare(student_id: &str, decision: Decision) -> Self {
        ProgressionOutcome {
            student_id: student_id.to_string(),
            decision,
            failed_units: 0,
            fee_cleared: false,
            enrollments_created: Vec::new(),
        }
    }
}

/// (enrollment id, course id, semester number) of every graded enrollment in
/// the academic year whose letter counts as a failure.
fn failed_enrollments(
    conn: &Connection,
    student_id: &str,
    academic_year_id: &str,
    semesters_per_year: i64,
) -> ErpResult<Vec<(String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.course_id, s.semester_number, g.grade
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         JOIN semesters s ON s.id = e.semester_id
         WHERE e.student_id = ?1
           AND s.academic_year_id = ?2
           AND s.semester_number <= ?3
         ORDER BY s.semester_number, e.id",
    )?;
    let rows: Vec<((String, String, i64), Letter)> = stmt
        .query_map(params![student_id, academic_year_id, semesters_per_year], |r| {
            Ok(((r.get(0)?, r.get(1)?, r.get(2)?), r.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|(_, letter)| letter.is_failing())
        .map(|(row, _)| row)
        .collect())
}

/// True iff the student holds at least one active, gradable enrollment in the
/// year and every one of them has a grade.
pub fn completed_year(
    conn: &Connection,
    student_id: &str,
    academic_year_id: &str,
    semesters_per_year: i64,
) -> ErpResult<bool> {
    let (total, ungraded): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN g.id IS NULL THEN 1 ELSE 0 END), 0)
         FROM enrollments e
         JOIN semesters s ON s.id = e.semester_id
         LEFT JOIN grades g ON g.enrollment_id = e.id
         WHERE e.student_id = ?1
           AND e.is_active = 1
           AND e.is_audit = 0
           AND s.academic_year_id = ?2
           AND s.semester_number <= ?3",
        params![student_id, academic_year_id, semesters_per_year],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(total > 0 && ungraded == 0)
}

pub fn fee_cleared(conn: &Connection, student: &Student, academic_year_id: &str, year: i64) -> ErpResult<bool> {
    if student.sponsor_type.clears_fees() {
        return Ok(true);
    }
    let (due, paid) = fees::year_totals(conn, &student.id, &student.programme_id, academic_year_id, year)?;
    if due <= Decimal::ZERO {
        return Ok(true);
    }
    Ok(paid >= due - fee_tolerance())
}

fn require_next_year(conn: &Connection, ay: &AcademicYear) -> ErpResult<AcademicYear> {
    catalog::next_academic_year(conn, ay)?.ok_or_else(|| {
        StateViolation::Other(format!("no academic year configured after {}", ay.year)).into()
    })
}

fn require_semester(conn: &Connection, ay: &AcademicYear, number: i64) -> ErpResult<Semester> {
    catalog::semester_by_number(conn, &ay.id, number)?.ok_or_else(|| {
        StateViolation::Other(format!("{} has no semester {}", ay.year, number)).into()
    })
}

fn already_decided(conn: &Connection, student_id: &str, sem: &Semester) -> ErpResult<bool> {
    let through: Option<NaiveDate> = conn
        .query_row(
            "SELECT progressed_through FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    Ok(matches!(through, Some(t) if sem.end_date <= t))
}

/// Runs the decision procedure for a student against the academic year of
/// `semester_id`. Writes go through `conn`; callers own the transaction.
pub fn evaluate(
    conn: &Connection,
    now: NaiveDateTime,
    student_id: &str,
    semester_id: &str,
) -> ErpResult<ProgressionOutcome> {
    let student = people::student(conn, student_id)?;
    if student.status != StudentStatus::Active {
        return Ok(ProgressionOutcome::bare(student_id, Decision::Skipped));
    }
    let sem = catalog::semester(conn, semester_id)?;
    if already_decided(conn, student_id, &sem)? {
        return Ok(ProgressionOutcome::bare(student_id, Decision::AlreadyDecided));
    }
    let ay = catalog::academic_year(conn, &sem.academic_year_id)?;
    let programme = catalog::programme(conn, &student.programme_id)?;
    let n = programme.semesters_per_year;
    let (y, s) = (student.current_year, student.current_semester);

    if !completed_year(conn, student_id, &ay.id, n)? {
        return Ok(ProgressionOutcome::bare(student_id, Decision::Incomplete));
    }

    let failed = failed_enrollments(conn, student_id, &ay.id, n)?;
    let cleared = fee_cleared(conn, &student, &ay.id, y)?;
    let mut created = Vec::new();

    let decision = if failed.len() <= MAX_FAILED_UNITS && cleared {
        if s < n {
            set_slot(conn, now, student_id, y, s + 1)?;
            Decision::Promoted { year: y, semester: s + 1 }
        } else if y < programme.duration_years {
            let next_ay = require_next_year(conn, &ay)?;
            let target = require_semester(conn, &next_ay, 1)?;
            for entry in catalog::curriculum(conn, &programme.id, Some((y + 1, 1)))? {
                if let Some(id) =
                    enrollment::upsert_enrollment(conn, now, student_id, &entry.course_id, &target.id, false, false)?
                {
                    created.push(id);
                }
            }
            set_slot(conn, now, student_id, y + 1, 1)?;
            Decision::Promoted { year: y + 1, semester: 1 }
        } else {
            let today = now.date();
            conn.execute(
                "UPDATE students SET status = ?, expected_graduation_date = ?, updated_at = ?
                 WHERE id = ?",
                params![StudentStatus::Graduated, today, now, student_id],
            )?;
            Decision::Graduated { on: today }
        }
    } else {
        if !failed.is_empty() {
            let next_ay = require_next_year(conn, &ay)?;
            for (_, course_id, number) in &failed {
                let target = require_semester(conn, &next_ay, *number)?;
                if let Some(id) =
                    enrollment::upsert_enrollment(conn, now, student_id, course_id, &target.id, false, true)?
                {
                    created.push(id);
                }
            }
        }
        Decision::Repeat { year: y, semester: s }
    };

    conn.execute(
        "UPDATE students SET progressed_through = ? WHERE id = ?",
        params![sem.end_date, student_id],
    )?;
    notify(conn, now, student_id, &decision, failed.len(), cleared)?;

    match &decision {
        Decision::Promoted { year, semester } => {
            info!(student = %student.student_id, year, semester, failed = failed.len(), "student promoted")
        }
        Decision::Graduated { .. } => info!(student = %student.student_id, "student graduated"),
        _ => warn!(
            student = %student.student_id,
            failed = failed.len(),
            fee_cleared = cleared,
            "student not promoted"
        ),
    }

    Ok(ProgressionOutcome {
        student_id: student_id.to_string(),
        decision,
        failed_units: failed.len(),
        fee_cleared: cleared,
        enrollments_created: created,
    })
}

fn set_slot(conn: &Connection, now: NaiveDateTime, student_id: &str, year: i64, semester: i64) -> ErpResult<()> {
    conn.execute(
        "UPDATE students SET current_year = ?, current_semester = ?, updated_at = ? WHERE id = ?",
        params![year, semester, now, student_id],
    )?;
    Ok(())
}

fn notify(
    conn: &Connection,
    now: NaiveDateTime,
    student_id: &str,
    decision: &Decision,
    failed: usize,
    cleared: bool,
) -> ErpResult<()> {
    let (kind, title, message) = match decision {
        Decision::Promoted { year, semester } => {
            let mut message = format!(
                "Congratulations! You have been promoted to Year {year}, Semester {semester}."
            );
            if failed > 0 {
                message.push_str(&format!(
                    " Note: You had {failed} failed unit(s) but can proceed with supplementary exams."
                ));
            }
            (NotificationKind::Promoted, format!("Promoted to Year {year}"), message)
        }
        Decision::Repeat { year, .. } => {
            let mut reasons = Vec::new();
            if failed > MAX_FAILED_UNITS {
                reasons.push(format!("{failed} failed units"));
            }
            if !cleared {
                reasons.push("outstanding fees".to_string());
            }
            let mut message = format!("You have not been promoted due to: {}.", reasons.join(", "));
            if failed > MAX_FAILED_UNITS {
                message.push_str(&format!(
                    " You have {failed} failed units (maximum allowed: {MAX_FAILED_UNITS})."
                ));
            }
            message.push_str(" Please contact the academic office for guidance.");
            (
                NotificationKind::NotPromoted,
                format!("Academic Progression Update - Year {year}"),
                message,
            )
        }
        Decision::Graduated { .. } => (
            NotificationKind::Graduated,
            "Graduation Eligibility".to_string(),
            "Congratulations! You have completed all requirements and are eligible for graduation. \
             Please contact the registry for graduation procedures."
                .to_string(),
        ),
        Decision::Skipped | Decision::Incomplete | Decision::AlreadyDecided => return Ok(()),
    };
    notifications::emit(conn, now, student_id, kind, &title, &message, None)?;
    Ok(())
}

/// Runs `evaluate` in a savepoint of `tx`. On failure the savepoint is rolled
/// back, the error is logged and stored in `progression_failures`, and the
/// surrounding transaction carries on.
pub fn run_guarded(
    tx: &mut Transaction<'_>,
    now: NaiveDateTime,
    student_id: &str,
    semester_id: &str,
    grade_id: Option<&str>,
) -> ErpResult<Option<ProgressionOutcome>> {
    let sp = tx.savepoint()?;
    match evaluate(&sp, now, student_id, semester_id) {
        Ok(outcome) => {
            sp.commit()?;
            Ok(Some(outcome))
        }
        Err(e) => {
            drop(sp);
            error!(student_id, semester_id, error = %e, "progression failed; grade kept");
            record_failure(tx, now, student_id, semester_id, grade_id, &e)?;
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionFailure {
    pub id: String,
    pub student_id: String,
    pub semester_id: String,
    pub grade_id: Option<String>,
    pub error: String,
    pub attempts: i64,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

fn record_failure(
    conn: &Connection,
    now: NaiveDateTime,
    student_id: &str,
    semester_id: &str,
    grade_id: Option<&str>,
    e: &ErpError,
) -> ErpResult<()> {
    conn.execute(
        "INSERT INTO progression_failures(id, student_id, semester_id, grade_id, error, attempts,
            created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        params![db::new_id(), student_id, semester_id, grade_id, e.to_string(), now],
    )?;
    Ok(())
}

fn failure(conn: &Connection, id: &str) -> ErpResult<ProgressionFailure> {
    conn.query_row(
        "SELECT id, student_id, semester_id, grade_id, error, attempts, resolved_at, created_at
         FROM progression_failures WHERE id = ?",
        [id],
        failure_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("progression failure", id))
}

fn failure_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressionFailure> {
    Ok(ProgressionFailure {
        id: r.get(0)?,
        student_id: r.get(1)?,
        semester_id: r.get(2)?,
        grade_id: r.get(3)?,
        error: r.get(4)?,
        attempts: r.get(5)?,
        resolved_at: r.get(6)?,
        created_at: r.get(7)?,
    })
}

pub fn failures(conn: &Connection, include_resolved: bool) -> ErpResult<Vec<ProgressionFailure>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, semester_id, grade_id, error, attempts, resolved_at, created_at
         FROM progression_failures
         WHERE ?1 = 1 OR resolved_at IS NULL
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([include_resolved], failure_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Re-runs progression for a logged failure. A second failure bumps the
/// attempt counter and is returned to the caller.
pub fn retry(conn: &mut Connection, now: NaiveDateTime, failure_id: &str) -> ErpResult<ProgressionOutcome> {
    let mut tx = db::immediate(conn)?;
    let f = failure(&tx, failure_id)?;
    if f.resolved_at.is_some() {
        return Err(StateViolation::Other("progression failure already resolved".to_string()).into());
    }
    let sp = tx.savepoint()?;
    let result = evaluate(&sp, now, &f.student_id, &f.semester_id);
    match result {
        Ok(outcome) => {
            sp.commit()?;
            tx.execute(
                "UPDATE progression_failures SET resolved_at = ?, attempts = attempts + 1 WHERE id = ?",
                params![now, f.id],
            )?;
            tx.commit()?;
            info!(failure_id, student_id = %f.student_id, "progression retry succeeded");
            Ok(outcome)
        }
        Err(e) => {
            drop(sp);
            tx.execute(
                "UPDATE progression_failures SET attempts = attempts + 1, error = ? WHERE id = ?",
                params![e.to_string(), f.id],
            )?;
            tx.commit()?;
            warn!(failure_id, error = %e, "progression retry failed again");
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepLine {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProgressionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Evaluates every active student holding an active enrollment in the
/// semester, one transaction per student.
pub fn sweep_semester(conn: &mut Connection, now: NaiveDateTime, semester_id: &str) -> ErpResult<Vec<SweepLine>> {
    catalog::semester(conn, semester_id)?;
    let ids: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT st.id
             FROM students st
             JOIN enrollments e ON e.student_id = st.id
             WHERE e.semester_id = ? AND e.is_active = 1 AND st.status = 'active'
             ORDER BY st.student_id",
        )?;
        let rows = stmt
            .query_map([semester_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        rows
    };

    let mut lines = Vec::with_capacity(ids.len());
    for student_id in ids {
        let mut tx = db::immediate(conn)?;
        let outcome = run_guarded(&mut tx, now, &student_id, semester_id, None)?;
        tx.commit()?;
        let error = match outcome {
            Some(_) => None,
            None => Some("progression failed; see progression failures".to_string()),
        };
        lines.push(SweepLine {
            student_id,
            outcome,
            error,
        });
    }
    info!(semester_id, students = lines.len(), "semester sweep finished");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::{self, GradeInput, Marks};
    use crate::model::{Gender, SponsorType};
    use crate::testkit::{dec, Campus};

    fn grade(campus: &mut Campus, enrollment_id: &str, ca: &str, fin: &str) -> grading::GradeWrite {
        let now = campus.now();
        grading::record_grade(
            &mut campus.conn,
            now,
            GradeInput {
                enrollment_id: enrollment_id.to_string(),
                marks: Marks {
                    continuous_assessment: dec(ca),
                    final_exam: dec(fin),
                    ..Marks::default()
                },
                remarks: None,
                graded_by: None,
            },
        )
        .expect("record grade")
    }

    fn notification_kinds(campus: &Campus, student: &str) -> Vec<NotificationKind> {
        notifications::list(&campus.conn, student, false)
            .expect("notifications")
            .into_iter()
            .map(|n| n.kind)
            .collect()
    }

    #[test]
    fn promotes_to_next_semester_after_last_grade() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/001/2024", Gender::Male, SponsorType::Government);
        let sem = campus.ay1_s1.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_ids[0].clone(), &sem);
        let e2 = campus.enroll_raw(&s, &campus.course_ids[1].clone(), &sem);

        let first = grade(&mut campus, &e1, "30", "50");
        assert_eq!(
            first.progression.expect("ran").decision,
            Decision::Incomplete
        );
        let second = grade(&mut campus, &e2, "35", "55");
        let outcome = second.progression.expect("ran");
        assert_eq!(outcome.decision, Decision::Promoted { year: 1, semester: 2 });
        assert!(outcome.enrollments_created.is_empty());

        let st = people::student(&campus.conn, &s).expect("student");
        assert_eq!((st.current_year, st.current_semester), (1, 2));
        assert_eq!(notification_kinds(&campus, &s), vec![NotificationKind::Promoted]);
    }

    #[test]
    fn three_failures_keep_state_and_queue_repeats() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/002/2024", Gender::Female, SponsorType::Government);
        let sem = campus.ay1_s1.clone();
        let ids: Vec<String> = campus.course_ids[..3].to_vec();
        let enrollments: Vec<String> = ids.iter().map(|c| campus.enroll_raw(&s, c, &sem)).collect();
        let mut last = None;
        for e in &enrollments {
            last = grade(&mut campus, e, "10", "10").progression;
        }
        let outcome = last.expect("ran");
        assert_eq!(outcome.decision, Decision::Repeat { year: 1, semester: 1 });
        assert_eq!(outcome.failed_units, 3);
        assert_eq!(outcome.enrollments_created.len(), 3);

        let repeats = enrollment::list(&campus.conn, &s, Some(campus.ay2_s1.as_str()), false).expect("list");
        assert_eq!(repeats.len(), 3);
        assert!(repeats.iter().all(|e| e.is_repeat));
        let st = people::student(&campus.conn, &s).expect("student");
        assert_eq!((st.current_year, st.current_semester), (1, 1));
        assert_eq!(notification_kinds(&campus, &s), vec![NotificationKind::NotPromoted]);
    }

    #[test]
    fn exactly_two_failures_still_promote() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/003/2024", Gender::Male, SponsorType::Scholarship);
        let sem = campus.ay1_s1.clone();
        let ids: Vec<String> = campus.course_ids[..3].to_vec();
        let e: Vec<String> = ids.iter().map(|c| campus.enroll_raw(&s, c, &sem)).collect();
        grade(&mut campus, &e[0], "10", "10");
        grade(&mut campus, &e[1], "10", "10");
        let outcome = grade(&mut campus, &e[2], "40", "60").progression.expect("ran");
        assert_eq!(outcome.failed_units, 2);
        assert_eq!(outcome.decision, Decision::Promoted { year: 1, semester: 2 });
    }

    #[test]
    fn year_end_promotion_auto_enrolls_next_year() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/004/2024", Gender::Male, SponsorType::Government);
        campus.place(&s, 1, 2);
        let sem = campus.ay1_s2.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_id("CS151"), &sem);
        let e2 = campus.enroll_raw(&s, &campus.course_id("CS152"), &sem);
        grade(&mut campus, &e1, "40", "60");
        let outcome = grade(&mut campus, &e2, "40", "60").progression.expect("ran");
        assert_eq!(outcome.decision, Decision::Promoted { year: 2, semester: 1 });
        assert_eq!(outcome.enrollments_created.len(), 2);
        let next = enrollment::list(&campus.conn, &s, Some(campus.ay2_s1.as_str()), false).expect("list");
        let codes: Vec<&str> = next.iter().map(|e| e.course_code.as_str()).collect();
        assert_eq!(codes, vec!["CS201", "CS202"]);
    }

    #[test]
    fn final_semester_pass_graduates() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/005/2022", Gender::Female, SponsorType::Bursary);
        campus.place(&s, 3, 2);
        let sem = campus.ay1_s2.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_id("CS351"), &sem);
        let outcome = grade(&mut campus, &e1, "40", "60").progression.expect("ran");
        assert_eq!(outcome.decision, Decision::Graduated { on: campus.now().date() });
        let st = people::student(&campus.conn, &s).expect("student");
        assert_eq!(st.status, StudentStatus::Graduated);
        assert_eq!(st.expected_graduation_date, Some(campus.now().date()));
    }

    #[test]
    fn unpaid_fees_hold_a_self_sponsored_student() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/006/2024", Gender::Male, SponsorType::SelfSponsored);
        let now = campus.now();
        let fs = fees::create_structure(
            &campus.conn,
            now,
            fees::NewFeeStructure::flat(&campus.programme, &campus.ay1, 1, 1, dec("50000")),
        )
        .expect("fee structure");
        let sem = campus.ay1_s1.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_ids[0].clone(), &sem);
        let outcome = grade(&mut campus, &e1, "40", "60").progression.expect("ran");
        assert!(!outcome.fee_cleared);
        assert_eq!(outcome.decision, Decision::Repeat { year: 1, semester: 1 });

        // Paying all but the tolerance clears the year.
        fees::record_payment(
            &mut campus.conn,
            now,
            fees::PaymentInput::cash(&s, &fs.id, dec("49900.00"), now.date()),
        )
        .expect("pay");
        let st = people::student(&campus.conn, &s).expect("student");
        assert!(fee_cleared(&campus.conn, &st, &campus.ay1, 1).expect("cleared"));
    }

    #[test]
    fn failure_is_logged_and_retried() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/007/2024", Gender::Male, SponsorType::Government);
        campus.place(&s, 1, 2);
        // Last academic year: there is no following year to enroll into.
        let sem = campus.ay3_s2.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_id("CS151"), &sem);
        let write = grade(&mut campus, &e1, "40", "60");
        assert!(write.progression.is_none());
        assert_eq!(write.grade.grade, grading::Letter::C);

        let open = failures(&campus.conn, false).expect("failures");
        assert_eq!(open.len(), 1);
        let e = retry(&mut campus.conn, campus.clock.now(), &open[0].id).expect_err("still no year");
        assert_eq!(e.code(), "state_error");
        assert_eq!(failures(&campus.conn, false).expect("failures")[0].attempts, 2);

        let now = campus.now();
        catalog::create_academic_year(
            &campus.conn,
            now,
            catalog::NewAcademicYear {
                year: "2027/2028".into(),
                start_date: crate::testkit::date(2027, 9, 1),
                end_date: crate::testkit::date(2028, 8, 31),
            },
        )
        .and_then(|ay| {
            catalog::create_semester(
                &campus.conn,
                now,
                catalog::NewSemester {
                    academic_year_id: ay.id,
                    semester_number: 1,
                    start_date: crate::testkit::date(2027, 9, 1),
                    end_date: crate::testkit::date(2028, 1, 31),
                    registration_start_date: crate::testkit::date(2027, 9, 1),
                    registration_end_date: crate::testkit::date(2027, 9, 30),
                },
            )
        })
        .expect("next year");
        let outcome = retry(&mut campus.conn, now, &open[0].id).expect("retry");
        assert_eq!(outcome.decision, Decision::Promoted { year: 2, semester: 1 });
        assert!(failures(&campus.conn, false).expect("failures").is_empty());
    }

    #[test]
    fn sweep_does_not_decide_a_semester_twice() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/008/2024", Gender::Male, SponsorType::Government);
        let sem = campus.ay1_s1.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_ids[0].clone(), &sem);
        grade(&mut campus, &e1, "40", "60");
        let now = campus.now();
        let lines = sweep_semester(&mut campus.conn, now, &sem).expect("sweep");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].outcome.as_ref().map(|o| o.decision.clone()),
            Some(Decision::AlreadyDecided)
        );
        let st = people::student(&campus.conn, &s).expect("student");
        assert_eq!((st.current_year, st.current_semester), (1, 2));
    }
}
