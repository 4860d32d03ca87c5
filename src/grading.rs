use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::enrollment;
use crate::error::{ErpError, ErpResult, RuleViolation};
use crate::money::{self, round2};
use crate::people;
use crate::progression::{self, ProgressionOutcome};

text_enum! {
    pub enum Letter {
        APlus => "A+",
        A => "A",
        AMinus => "A-",
        BPlus => "B+",
        B => "B",
        BMinus => "B-",
        CPlus => "C+",
        C => "C",
        CMinus => "C-",
        DPlus => "D+",
        D => "D",
        F => "F",
    }
}

impl Letter {
    /// Letters that count against a student at progression time.
    pub fn is_failing(self) -> bool {
        matches!(self, Letter::DPlus | Letter::D | Letter::F)
    }
}

/// Lower bound of each band, its letter and grade points in hundredths.
const BANDS: [(i64, Letter, i64); 11] = [
    (90, Letter::APlus, 400),
    (80, Letter::A, 400),
    (75, Letter::AMinus, 370),
    (70, Letter::BPlus, 330),
    (65, Letter::B, 300),
    (60, Letter::BMinus, 270),
    (55, Letter::CPlus, 230),
    (50, Letter::C, 200),
    (45, Letter::CMinus, 170),
    (40, Letter::DPlus, 130),
    (35, Letter::D, 100),
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    pub continuous_assessment: Decimal,
    pub final_exam: Decimal,
    #[serde(default)]
    pub practical_marks: Option<Decimal>,
    #[serde(default)]
    pub project_marks: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub total: Decimal,
    pub letter: Letter,
    pub grade_points: Decimal,
    pub quality_points: Decimal,
    pub passed: bool,
}

fn check_range(field: &str, v: Decimal, max: i64) -> ErpResult<()> {
    if v < Decimal::ZERO || v > Decimal::from(max) {
        return Err(ErpError::validation(field, format!("must be between 0 and {max}")));
    }
    Ok(())
}

impl Marks {
    pub fn validate(&self) -> ErpResult<()> {
        check_range("continuousAssessment", self.continuous_assessment, 40)?;
        check_range("finalExam", self.final_exam, 60)?;
        if let Some(p) = self.practical_marks {
            check_range("practicalMarks", p, 100)?;
        }
        if let Some(p) = self.project_marks {
            check_range("projectMarks", p, 100)?;
        }
        Ok(())
    }

    pub fn total(&self) -> Decimal {
        let tenth = Decimal::new(1, 1);
        round2(
            Decimal::new(4, 1) * self.continuous_assessment
                + Decimal::new(6, 1) * self.final_exam
                + tenth * self.practical_marks.unwrap_or_default()
                + tenth * self.project_marks.unwrap_or_default(),
        )
    }
}

pub fn letter_for(total: Decimal) -> (Letter, Decimal) {
    for (floor, letter, points) in BANDS {
        if total >= Decimal::from(floor) {
            return (letter, Decimal::new(points, 2));
        }
    }
    (Letter::F, Decimal::new(0, 2))
}

/// Pure marks-to-grade derivation.
pub fn derive(marks: &Marks, credit_hours: i64) -> Derived {
    let total = marks.total();
    let (letter, grade_points) = letter_for(total);
    Derived {
        total,
        letter,
        grade_points,
        quality_points: round2(grade_points * Decimal::from(credit_hours)),
        passed: total >= Decimal::from(45),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub enrollment_id: String,
    pub continuous_assessment: Decimal,
    pub final_exam: Decimal,
    pub practical_marks: Option<Decimal>,
    pub project_marks: Option<Decimal>,
    pub total_marks: Decimal,
    pub grade: Letter,
    pub grade_points: Decimal,
    pub quality_points: Decimal,
    pub is_passed: bool,
    pub remarks: Option<String>,
}

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<GradeRecord> {
    Ok(GradeRecord {
        id: r.get(0)?,
        enrollment_id: r.get(1)?,
        continuous_assessment: money::col(r, 2)?,
        final_exam: money::col(r, 3)?,
        practical_marks: money::opt_col(r, 4)?,
        project_marks: money::opt_col(r, 5)?,
        total_marks: money::col(r, 6)?,
        grade: r.get(7)?,
        grade_points: money::col(r, 8)?,
        quality_points: money::col(r, 9)?,
        is_passed: r.get(10)?,
        remarks: r.get(11)?,
    })
}

pub fn grade_for_enrollment(conn: &Connection, enrollment_id: &str) -> ErpResult<Option<GradeRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, enrollment_id, continuous_assessment, final_exam, practical_marks,
                    project_marks, total_marks, grade, grade_points, quality_points, is_passed,
                    remarks
             FROM grades WHERE enrollment_id = ?",
            [enrollment_id],
            grade_from_row,
        )
        .optional()?)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeInput {
    pub enrollment_id: String,
    #[serde(flatten)]
    pub marks: Marks,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub graded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeWrite {
    pub grade: GradeRecord,
    pub created: bool,
    pub progression: Option<ProgressionOutcome>,
}

/// Upserts the grade for an enrollment and refreshes the student's running
/// totals. A newly created grade also runs progression inside a savepoint; a
/// progression failure never undoes the grade.
pub fn record_grade(conn: &mut Connection, now: NaiveDateTime, input: GradeInput) -> ErpResult<GradeWrite> {
    input.marks.validate()?;
    let mut tx = db::immediate(conn)?;
    let e = enrollment::enrollment(&tx, &input.enrollment_id)?;
    if !e.is_active {
        return Err(RuleViolation::Other("enrollment is not active".to_string()).into());
    }
    if e.is_audit {
        return Err(RuleViolation::Other("audit enrollments are not graded".to_string()).into());
    }
    let d = derive(&input.marks, e.credit_hours);
    let existing = grade_for_enrollment(&tx, &e.id)?;
    let created = existing.is_none();
    let grade_id = match existing {
        Some(g) => {
            tx.execute(
                "UPDATE grades
                 SET continuous_assessment = ?, final_exam = ?, practical_marks = ?,
                     project_marks = ?, total_marks = ?, grade = ?, grade_points = ?,
                     quality_points = ?, is_passed = ?, remarks = ?, graded_by = ?,
                     updated_at = ?
                 WHERE id = ?",
                params![
                    money::to_sql(input.marks.continuous_assessment),
                    money::to_sql(input.marks.final_exam),
                    money::opt_to_sql(input.marks.practical_marks),
                    money::opt_to_sql(input.marks.project_marks),
                    money::to_sql(d.total),
                    d.letter,
                    money::to_sql(d.grade_points),
                    money::to_sql(d.quality_points),
                    d.passed,
                    input.remarks,
                    input.graded_by,
                    now,
                    g.id
                ],
            )?;
            g.id
        }
        None => {
            let id = db::new_id();
            tx.execute(
                "INSERT INTO grades(id, enrollment_id, continuous_assessment, final_exam,
                    practical_marks, project_marks, total_marks, grade, grade_points,
                    quality_points, is_passed, remarks, graded_by, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    e.id,
                    money::to_sql(input.marks.continuous_assessment),
                    money::to_sql(input.marks.final_exam),
                    money::opt_to_sql(input.marks.practical_marks),
                    money::opt_to_sql(input.marks.project_marks),
                    money::to_sql(d.total),
                    d.letter,
                    money::to_sql(d.grade_points),
                    money::to_sql(d.quality_points),
                    d.passed,
                    input.remarks,
                    input.graded_by,
                    now,
                    now
                ],
            )?;
            id
        }
    };
    refresh_student_totals(&tx, now, &e.student_id)?;

    let progression = if created {
        progression::run_guarded(&mut tx, now, &e.student_id, &e.semester_id, Some(&grade_id))?
    } else {
        None
    };

    let grade = grade_for_enrollment(&tx, &e.id)?
        .ok_or_else(|| ErpError::Internal("grade vanished after write".to_string()))?;
    tx.commit()?;
    info!(
        enrollment_id = %e.id,
        course = %e.course_code,
        grade = %grade.grade,
        created,
        "grade recorded"
    );
    Ok(GradeWrite {
        grade,
        created,
        progression,
    })
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Gpa {
    pub credit_hours: i64,
    pub quality_points: Decimal,
    pub gpa: Decimal,
}

impl Gpa {
    fn from_sums(credit_hours: i64, quality_points: Decimal) -> Self {
        let gpa = if credit_hours > 0 {
            round2(quality_points / Decimal::from(credit_hours))
        } else {
            Decimal::new(0, 2)
        };
        Gpa {
            credit_hours,
            quality_points: round2(quality_points),
            gpa,
        }
    }
}

/// (credit hours, quality points) of every graded enrollment of the student,
/// optionally narrowed to one semester.
fn graded_points(conn: &Connection, student_id: &str, semester_id: Option<&str>) -> ErpResult<Vec<(i64, Decimal)>> {
    let mut stmt = conn.prepare(
        "SELECT c.credit_hours, g.quality_points
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         JOIN courses c ON c.id = e.course_id
         WHERE e.student_id = ?1 AND (?2 IS NULL OR e.semester_id = ?2)",
    )?;
    let rows = stmt
        .query_map(params![student_id, semester_id], |r| Ok((r.get(0)?, money::col(r, 1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn gpa_over(rows: &[(i64, Decimal)]) -> Gpa {
    let credits = rows.iter().map(|(c, _)| *c).sum();
    let points = rows.iter().map(|(_, q)| *q).sum();
    Gpa::from_sums(credits, points)
}

pub fn semester_gpa(conn: &Connection, student_id: &str, semester_id: &str) -> ErpResult<Gpa> {
    people::student(conn, student_id)?;
    Ok(gpa_over(&graded_points(conn, student_id, Some(semester_id))?))
}

pub fn cumulative_gpa(conn: &Connection, student_id: &str) -> ErpResult<Gpa> {
    people::student(conn, student_id)?;
    Ok(gpa_over(&graded_points(conn, student_id, None)?))
}

/// Recomputes `cumulative_gpa` and `total_credit_hours` (credits of distinct
/// passed courses) on the student row.
pub fn refresh_student_totals(conn: &Connection, now: NaiveDateTime, student_id: &str) -> ErpResult<()> {
    let gpa = gpa_over(&graded_points(conn, student_id, None)?);
    let earned: i64 = conn.query_row(
        "SELECT COALESCE(SUM(credit_hours), 0) FROM courses
         WHERE id IN (
            SELECT e.course_id FROM grades g
            JOIN enrollments e ON e.id = g.enrollment_id
            WHERE e.student_id = ? AND g.is_passed = 1
         )",
        [student_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "UPDATE students SET cumulative_gpa = ?, total_credit_hours = ?, updated_at = ? WHERE id = ?",
        params![money::to_sql(gpa.gpa), earned, now, student_id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    pub course_code: String,
    pub course_name: String,
    pub credit_hours: i64,
    pub total_marks: Decimal,
    pub grade: Letter,
    pub grade_points: Decimal,
    pub quality_points: Decimal,
    pub is_passed: bool,
    pub is_repeat: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSemester {
    pub semester_id: String,
    pub academic_year: String,
    pub semester_number: i64,
    pub courses: Vec<TranscriptLine>,
    pub gpa: Gpa,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub student_id: String,
    pub student_number: String,
    pub full_name: String,
    pub semesters: Vec<TranscriptSemester>,
    pub cumulative: Gpa,
    pub total_credit_hours: i64,
}

pub fn transcript(conn: &Connection, student_id: &str) -> ErpResult<Transcript> {
    let student = people::student(conn, student_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, ay.year, s.semester_number, c.code, c.name, c.credit_hours,
                g.total_marks, g.grade, g.grade_points, g.quality_points, g.is_passed, e.is_repeat
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         JOIN courses c ON c.id = e.course_id
         JOIN semesters s ON s.id = e.semester_id
         JOIN academic_years ay ON ay.id = s.academic_year_id
         WHERE e.student_id = ?
         ORDER BY s.start_date, c.code",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                TranscriptLine {
                    course_code: r.get(3)?,
                    course_name: r.get(4)?,
                    credit_hours: r.get(5)?,
                    total_marks: money::col(r, 6)?,
                    grade: r.get(7)?,
                    grade_points: money::col(r, 8)?,
                    quality_points: money::col(r, 9)?,
                    is_passed: r.get(10)?,
                    is_repeat: r.get(11)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut semesters: Vec<TranscriptSemester> = Vec::new();
    for (semester_id, year, number, line) in rows {
        match semesters.last_mut() {
            Some(last) if last.semester_id == semester_id => last.courses.push(line),
            _ => semesters.push(TranscriptSemester {
                semester_id,
                academic_year: year,
                semester_number: number,
                courses: vec![line],
                gpa: Gpa::from_sums(0, Decimal::ZERO),
            }),
        }
    }
    for sem in &mut semesters {
        let points: Vec<(i64, Decimal)> = sem
            .courses
            .iter()
            .map(|l| (l.credit_hours, l.quality_points))
            .collect();
        sem.gpa = gpa_over(&points);
    }
    let all: Vec<(i64, Decimal)> = semesters
        .iter()
        .flat_map(|s| s.courses.iter().map(|l| (l.credit_hours, l.quality_points)))
        .collect();

    Ok(Transcript {
        student_id: student.id,
        student_number: student.student_id,
        full_name: student.full_name,
        semesters,
        cumulative: gpa_over(&all),
        total_credit_hours: student.total_credit_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, SponsorType};
    use crate::testkit::{dec, Campus};

    fn marks(ca: &str, fin: &str) -> Marks {
        Marks {
            continuous_assessment: dec(ca),
            final_exam: dec(fin),
            ..Marks::default()
        }
    }

    #[test]
    fn band_edges() {
        assert_eq!(letter_for(dec("34.99")).0, Letter::F);
        assert_eq!(letter_for(dec("35.00")), (Letter::D, dec("1.00")));
        assert_eq!(letter_for(dec("39.99")).0, Letter::D);
        assert_eq!(letter_for(dec("40.00")).0, Letter::DPlus);
        assert_eq!(letter_for(dec("44.99")).0, Letter::DPlus);
        assert_eq!(letter_for(dec("45")).0, Letter::CMinus);
        assert_eq!(letter_for(dec("75")), (Letter::AMinus, dec("3.70")));
        assert_eq!(letter_for(dec("90")).0, Letter::APlus);
        assert_eq!(letter_for(dec("100")).1, dec("4.00"));
    }

    #[test]
    fn total_weights_components_and_ignores_missing_ones() {
        let m = marks("40", "60");
        assert_eq!(m.total(), dec("52.00"));
        let m = Marks {
            practical_marks: Some(dec("80")),
            project_marks: Some(dec("70")),
            ..marks("40", "60")
        };
        assert_eq!(m.total(), dec("67.00"));
        let d = derive(&m, 3);
        assert_eq!(d.letter, Letter::B);
        assert_eq!(d.quality_points, dec("9.00"));
        assert!(d.passed);
        assert_eq!(derive(&m, 3), d);
    }

    #[test]
    fn d_plus_is_not_a_pass() {
        let d = derive(&marks("25", "50"), 3);
        assert_eq!(d.total, dec("40.00"));
        assert_eq!(d.letter, Letter::DPlus);
        assert!(!d.passed);
        assert!(d.letter.is_failing());
    }

    #[test]
    fn marks_out_of_range_are_rejected() {
        let e = marks("41", "10").validate().expect_err("ca over 40");
        assert_eq!(e.kind(), "ValidationError");
        let e = marks("10", "-1").validate().expect_err("negative");
        assert_eq!(e.kind(), "ValidationError");
    }

    #[test]
    fn regrade_updates_in_place_and_keeps_totals_consistent() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/001/2024", Gender::Male, SponsorType::Government);
        let sem = campus.ay1_s1.clone();
        let e1 = campus.enroll_raw(&s, &campus.course_ids[0].clone(), &sem);
        let e2 = campus.enroll_raw(&s, &campus.course_ids[1].clone(), &sem);
        let now = campus.now();

        let first = record_grade(
            &mut campus.conn,
            now,
            GradeInput {
                enrollment_id: e1.clone(),
                marks: marks("40", "60"),
                remarks: None,
                graded_by: None,
            },
        )
        .expect("grade");
        assert!(first.created);
        let again = record_grade(
            &mut campus.conn,
            now,
            GradeInput {
                enrollment_id: e1,
                marks: marks("10", "10"),
                remarks: Some("re-marked".into()),
                graded_by: None,
            },
        )
        .expect("regrade");
        assert!(!again.created);
        assert!(again.progression.is_none());
        assert_eq!(again.grade.id, first.grade.id);
        assert_eq!(again.grade.grade, Letter::F);

        record_grade(
            &mut campus.conn,
            now,
            GradeInput {
                enrollment_id: e2,
                marks: marks("40", "60"),
                remarks: None,
                graded_by: None,
            },
        )
        .expect("grade");

        // (0.00 * 3 + 2.00 * 3) / 6
        let cum = cumulative_gpa(&campus.conn, &s).expect("cumulative");
        assert_eq!(cum.gpa, dec("1.00"));
        let student = people::student(&campus.conn, &s).expect("student");
        assert_eq!(student.cumulative_gpa, cum.gpa);
        assert_eq!(student.total_credit_hours, 3);
        assert_eq!(semester_gpa(&campus.conn, &s, &sem).expect("sem").gpa, dec("1.00"));

        let t = transcript(&campus.conn, &s).expect("transcript");
        assert_eq!(t.semesters.len(), 1);
        assert_eq!(t.semesters[0].courses.len(), 2);
        assert_eq!(t.cumulative, cum);
    }

    #[test]
    fn audit_enrollments_are_not_graded() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/001/2024", Gender::Male, SponsorType::Government);
        let e = campus.enroll_raw(&s, &campus.course_ids[0].clone(), &campus.ay1_s1.clone());
        campus
            .conn
            .execute("UPDATE enrollments SET is_audit = 1 WHERE id = ?", [&e])
            .expect("audit");
        let now = campus.now();
        let err = record_grade(
            &mut campus.conn,
            now,
            GradeInput {
                enrollment_id: e,
                marks: marks("40", "60"),
                remarks: None,
                graded_by: None,
            },
        )
        .expect_err("audit");
        assert_eq!(err.code(), "business_rule");
    }
}
