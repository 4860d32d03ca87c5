//! Append-only fee ledger. A payment larger than what its fee structure still
//! owes spills forward into later periods of the programme.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{self, AcademicYear};
use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult, StateViolation};
use crate::model::{Allocation, PaymentMethod, PaymentStatus};
use crate::money;
use crate::people;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructure {
    pub id: String,
    pub programme_id: String,
    pub academic_year_id: String,
    pub year: i64,
    pub semester: i64,
    pub tuition_fee: Decimal,
    pub registration_fee: Decimal,
    pub examination_fee: Decimal,
    pub other_fees: Decimal,
    pub government_subsidy: Decimal,
    pub scholarship_amount: Decimal,
    pub net_fee: Decimal,
}

impl FeeStructure {
    fn charges(&self) -> Decimal {
        self.tuition_fee + self.registration_fee + self.examination_fee + self.other_fees
    }

    /// Charges less subsidy and scholarship.
    pub fn compute_net(&self) -> Decimal {
        money::round2(self.charges() - self.government_subsidy - self.scholarship_amount)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeeStructure {
    pub programme_id: String,
    pub academic_year_id: String,
    pub year: i64,
    pub semester: i64,
    pub tuition_fee: Decimal,
    #[serde(default)]
    pub registration_fee: Decimal,
    #[serde(default)]
    pub examination_fee: Decimal,
    #[serde(default)]
    pub other_fees: Decimal,
    #[serde(default)]
    pub government_subsidy: Decimal,
    #[serde(default)]
    pub scholarship_amount: Decimal,
}

#[cfg(test)]
impl NewFeeStructure {
    pub fn flat(programme_id: &str, academic_year_id: &str, year: i64, semester: i64, tuition: Decimal) -> Self {
        NewFeeStructure {
            programme_id: programme_id.to_string(),
            academic_year_id: academic_year_id.to_string(),
            year,
            semester,
            tuition_fee: tuition,
            registration_fee: Decimal::ZERO,
            examination_fee: Decimal::ZERO,
            other_fees: Decimal::ZERO,
            government_subsidy: Decimal::ZERO,
            scholarship_amount: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayment {
    pub id: String,
    pub student_id: String,
    pub fee_structure_id: String,
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub receipt_number: String,
    pub transaction_reference: Option<String>,
    pub allocation: Allocation,
    pub source_receipt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub student_id: String,
    pub fee_structure_id: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    /// Caller-issued receipt for the direct payment; generated when absent.
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[cfg(test)]
impl PaymentInput {
    pub fn cash(student_id: &str, fee_structure_id: &str, amount: Decimal, on: NaiveDate) -> Self {
        PaymentInput {
            student_id: student_id.to_string(),
            fee_structure_id: fee_structure_id.to_string(),
            amount,
            payment_method: PaymentMethod::Cash,
            payment_date: on,
            transaction_reference: None,
            receipt_number: None,
            recorded_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub payments: Vec<FeePayment>,
    /// Part of the amount that found no later period to settle.
    pub credit_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub fee_structure_id: String,
    pub net_fee: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
}

const FS_COLS: &str = "id, programme_id, academic_year_id, year, semester, tuition_fee,
    registration_fee, examination_fee, other_fees, government_subsidy, scholarship_amount";

const PAYMENT_COLS: &str = "id, student_id, fee_structure_id, amount_paid, payment_date,
    payment_method, payment_status, receipt_number, transaction_reference, allocation,
    source_receipt";

fn structure_from_row(r: &Row<'_>) -> rusqlite::Result<FeeStructure> {
    let mut fs = FeeStructure {
        id: r.get(0)?,
        programme_id: r.get(1)?,
        academic_year_id: r.get(2)?,
        year: r.get(3)?,
        semester: r.get(4)?,
        tuition_fee: money::col(r, 5)?,
        registration_fee: money::col(r, 6)?,
        examination_fee: money::col(r, 7)?,
        other_fees: money::col(r, 8)?,
        government_subsidy: money::col(r, 9)?,
        scholarship_amount: money::col(r, 10)?,
        net_fee: Decimal::ZERO,
    };
    fs.net_fee = fs.compute_net();
    Ok(fs)
}

fn payment_from_row(r: &Row<'_>) -> rusqlite::Result<FeePayment> {
    Ok(FeePayment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        fee_structure_id: r.get(2)?,
        amount_paid: money::col(r, 3)?,
        payment_date: r.get(4)?,
        payment_method: r.get(5)?,
        payment_status: r.get(6)?,
        receipt_number: r.get(7)?,
        transaction_reference: r.get(8)?,
        allocation: r.get(9)?,
        source_receipt: r.get(10)?,
    })
}

pub fn fee_structure(conn: &Connection, id: &str) -> ErpResult<FeeStructure> {
    conn.query_row(
        &format!("SELECT {FS_COLS} FROM fee_structures WHERE id = ?"),
        [id],
        structure_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("fee structure", id))
}

fn find_structure(
    conn: &Connection,
    programme_id: &str,
    academic_year_id: &str,
    year: i64,
    semester: i64,
) -> ErpResult<Option<FeeStructure>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {FS_COLS} FROM fee_structures
                 WHERE programme_id = ? AND academic_year_id = ? AND year = ? AND semester = ?"
            ),
            params![programme_id, academic_year_id, year, semester],
            structure_from_row,
        )
        .optional()?)
}

pub fn payment(conn: &Connection, id: &str) -> ErpResult<FeePayment> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLS} FROM fee_payments WHERE id = ?"),
        [id],
        payment_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("fee payment", id))
}

fn payments_on(conn: &Connection, student_id: &str, fee_structure_id: &str) -> ErpResult<Vec<FeePayment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLS} FROM fee_payments
         WHERE student_id = ? AND fee_structure_id = ?
         ORDER BY payment_date, created_at, rowid"
    ))?;
    let rows = stmt
        .query_map(params![student_id, fee_structure_id], payment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Sum of completed payments the student holds against one fee structure.
fn paid_on(conn: &Connection, student_id: &str, fee_structure_id: &str) -> ErpResult<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT amount_paid FROM fee_payments
         WHERE student_id = ? AND fee_structure_id = ? AND payment_status = 'completed'",
    )?;
    let amounts = stmt
        .query_map(params![student_id, fee_structure_id], |r| money::col(r, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(money::sum(amounts))
}

pub fn create_structure(conn: &Connection, now: NaiveDateTime, input: NewFeeStructure) -> ErpResult<FeeStructure> {
    let programme = catalog::programme(conn, &input.programme_id)?;
    catalog::academic_year(conn, &input.academic_year_id)?;
    if !(1..=programme.duration_years).contains(&input.year) {
        return Err(ErpError::validation(
            "year",
            format!("must be between 1 and {}", programme.duration_years),
        ));
    }
    if !(1..=programme.semesters_per_year).contains(&input.semester) {
        return Err(ErpError::validation(
            "semester",
            format!("must be between 1 and {}", programme.semesters_per_year),
        ));
    }
    for (field, value) in [
        ("tuitionFee", input.tuition_fee),
        ("registrationFee", input.registration_fee),
        ("examinationFee", input.examination_fee),
        ("otherFees", input.other_fees),
        ("governmentSubsidy", input.government_subsidy),
        ("scholarshipAmount", input.scholarship_amount),
    ] {
        if value < Decimal::ZERO {
            return Err(ErpError::validation(field, "must not be negative"));
        }
    }
    let charges = input.tuition_fee + input.registration_fee + input.examination_fee + input.other_fees;
    if input.government_subsidy + input.scholarship_amount > charges {
        return Err(ErpError::validation(
            "scholarshipAmount",
            "subsidy and scholarship exceed the charges",
        ));
    }

    let id = db::new_id();
    conn.execute(
        "INSERT INTO fee_structures(id, programme_id, academic_year_id, year, semester, tuition_fee,
            registration_fee, examination_fee, other_fees, government_subsidy, scholarship_amount,
            created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            input.programme_id,
            input.academic_year_id,
            input.year,
            input.semester,
            money::to_sql(input.tuition_fee),
            money::to_sql(input.registration_fee),
            money::to_sql(input.examination_fee),
            money::to_sql(input.other_fees),
            money::to_sql(input.government_subsidy),
            money::to_sql(input.scholarship_amount),
            now
        ],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "fee structure",
            key: format!("{} Y{}S{}", programme.code, input.year, input.semester),
        })
    })?;
    fee_structure(conn, &id)
}

fn receipt(prefix: &str, on: NaiveDate) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}-{}", prefix, on.format("%Y%m%d"), &hex[..8])
}

struct Allocated<'a> {
    student_id: &'a str,
    fee_structure_id: &'a str,
    amount: Decimal,
    allocation: Allocation,
    receipt_number: String,
    source_receipt: Option<&'a str>,
}

fn insert_payment(
    conn: &Connection,
    now: NaiveDateTime,
    input: &PaymentInput,
    row: Allocated<'_>,
) -> ErpResult<FeePayment> {
    let id = db::new_id();
    let receipt_number = row.receipt_number;
    conn.execute(
        "INSERT INTO fee_payments(id, student_id, fee_structure_id, amount_paid, payment_date,
            payment_method, payment_status, receipt_number, transaction_reference, allocation,
            source_receipt, recorded_by, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, 'completed', ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            row.student_id,
            row.fee_structure_id,
            money::to_sql(row.amount),
            input.payment_date,
            input.payment_method,
            receipt_number,
            input.transaction_reference,
            row.allocation,
            row.source_receipt,
            input.recorded_by,
            now,
            now
        ],
    )
    .map_err(|e| map_unique(e, || Conflict::DuplicateReceipt(receipt_number.clone())))?;
    payment(conn, &id)
}

/// The (academic year, year, semester) after `at`, or `None` past the end of
/// the programme or of the configured calendar.
fn next_period(
    conn: &Connection,
    at: &(AcademicYear, i64, i64),
    semesters_per_year: i64,
    duration_years: i64,
) -> ErpResult<Option<(AcademicYear, i64, i64)>> {
    let (ay, year, semester) = at;
    if *semester < semesters_per_year {
        return Ok(Some((ay.clone(), *year, semester + 1)));
    }
    if *year >= duration_years {
        return Ok(None);
    }
    Ok(catalog::next_academic_year(conn, ay)?.map(|next| (next, year + 1, 1)))
}

/// Records a completed payment on `fee_structure_id` and forwards whatever it
/// does not owe into later periods, all in one IMMEDIATE transaction.
pub fn record_payment(conn: &mut Connection, now: NaiveDateTime, input: PaymentInput) -> ErpResult<PaymentOutcome> {
    if input.amount <= Decimal::ZERO {
        return Err(ErpError::validation("amount", "must be greater than zero"));
    }
    if money::round2(input.amount) != input.amount {
        return Err(ErpError::validation("amount", "at most two decimal places"));
    }
    if let Some(r) = &input.receipt_number {
        if r.trim().is_empty() {
            return Err(ErpError::validation("receiptNumber", "must not be blank"));
        }
    }

    let tx = db::immediate(conn)?;
    let student = people::student(&tx, &input.student_id)?;
    let fs0 = fee_structure(&tx, &input.fee_structure_id)?;
    if fs0.programme_id != student.programme_id {
        return Err(ErpError::validation(
            "feeStructureId",
            "fee structure belongs to another programme",
        ));
    }
    let programme = catalog::programme(&tx, &fs0.programme_id)?;

    let owed = (fs0.net_fee - paid_on(&tx, &student.id, &fs0.id)?).max(Decimal::ZERO);
    let apply = input.amount.min(owed);
    let direct = insert_payment(
        &tx,
        now,
        &input,
        Allocated {
            student_id: &student.id,
            fee_structure_id: &fs0.id,
            amount: apply,
            allocation: Allocation::Direct,
            receipt_number: input
                .receipt_number
                .clone()
                .unwrap_or_else(|| receipt("RCT", input.payment_date)),
            source_receipt: None,
        },
    )?;
    let source = direct.receipt_number.clone();
    let mut payments = vec![direct];
    let mut surplus = input.amount - apply;

    let mut last_fs = fs0.id.clone();
    let mut at = (catalog::academic_year(&tx, &fs0.academic_year_id)?, fs0.year, fs0.semester);
    while surplus > Decimal::ZERO {
        let Some(next) = next_period(&tx, &at, programme.semesters_per_year, programme.duration_years)? else {
            break;
        };
        at = next;
        let Some(fs) = find_structure(&tx, &programme.id, &at.0.id, at.1, at.2)? else {
            continue;
        };
        last_fs = fs.id.clone();
        let owed = (fs.net_fee - paid_on(&tx, &student.id, &fs.id)?).max(Decimal::ZERO);
        let apply = surplus.min(owed);
        if apply <= Decimal::ZERO {
            continue;
        }
        payments.push(insert_payment(
            &tx,
            now,
            &input,
            Allocated {
                student_id: &student.id,
                fee_structure_id: &fs.id,
                amount: apply,
                allocation: Allocation::Forwarded,
                receipt_number: receipt("ADV", input.payment_date),
                source_receipt: Some(&source),
            },
        )?);
        surplus -= apply;
    }

    let credit_balance = surplus;
    if surplus > Decimal::ZERO {
        payments.push(insert_payment(
            &tx,
            now,
            &input,
            Allocated {
                student_id: &student.id,
                fee_structure_id: &last_fs,
                amount: surplus,
                allocation: Allocation::Credit,
                receipt_number: receipt("ADV", input.payment_date),
                source_receipt: Some(&source),
            },
        )?);
    }
    tx.commit()?;

    info!(
        student = %student.student_id,
        receipt = %source,
        amount = %input.amount,
        rows = payments.len(),
        credit = %credit_balance,
        "fee payment recorded"
    );
    Ok(PaymentOutcome {
        payments,
        credit_balance,
    })
}

/// Net fee less completed payments. Negative when the student holds credit.
pub fn balance(conn: &Connection, student_id: &str, fee_structure_id: &str) -> ErpResult<Balance> {
    people::student(conn, student_id)?;
    let fs = fee_structure(conn, fee_structure_id)?;
    let paid = paid_on(conn, student_id, &fs.id)?;
    Ok(Balance {
        fee_structure_id: fs.id,
        net_fee: fs.net_fee,
        paid,
        balance: money::round2(fs.net_fee - paid),
    })
}

/// Amount due and completed payments for one programme year.
pub fn year_totals(
    conn: &Connection,
    student_id: &str,
    programme_id: &str,
    academic_year_id: &str,
    year: i64,
) -> ErpResult<(Decimal, Decimal)> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FS_COLS} FROM fee_structures
         WHERE programme_id = ? AND academic_year_id = ? AND year = ?"
    ))?;
    let structures = stmt
        .query_map(params![programme_id, academic_year_id, year], structure_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut due = Decimal::ZERO;
    let mut paid = Decimal::ZERO;
    for fs in &structures {
        due += fs.net_fee;
        paid += paid_on(conn, student_id, &fs.id)?;
    }
    Ok((money::round2(due), money::round2(paid)))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    pub fee_structure_id: String,
    pub year: i64,
    pub semester: i64,
    pub net_fee: Decimal,
    pub paid: Decimal,
    pub balance: Decimal,
    pub payments: Vec<FeePayment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub student_id: String,
    pub academic_year_id: String,
    pub lines: Vec<StatementLine>,
    pub total_due: Decimal,
    pub total_paid: Decimal,
    pub total_balance: Decimal,
}

pub fn statement(conn: &Connection, student_id: &str, academic_year_id: &str) -> ErpResult<Statement> {
    let student = people::student(conn, student_id)?;
    catalog::academic_year(conn, academic_year_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {FS_COLS} FROM fee_structures
         WHERE programme_id = ? AND academic_year_id = ?
         ORDER BY year, semester"
    ))?;
    let structures = stmt
        .query_map(params![student.programme_id, academic_year_id], structure_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lines = Vec::with_capacity(structures.len());
    for fs in structures {
        let paid = paid_on(conn, student_id, &fs.id)?;
        lines.push(StatementLine {
            payments: payments_on(conn, student_id, &fs.id)?,
            balance: money::round2(fs.net_fee - paid),
            fee_structure_id: fs.id,
            year: fs.year,
            semester: fs.semester,
            net_fee: fs.net_fee,
            paid,
        });
    }
    let total_due = money::sum(lines.iter().map(|l| l.net_fee));
    let total_paid = money::sum(lines.iter().map(|l| l.paid));
    Ok(Statement {
        student_id: student.id,
        academic_year_id: academic_year_id.to_string(),
        total_balance: money::round2(total_due - total_paid),
        lines,
        total_due,
        total_paid,
    })
}

/// Moves a payment along pending -> completed/failed, completed -> refunded.
/// Rows are never deleted.
pub fn set_payment_status(
    conn: &Connection,
    now: NaiveDateTime,
    payment_id: &str,
    status: PaymentStatus,
) -> ErpResult<FeePayment> {
    let current = payment(conn, payment_id)?;
    if !current.payment_status.can_become(status) {
        return Err(StateViolation::InvalidTransition {
            entity: "fee payment",
            from: current.payment_status.to_string(),
            to: status.to_string(),
        }
        .into());
    }
    conn.execute(
        "UPDATE fee_payments SET payment_status = ?, updated_at = ? WHERE id = ?",
        params![status, now, payment_id],
    )?;
    info!(receipt = %current.receipt_number, from = %current.payment_status, to = %status, "fee payment status changed");
    payment(conn, payment_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, SponsorType};
    use crate::testkit::{dec, Campus};

    /// One 50 000 structure for each of the six BSCS periods, year N in AY N.
    fn six_periods(campus: &Campus) -> Vec<FeeStructure> {
        let years = [&campus.ay1, &campus.ay2, &campus.ay3];
        let mut out = Vec::new();
        for (i, ay) in years.iter().enumerate() {
            for sem in 1..=2 {
                out.push(
                    create_structure(
                        &campus.conn,
                        campus.now(),
                        NewFeeStructure::flat(&campus.programme, ay, i as i64 + 1, sem, dec("50000")),
                    )
                    .expect("fee structure"),
                );
            }
        }
        out
    }

    #[test]
    fn overpayment_cascades_forward() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/010/2024", Gender::Male, SponsorType::SelfSponsored);
        let fs = six_periods(&campus);
        let now = campus.now();

        let out = record_payment(
            &mut campus.conn,
            now,
            PaymentInput::cash(&s, &fs[0].id, dec("125000"), now.date()),
        )
        .expect("pay");

        let amounts: Vec<Decimal> = out.payments.iter().map(|p| p.amount_paid).collect();
        assert_eq!(amounts, vec![dec("50000"), dec("50000"), dec("25000")]);
        assert_eq!(money::sum(amounts), dec("125000"));
        assert!(out.payments[0].receipt_number.starts_with("RCT-20250110-"));
        assert_eq!(out.payments[0].receipt_number.len(), "RCT-20250110-".len() + 8);
        assert!(out.payments[1].receipt_number.starts_with("ADV-20250110-"));
        assert_eq!(out.payments[2].allocation, Allocation::Forwarded);
        assert_eq!(
            out.payments[2].source_receipt.as_deref(),
            Some(out.payments[0].receipt_number.as_str())
        );
        assert_eq!(out.credit_balance, Decimal::ZERO);

        let balances: Vec<Decimal> = fs
            .iter()
            .map(|f| balance(&campus.conn, &s, &f.id).expect("balance").balance)
            .collect();
        assert_eq!(
            balances,
            ["0", "0", "25000", "50000", "50000", "50000"].map(dec).to_vec()
        );
    }

    #[test]
    fn surplus_past_the_programme_becomes_credit() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/011/2024", Gender::Female, SponsorType::SelfSponsored);
        let fs = six_periods(&campus);
        let now = campus.now();
        let out = record_payment(
            &mut campus.conn,
            now,
            PaymentInput::cash(&s, &fs[4].id, dec("120000.50"), now.date()),
        )
        .expect("pay");
        assert_eq!(out.payments.len(), 3);
        assert_eq!(out.payments[2].allocation, Allocation::Credit);
        assert_eq!(out.payments[2].fee_structure_id, fs[5].id);
        assert_eq!(out.credit_balance, dec("20000.50"));
        assert_eq!(
            money::sum(out.payments.iter().map(|p| p.amount_paid)),
            dec("120000.50")
        );
        assert_eq!(balance(&campus.conn, &s, &fs[5].id).expect("balance").balance, dec("-20000.50"));
    }

    #[test]
    fn missing_period_is_skipped() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/012/2024", Gender::Male, SponsorType::SelfSponsored);
        let now = campus.now();
        let first = create_structure(
            &campus.conn,
            now,
            NewFeeStructure::flat(&campus.programme, &campus.ay1, 1, 1, dec("1000")),
        )
        .expect("fs");
        let later = create_structure(
            &campus.conn,
            now,
            NewFeeStructure::flat(&campus.programme, &campus.ay2, 2, 1, dec("1000")),
        )
        .expect("fs");
        let out = record_payment(
            &mut campus.conn,
            now,
            PaymentInput::cash(&s, &first.id, dec("1500"), now.date()),
        )
        .expect("pay");
        assert_eq!(out.payments[1].fee_structure_id, later.id);
        assert_eq!(out.payments[1].amount_paid, dec("500"));
    }

    #[test]
    fn zero_amount_and_duplicate_receipt_are_rejected() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/013/2024", Gender::Male, SponsorType::SelfSponsored);
        let fs = six_periods(&campus);
        let now = campus.now();

        let e = record_payment(
            &mut campus.conn,
            now,
            PaymentInput::cash(&s, &fs[0].id, Decimal::ZERO, now.date()),
        )
        .expect_err("zero");
        assert_eq!(e.kind(), "ValidationError");

        let mut input = PaymentInput::cash(&s, &fs[0].id, dec("100"), now.date());
        input.receipt_number = Some("RCT-MANUAL-1".into());
        record_payment(&mut campus.conn, now, input.clone()).expect("first");
        let e = record_payment(&mut campus.conn, now, input).expect_err("duplicate");
        assert_eq!(e.kind(), "DuplicateReceipt");
        assert_eq!(e.details()["receiptNumber"], "RCT-MANUAL-1");
        assert_eq!(balance(&campus.conn, &s, &fs[0].id).expect("balance").paid, dec("100"));
    }

    #[test]
    fn refund_removes_payment_from_balance() {
        let mut campus = Campus::new();
        let s = campus.add_student("CS/014/2024", Gender::Male, SponsorType::SelfSponsored);
        let fs = six_periods(&campus);
        let now = campus.now();
        let out = record_payment(
            &mut campus.conn,
            now,
            PaymentInput::cash(&s, &fs[0].id, dec("20000"), now.date()),
        )
        .expect("pay");
        let id = out.payments[0].id.clone();

        let e = set_payment_status(&campus.conn, now, &id, PaymentStatus::Pending).expect_err("back");
        assert_eq!(e.kind(), "InvalidTransition");
        set_payment_status(&campus.conn, now, &id, PaymentStatus::Refunded).expect("refund");
        assert_eq!(balance(&campus.conn, &s, &fs[0].id).expect("balance").balance, dec("50000"));

        let st = statement(&campus.conn, &s, &campus.ay1).expect("statement");
        assert_eq!(st.lines.len(), 2);
        assert_eq!(st.lines[0].payments.len(), 1);
        assert_eq!(st.total_due, dec("100000"));
        assert_eq!(st.total_paid, Decimal::ZERO);
    }

    #[test]
    fn net_fee_subtracts_subsidy_and_scholarship() {
        let campus = Campus::new();
        let mut input = NewFeeStructure::flat(&campus.programme, &campus.ay1, 1, 1, dec("60000"));
        input.registration_fee = dec("2000");
        input.government_subsidy = dec("30000");
        input.scholarship_amount = dec("5000.50");
        let fs = create_structure(&campus.conn, campus.now(), input.clone()).expect("fs");
        assert_eq!(fs.net_fee, dec("26999.50"));
        let e = create_structure(&campus.conn, campus.now(), input).expect_err("dup");
        assert_eq!(e.kind(), "Duplicate");
    }

    #[test]
    fn discounts_above_the_charges_are_rejected() {
        let campus = Campus::new();
        let mut input = NewFeeStructure::flat(&campus.programme, &campus.ay1, 1, 1, dec("40000"));
        input.government_subsidy = dec("30000");
        input.scholarship_amount = dec("10000.01");
        let e = create_structure(&campus.conn, campus.now(), input.clone()).expect_err("over-discounted");
        assert_eq!(e.code(), "validation_error");

        input.scholarship_amount = dec("10000");
        let fs = create_structure(&campus.conn, campus.now(), input).expect("fully covered");
        assert_eq!(fs.net_fee, Decimal::ZERO);
    }
}
