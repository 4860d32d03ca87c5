use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db;
use crate::error::{map_unique, Conflict, ErpError, ErpResult, RuleViolation, StateViolation};
use crate::model::{LoanStatus, ResourceType};
use crate::money;
use crate::people;

pub const MAX_RENEWALS: i64 = 2;

/// Loan period and daily fine, from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct LoanPolicy {
    pub loan_days: i64,
    pub fine_per_day: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub resource_type: ResourceType,
    pub total_copies: i64,
    pub available_copies: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    pub resource_type: ResourceType,
    pub total_copies: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: String,
    pub resource_id: String,
    pub user_id: String,
    pub borrowed_on: NaiveDate,
    pub due_date: NaiveDate,
    pub returned_on: Option<NaiveDate>,
    pub renewals: i64,
    pub fine_amount: Decimal,
    pub status: LoanStatus,
}

fn resource_from_row(r: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: r.get(0)?,
        title: r.get(1)?,
        author: r.get(2)?,
        isbn: r.get(3)?,
        resource_type: r.get(4)?,
        total_copies: r.get(5)?,
        available_copies: r.get(6)?,
    })
}

fn loan_from_row(r: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: r.get(0)?,
        resource_id: r.get(1)?,
        user_id: r.get(2)?,
        borrowed_on: r.get(3)?,
        due_date: r.get(4)?,
        returned_on: r.get(5)?,
        renewals: r.get(6)?,
        fine_amount: money::col(r, 7)?,
        status: r.get(8)?,
    })
}

pub fn resource(conn: &Connection, id: &str) -> ErpResult<Resource> {
    conn.query_row(
        "SELECT id, title, author, isbn, resource_type, total_copies, available_copies
         FROM library_resources WHERE id = ?",
        [id],
        resource_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("library resource", id))
}

pub fn loan(conn: &Connection, id: &str) -> ErpResult<Loan> {
    conn.query_row(
        "SELECT id, resource_id, user_id, borrowed_on, due_date, returned_on, renewals,
                fine_amount, status
         FROM library_loans WHERE id = ?",
        [id],
        loan_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("library loan", id))
}

pub fn add_resource(conn: &Connection, now: NaiveDateTime, input: NewResource) -> ErpResult<Resource> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(ErpError::validation("title", "required"));
    }
    if input.total_copies < 0 {
        return Err(ErpError::validation("totalCopies", "must not be negative"));
    }
    let isbn = input
        .isbn
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let id = db::new_id();
    conn.execute(
        "INSERT INTO library_resources(id, title, author, isbn, resource_type, total_copies,
            available_copies, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![id, title, input.author, isbn, input.resource_type, input.total_copies, input.total_copies, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "library resource",
            key: isbn.clone().unwrap_or_default(),
        })
    })?;
    resource(conn, &id)
}

pub fn borrow(
    conn: &mut Connection,
    today: NaiveDate,
    policy: LoanPolicy,
    resource_id: &str,
    user_id: &str,
) -> ErpResult<Loan> {
    let tx = db::immediate(conn)?;
    let res = resource(&tx, resource_id)?;
    let user = people::user(&tx, user_id)?;
    if !user.is_active {
        return Err(StateViolation::Other("user account is inactive".to_string()).into());
    }
    if res.available_copies <= 0 {
        return Err(RuleViolation::NoCopiesAvailable.into());
    }
    tx.execute(
        "UPDATE library_resources SET available_copies = available_copies - 1 WHERE id = ?",
        [&res.id],
    )?;
    let id = db::new_id();
    tx.execute(
        "INSERT INTO library_loans(id, resource_id, user_id, borrowed_on, due_date, renewals,
            fine_amount, status)
         VALUES(?, ?, ?, ?, ?, 0, '0.00', 'active')",
        params![id, res.id, user.id, today, today + Duration::days(policy.loan_days)],
    )?;
    let out = loan(&tx, &id)?;
    tx.commit()?;
    info!(resource = %res.title, user = %user.username, due = %out.due_date, "library loan opened");
    Ok(out)
}

/// Extends an active, not yet overdue loan by one loan period.
pub fn renew(conn: &Connection, today: NaiveDate, policy: LoanPolicy, loan_id: &str) -> ErpResult<Loan> {
    let current = loan(conn, loan_id)?;
    if current.status != LoanStatus::Active {
        return Err(StateViolation::Other("loan has been returned".to_string()).into());
    }
    if today > current.due_date {
        return Err(StateViolation::Other("overdue loans cannot be renewed".to_string()).into());
    }
    if current.renewals >= MAX_RENEWALS {
        return Err(RuleViolation::Other(format!("at most {MAX_RENEWALS} renewals per loan")).into());
    }
    conn.execute(
        "UPDATE library_loans SET due_date = ?, renewals = renewals + 1 WHERE id = ?",
        params![current.due_date + Duration::days(policy.loan_days), loan_id],
    )?;
    loan(conn, loan_id)
}

pub fn fine_for(due: NaiveDate, returned: NaiveDate, fine_per_day: Decimal) -> Decimal {
    let days = (returned - due).num_days().max(0);
    money::round2(fine_per_day * Decimal::from(days))
}

pub fn return_loan(conn: &mut Connection, today: NaiveDate, policy: LoanPolicy, loan_id: &str) -> ErpResult<Loan> {
    let tx = db::immediate(conn)?;
    let current = loan(&tx, loan_id)?;
    if current.status != LoanStatus::Active {
        return Err(StateViolation::Other("loan has already been returned".to_string()).into());
    }
    let fine = fine_for(current.due_date, today, policy.fine_per_day);
    tx.execute(
        "UPDATE library_loans SET returned_on = ?, fine_amount = ?, status = 'returned' WHERE id = ?",
        params![today, money::to_sql(fine), loan_id],
    )?;
    tx.execute(
        "UPDATE library_resources SET available_copies = available_copies + 1 WHERE id = ?",
        [&current.resource_id],
    )?;
    let out = loan(&tx, loan_id)?;
    tx.commit()?;
    info!(loan_id, fine = %fine, "library loan returned");
    Ok(out)
}
