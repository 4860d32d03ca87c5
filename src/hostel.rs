//! Hostels, rooms, per-year beds and the booking lifecycle.
//!
//! `beds.is_available` is derived from bookings: every transition that can
//! change it recomputes it inside the same IMMEDIATE transaction, and a
//! partial unique index keeps a bed from being held by two live bookings.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog;
use crate::db;
use crate::error::{is_unique_violation, map_unique, Conflict, ErpError, ErpResult, RuleViolation, StateViolation};
use crate::model::{
    BookingStatus, HostelPaymentStatus, HostelType, MaintenanceStatus, PaymentMethod, StudentStatus,
};
use crate::money;
use crate::people;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hostel {
    pub id: String,
    pub name: String,
    pub hostel_type: HostelType,
    pub warden_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub hostel_id: String,
    pub room_number: String,
    pub floor: i64,
    pub capacity: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bed {
    pub id: String,
    pub room_id: String,
    pub academic_year_id: String,
    pub bed_position: i64,
    pub bed_number: String,
    pub is_available: bool,
    pub maintenance_status: MaintenanceStatus,
}

impl Bed {
    pub fn bookable(&self) -> bool {
        self.is_available && self.maintenance_status.bookable()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub student_id: String,
    pub bed_id: String,
    pub academic_year_id: String,
    pub booking_status: BookingStatus,
    pub payment_status: HostelPaymentStatus,
    pub booking_fee: Decimal,
    pub amount_paid: Decimal,
    pub booking_date: NaiveDate,
    pub approved_by: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHostel {
    pub name: String,
    pub hostel_type: HostelType,
    #[serde(default)]
    pub warden_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub hostel_id: String,
    pub room_number: String,
    #[serde(default)]
    pub floor: i64,
    pub capacity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub student_id: String,
    pub bed_id: String,
    #[serde(default)]
    pub booking_fee: Decimal,
    #[serde(default)]
    pub remarks: Option<String>,
}

const BED_COLS: &str = "id, room_id, academic_year_id, bed_position, bed_number, is_available,
    maintenance_status";

const BOOKING_COLS: &str = "id, student_id, bed_id, academic_year_id, booking_status,
    payment_status, booking_fee, amount_paid, booking_date, approved_by, approval_date,
    check_in_date, check_out_date, remarks";

fn bed_from_row(r: &Row<'_>) -> rusqlite::Result<Bed> {
    Ok(Bed {
        id: r.get(0)?,
        room_id: r.get(1)?,
        academic_year_id: r.get(2)?,
        bed_position: r.get(3)?,
        bed_number: r.get(4)?,
        is_available: r.get(5)?,
        maintenance_status: r.get(6)?,
    })
}

fn booking_from_row(r: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: r.get(0)?,
        student_id: r.get(1)?,
        bed_id: r.get(2)?,
        academic_year_id: r.get(3)?,
        booking_status: r.get(4)?,
        payment_status: r.get(5)?,
        booking_fee: money::col(r, 6)?,
        amount_paid: money::col(r, 7)?,
        booking_date: r.get(8)?,
        approved_by: r.get(9)?,
        approval_date: r.get(10)?,
        check_in_date: r.get(11)?,
        check_out_date: r.get(12)?,
        remarks: r.get(13)?,
    })
}

pub fn hostel(conn: &Connection, id: &str) -> ErpResult<Hostel> {
    conn.query_row(
        "SELECT id, name, hostel_type, warden_id, is_active FROM hostels WHERE id = ?",
        [id],
        |r| {
            Ok(Hostel {
                id: r.get(0)?,
                name: r.get(1)?,
                hostel_type: r.get(2)?,
                warden_id: r.get(3)?,
                is_active: r.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("hostel", id))
}

pub fn room(conn: &Connection, id: &str) -> ErpResult<Room> {
    conn.query_row(
        "SELECT id, hostel_id, room_number, floor, capacity, is_active FROM rooms WHERE id = ?",
        [id],
        |r| {
            Ok(Room {
                id: r.get(0)?,
                hostel_id: r.get(1)?,
                room_number: r.get(2)?,
                floor: r.get(3)?,
                capacity: r.get(4)?,
                is_active: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("room", id))
}

pub fn bed(conn: &Connection, id: &str) -> ErpResult<Bed> {
    conn.query_row(&format!("SELECT {BED_COLS} FROM beds WHERE id = ?"), [id], bed_from_row)
        .optional()?
        .ok_or_else(|| ErpError::not_found("bed", id))
}

pub fn booking(conn: &Connection, id: &str) -> ErpResult<Booking> {
    conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM hostel_bookings WHERE id = ?"),
        [id],
        booking_from_row,
    )
    .optional()?
    .ok_or_else(|| ErpError::not_found("hostel booking", id))
}

pub fn create_hostel(conn: &Connection, now: NaiveDateTime, input: NewHostel) -> ErpResult<Hostel> {
    let name = input.name.trim().to_string();
    if name.chars().filter(|c| c.is_ascii_alphabetic()).count() < 3 {
        return Err(ErpError::validation("name", "needs at least three letters"));
    }
    if let Some(warden) = &input.warden_id {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM staff WHERE id = ?)",
            [warden],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(ErpError::validation("wardenId", "unknown staff member"));
        }
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO hostels(id, name, hostel_type, warden_id, is_active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        params![id, name, input.hostel_type, input.warden_id, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "hostel",
            key: name.clone(),
        })
    })?;
    hostel(conn, &id)
}

pub fn add_room(conn: &Connection, now: NaiveDateTime, input: NewRoom) -> ErpResult<Room> {
    hostel(conn, &input.hostel_id)?;
    let number = input.room_number.trim().to_string();
    if number.is_empty() {
        return Err(ErpError::validation("roomNumber", "required"));
    }
    if !(1..=8).contains(&input.capacity) {
        return Err(ErpError::validation("capacity", "must be between 1 and 8"));
    }
    let id = db::new_id();
    conn.execute(
        "INSERT INTO rooms(id, hostel_id, room_number, floor, capacity, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        params![id, input.hostel_id, number, input.floor, input.capacity, now],
    )
    .map_err(|e| {
        map_unique(e, || Conflict::Duplicate {
            entity: "room",
            key: number.clone(),
        })
    })?;
    room(conn, &id)
}

/// `NYA` + `101` + `2` + `24`: hostel prefix, room, position, start year.
pub fn bed_number(hostel_name: &str, room_number: &str, position: i64, ay_start: NaiveDate) -> String {
    let prefix: String = hostel_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    format!("{}{}{}{:02}", prefix, room_number, position, ay_start.year().rem_euclid(100))
}

/// Creates the missing beds of every active room of a hostel for one
/// academic year. Returns the beds created.
pub fn materialize_beds(
    conn: &mut Connection,
    now: NaiveDateTime,
    hostel_id: &str,
    academic_year_id: &str,
) -> ErpResult<Vec<Bed>> {
    let tx = db::immediate(conn)?;
    let h = hostel(&tx, hostel_id)?;
    let ay = catalog::academic_year(&tx, academic_year_id)?;
    let rooms: Vec<(String, String, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT id, room_number, capacity FROM rooms
             WHERE hostel_id = ? AND is_active = 1
             ORDER BY room_number",
        )?;
        let rows = stmt
            .query_map([hostel_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut created = Vec::new();
    for (room_id, room_number, capacity) in rooms {
        for position in 1..=capacity {
            let id = db::new_id();
            let number = bed_number(&h.name, &room_number, position, ay.start_date);
            let n = tx.execute(
                "INSERT INTO beds(id, room_id, academic_year_id, bed_position, bed_number,
                    is_available, maintenance_status, created_at)
                 VALUES(?, ?, ?, ?, ?, 1, 'good', ?)
                 ON CONFLICT(room_id, academic_year_id, bed_position) DO NOTHING",
                params![id, room_id, ay.id, position, number, now],
            )?;
            if n == 1 {
                created.push(bed(&tx, &id)?);
            }
        }
    }
    tx.commit()?;
    info!(hostel = %h.name, year = %ay.year, beds = created.len(), "beds materialized");
    Ok(created)
}

pub fn set_bed_maintenance(conn: &mut Connection, bed_id: &str, status: MaintenanceStatus) -> ErpResult<Bed> {
    let tx = db::immediate(conn)?;
    bed(&tx, bed_id)?;
    tx.execute(
        "UPDATE beds SET maintenance_status = ? WHERE id = ?",
        params![status, bed_id],
    )?;
    let out = bed(&tx, bed_id)?;
    tx.commit()?;
    info!(bed = %out.bed_number, status = %status, "bed maintenance updated");
    Ok(out)
}

/// Recomputes `is_available` from the bookings that hold the bed.
fn sync_bed(conn: &Connection, bed_id: &str) -> ErpResult<()> {
    conn.execute(
        "UPDATE beds SET is_available = NOT EXISTS(
            SELECT 1 FROM hostel_bookings
            WHERE bed_id = ?1 AND booking_status IN ('approved', 'checked_in'))
         WHERE id = ?1",
        [bed_id],
    )?;
    Ok(())
}

fn ineligible(reason: impl Into<String>) -> ErpError {
    RuleViolation::IneligibleForHostel { reason: reason.into() }.into()
}

fn bed_unavailable(bed_id: &str) -> ErpError {
    StateViolation::BedUnavailable {
        bed_id: bed_id.to_string(),
    }
    .into()
}

/// Files a pending booking for the bed's academic year.
pub fn book(conn: &mut Connection, now: NaiveDateTime, input: BookingRequest) -> ErpResult<Booking> {
    if input.booking_fee < Decimal::ZERO {
        return Err(ErpError::validation("bookingFee", "must not be negative"));
    }
    let tx = db::immediate(conn)?;
    let student = people::student(&tx, &input.student_id)?;
    if student.status != StudentStatus::Active {
        return Err(ineligible(format!("student is {}", student.status)));
    }
    if student.current_year != 1 {
        return Err(ineligible("hostel places are reserved for first-year students"));
    }
    let b = bed(&tx, &input.bed_id)?;
    let r = room(&tx, &b.room_id)?;
    let h = hostel(&tx, &r.hostel_id)?;
    if !h.hostel_type.admits(student.gender) {
        return Err(ineligible(format!("{} hostel does not admit this student", h.hostel_type)));
    }
    if !b.bookable() || !r.is_active || !h.is_active {
        warn!(bed = %b.bed_number, "booking refused, bed unavailable");
        return Err(bed_unavailable(&b.id));
    }

    let id = db::new_id();
    tx.execute(
        "INSERT INTO hostel_bookings(id, student_id, bed_id, academic_year_id, booking_status,
            payment_status, booking_fee, amount_paid, booking_date, remarks, updated_at)
         VALUES(?, ?, ?, ?, 'pending', 'pending', ?, '0.00', ?, ?, ?)",
        params![
            id,
            student.id,
            b.id,
            b.academic_year_id,
            money::to_sql(input.booking_fee),
            now.date(),
            input.remarks,
            now
        ],
    )
    .map_err(|e| map_unique(e, || Conflict::DuplicateBooking))?;
    let out = booking(&tx, &id)?;
    tx.commit()?;
    info!(student = %student.student_id, bed = %b.bed_number, "hostel booking filed");
    Ok(out)
}

fn transition(
    conn: &mut Connection,
    now: NaiveDateTime,
    booking_id: &str,
    to: BookingStatus,
    actor: Option<&str>,
    remarks: Option<&str>,
) -> ErpResult<Booking> {
    let tx = db::immediate(conn)?;
    let current = booking(&tx, booking_id)?;
    if !current.booking_status.can_become(to) {
        return Err(StateViolation::InvalidTransition {
            entity: "hostel booking",
            from: current.booking_status.to_string(),
            to: to.to_string(),
        }
        .into());
    }
    if to.holds_bed() && !current.booking_status.holds_bed() {
        let b = bed(&tx, &current.bed_id)?;
        if !b.bookable() {
            return Err(bed_unavailable(&b.id));
        }
    }

    let today = now.date();
    let update = match to {
        BookingStatus::Approved => tx.execute(
            "UPDATE hostel_bookings
             SET booking_status = ?, approved_by = ?, approval_date = ?, updated_at = ?
             WHERE id = ?",
            params![to, actor, today, now, booking_id],
        ),
        BookingStatus::CheckedIn => tx.execute(
            "UPDATE hostel_bookings SET booking_status = ?, check_in_date = ?, updated_at = ?
             WHERE id = ?",
            params![to, today, now, booking_id],
        ),
        BookingStatus::CheckedOut => tx.execute(
            "UPDATE hostel_bookings SET booking_status = ?, check_out_date = ?, updated_at = ?
             WHERE id = ?",
            params![to, today, now, booking_id],
        ),
        _ => tx.execute(
            "UPDATE hostel_bookings
             SET booking_status = ?, remarks = COALESCE(?, remarks), updated_at = ?
             WHERE id = ?",
            params![to, remarks, now, booking_id],
        ),
    };
    if let Err(e) = update {
        if is_unique_violation(&e) {
            return Err(bed_unavailable(&current.bed_id));
        }
        return Err(e.into());
    }
    sync_bed(&tx, &current.bed_id)?;
    let out = booking(&tx, booking_id)?;
    tx.commit()?;
    info!(booking_id, from = %current.booking_status, to = %to, "hostel booking moved");
    Ok(out)
}

pub fn approve(conn: &mut Connection, now: NaiveDateTime, booking_id: &str, approved_by: Option<&str>) -> ErpResult<Booking> {
    transition(conn, now, booking_id, BookingStatus::Approved, approved_by, None)
}

pub fn reject(conn: &mut Connection, now: NaiveDateTime, booking_id: &str, remarks: Option<&str>) -> ErpResult<Booking> {
    transition(conn, now, booking_id, BookingStatus::Rejected, None, remarks)
}

pub fn cancel(conn: &mut Connection, now: NaiveDateTime, booking_id: &str, remarks: Option<&str>) -> ErpResult<Booking> {
    transition(conn, now, booking_id, BookingStatus::Cancelled, None, remarks)
}

pub fn check_in(conn: &mut Connection, now: NaiveDateTime, booking_id: &str) -> ErpResult<Booking> {
    transition(conn, now, booking_id, BookingStatus::CheckedIn, None, None)
}

pub fn check_out(conn: &mut Connection, now: NaiveDateTime, booking_id: &str) -> ErpResult<Booking> {
    transition(conn, now, booking_id, BookingStatus::CheckedOut, None, None)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostelPaymentInput {
    pub booking_id: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub received_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostelPayment {
    pub id: String,
    pub booking_id: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub receipt_number: String,
    pub booking: Booking,
}

/// Next value of a named counter for one period, taken under the write lock
/// the caller's transaction already holds.
fn next_sequence(conn: &Connection, name: &str, period: &str) -> ErpResult<i64> {
    Ok(conn.query_row(
        "INSERT INTO receipt_sequences(name, period, last_value) VALUES(?, ?, 1)
         ON CONFLICT(name, period) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
        params![name, period],
        |r| r.get(0),
    )?)
}

pub fn payment_status_for(fee: Decimal, paid: Decimal) -> HostelPaymentStatus {
    if paid >= fee && paid > Decimal::ZERO {
        HostelPaymentStatus::Paid
    } else if paid > Decimal::ZERO {
        HostelPaymentStatus::Partial
    } else {
        HostelPaymentStatus::Pending
    }
}

pub fn record_payment(conn: &mut Connection, now: NaiveDateTime, input: HostelPaymentInput) -> ErpResult<HostelPayment> {
    if input.amount <= Decimal::ZERO {
        return Err(ErpError::validation("amount", "must be greater than zero"));
    }
    let tx = db::immediate(conn)?;
    let current = booking(&tx, &input.booking_id)?;
    if matches!(current.booking_status, BookingStatus::Rejected | BookingStatus::Cancelled) {
        return Err(StateViolation::Other(format!(
            "cannot take payment on a {} booking",
            current.booking_status
        ))
        .into());
    }
    let year = input.payment_date.year();
    let seq = next_sequence(&tx, "HPR", &year.to_string())?;
    let receipt_number = format!("HPR{year}{seq:05}");
    let id = db::new_id();
    tx.execute(
        "INSERT INTO hostel_payments(id, booking_id, amount, payment_date, payment_method,
            receipt_number, transaction_reference, received_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            current.id,
            money::to_sql(input.amount),
            input.payment_date,
            input.payment_method,
            receipt_number,
            input.transaction_reference,
            input.received_by,
            now
        ],
    )
    .map_err(|e| map_unique(e, || Conflict::DuplicateReceipt(receipt_number.clone())))?;

    let paid = {
        let mut stmt = tx.prepare("SELECT amount FROM hostel_payments WHERE booking_id = ?")?;
        let amounts = stmt
            .query_map([&current.id], |r| money::col(r, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        money::sum(amounts)
    };
    tx.execute(
        "UPDATE hostel_bookings SET amount_paid = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        params![
            money::to_sql(paid),
            payment_status_for(current.booking_fee, paid),
            now,
            current.id
        ],
    )?;
    let updated = booking(&tx, &current.id)?;
    tx.commit()?;
    info!(receipt = %receipt_number, booking_id = %current.id, amount = %input.amount, "hostel payment recorded");
    Ok(HostelPayment {
        id,
        booking_id: updated.id.clone(),
        amount: money::round2(input.amount),
        payment_date: input.payment_date,
        payment_method: input.payment_method,
        receipt_number,
        booking: updated,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    pub total_beds: i64,
    pub occupied_beds: i64,
    pub available_beds: i64,
    pub out_of_service_beds: i64,
    pub rooms_with_free_bed: i64,
}

pub fn occupancy(conn: &Connection, hostel_id: &str, academic_year_id: &str) -> ErpResult<Occupancy> {
    hostel(conn, hostel_id)?;
    let beds: Vec<(String, Bed)> = {
        let mut stmt = conn.prepare(
            "SELECT r.id, b.id, b.room_id, b.academic_year_id, b.bed_position, b.bed_number,
                    b.is_available, b.maintenance_status
             FROM beds b JOIN rooms r ON r.id = b.room_id
             WHERE r.hostel_id = ? AND b.academic_year_id = ?",
        )?;
        let rows = stmt
            .query_map(params![hostel_id, academic_year_id], |r| {
                let bed = Bed {
                    id: r.get(1)?,
                    room_id: r.get(2)?,
                    academic_year_id: r.get(3)?,
                    bed_position: r.get(4)?,
                    bed_number: r.get(5)?,
                    is_available: r.get(6)?,
                    maintenance_status: r.get(7)?,
                };
                Ok((r.get(0)?, bed))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut free_rooms: Vec<&str> = beds
        .iter()
        .filter(|(_, b)| b.bookable())
        .map(|(room, _)| room.as_str())
        .collect();
    free_rooms.sort_unstable();
    free_rooms.dedup();
    let count = |f: &dyn Fn(&Bed) -> bool| beds.iter().filter(|(_, b)| f(b)).count() as i64;
    Ok(Occupancy {
        total_beds: beds.len() as i64,
        occupied_beds: count(&|b| !b.is_available),
        available_beds: count(&|b| b.bookable()),
        out_of_service_beds: count(&|b| b.is_available && !b.maintenance_status.bookable()),
        rooms_with_free_bed: free_rooms.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, SponsorType};
    use crate::testkit::{dec, Campus};

    struct Block {
        hostel: Hostel,
        beds: Vec<Bed>,
    }

    fn boys_block(campus: &mut Campus, rooms: &[(&str, i64)]) -> Block {
        let now = campus.now();
        let hostel = create_hostel(
            &campus.conn,
            now,
            NewHostel {
                name: "Nyati Hall".into(),
                hostel_type: HostelType::Boys,
                warden_id: None,
            },
        )
        .expect("hostel");
        for (number, capacity) in rooms {
            add_room(
                &campus.conn,
                now,
                NewRoom {
                    hostel_id: hostel.id.clone(),
                    room_number: number.to_string(),
                    floor: 1,
                    capacity: *capacity,
                },
            )
            .expect("room");
        }
        let ay = campus.ay1.clone();
        let beds = materialize_beds(&mut campus.conn, now, &hostel.id, &ay).expect("beds");
        Block { hostel, beds }
    }

    fn request(student: &str, bed: &str) -> BookingRequest {
        BookingRequest {
            student_id: student.to_string(),
            bed_id: bed.to_string(),
            booking_fee: dec("6000"),
            remarks: None,
        }
    }

    #[test]
    fn bed_numbers_follow_hostel_room_position_year() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 2)]);
        let numbers: Vec<&str> = block.beds.iter().map(|b| b.bed_number.as_str()).collect();
        assert_eq!(numbers, vec!["NYA101124", "NYA101224"]);
        let again = materialize_beds(&mut campus.conn, campus.clock.now(), &block.hostel.id, &campus.ay1)
            .expect("idempotent");
        assert!(again.is_empty());
    }

    #[test]
    fn hostels_sharing_a_name_prefix_both_get_beds() {
        let mut campus = Campus::new();
        let first = boys_block(&mut campus, &[("101", 1)]);
        let now = campus.now();
        let second = create_hostel(
            &campus.conn,
            now,
            NewHostel {
                name: "Nyayo Hall".into(),
                hostel_type: HostelType::Boys,
                warden_id: None,
            },
        )
        .expect("hostel");
        add_room(
            &campus.conn,
            now,
            NewRoom {
                hostel_id: second.id.clone(),
                room_number: "101".into(),
                floor: 1,
                capacity: 1,
            },
        )
        .expect("room");
        let ay = campus.ay1.clone();
        let beds = materialize_beds(&mut campus.conn, now, &second.id, &ay).expect("second hostel beds");
        assert_eq!(beds.len(), 1);
        assert_eq!(beds[0].bed_number, first.beds[0].bed_number);
        assert_ne!(beds[0].id, first.beds[0].id);
        let occ = occupancy(&campus.conn, &second.id, &ay).expect("occupancy");
        assert_eq!(occ.total_beds, 1);
    }

    #[test]
    fn approval_takes_the_bed_and_cancel_releases_it() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 1)]);
        let bed_id = block.beds[0].id.clone();
        let s = campus.add_student("CS/020/2024", Gender::Male, SponsorType::Government);
        let now = campus.now();

        let b = book(&mut campus.conn, now, request(&s, &bed_id)).expect("book");
        assert_eq!(b.booking_status, BookingStatus::Pending);
        assert!(bed(&campus.conn, &bed_id).expect("bed").is_available);

        approve(&mut campus.conn, now, &b.id, Some("warden")).expect("approve");
        assert!(!bed(&campus.conn, &bed_id).expect("bed").is_available);
        let other = campus.add_student("CS/021/2024", Gender::Male, SponsorType::Government);
        let e = book(&mut campus.conn, now, request(&other, &bed_id)).expect_err("held");
        assert_eq!(e.kind(), "BedUnavailable");

        cancel(&mut campus.conn, now, &b.id, Some("changed plans")).expect("cancel");
        assert!(bed(&campus.conn, &bed_id).expect("bed").is_available);
        book(&mut campus.conn, now, request(&other, &bed_id)).expect("rebook freed bed");
    }

    #[test]
    fn full_lifecycle_and_illegal_edges() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 1)]);
        let bed_id = block.beds[0].id.clone();
        let s = campus.add_student("CS/022/2024", Gender::Male, SponsorType::Government);
        let now = campus.now();
        let b = book(&mut campus.conn, now, request(&s, &bed_id)).expect("book");

        let e = check_in(&mut campus.conn, now, &b.id).expect_err("not approved");
        assert_eq!(e.kind(), "InvalidTransition");
        approve(&mut campus.conn, now, &b.id, None).expect("approve");
        let inn = check_in(&mut campus.conn, now, &b.id).expect("check in");
        assert_eq!(inn.check_in_date, Some(now.date()));
        let e = cancel(&mut campus.conn, now, &b.id, None).expect_err("checked in");
        assert_eq!(e.kind(), "InvalidTransition");
        assert!(!bed(&campus.conn, &bed_id).expect("bed").is_available);
        check_out(&mut campus.conn, now, &b.id).expect("check out");
        assert!(bed(&campus.conn, &bed_id).expect("bed").is_available);
    }

    #[test]
    fn eligibility_rules() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 2)]);
        let now = campus.now();
        let girl = campus.add_student("CS/023/2024", Gender::Female, SponsorType::Government);
        let e = book(&mut campus.conn, now, request(&girl, &block.beds[0].id)).expect_err("gender");
        assert_eq!(e.kind(), "IneligibleForHostel");

        let senior = campus.add_student("CS/024/2023", Gender::Male, SponsorType::Government);
        campus.place(&senior, 2, 1);
        let e = book(&mut campus.conn, now, request(&senior, &block.beds[0].id)).expect_err("year");
        assert_eq!(e.kind(), "IneligibleForHostel");

        let s = campus.add_student("CS/025/2024", Gender::Male, SponsorType::Government);
        book(&mut campus.conn, now, request(&s, &block.beds[0].id)).expect("first");
        let e = book(&mut campus.conn, now, request(&s, &block.beds[1].id)).expect_err("second");
        assert_eq!(e.kind(), "DuplicateBooking");
    }

    #[test]
    fn maintenance_blocks_an_available_bed() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 2)]);
        let bed_id = block.beds[0].id.clone();
        let s = campus.add_student("CS/026/2024", Gender::Male, SponsorType::Government);
        set_bed_maintenance(&mut campus.conn, &bed_id, MaintenanceStatus::UnderMaintenance).expect("maintenance");
        let now = campus.now();
        let e = book(&mut campus.conn, now, request(&s, &bed_id)).expect_err("maintenance");
        assert_eq!(e.kind(), "BedUnavailable");

        set_bed_maintenance(&mut campus.conn, &bed_id, MaintenanceStatus::NeedsRepair).expect("repair");
        book(&mut campus.conn, now, request(&s, &bed_id)).expect("needs_repair is bookable");
    }

    #[test]
    fn payments_number_receipts_and_settle_status() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 1)]);
        let s = campus.add_student("CS/027/2024", Gender::Male, SponsorType::Government);
        let now = campus.now();
        let b = book(&mut campus.conn, now, request(&s, &block.beds[0].id)).expect("book");
        let pay = |campus: &mut Campus, amount: &str| {
            record_payment(
                &mut campus.conn,
                now,
                HostelPaymentInput {
                    booking_id: b.id.clone(),
                    amount: dec(amount),
                    payment_method: PaymentMethod::Mpesa,
                    payment_date: now.date(),
                    transaction_reference: None,
                    received_by: None,
                },
            )
            .expect("pay")
        };
        let first = pay(&mut campus, "2500");
        assert_eq!(first.receipt_number, "HPR202500001");
        assert_eq!(first.booking.payment_status, HostelPaymentStatus::Partial);
        let second = pay(&mut campus, "3500");
        assert_eq!(second.receipt_number, "HPR202500002");
        assert_eq!(second.booking.amount_paid, dec("6000"));
        assert_eq!(second.booking.payment_status, HostelPaymentStatus::Paid);
    }

    #[test]
    fn occupancy_counts() {
        let mut campus = Campus::new();
        let block = boys_block(&mut campus, &[("101", 2), ("102", 1)]);
        let s = campus.add_student("CS/028/2024", Gender::Male, SponsorType::Government);
        let now = campus.now();
        let room_102_bed = block
            .beds
            .iter()
            .find(|b| b.bed_number.starts_with("NYA102"))
            .expect("room 102")
            .id
            .clone();
        let b = book(&mut campus.conn, now, request(&s, &room_102_bed)).expect("book");
        approve(&mut campus.conn, now, &b.id, None).expect("approve");
        set_bed_maintenance(&mut campus.conn, &block.beds[0].id, MaintenanceStatus::OutOfOrder).expect("ooo");

        let occ = occupancy(&campus.conn, &block.hostel.id, &campus.ay1).expect("occupancy");
        assert_eq!(
            occ,
            Occupancy {
                total_beds: 3,
                occupied_beds: 1,
                available_beds: 1,
                out_of_service_beds: 1,
                rooms_with_free_bed: 1,
            }
        );
    }

    #[test]
    fn concurrent_double_booking_has_one_winner() {
        let dir = Campus::temp_dir("unierpd-hostel");
        let mut campus = Campus::on_disk(&dir);
        let block = boys_block(&mut campus, &[("101", 1)]);
        let bed_id = block.beds[0].id.clone();
        let s = campus.add_student("CS/029/2024", Gender::Male, SponsorType::Government);
        let now = campus.now();

        let results: Vec<ErpResult<Booking>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let dir = dir.clone();
                    let req = request(&s, &bed_id);
                    scope.spawn(move || {
                        let mut conn = db::open_db(&dir).expect("second connection");
                        book(&mut conn, now, req)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("thread")).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = results.into_iter().find_map(|r| r.err()).expect("one loser");
        assert!(matches!(loser.kind(), "DuplicateBooking" | "BedUnavailable"));
        let live: i64 = campus
            .conn
            .query_row(
                "SELECT COUNT(*) FROM hostel_bookings WHERE student_id = ?",
                [&s],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(live, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
