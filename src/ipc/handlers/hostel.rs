use serde::Deserialize;
use serde_json::json;

use crate::hostel::{self, BookingRequest, HostelPaymentInput, NewHostel, NewRoom};
use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::MaintenanceStatus;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterializeParams {
    hostel_id: String,
    academic_year_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaintenanceParams {
    bed_id: String,
    status: MaintenanceStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingParams {
    booking_id: String,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    approved_by: Option<String>,
}

fn handle_create_hostel(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewHostel = params(req)?;
    let now = state.clock.now();
    to_json(hostel::create_hostel(db(state)?, now, input)?)
}

fn handle_add_room(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewRoom = params(req)?;
    let now = state.clock.now();
    to_json(hostel::add_room(db(state)?, now, input)?)
}

fn handle_materialize_beds(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: MaterializeParams = params(req)?;
    let now = state.clock.now();
    let beds = hostel::materialize_beds(db_mut(state)?, now, &p.hostel_id, &p.academic_year_id)?;
    Ok(json!({ "beds": beds }))
}

fn handle_set_bed_maintenance(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: MaintenanceParams = params(req)?;
    to_json(hostel::set_bed_maintenance(db_mut(state)?, &p.bed_id, p.status)?)
}

fn handle_book(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: BookingRequest = params(req)?;
    let now = state.clock.now();
    to_json(hostel::book(db_mut(state)?, now, input)?)
}

fn handle_approve(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BookingParams = params(req)?;
    let approver = p
        .approved_by
        .or_else(|| req.principal.as_ref().map(|pr| pr.user_id.clone()));
    let now = state.clock.now();
    to_json(hostel::approve(db_mut(state)?, now, &p.booking_id, approver.as_deref())?)
}

fn handle_reject(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BookingParams = params(req)?;
    let now = state.clock.now();
    to_json(hostel::reject(db_mut(state)?, now, &p.booking_id, p.remarks.as_deref())?)
}

fn handle_cancel(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BookingParams = params(req)?;
    let now = state.clock.now();
    to_json(hostel::cancel(db_mut(state)?, now, &p.booking_id, p.remarks.as_deref())?)
}

fn handle_check_in(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BookingParams = params(req)?;
    let now = state.clock.now();
    to_json(hostel::check_in(db_mut(state)?, now, &p.booking_id)?)
}

fn handle_check_out(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BookingParams = params(req)?;
    let now = state.clock.now();
    to_json(hostel::check_out(db_mut(state)?, now, &p.booking_id)?)
}

fn handle_record_payment(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: HostelPaymentInput = params(req)?;
    let now = state.clock.now();
    to_json(hostel::record_payment(db_mut(state)?, now, input)?)
}

fn handle_occupancy(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: MaterializeParams = params(req)?;
    to_json(hostel::occupancy(db(state)?, &p.hostel_id, &p.academic_year_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "hostel.createHostel" => handle_create_hostel(state, req),
        "hostel.addRoom" => handle_add_room(state, req),
        "hostel.materializeBeds" => handle_materialize_beds(state, req),
        "hostel.setBedMaintenance" => handle_set_bed_maintenance(state, req),
        "hostel.book" => handle_book(state, req),
        "hostel.approve" => handle_approve(state, req),
        "hostel.reject" => handle_reject(state, req),
        "hostel.cancel" => handle_cancel(state, req),
        "hostel.checkIn" => handle_check_in(state, req),
        "hostel.checkOut" => handle_check_out(state, req),
        "hostel.recordPayment" => handle_record_payment(state, req),
        "hostel.occupancy" => handle_occupancy(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
