use serde::Deserialize;

use crate::fees::{self, NewFeeStructure, PaymentInput};
use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::PaymentStatus;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceParams {
    student_id: String,
    fee_structure_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementParams {
    student_id: String,
    academic_year_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusParams {
    payment_id: String,
    status: PaymentStatus,
}

fn handle_create_structure(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewFeeStructure = params(req)?;
    let now = state.clock.now();
    to_json(fees::create_structure(db(state)?, now, input)?)
}

fn handle_record_payment(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: PaymentInput = params(req)?;
    let now = state.clock.now();
    to_json(fees::record_payment(db_mut(state)?, now, input)?)
}

fn handle_balance(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BalanceParams = params(req)?;
    to_json(fees::balance(db(state)?, &p.student_id, &p.fee_structure_id)?)
}

fn handle_statement(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StatementParams = params(req)?;
    to_json(fees::statement(db(state)?, &p.student_id, &p.academic_year_id)?)
}

fn handle_set_payment_status(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StatusParams = params(req)?;
    let now = state.clock.now();
    to_json(fees::set_payment_status(db(state)?, now, &p.payment_id, p.status)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "fees.createStructure" => handle_create_structure(state, req),
        "fees.recordPayment" => handle_record_payment(state, req),
        "fees.balance" => handle_balance(state, req),
        "fees.statement" => handle_statement(state, req),
        "fees.setPaymentStatus" => handle_set_payment_status(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
