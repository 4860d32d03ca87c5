use serde::Deserialize;

use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::library::{self, LoanPolicy, NewResource};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BorrowParams {
    resource_id: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoanParams {
    loan_id: String,
}

fn loan_policy(state: &AppState) -> LoanPolicy {
    LoanPolicy {
        loan_days: state.config.library_loan_days,
        fine_per_day: state.config.library_fine_per_day,
    }
}

fn handle_add_resource(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewResource = params(req)?;
    let now = state.clock.now();
    to_json(library::add_resource(db(state)?, now, input)?)
}

fn handle_borrow(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: BorrowParams = params(req)?;
    let (today, policy) = (state.clock.today(), loan_policy(state));
    to_json(library::borrow(db_mut(state)?, today, policy, &p.resource_id, &p.user_id)?)
}

fn handle_renew(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: LoanParams = params(req)?;
    let (today, policy) = (state.clock.today(), loan_policy(state));
    to_json(library::renew(db(state)?, today, policy, &p.loan_id)?)
}

fn handle_return(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: LoanParams = params(req)?;
    let (today, policy) = (state.clock.today(), loan_policy(state));
    to_json(library::return_loan(db_mut(state)?, today, policy, &p.loan_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "library.addResource" => handle_add_resource(state, req),
        "library.borrow" => handle_borrow(state, req),
        "library.renew" => handle_renew(state, req),
        "library.return" => handle_return(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
