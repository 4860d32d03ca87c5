use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::teaching::{self, NewTeachingAssignment};

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    lecturer_id: Option<String>,
    #[serde(default)]
    semester_id: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

fn handle_assign(state: &mut AppState, req: &Request) -> HandlerResult {
    let mut input: NewTeachingAssignment = params(req)?;
    if input.assigned_by.is_none() {
        input.assigned_by = req.principal.as_ref().map(|p| p.user_id.clone());
    }
    let now = state.clock.now();
    to_json(teaching::assign(db(state)?, now, input)?)
}

fn handle_deactivate(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: IdParams = params(req)?;
    to_json(teaching::deactivate(db(state)?, &p.id)?)
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ListParams = params(req)?;
    let rows = teaching::list(
        db(state)?,
        p.lecturer_id.as_deref(),
        p.semester_id.as_deref(),
        p.include_inactive,
    )?;
    Ok(json!({ "assignments": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teaching.assign" => handle_assign(state, req),
        "teaching.deactivate" => handle_deactivate(state, req),
        "teaching.list" => handle_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
