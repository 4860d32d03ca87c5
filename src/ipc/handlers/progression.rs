use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::progression;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailuresParams {
    #[serde(default)]
    include_resolved: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryParams {
    failure_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SweepParams {
    semester_id: String,
}

fn handle_failures(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: FailuresParams = params(req)?;
    let failures = progression::failures(db(state)?, p.include_resolved)?;
    Ok(json!({ "failures": failures }))
}

fn handle_retry(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: RetryParams = params(req)?;
    let now = state.clock.now();
    to_json(progression::retry(db_mut(state)?, now, &p.failure_id)?)
}

fn handle_sweep(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SweepParams = params(req)?;
    let now = state.clock.now();
    let lines = progression::sweep_semester(db_mut(state)?, now, &p.semester_id)?;
    let failed = lines.iter().filter(|l| l.error.is_some()).count();
    Ok(json!({ "students": lines, "failed": failed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "progression.failures" => handle_failures(state, req),
        "progression.retry" => handle_retry(state, req),
        "progression.sweepSemester" => handle_sweep(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
