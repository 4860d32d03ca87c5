use serde::Deserialize;
use serde_json::json;

use crate::enrollment;
use crate::ipc::helpers::{db, db_mut, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterParams {
    student_id: String,
    semester_id: String,
    course_ids: Vec<String>,
    #[serde(default)]
    is_audit: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    student_id: String,
    #[serde(default)]
    semester_id: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeactivateParams {
    enrollment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckParams {
    student_id: String,
    semester_id: String,
    course_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableParams {
    student_id: String,
    semester_id: String,
}

fn handle_register(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: RegisterParams = params(req)?;
    let now = state.clock.now();
    let enrollments = enrollment::register(
        db_mut(state)?,
        now,
        &p.student_id,
        &p.semester_id,
        &p.course_ids,
        p.is_audit,
    )?;
    Ok(json!({ "enrollments": enrollments }))
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ListParams = params(req)?;
    let enrollments = enrollment::list(
        db(state)?,
        &p.student_id,
        p.semester_id.as_deref(),
        p.include_inactive,
    )?;
    Ok(json!({ "enrollments": enrollments }))
}

fn handle_deactivate(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: DeactivateParams = params(req)?;
    let now = state.clock.now();
    let e = enrollment::deactivate(db(state)?, now, &p.enrollment_id)?;
    Ok(json!({ "enrollment": e }))
}

fn handle_check_prerequisites(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: CheckParams = params(req)?;
    let reports =
        enrollment::check_prerequisites(db(state)?, &p.student_id, &p.semester_id, &p.course_ids)?;
    let all_satisfied = reports.iter().all(|r| r.satisfied);
    Ok(json!({ "courses": reports, "allSatisfied": all_satisfied }))
}

fn handle_available(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: AvailableParams = params(req)?;
    let courses = enrollment::available(db(state)?, &p.student_id, &p.semester_id)?;
    Ok(json!({ "courses": courses }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollment.register" => handle_register(state, req),
        "enrollment.list" => handle_list(state, req),
        "enrollment.deactivate" => handle_deactivate(state, req),
        "enrollment.checkPrerequisites" => handle_check_prerequisites(state, req),
        "enrollment.available" => handle_available(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
