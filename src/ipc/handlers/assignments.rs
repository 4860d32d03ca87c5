use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::assignments::{self, NewAssignment, SubmissionInput};
use crate::ipc::helpers::{acting_lecturer, db, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishParams {
    assignment_id: String,
    #[serde(default = "published")]
    published: bool,
}

fn published() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    student_id: String,
    #[serde(default)]
    semester_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeParams {
    submission_id: String,
    marks: Decimal,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnParams {
    submission_id: String,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentParams {
    assignment_id: String,
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewAssignment = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    let now = state.clock.now();
    to_json(assignments::create(db(state)?, now, &lecturer_id, input)?)
}

fn handle_publish(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: PublishParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    let now = state.clock.now();
    to_json(assignments::publish(
        db(state)?,
        now,
        &lecturer_id,
        &p.assignment_id,
        p.published,
    )?)
}

fn handle_list_for_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StudentParams = params(req)?;
    let rows = assignments::list_for_student(db(state)?, &p.student_id, p.semester_id.as_deref())?;
    Ok(json!({ "assignments": rows }))
}

fn handle_submit(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: SubmissionInput = params(req)?;
    let now = state.clock.now();
    to_json(assignments::submit(db(state)?, now, input)?)
}

fn handle_grade(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: GradeParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    let now = state.clock.now();
    to_json(assignments::grade(
        db(state)?,
        now,
        &lecturer_id,
        &p.submission_id,
        p.marks,
        p.feedback.as_deref(),
    )?)
}

fn handle_return(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ReturnParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    to_json(assignments::return_submission(
        db(state)?,
        &lecturer_id,
        &p.submission_id,
        p.feedback.as_deref(),
    )?)
}

fn handle_stats(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: AssignmentParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    to_json(assignments::stats(db(state)?, &lecturer_id, &p.assignment_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.create" => handle_create(state, req),
        "assignments.publish" => handle_publish(state, req),
        "assignments.listForStudent" => handle_list_for_student(state, req),
        "assignments.submit" => handle_submit(state, req),
        "assignments.grade" => handle_grade(state, req),
        "assignments.return" => handle_return(state, req),
        "assignments.stats" => handle_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
