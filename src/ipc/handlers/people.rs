use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentStatus;
use crate::people::{self, NewLecturer, NewStaff, NewStudent, NewUser};

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct StatusParams {
    id: String,
    status: StudentStatus,
}

fn handle_create_user(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewUser = params(req)?;
    let now = state.clock.now();
    to_json(people::create_user(db(state)?, now, input)?)
}

fn handle_create_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewStudent = params(req)?;
    let now = state.clock.now();
    to_json(people::create_student(db(state)?, now, input)?)
}

fn handle_create_lecturer(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewLecturer = params(req)?;
    let now = state.clock.now();
    to_json(people::create_lecturer(db(state)?, now, input)?)
}

fn handle_create_staff(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewStaff = params(req)?;
    let now = state.clock.now();
    let id = people::create_staff(db(state)?, now, input)?;
    Ok(json!({ "id": id }))
}

fn handle_get_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: IdParams = params(req)?;
    to_json(people::student(db(state)?, &p.id)?)
}

fn handle_set_student_status(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StatusParams = params(req)?;
    let now = state.clock.now();
    to_json(people::set_student_status(db(state)?, now, &p.id, p.status)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "people.createUser" => handle_create_user(state, req),
        "people.createStudent" => handle_create_student(state, req),
        "people.createLecturer" => handle_create_lecturer(state, req),
        "people.createStaff" => handle_create_staff(state, req),
        "people.getStudent" => handle_get_student(state, req),
        "people.setStudentStatus" => handle_set_student_status(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
