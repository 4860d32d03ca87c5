use serde::Deserialize;
use serde_json::json;

use crate::attendance::{self, NewSession, NewSlot};
use crate::error::ErpError;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{acting_lecturer, db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceStatus, UserType};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkParams {
    token: String,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideParams {
    session_id: String,
    student_id: String,
    status: AttendanceStatus,
    #[serde(default)]
    remarks: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: String,
}

fn handle_create_slot(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewSlot = params(req)?;
    let now = state.clock.now();
    to_json(attendance::create_slot(db(state)?, now, input)?)
}

fn handle_create_session(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewSession = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    let now = state.clock.now();
    let session = attendance::create_session(db_mut(state)?, now, &lecturer_id, input)?;
    let link = state.config.attendance_link(&session.session_token);
    Ok(json!({ "session": session, "link": link }))
}

/// A student principal may only mark for itself; other callers name the student.
fn marking_student(req: &Request, named: Option<String>) -> Result<String, HandlerErr> {
    match req.principal.as_ref() {
        Some(p) if p.user_type == UserType::Student => {
            let own = p.linked_profile.clone().ok_or_else(|| {
                ErpError::PermissionDenied("principal has no student profile".to_string())
            })?;
            if named.as_deref().is_some_and(|n| n != own) {
                return Err(ErpError::PermissionDenied(
                    "students can only mark their own attendance".to_string(),
                )
                .into());
            }
            Ok(own)
        }
        _ => named.ok_or_else(|| HandlerErr::new("bad_params", "missing studentId")),
    }
}

fn handle_mark(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: MarkParams = params(req)?;
    let student_id = marking_student(req, p.student_id)?;
    let now = state.clock.now();
    to_json(attendance::mark(
        db(state)?,
        now,
        &p.token,
        &student_id,
        p.ip_address.as_deref(),
    )?)
}

fn handle_override(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: OverrideParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    let now = state.clock.now();
    to_json(attendance::override_mark(
        db(state)?,
        now,
        &lecturer_id,
        &p.session_id,
        &p.student_id,
        p.status,
        p.remarks.as_deref(),
    )?)
}

fn handle_roster(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SessionParams = params(req)?;
    let conn = db(state)?;
    let session = attendance::session(conn, &p.session_id)?;
    let students = attendance::roster(conn, &session.id)?;
    let present = students
        .iter()
        .filter(|l| matches!(l.status, AttendanceStatus::Present | AttendanceStatus::Late))
        .count();
    Ok(json!({ "session": session, "students": students, "present": present }))
}

fn handle_close_session(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SessionParams = params(req)?;
    let lecturer_id = acting_lecturer(req)?;
    to_json(attendance::close_session(db(state)?, &lecturer_id, &p.session_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "timetable.createSlot" => handle_create_slot(state, req),
        "attendance.createSession" => handle_create_session(state, req),
        "attendance.mark" => handle_mark(state, req),
        "attendance.override" => handle_override(state, req),
        "attendance.roster" => handle_roster(state, req),
        "attendance.closeSession" => handle_close_session(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
