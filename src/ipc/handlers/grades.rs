use serde::Deserialize;
use serde_json::json;

use crate::grading::{self, GradeInput};
use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemesterGpaParams {
    student_id: String,
    semester_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    student_id: String,
}

fn handle_record(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: GradeInput = params(req)?;
    let now = state.clock.now();
    let write = grading::record_grade(db_mut(state)?, now, input)?;
    Ok(json!({
        "grade": write.grade,
        "created": write.created,
        "progression": write.progression,
    }))
}

fn handle_semester_gpa(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SemesterGpaParams = params(req)?;
    to_json(grading::semester_gpa(db(state)?, &p.student_id, &p.semester_id)?)
}

fn handle_cumulative_gpa(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StudentParams = params(req)?;
    to_json(grading::cumulative_gpa(db(state)?, &p.student_id)?)
}

fn handle_transcript(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: StudentParams = params(req)?;
    to_json(grading::transcript(db(state)?, &p.student_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.record" => handle_record(state, req),
        "grades.semesterGpa" => handle_semester_gpa(state, req),
        "grades.cumulativeGpa" => handle_cumulative_gpa(state, req),
        "grades.transcript" => handle_transcript(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
