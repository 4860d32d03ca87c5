use serde::Deserialize;
use serde_json::json;

use crate::catalog::{self, NewAcademicYear, NewCourse, NewProgramme, NewSemester};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db, db_mut, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FacultyParams {
    code: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentParams {
    faculty_id: String,
    code: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrerequisiteParams {
    course_id: String,
    prerequisite_id: String,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacementParams {
    programme_id: String,
    course_id: String,
    year: i64,
    semester: i64,
    #[serde(default = "default_true")]
    is_mandatory: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurriculumParams {
    programme_id: String,
    #[serde(default)]
    year: Option<i64>,
    #[serde(default)]
    semester: Option<i64>,
}

fn handle_create_academic_year(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewAcademicYear = params(req)?;
    let now = state.clock.now();
    to_json(catalog::create_academic_year(db(state)?, now, input)?)
}

fn handle_set_current_academic_year(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: IdParams = params(req)?;
    to_json(catalog::set_current_academic_year(db_mut(state)?, &p.id)?)
}

fn handle_create_semester(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewSemester = params(req)?;
    let now = state.clock.now();
    to_json(catalog::create_semester(db(state)?, now, input)?)
}

fn handle_set_current_semester(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: IdParams = params(req)?;
    to_json(catalog::set_current_semester(db_mut(state)?, &p.id)?)
}

fn handle_current(state: &mut AppState, _req: &Request) -> HandlerResult {
    let (academic_year, semester) = catalog::current(db(state)?)?;
    Ok(json!({ "academicYear": academic_year, "semester": semester }))
}

fn handle_create_faculty(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: FacultyParams = params(req)?;
    let now = state.clock.now();
    let id = catalog::create_faculty(db(state)?, now, &p.code, &p.name)?;
    Ok(json!({ "id": id }))
}

fn handle_create_department(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: DepartmentParams = params(req)?;
    let now = state.clock.now();
    let id = catalog::create_department(db(state)?, now, &p.faculty_id, &p.code, &p.name)?;
    Ok(json!({ "id": id }))
}

fn handle_create_programme(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewProgramme = params(req)?;
    let now = state.clock.now();
    to_json(catalog::create_programme(db(state)?, now, input)?)
}

fn handle_create_course(state: &mut AppState, req: &Request) -> HandlerResult {
    let input: NewCourse = params(req)?;
    let now = state.clock.now();
    to_json(catalog::create_course(db(state)?, now, input)?)
}

fn handle_add_prerequisite(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: PrerequisiteParams = params(req)?;
    let conn = db_mut(state)?;
    catalog::add_prerequisite(conn, &p.course_id, &p.prerequisite_id)?;
    prerequisite_list(conn, &p.course_id)
}

fn handle_remove_prerequisite(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: PrerequisiteParams = params(req)?;
    let conn = db(state)?;
    let removed = catalog::remove_prerequisite(conn, &p.course_id, &p.prerequisite_id)?;
    let mut out = prerequisite_list(conn, &p.course_id)?;
    out["removed"] = json!(removed);
    Ok(out)
}

fn prerequisite_list(conn: &rusqlite::Connection, course_id: &str) -> HandlerResult {
    let prerequisites: Vec<serde_json::Value> = catalog::prerequisites(conn, course_id)?
        .into_iter()
        .map(|(id, code)| json!({ "id": id, "code": code }))
        .collect();
    Ok(json!({ "courseId": course_id, "prerequisites": prerequisites }))
}

fn handle_add_programme_course(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: PlacementParams = params(req)?;
    let id = catalog::add_programme_course(
        db(state)?,
        &p.programme_id,
        &p.course_id,
        p.year,
        p.semester,
        p.is_mandatory,
    )?;
    Ok(json!({ "id": id }))
}

fn handle_curriculum(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: CurriculumParams = params(req)?;
    let slot = match (p.year, p.semester) {
        (Some(y), Some(s)) => Some((y, s)),
        (None, None) => None,
        _ => {
            return Err(HandlerErr::new(
                "bad_params",
                "year and semester must be given together",
            ))
        }
    };
    let entries = catalog::curriculum(db(state)?, &p.programme_id, slot)?;
    Ok(json!({ "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "catalog.createAcademicYear" => handle_create_academic_year(state, req),
        "catalog.setCurrentAcademicYear" => handle_set_current_academic_year(state, req),
        "catalog.createSemester" => handle_create_semester(state, req),
        "catalog.setCurrentSemester" => handle_set_current_semester(state, req),
        "catalog.current" => handle_current(state, req),
        "catalog.createFaculty" => handle_create_faculty(state, req),
        "catalog.createDepartment" => handle_create_department(state, req),
        "catalog.createProgramme" => handle_create_programme(state, req),
        "catalog.createCourse" => handle_create_course(state, req),
        "catalog.addPrerequisite" => handle_add_prerequisite(state, req),
        "catalog.removePrerequisite" => handle_remove_prerequisite(state, req),
        "catalog.addProgrammeCourse" => handle_add_programme_course(state, req),
        "catalog.curriculum" => handle_curriculum(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
