use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ErpError;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

pub fn respond(id: &str, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

/// Decodes `req.params` into `T`; an absent params object reads as `{}`.
pub fn params<T: DeserializeOwned>(req: &Request) -> Result<T, HandlerErr> {
    let raw = if req.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| HandlerErr::new("bad_params", e.to_string()))
}

pub fn db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn db_mut(state: &mut AppState) -> Result<&mut Connection, HandlerErr> {
    state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn to_json<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

/// Lecturer profile id of the calling principal.
pub fn acting_lecturer(req: &Request) -> Result<String, HandlerErr> {
    let principal = req
        .principal
        .as_ref()
        .ok_or_else(|| ErpError::PermissionDenied("request carries no principal".to_string()))?;
    Ok(principal.lecturer_id()?.to_string())
}
