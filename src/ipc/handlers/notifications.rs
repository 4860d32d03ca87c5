use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::notifications;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    student_id: String,
    #[serde(default)]
    unread_only: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadParams {
    student_id: String,
    ids: Vec<String>,
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ListParams = params(req)?;
    let items = notifications::list(db(state)?, &p.student_id, p.unread_only)?;
    let unread = items.iter().filter(|n| !n.is_read).count();
    Ok(json!({ "notifications": items, "unread": unread }))
}

fn handle_mark_read(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: MarkReadParams = params(req)?;
    let updated = notifications::mark_read(db(state)?, &p.student_id, &p.ids)?;
    Ok(json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.list" => handle_list(state, req),
        "notifications.markRead" => handle_mark_read(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
