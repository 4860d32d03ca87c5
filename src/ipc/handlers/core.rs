use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::backup;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "now": state.clock.now(),
    }))
}

#[derive(Deserialize)]
struct SelectParams {
    path: PathBuf,
}

pub fn open_workspace(state: &mut AppState, path: PathBuf) -> Result<(), HandlerErr> {
    let conn = db::open_db(&path).map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path);
    state.db = Some(conn);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SelectParams = params(req)?;
    open_workspace(state, p.path.clone())?;
    Ok(json!({ "workspacePath": p.path.to_string_lossy() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    out_path: PathBuf,
}

fn handle_export_backup(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ExportParams = params(req)?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)") {
            warn!(error = %e, "wal checkpoint before export failed");
        }
    }
    let manifest = backup::export_workspace_bundle(&workspace, &p.out_path, state.clock.now())
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}"))
                .with_details(json!({ "path": p.out_path.to_string_lossy() }))
        })?;
    info!(path = %p.out_path.display(), sha256 = %manifest.db_sha256, "workspace exported");
    Ok(json!({
        "path": p.out_path.to_string_lossy(),
        "manifest": manifest,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    in_path: PathBuf,
    #[serde(default)]
    workspace_path: Option<PathBuf>,
}

fn handle_import_backup(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ImportParams = params(req)?;
    let Some(workspace) = p.workspace_path.clone().or_else(|| state.workspace.clone()) else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    if !p.in_path.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": p.in_path.to_string_lossy() })));
    }

    // The file is about to be replaced underneath any open handle.
    state.db = None;
    let manifest = backup::import_workspace_bundle(&p.in_path, &workspace).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": p.in_path.to_string_lossy() }))
    })?;
    open_workspace(state, workspace.clone())?;
    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "manifest": manifest,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "workspace.exportBackup" => handle_export_backup(state, req),
        "workspace.importBackup" => handle_import_backup(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
