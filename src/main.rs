#[macro_use]
mod kinds;

mod assignments;
mod attendance;
mod backup;
mod catalog;
mod clock;
mod config;
mod db;
mod enrollment;
mod error;
mod fees;
mod grading;
mod hostel;
mod ipc;
mod library;
mod model;
mod money;
mod notifications;
mod people;
mod progression;
mod teaching;

#[cfg(test)]
mod testkit;

use std::io::{self, BufRead, Write};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogSettings};

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(settings: &LogSettings) {
    let filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn write_line(stdout: &mut impl Write, resp: &serde_json::Value) {
    let text = serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    if let Err(e) = writeln!(stdout, "{text}").and_then(|_| stdout.flush()) {
        error!(error = %e, "failed to write response");
    }
}

fn main() {
    init_tracing(&LogSettings::from_env());
    let config = Config::load();
    info!(version = env!("CARGO_PKG_VERSION"), base_url = %config.base_url, "unierpd starting");

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            warn!(error = %e.message, "could not open configured workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to; reply with a null one so the caller can resync.
                let resp = serde_json::json!({
                    "id": null,
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                write_line(&mut stdout, &resp);
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }
    info!("stdin closed, shutting down");
}
