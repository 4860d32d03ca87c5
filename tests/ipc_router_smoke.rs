mod common;

use common::{temp_dir, Sidecar};
use serde_json::json;

const FAMILY_PROBES: &[&str] = &[
    "catalog.current",
    "catalog.curriculum",
    "people.getStudent",
    "enrollment.list",
    "grades.transcript",
    "progression.failures",
    "fees.statement",
    "hostel.occupancy",
    "timetable.createSlot",
    "attendance.roster",
    "teaching.list",
    "assignments.listForStudent",
    "notifications.list",
    "library.addResource",
];

#[test]
fn health_and_error_envelopes() {
    let mut sc = Sidecar::spawn("2025-01-10T10:00:00");

    let health = sc.ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["now"], "2025-01-10T10:00:00");

    let (code, _) = sc.fail("registry.explode", json!({}));
    assert_eq!(code, "not_implemented");

    let (code, _) = sc.fail("catalog.current", json!({}));
    assert_eq!(code, "no_workspace");

    let resp = sc.send_raw("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");

    let (code, _) = sc.fail("workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn every_family_is_routed_once_a_workspace_is_open() {
    let workspace = temp_dir("unierp-router-smoke");
    let mut sc = Sidecar::spawn("2025-01-10T10:00:00");
    let selected = sc.ok("workspace.select", json!({ "path": workspace }));
    assert_eq!(selected["workspacePath"], workspace.to_string_lossy().as_ref());

    let current = sc.ok("catalog.current", json!({}));
    assert!(current["academicYear"].is_null());

    for method in FAMILY_PROBES {
        let resp = sc.call(method, json!({}));
        if resp["ok"] == false {
            let code = resp["error"]["code"].as_str().unwrap_or_default();
            assert_ne!(code, "not_implemented", "{} is not routed", method);
            assert_ne!(code, "no_workspace", "{} lost the workspace", method);
        }
    }

    let (code, kind) = sc.fail("people.getStudent", json!({ "id": "missing" }));
    assert_eq!(code, "not_found");
    assert_eq!(kind, "NotFound");

    let _ = std::fs::remove_dir_all(workspace);
}
