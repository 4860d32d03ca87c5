#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    /// Spawns the daemon with its clock pinned to `now` (`YYYY-MM-DDTHH:MM:SS`).
    pub fn spawn(now: &str) -> Self {
        let exe = env!("CARGO_BIN_EXE_unierpd");
        let mut child = Command::new(exe)
            .env("UNIERPD_NOW", now)
            .env("UNIERPD_BASE_URL", "https://erp.test")
            .env_remove("UNIERPD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn unierpd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call_as(&mut self, method: &str, params: Value, principal: Option<Value>) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some(p) = principal {
            payload["principal"] = p;
        }
        let resp = self.send_raw(&payload.to_string());
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        resp
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        self.call_as(method, params, None)
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.call(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    pub fn ok_as(&mut self, method: &str, params: Value, principal: Value) -> Value {
        let resp = self.call_as(method, params, Some(principal));
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    /// Asserts failure and returns `(code, details.kind)`.
    pub fn fail(&mut self, method: &str, params: Value) -> (String, String) {
        let resp = self.call(method, params);
        error_of(&resp, method)
    }

    pub fn fail_as(&mut self, method: &str, params: Value, principal: Value) -> (String, String) {
        let resp = self.call_as(method, params, Some(principal));
        error_of(&resp, method)
    }
}

fn error_of(resp: &Value, method: &str) -> (String, String) {
    assert_eq!(resp["ok"], false, "{} unexpectedly succeeded: {}", method, resp);
    (
        resp["error"]["code"].as_str().unwrap_or_default().to_string(),
        resp["error"]["details"]["kind"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    )
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Ids of a small seeded campus: 2024/2025 (current) and 2025/2026, each with
/// two semesters; BSCS (3 years, 2 semesters per year) with CS101/CS102 in
/// Y1S1, CS151 in Y1S2 and CS201 in Y2S1 (CS201 requires CS101).
pub struct Seed {
    pub ay1: String,
    pub ay2: String,
    pub ay1_s1: String,
    pub ay1_s2: String,
    pub ay2_s1: String,
    pub department: String,
    pub programme: String,
    pub cs101: String,
    pub cs102: String,
    pub cs151: String,
    pub cs201: String,
}

pub fn seed_campus(sc: &mut Sidecar, workspace: &PathBuf) -> Seed {
    sc.ok("workspace.select", json!({ "path": workspace }));

    let mut years = Vec::new();
    for start in [2024, 2025] {
        let ay = sc.ok(
            "catalog.createAcademicYear",
            json!({
                "year": format!("{}/{}", start, start + 1),
                "startDate": format!("{}-09-01", start),
                "endDate": format!("{}-08-31", start + 1),
            }),
        );
        let ay_id = ay["id"].as_str().expect("ay id").to_string();
        let s1 = sc.ok(
            "catalog.createSemester",
            json!({
                "academicYearId": ay_id,
                "semesterNumber": 1,
                "startDate": format!("{}-09-02", start),
                "endDate": format!("{}-01-31", start + 1),
                "registrationStartDate": format!("{}-09-02", start),
                "registrationEndDate": format!("{}-01-20", start + 1),
            }),
        );
        let s2 = sc.ok(
            "catalog.createSemester",
            json!({
                "academicYearId": ay_id,
                "semesterNumber": 2,
                "startDate": format!("{}-02-01", start + 1),
                "endDate": format!("{}-06-30", start + 1),
                "registrationStartDate": format!("{}-02-01", start + 1),
                "registrationEndDate": format!("{}-02-20", start + 1),
            }),
        );
        years.push((
            ay_id,
            s1["id"].as_str().expect("s1").to_string(),
            s2["id"].as_str().expect("s2").to_string(),
        ));
    }
    sc.ok("catalog.setCurrentAcademicYear", json!({ "id": years[0].0 }));
    sc.ok("catalog.setCurrentSemester", json!({ "id": years[0].1 }));

    let faculty = sc.ok(
        "catalog.createFaculty",
        json!({ "code": "FCI", "name": "Computing and Informatics" }),
    )["id"]
        .as_str()
        .expect("faculty")
        .to_string();
    let department = sc.ok(
        "catalog.createDepartment",
        json!({ "facultyId": faculty, "code": "CS", "name": "Computer Science" }),
    )["id"]
        .as_str()
        .expect("department")
        .to_string();
    let programme = sc.ok(
        "catalog.createProgramme",
        json!({
            "code": "BSCS",
            "name": "BSc Computer Science",
            "departmentId": department,
            "durationYears": 3,
            "semestersPerYear": 2,
        }),
    )["id"]
        .as_str()
        .expect("programme")
        .to_string();

    let mut course = |code: &str, year: i64, semester: i64| -> String {
        let id = sc.ok(
            "catalog.createCourse",
            json!({ "code": code, "name": format!("{} course", code), "departmentId": department, "creditHours": 3 }),
        )["id"]
            .as_str()
            .expect("course id")
            .to_string();
        sc.ok(
            "catalog.addProgrammeCourse",
            json!({ "programmeId": programme, "courseId": id, "year": year, "semester": semester }),
        );
        id
    };
    let cs101 = course("CS101", 1, 1);
    let cs102 = course("CS102", 1, 1);
    let cs151 = course("CS151", 1, 2);
    let cs201 = course("CS201", 2, 1);
    sc.ok(
        "catalog.addPrerequisite",
        json!({ "courseId": cs201, "prerequisiteId": cs101 }),
    );

    Seed {
        ay1: years[0].0.clone(),
        ay2: years[1].0.clone(),
        ay1_s1: years[0].1.clone(),
        ay1_s2: years[0].2.clone(),
        ay2_s1: years[1].1.clone(),
        department,
        programme,
        cs101,
        cs102,
        cs151,
        cs201,
    }
}

/// Creates a user plus student profile in year 1, semester 1.
pub fn add_student(sc: &mut Sidecar, seed: &Seed, number: &str, gender: &str, sponsor: &str) -> String {
    let username = number.replace('/', "").to_lowercase();
    let user = sc.ok(
        "people.createUser",
        json!({
            "username": username,
            "firstName": username,
            "lastName": "Student",
            "userType": "student",
            "gender": gender,
        }),
    );
    sc.ok(
        "people.createStudent",
        json!({
            "userId": user["id"],
            "studentId": number,
            "programmeId": seed.programme,
            "sponsorType": sponsor,
            "admissionDate": "2024-09-02",
        }),
    )["id"]
        .as_str()
        .expect("student id")
        .to_string()
}

/// Creates a lecturer and returns `(lecturer id, principal json)`.
pub fn add_lecturer(sc: &mut Sidecar, seed: &Seed, employee_number: &str) -> (String, Value) {
    let user = sc.ok(
        "people.createUser",
        json!({
            "username": employee_number.to_lowercase(),
            "firstName": "Grace",
            "lastName": "Lecturer",
            "userType": "lecturer",
            "gender": "female",
        }),
    );
    let lecturer = sc.ok(
        "people.createLecturer",
        json!({
            "userId": user["id"],
            "employeeNumber": employee_number,
            "departmentId": seed.department,
        }),
    );
    let id = lecturer["id"].as_str().expect("lecturer id").to_string();
    let principal = json!({ "userId": user["id"], "userType": "lecturer", "linkedProfile": id });
    (id, principal)
}
