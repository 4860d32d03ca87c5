mod common;

use common::{add_student, seed_campus, temp_dir, Seed, Sidecar};
use serde_json::{json, Value};

fn amount(v: &Value) -> f64 {
    v.as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| v.as_f64())
        .unwrap_or_else(|| panic!("not an amount: {}", v))
}

fn structure(sc: &mut Sidecar, seed: &Seed, ay: &str, year: i64, semester: i64, tuition: &str) -> String {
    sc.ok(
        "fees.createStructure",
        json!({
            "programmeId": seed.programme,
            "academicYearId": ay,
            "year": year,
            "semester": semester,
            "tuitionFee": tuition,
        }),
    )["id"]
        .as_str()
        .expect("fee structure id")
        .to_string()
}

#[test]
fn overpayment_cascades_forward_and_leaves_credit() {
    let workspace = temp_dir("unierp-fees");
    let mut sc = Sidecar::spawn("2025-01-10T10:00:00");
    let seed = seed_campus(&mut sc, &workspace);
    let student = add_student(&mut sc, &seed, "CS/020/2024", "female", "self");

    let ay1 = seed.ay1.clone();
    let ay2 = seed.ay2.clone();
    let y1s1 = structure(&mut sc, &seed, &ay1, 1, 1, "50000.00");
    let y1s2 = structure(&mut sc, &seed, &ay1, 1, 2, "50000.00");
    let y2s1 = structure(&mut sc, &seed, &ay2, 2, 1, "40000.00");

    let outcome = sc.ok(
        "fees.recordPayment",
        json!({
            "studentId": student,
            "feeStructureId": y1s1,
            "amount": "150000.00",
            "paymentMethod": "mpesa",
            "paymentDate": "2025-01-10",
            "transactionReference": "QWE123RTY",
        }),
    );
    let rows = outcome["payments"].as_array().expect("payments").clone();
    let shape: Vec<(String, String, f64)> = rows
        .iter()
        .map(|p| {
            (
                p["feeStructureId"].as_str().unwrap_or_default().to_string(),
                p["allocation"].as_str().unwrap_or_default().to_string(),
                amount(&p["amountPaid"]),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            (y1s1.clone(), "direct".to_string(), 50000.0),
            (y1s2.clone(), "forwarded".to_string(), 50000.0),
            (y2s1.clone(), "forwarded".to_string(), 40000.0),
            (y2s1.clone(), "credit".to_string(), 10000.0),
        ]
    );
    assert_eq!(amount(&outcome["creditBalance"]), 10000.0);
    let source = rows[0]["receiptNumber"].as_str().expect("receipt").to_string();
    assert!(source.starts_with("RCT-20250110-"));
    assert!(rows[1..].iter().all(|p| p["sourceReceipt"] == source.as_str()));

    let credit = sc.ok("fees.balance", json!({ "studentId": student, "feeStructureId": y2s1 }));
    assert_eq!(amount(&credit["balance"]), -10000.0);

    let statement = sc.ok("fees.statement", json!({ "studentId": student, "academicYearId": ay1 }));
    assert_eq!(amount(&statement["totalDue"]), 100000.0);
    assert_eq!(amount(&statement["totalBalance"]), 0.0);

    let (code, kind) = sc.fail(
        "fees.recordPayment",
        json!({
            "studentId": student,
            "feeStructureId": y1s1,
            "amount": "10.00",
            "paymentMethod": "cash",
            "paymentDate": "2025-01-10",
            "receiptNumber": source,
        }),
    );
    assert_eq!((code.as_str(), kind.as_str()), ("conflict", "DuplicateReceipt"));

    let (code, _) = sc.fail(
        "fees.recordPayment",
        json!({
            "studentId": student,
            "feeStructureId": y1s1,
            "amount": "0",
            "paymentMethod": "cash",
            "paymentDate": "2025-01-10",
        }),
    );
    assert_eq!(code, "validation_error");

    let refunded = sc.ok(
        "fees.setPaymentStatus",
        json!({ "paymentId": rows[0]["id"], "status": "refunded" }),
    );
    assert_eq!(refunded["paymentStatus"], "refunded");
    let (code, kind) = sc.fail(
        "fees.setPaymentStatus",
        json!({ "paymentId": rows[0]["id"], "status": "completed" }),
    );
    assert_eq!((code.as_str(), kind.as_str()), ("state_error", "InvalidTransition"));

    let _ = std::fs::remove_dir_all(workspace);
}
