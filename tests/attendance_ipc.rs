mod test_support;

use serde_json::json;
use test_support::{error_code, open_workspace, request, request_ok, spawn_sidecar};

fn create_student(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        "setup-student",
        "students.create",
        json!({ "firstName": "Noor", "lastName": "Ali", "yearGroup": 11 }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

#[test]
fn day_register_upserts_and_lists_most_recent_first() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "homeroom-attendance-day");
    let student_id = create_student(&mut stdin, &mut reader);

    for (i, (date, status)) in [
        ("2026-05-18", "Present"),
        ("2026-05-19", "Absent"),
        ("2026-05-20", "Late"),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("mark-{}", i),
            "attendance.markDay",
            json!({ "studentId": student_id, "date": date, "status": status }),
        );
    }
    // Same day again overwrites rather than duplicating.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "remark",
        "attendance.markDay",
        json!({ "studentId": student_id, "date": "2026-05-19", "status": "Present" }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "attendance.listRange",
        json!({ "studentId": student_id, "from": "2026-05-18", "to": "2026-05-24" }),
    );
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records")
        .clone();
    assert_eq!(records.len(), 3);
    let dates: Vec<&str> = records
        .iter()
        .map(|r| r.get("date").and_then(|v| v.as_str()).expect("date"))
        .collect();
    assert_eq!(dates, vec!["2026-05-20", "2026-05-19", "2026-05-18"]);
    assert_eq!(
        records[1].get("status").and_then(|v| v.as_str()),
        Some("Present")
    );

    // The day register accepts whatever the register writes; odd statuses
    // are data for the analytics layer, not an error here.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "odd",
        "attendance.markDay",
        json!({ "studentId": student_id, "date": "2026-05-21", "status": "Sick note" }),
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "missing",
        "attendance.markDay",
        json!({ "studentId": "nope", "date": "2026-05-21", "status": "Present" }),
    );
    assert_eq!(error_code(&unknown), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn period_register_validates_and_upserts() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "homeroom-attendance-period");
    let student_id = create_student(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "attendance.markPeriod",
        json!({ "studentId": student_id, "date": "2026-05-18", "period": 3, "status": "Late" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "p2",
        "attendance.markPeriod",
        json!({ "studentId": student_id, "date": "2026-05-18", "period": 3, "status": "Present" }),
    );

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "p3",
        "attendance.markPeriod",
        json!({ "studentId": student_id, "date": "2026-05-18", "period": 3, "status": "Skiving" }),
    );
    assert_eq!(error_code(&bad_status), "bad_params");

    let bad_period = request(
        &mut stdin,
        &mut reader,
        "p4",
        "attendance.markPeriod",
        json!({ "studentId": student_id, "date": "2026-05-18", "period": 9, "status": "Present" }),
    );
    assert_eq!(error_code(&bad_period), "bad_params");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "p5",
        "attendance.listPeriods",
        json!({ "studentId": student_id, "date": "2026-05-18" }),
    );
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records")
        .clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("period").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        records[0].get("status").and_then(|v| v.as_str()),
        Some("Present")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
