mod test_support;

use serde_json::json;
use test_support::{error_code, open_workspace, request, request_ok, spawn_sidecar};

#[test]
fn assessment_rules_kind_dates_and_caps() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "homeroom-assessments");

    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({ "name": "Science" }),
    );
    let subject_id = subject
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "History" }),
    );
    let other_subject_id = other
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "firstName": "Iris",
            "lastName": "Vance",
            "yearGroup": 12,
            "subjectIds": [subject_id],
        }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    // Three midpoint1 scores land; the fourth is refused.
    for (i, date) in ["2026-02-10", "2026-03-10", "2026-04-10"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("rec-{}", i),
            "assessments.record",
            json!({
                "studentId": student_id,
                "subjectId": subject_id,
                "kind": "midpoint1",
                "score": 62.5 + i as f64,
                "date": date,
                "asOf": "2026-05-20"
            }),
        );
    }
    let overflow = request(
        &mut stdin,
        &mut reader,
        "overflow",
        "assessments.record",
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "kind": "midpoint1",
            "score": 70,
            "date": "2026-05-01",
            "asOf": "2026-05-20"
        }),
    );
    assert_eq!(error_code(&overflow), "too_many_assessments");

    let future = request(
        &mut stdin,
        &mut reader,
        "future",
        "assessments.record",
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "kind": "endpoint",
            "score": 70,
            "date": "2026-06-01",
            "asOf": "2026-05-20"
        }),
    );
    assert_eq!(error_code(&future), "bad_params");

    let stale = request(
        &mut stdin,
        &mut reader,
        "stale",
        "assessments.record",
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "kind": "endpoint",
            "score": 70,
            "date": "2023-05-20",
            "asOf": "2026-05-20"
        }),
    );
    assert_eq!(error_code(&stale), "bad_params");

    let wrong_kind = request(
        &mut stdin,
        &mut reader,
        "kind",
        "assessments.record",
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "kind": "mock",
            "score": 70,
            "date": "2026-05-01",
            "asOf": "2026-05-20"
        }),
    );
    assert_eq!(error_code(&wrong_kind), "bad_params");

    let not_taken = request(
        &mut stdin,
        &mut reader,
        "not-taken",
        "assessments.record",
        json!({
            "studentId": student_id,
            "subjectId": other_subject_id,
            "kind": "endpoint",
            "score": 70,
            "date": "2026-05-01",
            "asOf": "2026-05-20"
        }),
    );
    assert_eq!(error_code(&not_taken), "bad_params");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "assessments.list",
        json!({ "studentId": student_id }),
    );
    let assessments = listed
        .get("assessments")
        .and_then(|v| v.as_array())
        .expect("assessments")
        .clone();
    assert_eq!(assessments.len(), 3);
    // Newest first, subject names joined in.
    assert_eq!(
        assessments[0].get("date").and_then(|v| v.as_str()),
        Some("2026-04-10")
    );
    assert_eq!(
        assessments[0].get("subject").and_then(|v| v.as_str()),
        Some("Science")
    );

    let first_id = assessments[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("assessment id")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "del",
        "assessments.delete",
        json!({ "assessmentId": first_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "del-again",
        "assessments.delete",
        json!({ "assessmentId": first_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
