mod test_support;

use serde_json::json;
use test_support::{error_code, open_workspace, request, request_ok, spawn_sidecar};

#[test]
fn student_lifecycle_create_open_search_update_delete() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "homeroom-students-crud");

    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({ "name": "Computing" }),
    );
    let subject_id = subject
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();
    let mastery = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "mastery.create",
        json!({ "name": "FINANCE", "yearGroup": 13 }),
    );
    let mastery_id = mastery
        .get("masteryGroupId")
        .and_then(|v| v.as_str())
        .expect("masteryGroupId")
        .to_string();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "firstName": "Leah",
            "lastName": "Hassan",
            "yearGroup": 13,
            "gender": "F",
            "email": "leah.hassan@example.school",
            "masteryGroupId": mastery_id,
            "subjectIds": [subject_id],
            "contacts": {
                "parentName": "Samir Hassan",
                "parentPhone": "07700900000",
                "nationality": "British"
            },
            "medical": { "allergies": "Penicillin" }
        }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.open",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        opened.pointer("/student/firstName").and_then(|v| v.as_str()),
        Some("Leah")
    );
    assert_eq!(
        opened.pointer("/student/masteryGroup").and_then(|v| v.as_str()),
        Some("FINANCE")
    );
    assert_eq!(
        opened.pointer("/contacts/parentName").and_then(|v| v.as_str()),
        Some("Samir Hassan")
    );
    assert_eq!(
        opened.pointer("/medical/allergies").and_then(|v| v.as_str()),
        Some("Penicillin")
    );
    assert_eq!(
        opened.get("subjects").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );
    assert_eq!(
        opened.get("detentionsToday").and_then(|v| v.as_i64()),
        Some(0)
    );

    // Search hits on name, email fragment, mastery name and year group.
    for (id, query) in [
        ("5", "Hassan"),
        ("6", "leah.hassan"),
        ("7", "FINANCE"),
        ("8", "13"),
    ] {
        let found = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.list",
            json!({ "query": query }),
        );
        assert_eq!(
            found.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
            Some(1),
            "query {:?} should match",
            query
        );
    }
    let missed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.list",
        json!({ "query": "Zebra" }),
    );
    assert_eq!(
        missed.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.update",
        json!({
            "studentId": student_id,
            "patch": { "firstName": "Leila", "yearGroup": 12 }
        }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.open",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        after.pointer("/student/firstName").and_then(|v| v.as_str()),
        Some("Leila")
    );
    assert_eq!(
        after.pointer("/student/yearGroup").and_then(|v| v.as_i64()),
        Some(12)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "13",
        "students.open",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn student_create_rejects_bad_subject_lists() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "homeroom-students-subjects");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "firstName": "Rui",
            "lastName": "Chen",
            "yearGroup": 12,
            "subjectIds": ["no-such-subject"],
        }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "firstName": "Rui" }),
    );
    assert_eq!(error_code(&missing), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
