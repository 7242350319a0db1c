use crate::ipc::helpers::{
    date_or_today, dispatch, iso, required_date, required_f64, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const KINDS: [&str; 3] = ["midpoint1", "midpoint2", "endpoint"];
const MAX_PER_KIND: i64 = 3;

fn assessments_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let subject_id = required_str(params, "subjectId")?;
    let kind = required_str(params, "kind")?;
    let score = required_f64(params, "score")?;
    let date = required_date(params, "date")?;
    let as_of = date_or_today(params, "asOf")?;

    if !KINDS.contains(&kind.as_str()) {
        return Err(HandlerErr::bad_params(
            "kind must be midpoint1, midpoint2 or endpoint",
        ));
    }
    if date > as_of {
        return Err(HandlerErr::bad_params("assessment date cannot be in the future"));
    }
    if date < as_of - Duration::days(365 * 2) {
        return Err(HandlerErr::bad_params(
            "assessment date cannot be more than two years old",
        ));
    }

    // The subject has to be one the student actually takes.
    let takes_subject = conn
        .query_row(
            "SELECT 1 FROM student_subjects WHERE student_id = ? AND subject_id = ?",
            (&student_id, &subject_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !takes_subject {
        let exists = conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(HandlerErr::not_found("student not found"));
        }
        return Err(HandlerErr::bad_params("student does not take that subject"));
    }

    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assessments WHERE student_id = ? AND subject_id = ? AND kind = ?",
        (&student_id, &subject_id, &kind),
        |r| r.get(0),
    )?;
    if existing >= MAX_PER_KIND {
        return Err(HandlerErr::new(
            "too_many_assessments",
            format!("already {} {} assessments for that subject", existing, kind),
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assessments(id, student_id, subject_id, kind, score, date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &student_id, &subject_id, &kind, score, iso(date)),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "assessments" }))
    })?;
    Ok(json!({ "assessmentId": id }))
}

fn assessments_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT a.id, sub.name, a.kind, a.score, a.date
         FROM assessments a
         JOIN subjects sub ON sub.id = a.subject_id
         WHERE a.student_id = ?
         ORDER BY a.date DESC, a.id",
    )?;
    let assessments = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "score": r.get::<_, f64>(3)?,
                "date": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "assessments": assessments }))
}

fn assessments_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let assessment_id = required_str(params, "assessmentId")?;
    let changed = conn
        .execute("DELETE FROM assessments WHERE id = ?", [&assessment_id])
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "assessments" }))
        })?;
    if changed == 0 {
        return Err(HandlerErr::not_found("assessment not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.record" => Some(dispatch(state, req, assessments_record)),
        "assessments.list" => Some(dispatch(state, req, assessments_list)),
        "assessments.delete" => Some(dispatch(state, req, assessments_delete)),
        _ => None,
    }
}
