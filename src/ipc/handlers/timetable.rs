use crate::ipc::helpers::{dispatch, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Periods 1 and 5 are the mastery slots; the rest carry subjects.
const MASTERY_PERIODS: [i64; 2] = [1, 5];

struct SlotSpec {
    kind: String,
    subject_id: Option<String>,
}

fn parse_slots(params: &serde_json::Value) -> Result<Vec<SlotSpec>, HandlerErr> {
    let Some(raw) = params.get("slots").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing slots"));
    };
    if raw.len() != 8 {
        return Err(HandlerErr::bad_params("slots must cover all 8 periods"));
    }
    let mut out = Vec::with_capacity(8);
    for (i, slot) in raw.iter().enumerate() {
        let period = (i + 1) as i64;
        let kind = slot
            .get("kind")
            .and_then(|v| v.as_str())
            .unwrap_or("free")
            .to_string();
        let subject_id = slot
            .get("subjectId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        match kind.as_str() {
            "free" => {}
            "mastery" => {
                if !MASTERY_PERIODS.contains(&period) {
                    return Err(HandlerErr::bad_params(format!(
                        "period {} cannot be a mastery slot",
                        period
                    )));
                }
            }
            "subject" => {
                if MASTERY_PERIODS.contains(&period) {
                    return Err(HandlerErr::bad_params(format!(
                        "period {} is reserved for mastery",
                        period
                    )));
                }
                if subject_id.is_none() {
                    return Err(HandlerErr::bad_params(format!(
                        "period {} subject slot needs a subjectId",
                        period
                    )));
                }
            }
            other => {
                return Err(HandlerErr::bad_params(format!("unknown slot kind: {}", other)));
            }
        }
        out.push(SlotSpec { kind, subject_id });
    }
    Ok(out)
}

fn timetable_set_day(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let day = required_i64(params, "day")?;
    if !(1..=5).contains(&day) {
        return Err(HandlerErr::bad_params("day must be 1-5"));
    }
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }
    let slots = parse_slots(params)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM timetable_slots WHERE student_id = ? AND day = ?",
        (&student_id, day),
    )?;
    for (i, slot) in slots.iter().enumerate() {
        tx.execute(
            "INSERT INTO timetable_slots(student_id, day, period, kind, subject_id)
             VALUES(?, ?, ?, ?, ?)",
            (&student_id, day, (i + 1) as i64, &slot.kind, &slot.subject_id),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "timetable_slots" }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn timetable_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let mut stmt = conn.prepare(
        "SELECT ts.day, ts.period, ts.kind, COALESCE(sub.name, '')
         FROM timetable_slots ts
         LEFT JOIN subjects sub ON sub.id = ts.subject_id
         WHERE ts.student_id = ?
         ORDER BY ts.day, ts.period",
    )?;
    let rows: Vec<(i64, i64, String, String)> = stmt
        .query_map([&student_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut days: Vec<serde_json::Value> = Vec::new();
    for day in 1..=5i64 {
        let slots: Vec<serde_json::Value> = rows
            .iter()
            .filter(|(d, _, _, _)| *d == day)
            .map(|(_, period, kind, subject)| {
                json!({
                    "period": period,
                    "kind": kind,
                    "subject": if subject.is_empty() { serde_json::Value::Null } else { json!(subject) },
                })
            })
            .collect();
        days.push(json!({ "day": day, "slots": slots }));
    }
    Ok(json!({ "days": days }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.get" => Some(dispatch(state, req, timetable_get)),
        "timetable.setDay" => Some(dispatch(state, req, timetable_set_day)),
        _ => None,
    }
}
