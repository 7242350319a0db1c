use crate::ipc::helpers::{
    dispatch, iso, optional_str, required_date, required_i64, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Whole-day register upsert. The status string is stored as given; the
/// analytics core owns normalization, so imported or mistyped values stay
/// visible instead of erroring.
fn attendance_mark_day(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let date = required_date(params, "date")?;
    let status = required_str(params, "status")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    conn.execute(
        "INSERT INTO attendance(id, student_id, date, status)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET status = excluded.status",
        (Uuid::new_v4().to_string(), &student_id, iso(date), &status),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "attendance" }))
    })?;
    Ok(json!({ "ok": true }))
}

fn attendance_list_range(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let from = required_date(params, "from")?;
    let to = required_date(params, "to")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT date, status FROM attendance
         WHERE student_id = ? AND date BETWEEN ? AND ?
         ORDER BY date DESC",
    )?;
    let records = stmt
        .query_map((&student_id, iso(from), iso(to)), |r| {
            Ok(json!({
                "date": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "records": records }))
}

/// Per-lesson register. The marking screens only ever send the three real
/// statuses, so this path validates them.
fn attendance_mark_period(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let date = required_date(params, "date")?;
    let period = required_i64(params, "period")?;
    let status = required_str(params, "status")?;
    if !(1..=8).contains(&period) {
        return Err(HandlerErr::bad_params("period must be 1-8"));
    }
    if !["Present", "Absent", "Late"].contains(&status.as_str()) {
        return Err(HandlerErr::bad_params("status must be Present, Absent or Late"));
    }
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let teacher_id = optional_str(params, "teacherId");

    conn.execute(
        "INSERT INTO period_attendance(id, student_id, date, period, teacher_id, status)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date, period) DO UPDATE SET
           status = excluded.status,
           teacher_id = excluded.teacher_id",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            iso(date),
            period,
            teacher_id,
            &status,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "period_attendance" }))
    })?;
    Ok(json!({ "ok": true }))
}

fn attendance_list_periods(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let date = required_date(params, "date")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT period, status, teacher_id FROM period_attendance
         WHERE student_id = ? AND date = ?
         ORDER BY period",
    )?;
    let records = stmt
        .query_map((&student_id, iso(date)), |r| {
            Ok(json!({
                "period": r.get::<_, i64>(0)?,
                "status": r.get::<_, String>(1)?,
                "teacherId": r.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.markDay" => Some(dispatch(state, req, attendance_mark_day)),
        "attendance.listRange" => Some(dispatch(state, req, attendance_list_range)),
        "attendance.markPeriod" => Some(dispatch(state, req, attendance_mark_period)),
        "attendance.listPeriods" => Some(dispatch(state, req, attendance_list_periods)),
        _ => None,
    }
}
