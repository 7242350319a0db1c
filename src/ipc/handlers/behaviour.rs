use crate::analytics::BehaviourKind;
use crate::calendar;
use crate::ipc::helpers::{
    date_or_today, dispatch, iso, optional_i64, optional_str, parse_date, required_i64,
    required_str, HandlerErr,
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

fn behaviour_types(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare("SELECT id, name FROM behaviour_types ORDER BY id")?;
    let types = stmt
        .query_map([], |r| {
            Ok(json!({ "id": r.get::<_, i64>(0)?, "name": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "types": types }))
}

fn behaviour_log(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let type_id = required_i64(params, "typeId")?;
    if BehaviourKind::from_type_id(type_id).is_none() {
        return Err(HandlerErr::bad_params(format!("unknown behaviour type: {}", type_id)));
    }
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let date = date_or_today(params, "date")?;
    // When the caller doesn't say, stamp whichever period the clock is in;
    // outside the bell table the event goes in with no period.
    let period = match optional_i64(params, "period") {
        Some(p) => {
            if !(1..=8).contains(&p) {
                return Err(HandlerErr::bad_params("period must be 1-8"));
            }
            Some(p)
        }
        None => calendar::period_at(chrono::Local::now().time()).map(|p| p as i64),
    };
    let note = optional_str(params, "note");
    let count = optional_i64(params, "count").unwrap_or(1);
    if count < 1 {
        return Err(HandlerErr::bad_params("count must be at least 1"));
    }

    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO behaviour_events(id, student_id, date, period, type_id, note)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&id, &student_id, iso(date), period, type_id, &note),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "behaviour_events" }))
        })?;
        ids.push(id);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "eventIds": ids }))
}

fn behaviour_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let from = optional_str(params, "from").map(|raw| parse_date(&raw)).transpose()?;
    let to = optional_str(params, "to").map(|raw| parse_date(&raw)).transpose()?;

    let base = "SELECT be.id, be.date, be.period, be.type_id, bt.name, be.note
                FROM behaviour_events be
                JOIN behaviour_types bt ON bt.id = be.type_id
                WHERE be.student_id = ?";
    let rows: Vec<(String, String, Option<i64>, i64, String, Option<String>)> =
        match (from, to) {
            (Some(from), Some(to)) => {
                let sql = format!("{base} AND be.date BETWEEN ? AND ? ORDER BY be.date DESC, be.id");
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map((&student_id, iso(from), iso(to)), |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
            }
            _ => {
                let sql = format!("{base} ORDER BY be.date DESC, be.id");
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map([&student_id], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
            }
        };

    let events: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(id, date, period, type_id, type_name, note)| {
            json!({
                "id": id,
                "date": date,
                "period": period,
                "typeId": type_id,
                "type": type_name,
                "note": note,
            })
        })
        .collect();
    Ok(json!({ "events": events }))
}

/// One count keyed only by type and date; the time of day never narrows it.
fn behaviour_detentions_today(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let date = date_or_today(params, "date")?;

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM behaviour_events WHERE student_id = ? AND date = ? AND type_id = ?",
        (&student_id, iso(date), BehaviourKind::Detention.type_id()),
        |r| r.get(0),
    )?;
    Ok(json!({ "date": iso(date), "detentions": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "behaviour.types" => Some(dispatch(state, req, behaviour_types)),
        "behaviour.log" => Some(dispatch(state, req, behaviour_log)),
        "behaviour.list" => Some(dispatch(state, req, behaviour_list)),
        "behaviour.detentionsToday" => Some(dispatch(state, req, behaviour_detentions_today)),
        _ => None,
    }
}
