use crate::ipc::helpers::{dispatch, optional_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn subjects_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY name")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(json!({ "id": r.get::<_, String>(0)?, "name": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO subjects(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "subjects" }))
        })?;
    Ok(json!({ "subjectId": id }))
}

fn mastery_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt =
        conn.prepare("SELECT id, name, year_group FROM mastery_groups ORDER BY name, year_group")?;
    let groups = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "yearGroup": r.get::<_, Option<i64>>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "masteryGroups": groups }))
}

fn mastery_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let year_group = optional_i64(params, "yearGroup");
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO mastery_groups(id, name, year_group) VALUES(?, ?, ?)",
        (&id, &name, year_group),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "mastery_groups" }))
    })?;
    Ok(json!({ "masteryGroupId": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(dispatch(state, req, subjects_list)),
        "subjects.create" => Some(dispatch(state, req, subjects_create)),
        "mastery.list" => Some(dispatch(state, req, mastery_list)),
        "mastery.create" => Some(dispatch(state, req, mastery_create)),
        _ => None,
    }
}
