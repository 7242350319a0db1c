use crate::ipc::helpers::{dispatch, optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn teacher_exists(conn: &Connection, teacher_id: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn apply_profile(
    conn: &Connection,
    teacher_id: &str,
    profile: &serde_json::Value,
) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO teacher_profiles(teacher_id, phone, personal_email, birth_date,
                                      qualifications, emergency_contact, address, employment_start)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(teacher_id) DO UPDATE SET
           phone = excluded.phone,
           personal_email = excluded.personal_email,
           birth_date = excluded.birth_date,
           qualifications = excluded.qualifications,
           emergency_contact = excluded.emergency_contact,
           address = excluded.address,
           employment_start = excluded.employment_start",
        (
            teacher_id,
            optional_str(profile, "phone"),
            optional_str(profile, "personalEmail"),
            optional_str(profile, "birthDate"),
            optional_str(profile, "qualifications"),
            optional_str(profile, "emergencyContact"),
            optional_str(profile, "address"),
            optional_str(profile, "employmentStart"),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "teacher_profiles" }))
    })?;
    Ok(())
}

fn teachers_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let query = optional_str(params, "query");
    let base = "SELECT t.id, t.last_name, t.first_name, t.email, t.role,
                       COALESCE(sub.name, ''), COALESCE(mg.name, '')
                FROM teachers t
                LEFT JOIN subjects sub ON sub.id = t.subject_id
                LEFT JOIN mastery_groups mg ON mg.id = t.mastery_group_id";
    let rows: Vec<(String, String, String, String, String, String, String)> = match &query {
        Some(q) => {
            let pattern = format!("%{}%", q);
            let sql = format!(
                "{base}
                 WHERE t.last_name LIKE ?1 OR t.first_name LIKE ?1 OR t.email LIKE ?1
                 ORDER BY t.last_name, t.first_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map([&pattern], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        }
        None => {
            let sql = format!("{base} ORDER BY t.last_name, t.first_name");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map([], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        }
    };

    let teachers: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(id, last, first, email, role, subject, mastery)| {
            json!({
                "id": id,
                "displayName": format!("{}, {}", last, first),
                "lastName": last,
                "firstName": first,
                "email": email,
                "role": role,
                "subject": if subject.is_empty() { serde_json::Value::Null } else { json!(subject) },
                "masteryGroup": if mastery.is_empty() { serde_json::Value::Null } else { json!(mastery) },
            })
        })
        .collect();
    Ok(json!({ "teachers": teachers }))
}

fn teachers_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let first_name = required_str(params, "firstName")?;
    let last_name = required_str(params, "lastName")?;
    let email = required_str(params, "email")?.to_lowercase();
    let role = required_str(params, "role")?;
    if role != "A" && role != "T" {
        return Err(HandlerErr::bad_params("role must be A or T"));
    }

    let taken = conn
        .query_row("SELECT 1 FROM teachers WHERE email = ?", [&email], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if taken {
        return Err(HandlerErr::new("email_taken", "a teacher with that email already exists"));
    }

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO teachers(id, last_name, first_name, gender, email, role,
                              subject_id, mastery_group_id)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &last_name,
            &first_name,
            optional_str(params, "gender"),
            &email,
            &role,
            optional_str(params, "subjectId"),
            optional_str(params, "masteryGroupId"),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "teachers" }))
    })?;
    if let Some(profile) = params.get("profile") {
        apply_profile(&tx, &id, profile)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "teacherId": id }))
}

fn teachers_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    if !teacher_exists(conn, &teacher_id)? {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    let tx = conn.unchecked_transaction()?;
    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("gender", "gender"),
        ("email", "email"),
        ("role", "role"),
        ("subjectId", "subject_id"),
        ("masteryGroupId", "mastery_group_id"),
    ] {
        if let Some(value) = optional_str(patch, key) {
            if key == "role" && value != "A" && value != "T" {
                return Err(HandlerErr::bad_params("role must be A or T"));
            }
            let sql = format!("UPDATE teachers SET {} = ? WHERE id = ?", column);
            tx.execute(&sql, (&value, &teacher_id)).map_err(|e| {
                HandlerErr::new("db_update_failed", e.to_string())
                    .with_details(json!({ "table": "teachers" }))
            })?;
        }
    }
    if let Some(profile) = patch.get("profile") {
        apply_profile(&tx, &teacher_id, profile)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn teachers_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    if !teacher_exists(conn, &teacher_id)? {
        return Err(HandlerErr::not_found("teacher not found"));
    }

    // Board posts must be reassigned or removed before the author can go.
    let post_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM board_posts WHERE teacher_id = ?",
        [&teacher_id],
        |r| r.get(0),
    )?;
    if post_count > 0 {
        return Err(HandlerErr::new(
            "has_board_posts",
            format!("teacher still owns {} board posts", post_count),
        )
        .with_details(json!({ "postCount": post_count })));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE period_attendance SET teacher_id = NULL WHERE teacher_id = ?",
        [&teacher_id],
    )?;
    tx.execute("DELETE FROM board_comments WHERE teacher_id = ?", [&teacher_id])?;
    tx.execute("DELETE FROM teacher_profiles WHERE teacher_id = ?", [&teacher_id])?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id])
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "teachers" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn teachers_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let teacher = conn
        .query_row(
            "SELECT t.id, t.last_name, t.first_name, t.gender, t.email, t.role,
                    COALESCE(sub.name, ''), COALESCE(mg.name, '')
             FROM teachers t
             LEFT JOIN subjects sub ON sub.id = t.subject_id
             LEFT JOIN mastery_groups mg ON mg.id = t.mastery_group_id
             WHERE t.id = ?",
            [&teacher_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "lastName": r.get::<_, String>(1)?,
                    "firstName": r.get::<_, String>(2)?,
                    "gender": r.get::<_, Option<String>>(3)?,
                    "email": r.get::<_, String>(4)?,
                    "role": r.get::<_, String>(5)?,
                    "subject": r.get::<_, String>(6)?,
                    "masteryGroup": r.get::<_, String>(7)?,
                }))
            },
        )
        .optional()?;
    let Some(teacher) = teacher else {
        return Err(HandlerErr::not_found("teacher not found"));
    };

    let profile = conn
        .query_row(
            "SELECT phone, personal_email, birth_date, qualifications,
                    emergency_contact, address, employment_start
             FROM teacher_profiles WHERE teacher_id = ?",
            [&teacher_id],
            |r| {
                Ok(json!({
                    "phone": r.get::<_, Option<String>>(0)?,
                    "personalEmail": r.get::<_, Option<String>>(1)?,
                    "birthDate": r.get::<_, Option<String>>(2)?,
                    "qualifications": r.get::<_, Option<String>>(3)?,
                    "emergencyContact": r.get::<_, Option<String>>(4)?,
                    "address": r.get::<_, Option<String>>(5)?,
                    "employmentStart": r.get::<_, Option<String>>(6)?,
                }))
            },
        )
        .optional()?;

    Ok(json!({ "teacher": teacher, "profile": profile }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(dispatch(state, req, teachers_list)),
        "teachers.create" => Some(dispatch(state, req, teachers_create)),
        "teachers.update" => Some(dispatch(state, req, teachers_update)),
        "teachers.delete" => Some(dispatch(state, req, teachers_delete)),
        "teachers.open" => Some(dispatch(state, req, teachers_open)),
        _ => None,
    }
}
