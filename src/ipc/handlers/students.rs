use crate::analytics::BehaviourKind;
use crate::ipc::helpers::{
    date_or_today, dispatch, iso, optional_i64, optional_str, required_i64, required_str,
    today, HandlerErr,
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

fn subject_exists(conn: &Connection, subject_id: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let query = optional_str(params, "query");
    let base = "SELECT s.id, s.last_name, s.first_name, s.year_group, s.email, s.gender,
                       COALESCE(mg.name, '')
                FROM students s
                LEFT JOIN mastery_groups mg ON mg.id = s.mastery_group_id";

    let rows: Vec<(String, String, String, i64, Option<String>, Option<String>, String)> =
        match &query {
            Some(q) => {
                let pattern = format!("%{}%", q);
                let sql = format!(
                    "{base}
                     WHERE s.last_name LIKE ?1 OR s.first_name LIKE ?1 OR s.email LIKE ?1
                        OR mg.name LIKE ?1 OR CAST(s.year_group AS TEXT) = ?2
                     ORDER BY s.last_name, s.first_name"
                );
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map((&pattern, q), |r| {
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
                let sql = format!("{base} ORDER BY s.last_name, s.first_name");
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

    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(id, last, first, year, email, gender, mastery)| {
            json!({
                "id": id,
                "displayName": format!("{}, {}", last, first),
                "lastName": last,
                "firstName": first,
                "yearGroup": year,
                "email": email,
                "gender": gender,
                "masteryGroup": if mastery.is_empty() { serde_json::Value::Null } else { json!(mastery) },
            })
        })
        .collect();

    Ok(json!({ "students": students }))
}

fn apply_contacts(
    conn: &Connection,
    student_id: &str,
    contacts: &serde_json::Value,
) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO student_contacts(student_id, parent_name, parent_phone, address,
                                      nationality, country_of_birth, enrolled_on)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           parent_name = excluded.parent_name,
           parent_phone = excluded.parent_phone,
           address = excluded.address,
           nationality = excluded.nationality,
           country_of_birth = excluded.country_of_birth,
           enrolled_on = excluded.enrolled_on",
        (
            student_id,
            optional_str(contacts, "parentName"),
            optional_str(contacts, "parentPhone"),
            optional_str(contacts, "address"),
            optional_str(contacts, "nationality"),
            optional_str(contacts, "countryOfBirth"),
            optional_str(contacts, "enrolledOn"),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "student_contacts" }))
    })?;
    Ok(())
}

fn apply_medical(
    conn: &Connection,
    student_id: &str,
    medical: &serde_json::Value,
) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO student_medical(student_id, conditions, medication, allergies, needs)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           conditions = excluded.conditions,
           medication = excluded.medication,
           allergies = excluded.allergies,
           needs = excluded.needs",
        (
            student_id,
            optional_str(medical, "conditions"),
            optional_str(medical, "medication"),
            optional_str(medical, "allergies"),
            optional_str(medical, "needs"),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "student_medical" }))
    })?;
    Ok(())
}

fn apply_subject_slots(
    conn: &Connection,
    student_id: &str,
    subject_ids: &[String],
) -> Result<(), HandlerErr> {
    if subject_ids.len() > 4 {
        return Err(HandlerErr::bad_params("a student takes at most 4 subjects"));
    }
    for subject_id in subject_ids {
        if !subject_exists(conn, subject_id)? {
            return Err(HandlerErr::not_found(format!("subject {} not found", subject_id)));
        }
    }
    conn.execute("DELETE FROM student_subjects WHERE student_id = ?", [student_id])?;
    for (i, subject_id) in subject_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO student_subjects(student_id, subject_id, slot) VALUES(?, ?, ?)",
            (student_id, subject_id, (i + 1) as i64),
        )?;
    }
    Ok(())
}

fn subject_ids_param(params: &serde_json::Value) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(raw) = params.get("subjectIds") else {
        return Ok(None);
    };
    let Some(arr) = raw.as_array() else {
        return Err(HandlerErr::bad_params("subjectIds must be an array"));
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(id) = v.as_str() else {
            return Err(HandlerErr::bad_params("subjectIds must contain only strings"));
        };
        out.push(id.trim().to_string());
    }
    Ok(Some(out))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let first_name = required_str(params, "firstName")?;
    let last_name = required_str(params, "lastName")?;
    let year_group = required_i64(params, "yearGroup")?;
    let id = Uuid::new_v4().to_string();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(id, last_name, first_name, birth_date, gender,
                              mastery_group_id, year_group, email, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &last_name,
            &first_name,
            optional_str(params, "birthDate"),
            optional_str(params, "gender"),
            optional_str(params, "masteryGroupId"),
            year_group,
            optional_str(params, "email"),
            iso(today()),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;

    if let Some(subject_ids) = subject_ids_param(params)? {
        apply_subject_slots(&tx, &id, &subject_ids)?;
    }
    if let Some(contacts) = params.get("contacts") {
        apply_contacts(&tx, &id, contacts)?;
    }
    if let Some(medical) = params.get("medical") {
        apply_medical(&tx, &id, medical)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "studentId": id }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    let tx = conn.unchecked_transaction()?;
    let mut sets: Vec<(&str, String)> = Vec::new();
    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("birthDate", "birth_date"),
        ("gender", "gender"),
        ("email", "email"),
        ("masteryGroupId", "mastery_group_id"),
    ] {
        if let Some(value) = optional_str(patch, key) {
            sets.push((column, value));
        }
    }
    for (column, value) in &sets {
        let sql = format!("UPDATE students SET {} = ? WHERE id = ?", column);
        tx.execute(&sql, (value, &student_id)).map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    }
    if let Some(year_group) = optional_i64(patch, "yearGroup") {
        tx.execute(
            "UPDATE students SET year_group = ? WHERE id = ?",
            (year_group, &student_id),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    }
    if let Some(subject_ids) = subject_ids_param(patch)? {
        apply_subject_slots(&tx, &student_id, &subject_ids)?;
    }
    if let Some(contacts) = patch.get("contacts") {
        apply_contacts(&tx, &student_id, contacts)?;
    }
    if let Some(medical) = patch.get("medical") {
        apply_medical(&tx, &student_id, medical)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let tx = conn.unchecked_transaction()?;
    for table in [
        "behaviour_events",
        "attendance",
        "period_attendance",
        "assessments",
        "summaries",
        "timetable_slots",
        "student_subjects",
        "student_contacts",
        "student_medical",
    ] {
        let sql = format!("DELETE FROM {} WHERE student_id = ?", table);
        tx.execute(&sql, [&student_id]).map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": table }))
        })?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn students_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let as_of = date_or_today(params, "date")?;

    let student = conn
        .query_row(
            "SELECT s.id, s.last_name, s.first_name, s.birth_date, s.gender,
                    s.year_group, s.email, COALESCE(mg.name, '')
             FROM students s
             LEFT JOIN mastery_groups mg ON mg.id = s.mastery_group_id
             WHERE s.id = ?",
            [&student_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "lastName": r.get::<_, String>(1)?,
                    "firstName": r.get::<_, String>(2)?,
                    "birthDate": r.get::<_, Option<String>>(3)?,
                    "gender": r.get::<_, Option<String>>(4)?,
                    "yearGroup": r.get::<_, i64>(5)?,
                    "email": r.get::<_, Option<String>>(6)?,
                    "masteryGroup": r.get::<_, String>(7)?,
                }))
            },
        )
        .optional()?;
    let Some(student) = student else {
        return Err(HandlerErr::not_found("student not found"));
    };

    let contacts = conn
        .query_row(
            "SELECT parent_name, parent_phone, address, nationality, country_of_birth, enrolled_on
             FROM student_contacts WHERE student_id = ?",
            [&student_id],
            |r| {
                Ok(json!({
                    "parentName": r.get::<_, Option<String>>(0)?,
                    "parentPhone": r.get::<_, Option<String>>(1)?,
                    "address": r.get::<_, Option<String>>(2)?,
                    "nationality": r.get::<_, Option<String>>(3)?,
                    "countryOfBirth": r.get::<_, Option<String>>(4)?,
                    "enrolledOn": r.get::<_, Option<String>>(5)?,
                }))
            },
        )
        .optional()?;

    let medical = conn
        .query_row(
            "SELECT conditions, medication, allergies, needs
             FROM student_medical WHERE student_id = ?",
            [&student_id],
            |r| {
                Ok(json!({
                    "conditions": r.get::<_, Option<String>>(0)?,
                    "medication": r.get::<_, Option<String>>(1)?,
                    "allergies": r.get::<_, Option<String>>(2)?,
                    "needs": r.get::<_, Option<String>>(3)?,
                }))
            },
        )
        .optional()?;

    let mut stmt = conn.prepare(
        "SELECT sub.name
         FROM student_subjects ss
         JOIN subjects sub ON sub.id = ss.subject_id
         WHERE ss.student_id = ?
         ORDER BY ss.slot",
    )?;
    let subjects = stmt
        .query_map([&student_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    // Unified detentions-today count: detention events on the given date,
    // whatever the period.
    let detentions_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM behaviour_events WHERE student_id = ? AND date = ? AND type_id = ?",
        (&student_id, iso(as_of), BehaviourKind::Detention.type_id()),
        |r| r.get(0),
    )?;

    Ok(json!({
        "student": student,
        "contacts": contacts,
        "medical": medical,
        "subjects": subjects,
        "detentionsToday": detentions_today,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.update" => Some(dispatch(state, req, students_update)),
        "students.delete" => Some(dispatch(state, req, students_delete)),
        "students.open" => Some(dispatch(state, req, students_open)),
        _ => None,
    }
}
