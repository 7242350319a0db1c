use crate::analytics::{
    count_attendance, snapshot_window, tally_behaviour, worst_period, AttendanceRow,
    BehaviourRow, WeekComparison,
};
use crate::calendar::{self, WeekWindow};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_or_today, dispatch, iso, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::summary::{self, StudentIdentity, Summarizer};
use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn fetch_identity(conn: &Connection, student_id: &str) -> Result<Option<StudentIdentity>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT s.id, s.first_name, s.last_name, COALESCE(s.gender, ''),
                    s.year_group, COALESCE(mg.name, '')
             FROM students s
             LEFT JOIN mastery_groups mg ON mg.id = s.mastery_group_id
             WHERE s.id = ?",
            [student_id],
            |r| {
                Ok(StudentIdentity {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    gender: r.get(3)?,
                    year_group: r.get(4)?,
                    mastery_group: r.get(5)?,
                })
            },
        )
        .optional()?)
}

/// Attendance rows in a date range, most recent first. Rows whose stored
/// date fails to parse are skipped rather than failing the whole window.
fn fetch_attendance(
    conn: &Connection,
    student_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AttendanceRow>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT date, status FROM attendance
         WHERE student_id = ? AND date BETWEEN ? AND ?
         ORDER BY date DESC",
    )?;
    let raw: Vec<(String, String)> = stmt
        .query_map((student_id, iso(from), iso(to)), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(raw
        .into_iter()
        .filter_map(|(date, status)| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .map(|date| AttendanceRow { date, status })
        })
        .collect())
}

fn fetch_behaviour(
    conn: &Connection,
    student_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<BehaviourRow>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT date, period, type_id FROM behaviour_events
         WHERE student_id = ? AND date BETWEEN ? AND ?
         ORDER BY date DESC, id",
    )?;
    let raw: Vec<(String, Option<i64>, i64)> = stmt
        .query_map((student_id, iso(from), iso(to)), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(raw
        .into_iter()
        .filter_map(|(date, period, type_id)| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .map(|date| BehaviourRow {
                    date,
                    period: period.and_then(|p| u8::try_from(p).ok()),
                    type_id,
                })
        })
        .collect())
}

fn window_json(window: WeekWindow) -> serde_json::Value {
    json!({
        "start": iso(window.start),
        "end": iso(window.end),
        "isoYear": window.start.iso_week().year(),
        "isoWeek": window.start.iso_week().week(),
    })
}

/// Dashboard comparison over calendar-aligned ISO weeks.
fn week_compare(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let as_of = date_or_today(params, "asOf")?;
    if fetch_identity(conn, &student_id)?.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }

    let (current_window, prior_window) = calendar::iso_week_windows(as_of);
    let comparison = WeekComparison {
        current: snapshot_window(
            &fetch_attendance(conn, &student_id, current_window.start, current_window.end)?,
            &fetch_behaviour(conn, &student_id, current_window.start, current_window.end)?,
        ),
        prior: snapshot_window(
            &fetch_attendance(conn, &student_id, prior_window.start, prior_window.end)?,
            &fetch_behaviour(conn, &student_id, prior_window.start, prior_window.end)?,
        ),
    };

    let comparison = serde_json::to_value(&comparison)
        .map_err(|e| HandlerErr::new("encode_failed", e.to_string()))?;
    Ok(json!({
        "currentWindow": window_json(current_window),
        "priorWindow": window_json(prior_window),
        "comparison": comparison,
    }))
}

/// Rolling-mode aggregation: trailing 14 days, first 7 rows against the
/// next 7, rendered to the narrative prompt. Returns None when the student
/// id resolves to nothing.
fn build_prompt(
    conn: &Connection,
    student_id: &str,
    as_of: NaiveDate,
) -> Result<Option<String>, HandlerErr> {
    let Some(identity) = fetch_identity(conn, student_id)? else {
        return Ok(None);
    };
    let cutoff = calendar::rolling_cutoff(as_of);

    let (att_current, att_prior) =
        calendar::split_recent(fetch_attendance(conn, student_id, cutoff, as_of)?);
    let (beh_current, beh_prior) =
        calendar::split_recent(fetch_behaviour(conn, student_id, cutoff, as_of)?);

    let current_tally = tally_behaviour(&beh_current);
    let prior_tally = tally_behaviour(&beh_prior);
    let trend = worst_period(&current_tally);

    Ok(Some(summary::build_weekly_prompt(
        &identity,
        count_attendance(&att_current),
        count_attendance(&att_prior),
        &current_tally,
        &prior_tally,
        trend,
    )))
}

fn weekly_prompt(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let as_of = date_or_today(params, "asOf")?;
    match build_prompt(conn, &student_id, as_of)? {
        Some(text) => Ok(json!({
            "found": true,
            "prompt": text,
            "systemInstruction": summary::SYSTEM_INSTRUCTION,
        })),
        None => Ok(json!({
            "found": false,
            "prompt": summary::NO_STUDENT_TEXT,
        })),
    }
}

fn weekly_summary(
    conn: &Connection,
    summarizer: &dyn Summarizer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let as_of = date_or_today(params, "asOf")?;
    let Some(prompt) = build_prompt(conn, &student_id, as_of)? else {
        // Degrade to the sentinel text; the caller decides how to show it.
        return Ok(json!({
            "found": false,
            "summary": summary::NO_STUDENT_TEXT,
        }));
    };

    let text = summarizer.summarize(&prompt).map_err(|e| {
        tracing::warn!(error = %e, "summarizer call failed");
        HandlerErr::new("summarizer_unavailable", e.to_string())
    })?;

    let (week, _) = calendar::iso_week_windows(as_of);
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO summaries(id, student_id, week_start, text, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &student_id, iso(week.start), &text, &created_at),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "summaries" }))
    })?;

    Ok(json!({
        "found": true,
        "summaryId": id,
        "weekStart": iso(week.start),
        "summary": text,
    }))
}

fn summaries_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let mut stmt = conn.prepare(
        "SELECT id, week_start, text, created_at FROM summaries
         WHERE student_id = ?
         ORDER BY week_start DESC, created_at DESC",
    )?;
    let summaries = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "weekStart": r.get::<_, String>(1)?,
                "text": r.get::<_, String>(2)?,
                "createdAt": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "summaries": summaries }))
}

fn handle_weekly_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match weekly_summary(conn, state.summarizer.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.weekCompare" => Some(dispatch(state, req, week_compare)),
        "analytics.weeklyPrompt" => Some(dispatch(state, req, weekly_prompt)),
        "analytics.weeklySummary" => Some(handle_weekly_summary(state, req)),
        "summaries.list" => Some(dispatch(state, req, summaries_list)),
        _ => None,
    }
}
