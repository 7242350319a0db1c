use crate::ipc::helpers::{dispatch, iso, required_str, today, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const BOARDS: [&str; 6] = [
    "general",
    "maths",
    "english",
    "science",
    "computing",
    "history",
];

fn check_board(board: &str) -> Result<(), HandlerErr> {
    if BOARDS.contains(&board) {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!("unknown board: {}", board)))
    }
}

fn teacher_role(conn: &Connection, teacher_id: &str) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row("SELECT role FROM teachers WHERE id = ?", [teacher_id], |r| {
            r.get::<_, String>(0)
        })
        .optional()?)
}

fn boards_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let board = required_str(params, "board")?;
    check_board(&board)?;

    let mut stmt = conn.prepare(
        "SELECT bp.id, bp.title, bp.posted_on, bp.posted_at,
                t.first_name || ' ' || t.last_name,
                (SELECT COUNT(*) FROM board_comments bc WHERE bc.post_id = bp.id)
         FROM board_posts bp
         JOIN teachers t ON t.id = bp.teacher_id
         WHERE bp.board = ?
         ORDER BY bp.posted_on DESC, bp.posted_at DESC",
    )?;
    let posts = stmt
        .query_map([&board], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "postedOn": r.get::<_, String>(2)?,
                "postedAt": r.get::<_, String>(3)?,
                "author": r.get::<_, String>(4)?,
                "commentCount": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "board": board, "posts": posts }))
}

fn boards_post(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let board = required_str(params, "board")?;
    check_board(&board)?;
    let title = required_str(params, "title")?;
    let content = required_str(params, "content")?;
    let teacher_id = required_str(params, "teacherId")?;
    if teacher_role(conn, &teacher_id)?.is_none() {
        return Err(HandlerErr::not_found("teacher not found"));
    }

    let id = Uuid::new_v4().to_string();
    let posted_at = chrono::Local::now().format("%H:%M").to_string();
    conn.execute(
        "INSERT INTO board_posts(id, board, title, content, posted_on, posted_at, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, &board, &title, &content, iso(today()), &posted_at, &teacher_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "board_posts" }))
    })?;
    Ok(json!({ "postId": id }))
}

fn boards_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let post_id = required_str(params, "postId")?;
    let post = conn
        .query_row(
            "SELECT bp.id, bp.board, bp.title, bp.content, bp.posted_on, bp.posted_at,
                    bp.teacher_id, t.first_name || ' ' || t.last_name
             FROM board_posts bp
             JOIN teachers t ON t.id = bp.teacher_id
             WHERE bp.id = ?",
            [&post_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "board": r.get::<_, String>(1)?,
                    "title": r.get::<_, String>(2)?,
                    "content": r.get::<_, String>(3)?,
                    "postedOn": r.get::<_, String>(4)?,
                    "postedAt": r.get::<_, String>(5)?,
                    "teacherId": r.get::<_, String>(6)?,
                    "author": r.get::<_, String>(7)?,
                }))
            },
        )
        .optional()?;
    let Some(post) = post else {
        return Err(HandlerErr::not_found("post not found"));
    };

    let mut stmt = conn.prepare(
        "SELECT bc.id, bc.content, bc.created_at, t.first_name || ' ' || t.last_name
         FROM board_comments bc
         JOIN teachers t ON t.id = bc.teacher_id
         WHERE bc.post_id = ?
         ORDER BY bc.created_at, bc.id",
    )?;
    let comments = stmt
        .query_map([&post_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "content": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, Option<String>>(2)?,
                "author": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "post": post, "comments": comments }))
}

fn boards_comment(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let post_id = required_str(params, "postId")?;
    let teacher_id = required_str(params, "teacherId")?;
    let content = required_str(params, "content")?;
    if teacher_role(conn, &teacher_id)?.is_none() {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    let post_exists = conn
        .query_row("SELECT 1 FROM board_posts WHERE id = ?", [&post_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !post_exists {
        return Err(HandlerErr::not_found("post not found"));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO board_comments(id, post_id, teacher_id, content, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &post_id, &teacher_id, &content, &created_at),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "board_comments" }))
    })?;
    Ok(json!({ "commentId": id }))
}

/// Authors delete their own posts; role A deletes anyone's.
fn boards_delete_post(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let post_id = required_str(params, "postId")?;
    let teacher_id = required_str(params, "teacherId")?;
    let Some(role) = teacher_role(conn, &teacher_id)? else {
        return Err(HandlerErr::not_found("teacher not found"));
    };

    let author: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM board_posts WHERE id = ?",
            [&post_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(author) = author else {
        return Err(HandlerErr::not_found("post not found"));
    };
    if author != teacher_id && role != "A" {
        return Err(HandlerErr::new("forbidden", "only the author or an admin may delete a post"));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM board_comments WHERE post_id = ?", [&post_id])?;
    tx.execute("DELETE FROM board_posts WHERE id = ?", [&post_id])
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "board_posts" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "boards.list" => Some(dispatch(state, req, boards_list)),
        "boards.post" => Some(dispatch(state, req, boards_post)),
        "boards.open" => Some(dispatch(state, req, boards_open)),
        "boards.comment" => Some(dispatch(state, req, boards_comment)),
        "boards.deletePost" => Some(dispatch(state, req, boards_delete_post)),
        _ => None,
    }
}
