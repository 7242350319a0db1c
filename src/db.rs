use crate::analytics::BehaviourKind;
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("homeroom.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mastery_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year_group INTEGER,
            UNIQUE(name, year_group)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            gender TEXT,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            subject_id TEXT,
            mastery_group_id TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(mastery_group_id) REFERENCES mastery_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_profiles(
            teacher_id TEXT PRIMARY KEY,
            phone TEXT,
            personal_email TEXT,
            birth_date TEXT,
            qualifications TEXT,
            emergency_contact TEXT,
            address TEXT,
            employment_start TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            birth_date TEXT,
            gender TEXT,
            mastery_group_id TEXT,
            year_group INTEGER NOT NULL,
            email TEXT,
            created_at TEXT,
            FOREIGN KEY(mastery_group_id) REFERENCES mastery_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_year ON students(year_group)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_contacts(
            student_id TEXT PRIMARY KEY,
            parent_name TEXT,
            parent_phone TEXT,
            address TEXT,
            nationality TEXT,
            country_of_birth TEXT,
            enrolled_on TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_medical(
            student_id TEXT PRIMARY KEY,
            conditions TEXT,
            medication TEXT,
            allergies TEXT,
            needs TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_subjects(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            slot INTEGER NOT NULL,
            PRIMARY KEY(student_id, slot),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_subjects_subject ON student_subjects(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            student_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            period INTEGER NOT NULL,
            kind TEXT NOT NULL,
            subject_id TEXT,
            PRIMARY KEY(student_id, day, period),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_date ON attendance(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS period_attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            period INTEGER NOT NULL,
            teacher_id TEXT,
            status TEXT NOT NULL,
            UNIQUE(student_id, date, period),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_attendance_student_date
         ON period_attendance(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS behaviour_types(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    seed_behaviour_types(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS behaviour_events(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            period INTEGER,
            type_id INTEGER NOT NULL,
            note TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(type_id) REFERENCES behaviour_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_behaviour_events_student_date
         ON behaviour_events(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            score REAL NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_student ON assessments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS summaries(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            week_start TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_summaries_student ON summaries(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS board_posts(
            id TEXT PRIMARY KEY,
            board TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            posted_on TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_board_posts_board ON board_posts(board)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS board_comments(
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(post_id) REFERENCES board_posts(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_board_comments_post ON board_comments(post_id)",
        [],
    )?;

    // Workspaces created before behaviour notes / student timestamps shipped.
    ensure_behaviour_events_note(&conn)?;
    ensure_students_created_at(&conn)?;

    Ok(conn)
}

/// The closed behaviour enumeration. Ids are stable and referenced by the
/// analytics core; never renumber.
fn seed_behaviour_types(conn: &Connection) -> anyhow::Result<()> {
    for kind in [
        BehaviourKind::HousePoint,
        BehaviourKind::Demerit,
        BehaviourKind::Detention,
        BehaviourKind::Withdrawal,
    ] {
        conn.execute(
            "INSERT OR IGNORE INTO behaviour_types(id, name) VALUES(?, ?)",
            (kind.type_id(), kind.name()),
        )?;
    }
    Ok(())
}

fn ensure_behaviour_events_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "behaviour_events", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE behaviour_events ADD COLUMN note TEXT", [])?;
    Ok(())
}

fn ensure_students_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN created_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
