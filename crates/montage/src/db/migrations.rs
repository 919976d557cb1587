//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_scenes_and_segments_tables",
        sql: include_str!("sql/002_create_scenes_and_segments.sql"),
    },
    Migration {
        version: 3,
        description: "create_matches_table",
        sql: include_str!("sql/003_create_matches.sql"),
    },
];

/// Brings the schema up to date. Each migration runs in its own
/// transaction together with its ledger row.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    log::info!(
        "Applying migration v{} ({})",
        migration.version,
        migration.description
    );
    tx.execute_batch(migration.sql)
        .map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_jobs_table_has_decision_list_handle() {
        let conn = fresh();
        run_all(&conn).unwrap();
        let columns = columns(&conn, "jobs");
        assert!(columns.iter().any(|c| c == "output_handle"));
        assert!(columns.iter().any(|c| c == "decision_list_handle"));
    }

    #[test]
    fn test_child_rows_cascade_with_job() {
        let conn = fresh();
        run_all(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO jobs (id, source_handle, source_filename, summary, created_at, updated_at)
                VALUES ('j', 'source-a.mp4', 'a.mp4', 'S.', 'now', 'now');
             INSERT INTO scenes (id, job_id, rank, start_time, end_time) VALUES ('sc', 'j', 0, 0.0, 1.0);
             INSERT INTO segments (id, job_id, rank, text) VALUES ('sg', 'j', 0, 'S.');
             INSERT INTO matches (segment_id, job_id, scene_id, score) VALUES ('sg', 'j', 'sc', 0.5);
             DELETE FROM jobs WHERE id = 'j';",
        )
        .unwrap();

        for table in ["scenes", "segments", "matches"] {
            let count: u32 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "{} should be empty after purge", table);
        }
    }
}
