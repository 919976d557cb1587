//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub state: String,
    pub source_handle: String,
    pub source_filename: String,
    pub summary: String,
    pub output_handle: Option<String>,
    pub decision_list_handle: Option<String>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub attempt: u32,
    pub scenes_ready: bool,
    pub segments_ready: bool,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            state: row.get("state")?,
            source_handle: row.get("source_handle")?,
            source_filename: row.get("source_filename")?,
            summary: row.get("summary")?,
            output_handle: row.get("output_handle")?,
            decision_list_handle: row.get("decision_list_handle")?,
            failed_stage: row.get("failed_stage")?,
            error: row.get("error")?,
            attempt: row.get("attempt")?,
            scenes_ready: row.get("scenes_ready")?,
            segments_ready: row.get("segments_ready")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub state: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, state, source_handle, source_filename, summary, output_handle,
         decision_list_handle, failed_stage, error, attempt, scenes_ready, segments_ready,
         created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            job.id,
            job.state,
            job.source_handle,
            job.source_filename,
            job.summary,
            job.output_handle,
            job.decision_list_handle,
            job.failed_stage,
            job.error,
            job.attempt,
            job.scenes_ready,
            job.segments_ready,
            job.created_at,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Updates an existing job row. All fields except `id`, `created_at` and the
/// source inputs are overwritten. Returns the number of rows touched.
pub fn update(conn: &Connection, job: &JobRow) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET state=?2, output_handle=?3, decision_list_handle=?4, failed_stage=?5,
         error=?6, attempt=?7, scenes_ready=?8, segments_ready=?9, updated_at=?10,
         completed_at=?11
         WHERE id=?1",
        params![
            job.id,
            job.state,
            job.output_handle,
            job.decision_list_handle,
            job.failed_stage,
            job.error,
            job.attempt,
            job.scenes_ready,
            job.segments_ready,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(changed)
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Queries jobs newest first, returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;

    match filter.state {
        Some(ref state) => {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE state = ?1",
                params![state],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT * FROM jobs WHERE state = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![state, limit, offset], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total))
        }
        None => {
            let total: u64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
            let mut stmt =
                conn.prepare("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")?;
            let rows = stmt
                .query_map(params![limit, offset], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total))
        }
    }
}

/// Returns the IDs of jobs in any of the given states.
pub fn ids_in_states(conn: &Connection, states: &[&str]) -> Result<Vec<String>, DatabaseError> {
    let mut ids = Vec::new();
    let mut stmt = conn.prepare("SELECT id FROM jobs WHERE state = ?1 ORDER BY created_at")?;
    for state in states {
        let found = stmt
            .query_map(params![state], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.extend(found);
    }
    Ok(ids)
}

/// Every artifact handle any job refers to.
pub fn artifact_handles(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT source_handle, output_handle, decision_list_handle FROM jobs")?;
    let rows = stmt
        .query_map([], |r| {
            Ok([
                Some(r.get::<_, String>(0)?),
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<String>>(2)?,
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().flatten().flatten().collect())
}

/// Deletes a job. Owned scenes, segments and matches cascade.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            state: "CREATED".to_string(),
            source_handle: format!("source-{}.mp4", id),
            source_filename: "film.mp4".to_string(),
            summary: "A man walks away.".to_string(),
            output_handle: None,
            decision_list_handle: None,
            failed_stage: None,
            error: None,
            attempt: 0,
            scenes_ready: false,
            segments_ready: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_job("job-1"))?;
            let found = find_by_id(conn, "job-1")?.unwrap();
            assert_eq!(found, sample_job("job-1"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        let found = db.with_conn(|conn| find_by_id(conn, "nonexistent")).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_update() {
        let db = test_db();
        db.with_conn(|conn| {
            let mut job = sample_job("job-2");
            insert(conn, &job)?;

            job.state = "FAILED".to_string();
            job.failed_stage = Some("captioning".to_string());
            job.error = Some("endpoint unreachable".to_string());
            job.attempt = 2;
            job.scenes_ready = true;
            assert_eq!(update(conn, &job)?, 1);

            let found = find_by_id(conn, "job-2")?.unwrap();
            assert_eq!(found.state, "FAILED");
            assert_eq!(found.failed_stage.as_deref(), Some("captioning"));
            assert_eq!(found.attempt, 2);
            assert!(found.scenes_ready);
            assert!(!found.segments_ready);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_missing_row_touches_nothing() {
        let db = test_db();
        let changed = db
            .with_conn(|conn| update(conn, &sample_job("ghost")))
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_query_with_state_filter_and_pagination() {
        let db = test_db();
        db.with_conn(|conn| {
            for i in 0..5 {
                let mut job = sample_job(&format!("q{}", i));
                job.created_at = format!("2026-01-{:02}T00:00:00Z", i + 1);
                if i % 2 == 0 {
                    job.state = "DONE".to_string();
                }
                insert(conn, &job)?;
            }

            let (rows, total) = query(conn, &JobFilter::default())?;
            assert_eq!(total, 5);
            assert_eq!(rows[0].id, "q4");

            let (rows, total) = query(
                conn,
                &JobFilter {
                    state: Some("DONE".to_string()),
                    limit: Some(2),
                    ..Default::default()
                },
            )?;
            assert_eq!(total, 3);
            assert_eq!(rows.len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_ids_in_states() {
        let db = test_db();
        db.with_conn(|conn| {
            let mut a = sample_job("a");
            a.state = "MATCHING".to_string();
            let mut b = sample_job("b");
            b.state = "FINALIZING".to_string();
            insert(conn, &a)?;
            insert(conn, &b)?;
            insert(conn, &sample_job("c"))?;

            let mut ids = ids_in_states(conn, &["MATCHING", "FINALIZING"])?;
            ids.sort();
            assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_job("d1"))?;
            assert!(delete(conn, "d1")?);
            assert!(!delete(conn, "d1")?);
            assert!(find_by_id(conn, "d1")?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
