//! Segment repository: the ordered summary segments owned by a job.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::model::SummarySegment;

fn segment_from_row(row: &Row<'_>) -> Result<SummarySegment, rusqlite::Error> {
    Ok(SummarySegment {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        rank: row.get("rank")?,
        text: row.get("text")?,
    })
}

pub fn replace_for_job(
    conn: &Connection,
    job_id: &str,
    segments: &[SummarySegment],
) -> Result<(), DatabaseError> {
    delete_for_job(conn, job_id)?;
    let mut stmt =
        conn.prepare("INSERT INTO segments (id, job_id, rank, text) VALUES (?1, ?2, ?3, ?4)")?;
    for segment in segments {
        stmt.execute(params![segment.id, job_id, segment.rank, segment.text])?;
    }
    Ok(())
}

/// Lists a job's segments in summary order.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<SummarySegment>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM segments WHERE job_id = ?1 ORDER BY rank")?;
    let segments = stmt
        .query_map(params![job_id], segment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(segments)
}

pub fn delete_for_job(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM segments WHERE job_id = ?1", params![job_id])?)
}
