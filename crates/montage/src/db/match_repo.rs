//! Match repository. Matches are keyed by segment id: a segment has at most
//! one row, and edits replace the row in place.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::model::{Match, MatchOrigin};

fn match_from_row(row: &Row<'_>) -> Result<(Match, String), rusqlite::Error> {
    let origin: String = row.get("origin")?;
    Ok((
        Match {
            segment_id: row.get("segment_id")?,
            scene_id: row.get("scene_id")?,
            score: row.get("score")?,
            origin: MatchOrigin::Auto,
        },
        origin,
    ))
}

/// Replaces the complete match set of a job.
pub fn replace_for_job(
    conn: &Connection,
    job_id: &str,
    matches: &[Match],
) -> Result<(), DatabaseError> {
    delete_for_job(conn, job_id)?;
    upsert(conn, job_id, matches)
}

/// Inserts or overwrites the matches for the given segments.
pub fn upsert(conn: &Connection, job_id: &str, matches: &[Match]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO matches (segment_id, job_id, scene_id, score, origin)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(segment_id) DO UPDATE SET
            scene_id = excluded.scene_id,
            score = excluded.score,
            origin = excluded.origin",
    )?;
    for m in matches {
        stmt.execute(params![
            m.segment_id,
            job_id,
            m.scene_id,
            m.score,
            m.origin.as_str()
        ])?;
    }
    Ok(())
}

/// Lists a job's matches in segment order.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<Match>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT m.* FROM matches m
         JOIN segments s ON s.id = m.segment_id
         WHERE m.job_id = ?1
         ORDER BY s.rank",
    )?;
    let rows = stmt
        .query_map(params![job_id], match_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(mut m, origin)| {
            m.origin = origin.parse().map_err(|_| DatabaseError::Corrupt {
                column: "origin",
                value: origin,
            })?;
            Ok(m)
        })
        .collect()
}

pub fn delete_for_job(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM matches WHERE job_id = ?1", params![job_id])?)
}
