//! Scene repository: the ordered scene set owned by a job.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::model::Scene;

fn scene_from_row(row: &Row<'_>) -> Result<Scene, rusqlite::Error> {
    Ok(Scene {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        rank: row.get("rank")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        caption: row.get("caption")?,
    })
}

/// Replaces every scene of a job. Run inside a transaction so readers never
/// observe a partial set.
pub fn replace_for_job(
    conn: &Connection,
    job_id: &str,
    scenes: &[Scene],
) -> Result<(), DatabaseError> {
    delete_for_job(conn, job_id)?;
    let mut stmt = conn.prepare(
        "INSERT INTO scenes (id, job_id, rank, start_time, end_time, caption)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for scene in scenes {
        stmt.execute(params![
            scene.id,
            job_id,
            scene.rank,
            scene.start_time,
            scene.end_time,
            scene.caption,
        ])?;
    }
    Ok(())
}

/// Sets the caption of one scene. Returns false if the scene is unknown.
pub fn set_caption(conn: &Connection, scene_id: &str, caption: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE scenes SET caption = ?2 WHERE id = ?1",
        params![scene_id, caption],
    )?;
    Ok(changed > 0)
}

/// Lists a job's scenes in playback order.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<Scene>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM scenes WHERE job_id = ?1 ORDER BY rank")?;
    let scenes = stmt
        .query_map(params![job_id], scene_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scenes)
}

pub fn delete_for_job(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM scenes WHERE job_id = ?1", params![job_id])?)
}
