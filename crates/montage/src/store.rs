//! Typed job store over the SQLite repositories.
//!
//! The orchestrator never touches rows directly. Every multi-table commit
//! goes through one transaction, so a job record and the scenes, segments
//! or matches it owns are always written together.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{match_repo, scene_repo, segment_repo, Database, DatabaseError};
use crate::model::{Job, JobState, Match, Scene, Stage, SummarySegment};
use crate::storage::ArtifactHandle;

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn create(&self, job: &Job) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_conn(|conn| job_repo::insert(conn, &row))
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, id))?;
        row.map(row_to_job).transpose()
    }

    pub fn save(&self, job: &Job) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        let changed = self.db.with_conn(|conn| job_repo::update(conn, &row))?;
        if changed == 0 {
            log::warn!("Job {} vanished before its update was written", job.id);
        }
        Ok(())
    }

    /// Lists jobs newest first, returning (jobs, total_count).
    pub fn list(
        &self,
        state: Option<JobState>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<(Vec<Job>, u64), DatabaseError> {
        let filter = JobFilter {
            state: state.map(|s| s.as_str().to_string()),
            limit,
            offset,
        };
        let (rows, total) = self.db.with_conn(|conn| job_repo::query(conn, &filter))?;
        let jobs = rows
            .into_iter()
            .map(row_to_job)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total))
    }

    pub fn ids_in_states(&self, states: &[JobState]) -> Result<Vec<String>, DatabaseError> {
        let names: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        self.db.with_conn(|conn| job_repo::ids_in_states(conn, &names))
    }

    pub fn referenced_artifacts(&self) -> Result<HashSet<ArtifactHandle>, DatabaseError> {
        let handles = self.db.with_conn(job_repo::artifact_handles)?;
        Ok(handles.into_iter().map(ArtifactHandle::new).collect())
    }

    pub fn scenes(&self, job_id: &str) -> Result<Vec<Scene>, DatabaseError> {
        self.db.with_conn(|conn| scene_repo::list_for_job(conn, job_id))
    }

    pub fn segments(&self, job_id: &str) -> Result<Vec<SummarySegment>, DatabaseError> {
        self.db
            .with_conn(|conn| segment_repo::list_for_job(conn, job_id))
    }

    pub fn matches(&self, job_id: &str) -> Result<Vec<Match>, DatabaseError> {
        self.db.with_conn(|conn| match_repo::list_for_job(conn, job_id))
    }

    /// Writes the scene set together with the job record.
    pub fn commit_scenes(&self, job: &Job, scenes: &[Scene]) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            scene_repo::replace_for_job(tx, &job.id, scenes)?;
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    /// Fills in captions (scene id, caption) together with the job record.
    pub fn commit_captions(
        &self,
        job: &Job,
        captions: &[(String, String)],
    ) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            for (scene_id, caption) in captions {
                if !scene_repo::set_caption(tx, scene_id, caption)? {
                    return Err(DatabaseError::Corrupt {
                        column: "scenes.id",
                        value: scene_id.clone(),
                    });
                }
            }
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    pub fn commit_segments(
        &self,
        job: &Job,
        segments: &[SummarySegment],
    ) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            segment_repo::replace_for_job(tx, &job.id, segments)?;
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    /// Replaces the whole match set together with the job record.
    pub fn commit_matches(&self, job: &Job, matches: &[Match]) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            match_repo::replace_for_job(tx, &job.id, matches)?;
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    /// Upserts edited matches. Either every edit lands or none does.
    pub fn apply_match_edits(&self, job: &Job, edits: &[Match]) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            match_repo::upsert(tx, &job.id, edits)?;
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    /// Drops scenes, segments and matches and writes the job record.
    pub fn reset_derived(&self, job: &Job) -> Result<(), DatabaseError> {
        let row = job_to_row(job);
        self.db.with_transaction(|tx| {
            match_repo::delete_for_job(tx, &job.id)?;
            segment_repo::delete_for_job(tx, &job.id)?;
            scene_repo::delete_for_job(tx, &job.id)?;
            job_repo::update(tx, &row)?;
            Ok(())
        })
    }

    /// Deletes the job and, by cascade, everything it owns.
    pub fn delete(&self, job_id: &str) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| job_repo::delete(conn, job_id))
    }
}

// ─── Row conversion ───

fn job_to_row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.clone(),
        state: job.state.as_str().to_string(),
        source_handle: job.source.as_str().to_string(),
        source_filename: job.source_filename.clone(),
        summary: job.summary.clone(),
        output_handle: job.output.as_ref().map(|h| h.as_str().to_string()),
        decision_list_handle: job.decision_list.as_ref().map(|h| h.as_str().to_string()),
        failed_stage: job.failed_stage.map(|s| s.as_str().to_string()),
        error: job.error.clone(),
        attempt: job.attempt,
        scenes_ready: job.scenes_ready,
        segments_ready: job.segments_ready,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
        completed_at: job.completed_at.map(|t| t.to_rfc3339()),
    }
}

fn row_to_job(row: JobRow) -> Result<Job, DatabaseError> {
    let state: JobState = row.state.parse().map_err(|_| DatabaseError::Corrupt {
        column: "state",
        value: row.state.clone(),
    })?;
    let failed_stage = row
        .failed_stage
        .map(|s| {
            s.parse::<Stage>()
                .map_err(|_| DatabaseError::Corrupt {
                    column: "failed_stage",
                    value: s.clone(),
                })
        })
        .transpose()?;

    Ok(Job {
        id: row.id,
        state,
        source: ArtifactHandle::new(row.source_handle),
        source_filename: row.source_filename,
        summary: row.summary,
        output: row.output_handle.map(ArtifactHandle::new),
        decision_list: row.decision_list_handle.map(ArtifactHandle::new),
        failed_stage,
        error: row.error,
        attempt: row.attempt,
        scenes_ready: row.scenes_ready,
        segments_ready: row.segments_ready,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        completed_at: row
            .completed_at
            .map(|t| parse_timestamp("completed_at", &t))
            .transpose()?,
    })
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DatabaseError::Corrupt {
            column,
            value: value.to_string(),
        })
}
