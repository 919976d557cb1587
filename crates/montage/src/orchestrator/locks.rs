//! Per-job serialisation.
//!
//! Each job has two locks. The mutation lock admits one client mutation at
//! a time and is only ever try-locked, so a second caller is told the job is
//! busy instead of queueing. The commit lock covers every read-check-write
//! of the job record, client or worker, and is awaited. Workers never hold
//! either lock while calling out to a capability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::error::ConflictError;

#[derive(Default)]
struct JobLock {
    mutation: Arc<AsyncMutex<()>>,
    commit: Arc<AsyncMutex<()>>,
}

type LockMap = Arc<Mutex<HashMap<String, Arc<JobLock>>>>;

/// Entries live only while someone holds or waits on one of the job's locks.
#[derive(Default)]
pub(crate) struct JobLocks {
    locks: LockMap,
}

/// A claim on a job's entry. The last claim to go removes the entry.
struct EntryClaim {
    locks: LockMap,
    job_id: String,
    lock: Arc<JobLock>,
}

impl Drop for EntryClaim {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let ours = locks
            .get(&self.job_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock));
        // One reference in the map, one here.
        if ours && Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.job_id);
        }
    }
}

/// Held for the duration of one client mutation.
pub(crate) struct MutationGuard {
    _mutation: OwnedMutexGuard<()>,
    _commit: OwnedMutexGuard<()>,
    _claim: EntryClaim,
}

/// Exclusive access to one job record.
pub(crate) struct CommitGuard {
    _commit: OwnedMutexGuard<()>,
    _claim: EntryClaim,
}

impl JobLocks {
    fn claim(&self, job_id: &str) -> EntryClaim {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(JobLock::default()))
            .clone();
        EntryClaim {
            locks: self.locks.clone(),
            job_id: job_id.to_string(),
            lock,
        }
    }

    /// Claims the job for a client mutation, or reports it busy.
    pub(crate) async fn mutation(&self, job_id: &str) -> Result<MutationGuard, ConflictError> {
        let claim = self.claim(job_id);
        let mutation = claim
            .lock
            .mutation
            .clone()
            .try_lock_owned()
            .map_err(|_| ConflictError::Busy {
                job_id: job_id.to_string(),
            })?;
        let commit = claim.lock.commit.clone().lock_owned().await;
        Ok(MutationGuard {
            _mutation: mutation,
            _commit: commit,
            _claim: claim,
        })
    }

    /// Waits for exclusive access to the job record.
    pub(crate) async fn commit(&self, job_id: &str) -> CommitGuard {
        let claim = self.claim(job_id);
        let commit = claim.lock.commit.clone().lock_owned().await;
        CommitGuard {
            _commit: commit,
            _claim: claim,
        }
    }

    /// Number of jobs with a live entry.
    pub(crate) fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_mutation_is_busy() {
        let locks = JobLocks::default();
        let _first = locks.mutation("j1").await.unwrap();

        let second = locks.mutation("j1").await;
        assert!(matches!(second, Err(ConflictError::Busy { job_id }) if job_id == "j1"));
    }

    #[tokio::test]
    async fn test_jobs_do_not_share_locks() {
        let locks = JobLocks::default();
        let _a = locks.mutation("a").await.unwrap();
        assert!(locks.mutation("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_mutation_waits_for_commit() {
        let locks = Arc::new(JobLocks::default());
        let commit = locks.commit("j1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.mutation("j1").await.is_ok() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(commit);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_released_mutation_can_be_claimed_again() {
        let locks = JobLocks::default();
        drop(locks.mutation("j1").await.unwrap());
        assert!(locks.mutation("j1").await.is_ok());
    }

    #[tokio::test]
    async fn test_entries_are_dropped_when_released() {
        let locks = JobLocks::default();

        let first = locks.mutation("j1").await.unwrap();
        assert!(locks.mutation("j1").await.is_err());
        assert_eq!(locks.tracked(), 1);
        drop(first);
        assert_eq!(locks.tracked(), 0);

        drop(locks.commit("j2").await);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_holds_it() {
        let locks = Arc::new(JobLocks::default());
        let commit = locks.commit("j1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.commit("j1").await;
            })
        };
        tokio::task::yield_now().await;

        drop(commit);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
