// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The worker scheduler (C6): a fixed-size pool of concurrent judge slots consuming a bounded job
//! queue and producing a bounded result queue.

use std::sync::Arc;

use bollard::Docker;
use judge_core::{adjudicate, Case, CaseType, SandboxRunner, Verdict};
use tokio::sync::{mpsc, watch, Mutex};

use crate::protocol::{unix_timestamp, Message};

/// Receiving half of the bounded job queue, shared across every slot. `tokio::sync::mpsc::Receiver`
/// has only one logical consumer, so fanning it out to `P` slots means wrapping it behind a mutex:
/// whichever slot is waiting on `recv()` takes the next job, giving the same "exactly one slot per
/// job" guarantee a true MPMC queue would.
pub type JobReceiver = Arc<Mutex<mpsc::Receiver<Job>>>;

/// One inbound job: an archive plus the metadata the dispatcher assigned it.
#[derive(Debug, Clone)]
pub struct Job {
    pub cid: String,
    pub ctype: CaseType,
    pub archive_bytes: Vec<u8>,
}

/// A completed Case's result, ready to be wrapped in a `CASE_RESULT` message and sent (§6).
#[derive(Debug, Clone)]
pub struct ResultEnvelope {
    pub cid: String,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stdout_overflow: bool,
    pub stderr: Vec<u8>,
    pub stderr_overflow: bool,
    pub exit_code: i64,
    pub timestamp: u64,
}

/// Owns the pool of `P` concurrent judge slots (§4.6). Each slot runs an unbounded loop: claim a
/// job, open a Case scope, run it, build a result envelope, push it to the result queue.
///
/// An [`judge_core::ArchiveError`] or [`judge_core::SandboxError`] surfacing from a job never
/// kills the slot; it is logged and the slot moves on to its next job. The Case scope (via
/// [`judge_core::CaseGuard`]'s `Drop`) guarantees no container or scratch dir leaks regardless of
/// where within the slot an error surfaces.
pub struct Scheduler {
    docker: Arc<Docker>,
    log_limit_bytes: usize,
}

impl Scheduler {
    pub fn new(docker: Docker, log_limit_bytes: usize) -> Self {
        Scheduler {
            docker: Arc::new(docker),
            log_limit_bytes,
        }
    }

    /// Spawns `slot_count` judge slots sharing `job_rx` and pushing results to `result_tx`. Each
    /// slot runs until `job_rx` closes or `shutdown` is signalled.
    ///
    /// `shutdown` is only observed between jobs, never while a Case is running (§5 cancellation):
    /// a slot that is mid-Case when shutdown fires finishes that Case -- container teardown and
    /// scratch deletion included -- before checking the flag again and exiting.
    pub fn spawn_slots(
        &self,
        slot_count: usize,
        job_rx: JobReceiver,
        result_tx: mpsc::Sender<ResultEnvelope>,
        send_tx: mpsc::Sender<Message>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..slot_count)
            .map(|slot_idx| {
                let docker = Arc::clone(&self.docker);
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let send_tx = send_tx.clone();
                let log_limit_bytes = self.log_limit_bytes;
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    run_slot(slot_idx, docker, job_rx, result_tx, send_tx, log_limit_bytes, shutdown).await;
                })
            })
            .collect()
    }
}

async fn run_slot(
    slot_idx: usize,
    docker: Arc<Docker>,
    job_rx: JobReceiver,
    result_tx: mpsc::Sender<ResultEnvelope>,
    send_tx: mpsc::Sender<Message>,
    log_limit_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let runner = SandboxRunner::new((*docker).clone());
    loop {
        if *shutdown.borrow() {
            break;
        }
        let job = tokio::select! {
            job = async { job_rx.lock().await.recv().await } => job,
            _ = shutdown.changed() => continue,
        };
        let job = match job {
            Some(job) => job,
            None => break,
        };
        log::info!("[{slot_idx}]({}) entering judge", job.cid);
        // §5 ordering: CASE_START is sent the moment a slot claims the job, strictly before the
        // eventual CASE_RESULT -- not merely back-to-back with it once the run has finished.
        if send_tx
            .send(Message::CaseStart { cid: job.cid.clone() })
            .await
            .is_err()
        {
            log::warn!("[{slot_idx}]({}) send queue closed, dropping CASE_START", job.cid);
        }
        match run_one_job(&runner, &job, log_limit_bytes).await {
            Ok(envelope) => {
                if result_tx.send(envelope).await.is_err() {
                    log::warn!("[{slot_idx}] result queue closed, dropping result for {}", job.cid);
                }
            }
            Err(err) => {
                log::error!("[{slot_idx}]({}) {err}", job.cid);
            }
        }
    }
    log::info!("[{slot_idx}] shutting down");
}

async fn run_one_job(
    runner: &SandboxRunner,
    job: &Job,
    log_limit_bytes: usize,
) -> Result<ResultEnvelope, judge_core::JudgeError> {
    let mut guard = Case::open(job.cid.clone(), job.ctype, &job.archive_bytes)?;
    guard.case_mut().run(runner).await?;

    let verdict = adjudicate(guard.case()).await?;
    match &verdict {
        Verdict::Rejected(reason) => log::info!("({}) rejected: {reason}", job.cid),
        Verdict::Accepted { score: Some(score) } => {
            log::info!("({}) accepted, estimated spread {score:.2}", job.cid)
        }
        Verdict::Accepted { score: None } => log::info!("({}) accepted", job.cid),
    }

    let case = guard.case();
    let (stdout, stdout_overflow) = truncate_to_last(&case.stdout, log_limit_bytes);
    let (stderr, stderr_overflow) = truncate_to_last(&case.stderr, log_limit_bytes);

    Ok(ResultEnvelope {
        cid: case.cid.clone(),
        timed_out: case.timed_out,
        stdout,
        stdout_overflow,
        stderr,
        stderr_overflow,
        exit_code: case.status_code,
        timestamp: unix_timestamp(),
    })
}

/// Truncates `bytes` to its last `limit` bytes, reporting whether truncation occurred (§4.6
/// output truncation).
fn truncate_to_last(bytes: &[u8], limit: usize) -> (Vec<u8>, bool) {
    if bytes.len() > limit {
        (bytes[bytes.len() - limit..].to_vec(), true)
    } else {
        (bytes.to_vec(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_tail_and_flags_overflow() {
        let (kept, overflow) = truncate_to_last(b"0123456789", 4);
        assert_eq!(kept, b"6789");
        assert!(overflow);
    }

    #[test]
    fn truncate_is_a_no_op_under_the_limit() {
        let (kept, overflow) = truncate_to_last(b"short", 4096);
        assert_eq!(kept, b"short");
        assert!(!overflow);
    }
}
