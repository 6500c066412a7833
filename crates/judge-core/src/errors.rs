// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// A malformed submission archive or manifest. Fatal to the job, not to the slot: the slot that
/// encounters one logs it and moves on to the next job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveError {
    message: String,
}

impl ArchiveError {
    pub fn new(message: impl Into<String>) -> Self {
        ArchiveError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ArchiveError {}

/// Raised by the sandbox runner when it is misused (run invoked twice on the same case) or when
/// the container runtime refuses an operation outright. Reported to the dispatcher the same way
/// as an [`ArchiveError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxError {
    message: String,
}

impl SandboxError {
    pub fn new(message: impl Into<String>) -> Self {
        SandboxError {
            message: message.into(),
        }
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SandboxError {}

impl From<SandboxError> for ArchiveError {
    fn from(err: SandboxError) -> Self {
        // The adjudicator and slot loop report both error kinds identically; this lets a single
        // `match` arm in the scheduler handle the union without a third enum variant.
        ArchiveError::new(err.to_string())
    }
}

/// Top-level error a judging slot can observe from running a single case end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeError {
    Archive(ArchiveError),
    Sandbox(SandboxError),
    Solution(influence_estimator::SolutionError),
}

impl fmt::Display for JudgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeError::Archive(e) => write!(f, "{e}"),
            JudgeError::Sandbox(e) => write!(f, "{e}"),
            JudgeError::Solution(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for JudgeError {}

impl From<ArchiveError> for JudgeError {
    fn from(e: ArchiveError) -> Self {
        JudgeError::Archive(e)
    }
}

impl From<SandboxError> for JudgeError {
    fn from(e: SandboxError) -> Self {
        JudgeError::Sandbox(e)
    }
}

impl From<influence_estimator::SolutionError> for JudgeError {
    fn from(e: influence_estimator::SolutionError) -> Self {
        JudgeError::Solution(e)
    }
}
