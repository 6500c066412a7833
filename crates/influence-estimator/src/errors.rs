// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// Raised when a seed file is inconsistent with its network (unknown vertex, malformed integer,
/// or a seed count mismatch). Carries a reason string that is surfaced verbatim to callers, since
/// the dispatcher matches on the exact wording in some of these messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionError {
    reason: String,
}

impl SolutionError {
    pub fn new(reason: impl Into<String>) -> Self {
        SolutionError {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for SolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for SolutionError {}
