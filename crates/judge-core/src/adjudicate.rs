// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::str::FromStr;

use influence_estimator::{DiffusionModel, estimate_async};

use crate::case::Case;
use crate::errors::{ArchiveError, JudgeError};
use crate::manifest::{CaseType, ManifestModel};

/// The adjudicator's classification of a completed Case (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Rejected(String),
    /// `score` is `None` for CARP (external adjudication) and ISE (no scoring applicable), and
    /// `Some(spread)` for IMP once the reference solver has estimated it.
    Accepted { score: Option<f64> },
}

/// Classifies a completed Case (§4.5). Pure aside from invoking the reference solver for IMP
/// cases; this function never touches the container or the scratch directory beyond reading the
/// dataset the manifest already names.
pub async fn adjudicate(case: &Case) -> Result<Verdict, JudgeError> {
    if case.timed_out {
        return Ok(Verdict::Rejected("Timed out".to_string()));
    }
    if case.status_code != 0 {
        return Ok(Verdict::Rejected("Exit code is not zero".to_string()));
    }
    if case.stdout.is_empty() {
        return Ok(Verdict::Rejected("No output".to_string()));
    }

    match case.ctype {
        // CARP is scored by the dispatcher against the raw stdout; ISE has no pass/fail scoring
        // of its own -- both just carry the run's output through unscored.
        CaseType::Carp | CaseType::Ise => Ok(Verdict::Accepted { score: None }),
        CaseType::Imp => Ok(Verdict::Accepted {
            score: Some(score_imp_submission(case).await?),
        }),
    }
}

async fn score_imp_submission(case: &Case) -> Result<f64, JudgeError> {
    let network_name = case
        .manifest
        .network
        .as_deref()
        .ok_or_else(|| ArchiveError::new("IMP case is missing a network file"))?;
    let network_path = case.scratch_dir.join("data").join(network_name);
    let network = tokio::fs::read_to_string(&network_path)
        .await
        .map_err(|e| ArchiveError::new(format!("Failed to read network file: {e}")))?;

    let seeds = String::from_utf8_lossy(&case.stdout).into_owned();
    let model = match case
        .manifest
        .model
        .as_deref()
        .and_then(|m| ManifestModel::from_str(m).ok())
    {
        Some(ManifestModel::Lt) => DiffusionModel::LinearThreshold,
        Some(ManifestModel::Ic) | None => DiffusionModel::IndependentCascade,
    };
    let seed_count = case.manifest.seed_count.unwrap_or(0) as usize;
    let random_seed = case.manifest.rng_seed.unwrap_or(0) as u64;

    let score = estimate_async(network, seeds, seed_count, model, num_cpus::get(), random_seed).await?;
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use std::path::PathBuf;

    fn base_case(ctype: CaseType) -> Case {
        Case::for_tests(
            "case-test".to_string(),
            ctype,
            Manifest {
                entry: "solve.py".to_string(),
                data: None,
                network: None,
                seeds: None,
                parameters: String::new(),
                time_seconds: 10,
                memory_mb: 256,
                cpu: 1,
                seed_count: None,
                model: None,
                rng_seed: None,
            },
            PathBuf::from("/tmp/carp_judge/test"),
            Vec::new(),
            Vec::new(),
            false,
            0,
        )
    }

    #[tokio::test]
    async fn timed_out_case_is_rejected() {
        let mut case = base_case(CaseType::Carp);
        case.timed_out = true;
        let verdict = adjudicate(&case).await.unwrap();
        assert_eq!(verdict, Verdict::Rejected("Timed out".to_string()));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_rejected() {
        let mut case = base_case(CaseType::Carp);
        case.status_code = 1;
        let verdict = adjudicate(&case).await.unwrap();
        assert_eq!(verdict, Verdict::Rejected("Exit code is not zero".to_string()));
    }

    #[tokio::test]
    async fn empty_stdout_is_rejected() {
        let case = base_case(CaseType::Carp);
        let verdict = adjudicate(&case).await.unwrap();
        assert_eq!(verdict, Verdict::Rejected("No output".to_string()));
    }

    #[tokio::test]
    async fn carp_case_passes_through_unscored() {
        let mut case = base_case(CaseType::Carp);
        case.stdout = b"35\n".to_vec();
        let verdict = adjudicate(&case).await.unwrap();
        assert_eq!(verdict, Verdict::Accepted { score: None });
    }
}
