// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;

use rand::Rng;

use crate::archive;
use crate::errors::{ArchiveError, SandboxError};
use crate::manifest::{CaseType, Manifest};
use crate::sandbox::{SANDBOX_MOUNT_POINT, SandboxOutcome, SandboxRunner};

const SCRATCH_ROOT: &str = "/tmp/carp_judge";

/// A live judging job: manifest, exclusively-owned scratch directory, and (once run) captured
/// container output (§3). Only ever constructed through [`Case::open`], which opens the scope
/// that [`CaseGuard`] closes.
pub struct Case {
    pub cid: String,
    pub ctype: CaseType,
    pub manifest: Manifest,
    pub scratch_dir: PathBuf,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub status_code: i64,
    ran: bool,
}

impl Case {
    /// Opens a Case: creates a fresh scratch directory and invokes the archive loader (C1). On
    /// archive-load failure the half-built scratch directory is removed before the error is
    /// returned, since no [`CaseGuard`] was constructed to own it.
    pub fn open(
        cid: String,
        ctype: CaseType,
        archive_bytes: &[u8],
    ) -> Result<CaseGuard, ArchiveError> {
        let scratch_dir = PathBuf::from(SCRATCH_ROOT).join(random_suffix());
        std::fs::create_dir_all(&scratch_dir)
            .map_err(|e| ArchiveError::new(format!("Failed to create scratch directory: {e}")))?;

        let manifest = match archive::load(archive_bytes, &scratch_dir) {
            Ok(manifest) => manifest,
            Err(err) => {
                let _ = std::fs::remove_dir_all(&scratch_dir);
                return Err(err);
            }
        };

        Ok(CaseGuard {
            case: Some(Case {
                cid,
                ctype,
                manifest,
                scratch_dir,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                status_code: 0,
                ran: false,
            }),
        })
    }

    /// Runs the Case's container to completion via `runner` (§4.2). A Case supports exactly one
    /// `run` invocation; a second call fails with [`SandboxError`] without touching the runtime.
    pub async fn run(&mut self, runner: &SandboxRunner) -> Result<(), SandboxError> {
        if self.ran {
            return Err(SandboxError::new("Case has already been run"));
        }
        self.ran = true;

        let command = self.command();
        let SandboxOutcome {
            timed_out,
            stdout,
            stderr,
            status_code,
        } = runner
            .run(
                command,
                &self.scratch_dir,
                self.manifest.cpu,
                self.manifest.memory_mb,
                self.manifest.time_seconds,
            )
            .await?;

        self.timed_out = timed_out;
        self.stdout = stdout;
        self.stderr = stderr;
        self.status_code = status_code;
        Ok(())
    }

    fn command(&self) -> Vec<String> {
        let substituted = archive::substitute_parameters(&self.manifest, SANDBOX_MOUNT_POINT);
        let mut argv = vec![
            "python3".to_string(),
            format!("{SANDBOX_MOUNT_POINT}/program/{}", self.manifest.entry),
        ];
        match shlex::split(&substituted) {
            Some(tokens) => argv.extend(tokens),
            None => argv.push(substituted),
        }
        argv
    }
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Scoped ownership of a [`Case`] (§4.3): guarantees the scratch directory is removed on every
/// exit path, including an early `?` return or a panic unwind caught above the slot loop.
/// Container removal is not this guard's job -- [`SandboxRunner::run`] already guarantees it as
/// part of running the Case, before this guard is ever dropped.
pub struct CaseGuard {
    case: Option<Case>,
}

impl CaseGuard {
    pub fn case(&self) -> &Case {
        self.case.as_ref().expect("CaseGuard used after release")
    }

    pub fn case_mut(&mut self) -> &mut Case {
        self.case.as_mut().expect("CaseGuard used after release")
    }
}

impl Drop for CaseGuard {
    fn drop(&mut self) {
        if let Some(case) = self.case.take() {
            if let Err(err) = std::fs::remove_dir_all(&case.scratch_dir) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!(
                        "failed to remove scratch directory {}: {err}",
                        case.scratch_dir.display()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
impl Case {
    /// Builds a [`Case`] directly from its fields for adjudicator unit tests, bypassing
    /// [`Case::open`]'s archive unpacking. Test-only: production code always goes through `open`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn for_tests(
        cid: String,
        ctype: CaseType,
        manifest: Manifest,
        scratch_dir: PathBuf,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        timed_out: bool,
        status_code: i64,
    ) -> Case {
        Case {
            cid,
            ctype,
            manifest,
            scratch_dir,
            stdout,
            stderr,
            timed_out,
            status_code,
            ran: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn build_archive() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buf);
            let options = SimpleFileOptions::default();
            writer.start_file("config.json", options).unwrap();
            writer
                .write_all(br#"{"entry":"solve.py","parameters":"","time":10,"memory":256,"cpu":1}"#)
                .unwrap();
            writer.start_file("program/solve.py", options).unwrap();
            writer.write_all(b"print(1)\n").unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn open_creates_scratch_dir_and_drop_removes_it() {
        let archive = build_archive();
        let guard = Case::open("case-1".to_string(), CaseType::Carp, &archive).unwrap();
        let scratch_dir = guard.case().scratch_dir.clone();
        assert!(scratch_dir.exists());
        drop(guard);
        assert!(!scratch_dir.exists());
    }

    #[test]
    fn second_run_fails_with_sandbox_error_without_touching_runner() {
        // Exercises the `ran` guard directly; a real second `run()` call would need a live
        // Docker daemon, which this unit test deliberately avoids (§10 -- daemon-dependent tests
        // are integration-level and `#[ignore]`d).
        let archive = build_archive();
        let mut guard = Case::open("case-2".to_string(), CaseType::Carp, &archive).unwrap();
        guard.case_mut().ran = true;
        let err = futures::executor::block_on(async {
            let docker_stub_unreachable =
                bollard::Docker::connect_with_local_defaults().unwrap();
            let runner = SandboxRunner::new(docker_stub_unreachable);
            guard.case_mut().run(&runner).await
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Case has already been run");
    }

    #[test]
    fn command_joins_interpreter_entry_and_substituted_parameters() {
        let archive = build_archive();
        let mut guard = Case::open("case-3".to_string(), CaseType::Carp, &archive).unwrap();
        guard.case_mut().manifest.parameters = "$data -t $time".to_string();
        guard.case_mut().manifest.data = Some("test.dat".to_string());
        let command = guard.case().command();
        assert_eq!(
            command,
            vec![
                "python3".to_string(),
                "/workspace/program/solve.py".to_string(),
                "/workspace/data/test.dat".to_string(),
                "-t".to_string(),
                "10".to_string(),
            ]
        );
    }
}
