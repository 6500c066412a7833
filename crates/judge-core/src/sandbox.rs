// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, WaitContainerOptions,
};
use bollard::service::{HostConfig, HostConfigLogConfig};
use futures::StreamExt;

use crate::errors::SandboxError;

/// Fixed judge image: contains nothing but the interpreter submissions are invoked under (§4.2).
pub const SANDBOX_IMAGE: &str = "carp_judge";
/// Bind-mount point for a Case's scratch directory inside the container; shared with the
/// parameter substitution in [`crate::archive`].
pub const SANDBOX_MOUNT_POINT: &str = crate::archive::SANDBOX_MOUNT_POINT;

const PIDS_LIMIT: i64 = 64;
const TMPFS_SIZE_BYTES: u64 = 1 << 30;

/// Outcome of running one container to completion, or to a timeout-forced kill (§3 Case, §4.2).
#[derive(Debug, Clone, Default)]
pub struct SandboxOutcome {
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status_code: i64,
}

/// Runs one Case's container to completion via the Docker Engine API, guaranteeing removal
/// regardless of how the run ends (§4.2). Holds the process-wide Docker client handle; cheap to
/// clone and share across concurrent judge slots (the underlying HTTP client is itself `Clone`).
pub struct SandboxRunner {
    docker: Docker,
}

impl SandboxRunner {
    pub fn new(docker: Docker) -> Self {
        SandboxRunner { docker }
    }

    /// Creates a container for `command` bind-mounting `scratch_dir` read-only at
    /// [`SANDBOX_MOUNT_POINT`], awaits its exit bounded by `time_limit_secs`, captures stdout and
    /// stderr, and removes the container before returning on every exit path.
    pub async fn run(
        &self,
        command: Vec<String>,
        scratch_dir: &Path,
        cpu: u64,
        memory_mb: u64,
        time_limit_secs: u64,
    ) -> Result<SandboxOutcome, SandboxError> {
        let container_id = self.create(command, scratch_dir, cpu, memory_mb).await?;
        let result = self.await_completion(&container_id, time_limit_secs).await;

        // Finalizer discipline: removal is attempted no matter how `await_completion` resolved.
        // Failures are logged and swallowed so they never mask the primary outcome (§7).
        if let Err(err) = self
            .docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            log::warn!("failed to remove container {container_id}: {err}");
        }

        result
    }

    async fn create(
        &self,
        command: Vec<String>,
        scratch_dir: &Path,
        cpu: u64,
        memory_mb: u64,
    ) -> Result<String, SandboxError> {
        let scratch_path = scratch_dir
            .to_str()
            .ok_or_else(|| SandboxError::new("Scratch directory path is not valid UTF-8"))?;

        let mut tmpfs = HashMap::new();
        tmpfs.insert("/tmp".to_string(), format!("rw,size={TMPFS_SIZE_BYTES}"));
        tmpfs.insert("/run".to_string(), format!("rw,size={TMPFS_SIZE_BYTES}"));

        let mut log_config_options = HashMap::new();
        log_config_options.insert("max-size".to_string(), "1m".to_string());
        log_config_options.insert("max-file".to_string(), "2".to_string());
        log_config_options.insert("mode".to_string(), "non-blocking".to_string());

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{scratch_path}:{SANDBOX_MOUNT_POINT}:ro"
            )]),
            nano_cpus: Some((cpu.saturating_mul(1_000_000_000)) as i64),
            memory: Some((memory_mb.saturating_mul(1024 * 1024)) as i64),
            memory_swap: Some((memory_mb.saturating_mul(1024 * 1024)) as i64),
            pids_limit: Some(PIDS_LIMIT),
            network_mode: Some("none".to_string()),
            readonly_rootfs: Some(true),
            tmpfs: Some(tmpfs),
            log_config: Some(HostConfigLogConfig {
                typ: Some("json-file".to_string()),
                config: Some(log_config_options),
            }),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(SANDBOX_IMAGE.to_string()),
            cmd: Some(command),
            host_config: Some(host_config),
            stop_signal: Some("SIGKILL".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: "",
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| SandboxError::new(format!("Failed to create container: {e}")))?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(|e| {
                SandboxError::new(format!(
                    "Failed to start container {}: {e}",
                    created.id
                ))
            })?;

        Ok(created.id)
    }

    async fn await_completion(
        &self,
        container_id: &str,
        time_limit_secs: u64,
    ) -> Result<SandboxOutcome, SandboxError> {
        let waited = tokio::time::timeout(
            Duration::from_secs(time_limit_secs),
            self.wait_for_exit(container_id),
        )
        .await;

        let (timed_out, status_code) = match waited {
            Ok(Ok(code)) => (false, code),
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                // Deadline fired first (§4.2 timeout discipline). The kill is best-effort: the
                // container may already have exited in the gap between the deadline firing and
                // this call, and that race is not an error.
                if let Err(err) = self
                    .docker
                    .kill_container(
                        container_id,
                        Some(KillContainerOptions { signal: "SIGKILL" }),
                    )
                    .await
                {
                    log::debug!(
                        "best-effort kill of {container_id} failed (already exited?): {err}"
                    );
                }
                (true, -1)
            }
        };

        let (stdout, stderr) = self.collect_logs(container_id).await?;
        Ok(SandboxOutcome {
            timed_out,
            stdout,
            stderr,
            status_code,
        })
    }

    async fn wait_for_exit(&self, container_id: &str) -> Result<i64, SandboxError> {
        let mut stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(err)) => Err(SandboxError::new(format!("Container wait failed: {err}"))),
            None => Err(SandboxError::new(
                "Container wait stream ended without a response",
            )),
        }
    }

    /// Fetches stdout and stderr independently. Each stream is already bounded by the log
    /// driver's `max-size`/`max-file` (§4.2); this just demultiplexes without re-trimming.
    async fn collect_logs(&self, container_id: &str) -> Result<(Vec<u8>, Vec<u8>), SandboxError> {
        let mut stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(_) => {}
                Err(err) => {
                    return Err(SandboxError::new(format!(
                        "Failed to fetch container logs: {err}"
                    )));
                }
            }
        }
        Ok((stdout, stderr))
    }
}
