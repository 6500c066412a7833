// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The control plane (C7): one persistent duplex connection to the dispatcher, multiplexing an
//! inbound job stream against the worker scheduler's slot pool (§4.7, §5).

use std::sync::Arc;
use std::time::Duration;

use bollard::Docker;
use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::Config;
use crate::errors::ControlPlaneError;
use crate::protocol::Message;
use crate::scheduler::{Job, ResultEnvelope, Scheduler};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Runs the control plane forever: authenticate, connect, run the five-task connection group
/// until one member terminates, then back off 5 seconds and retry (§4.7 state machine).
///
/// Never returns under normal operation; each iteration's errors are logged and absorbed so one
/// bad connection attempt never crashes the worker process.
pub async fn run(config: Config, docker: Docker, worker_uid: String) -> ! {
    let http = reqwest::Client::new();
    loop {
        match run_one_connection(&config, &docker, &worker_uid, &http).await {
            Ok(()) => log::warn!("disconnected, retry after {RECONNECT_BACKOFF:?}"),
            Err(err) => log::error!("connection attempt failed: {err}, retry after {RECONNECT_BACKOFF:?}"),
        }
        sleep(RECONNECT_BACKOFF).await;
    }
}

async fn run_one_connection(
    config: &Config,
    docker: &Docker,
    worker_uid: &str,
    http: &reqwest::Client,
) -> Result<(), ControlPlaneError> {
    log::info!("logging in to {}", config.login_url);
    let token = login(http, &config.login_url, &config.username, &config.password).await?;

    log::info!("connecting to {}", config.websocket_url);
    let mut request = config.websocket_url.as_str().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}")
            .parse()
            .map_err(|_| ControlPlaneError::new("Invalid auth token"))?,
    );
    let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
    log::info!("connected");
    let (ws_sink, ws_source) = ws_stream.split();

    let (send_tx, send_rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
    let (receive_tx, receive_rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
    let (job_tx, job_rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<ResultEnvelope>(QUEUE_CAPACITY);

    send_tx
        .send(Message::WorkerInfo {
            uid: worker_uid.to_string(),
            max_tasks: config.parallel_judge_tasks,
        })
        .await
        .map_err(|_| ControlPlaneError::new("send queue closed before startup"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher_task = tokio::spawn(run_dispatcher(ws_sink, send_rx, shutdown_rx.clone()));
    let receiver_task = tokio::spawn(run_receiver(ws_source, receive_tx, shutdown_rx.clone()));
    let handler_task = tokio::spawn(run_handler(receive_rx, job_tx, shutdown_rx.clone()));
    let heartbeat_task = tokio::spawn(run_heartbeat(send_tx.clone(), shutdown_rx.clone()));
    let result_forwarder_task = tokio::spawn(run_result_forwarder(
        result_rx,
        send_tx.clone(),
        shutdown_rx.clone(),
    ));

    let scheduler = Scheduler::new(docker.clone(), config.log_limit_bytes);
    let slot_handles = scheduler.spawn_slots(
        config.parallel_judge_tasks,
        job_rx,
        result_tx,
        send_tx.clone(),
        shutdown_rx,
    );

    // Structured concurrency (§5): the five per-connection task kinds plus every judge slot form
    // one group. The first to finish signals `shutdown`; everyone else drains to completion
    // before this function returns. A slot that is mid-Case when shutdown fires is never
    // interrupted there -- it only observes the flag between jobs (see `scheduler::run_slot`) --
    // so container teardown and scratch deletion always finish before the slot's task does.
    let mut group: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();
    group.push(dispatcher_task);
    group.push(receiver_task);
    group.push(handler_task);
    group.push(heartbeat_task);
    group.push(result_forwarder_task);
    for handle in slot_handles {
        group.push(handle);
    }

    group.next().await;
    log::warn!("a connection task ended, signalling the rest to shut down");
    let _ = shutdown_tx.send(true);
    while group.next().await.is_some() {}

    Ok(())
}

async fn login(
    http: &reqwest::Client,
    login_url: &str,
    username: &str,
    password: &str,
) -> Result<String, ControlPlaneError> {
    let response = http
        .post(login_url)
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await?
        .error_for_status()?;
    let body: LoginResponse = response.json().await?;
    Ok(body.token)
}

async fn run_dispatcher(
    mut ws_sink: impl futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    mut send_rx: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            message = send_rx.recv() => message,
            _ = shutdown.changed() => return,
        };
        let Some(message) = message else { return };
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                log::error!("failed to serialize outbound message: {err}");
                continue;
            }
        };
        if let Err(err) = ws_sink.send(WsMessage::Text(text.into())).await {
            log::error!("failed to send message: {err}");
            return;
        }
    }
}

async fn run_receiver(
    mut ws_source: impl futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    receive_tx: mpsc::Sender<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            frame = ws_source.next() => frame,
            _ = shutdown.changed() => return,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                log::error!("websocket read error: {err}");
                return;
            }
            None => return,
        };
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => {
                log::info!("server closed the connection");
                return;
            }
            _ => continue,
        };
        match serde_json::from_str::<Message>(&text) {
            Ok(message) => {
                if receive_tx.send(message).await.is_err() {
                    return;
                }
            }
            // One bad message never terminates the receive loop (§7).
            Err(err) => log::warn!("failed to parse inbound message: {err}"),
        }
    }
}

/// Drains `receive_rx`, decoding `CASE_DATA` jobs onto `job_tx` and logging (or, for future wire
/// extensions, replying to) everything else.
async fn run_handler(
    mut receive_rx: mpsc::Receiver<Message>,
    job_tx: mpsc::Sender<Job>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            message = receive_rx.recv() => message,
            _ = shutdown.changed() => return,
        };
        let Some(message) = message else { return };
        handle_message(message, &job_tx).await;
    }
}

async fn handle_message(message: Message, job_tx: &mpsc::Sender<Job>) {
    match message {
        Message::CaseData { cid, ctype, data } => match base85::decode(&data) {
            Ok(archive_bytes) => {
                if job_tx
                    .send(Job {
                        cid,
                        ctype,
                        archive_bytes,
                    })
                    .await
                    .is_err()
                {
                    log::warn!("job queue closed, dropping inbound case");
                }
            }
            Err(err) => log::warn!("failed to decode archive for case: {err:?}"),
        },
        Message::WorkerTick => log::trace!("heartbeat tick from server"),
        other => log::trace!("ignoring unexpected inbound message: {other:?}"),
    }
}

async fn run_heartbeat(send_tx: mpsc::Sender<Message>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = sleep(HEARTBEAT_INTERVAL) => {}
            _ = shutdown.changed() => return,
        }
        if send_tx.send(Message::WorkerTick).await.is_err() {
            return;
        }
    }
}

async fn run_result_forwarder(
    mut result_rx: mpsc::Receiver<ResultEnvelope>,
    send_tx: mpsc::Sender<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let envelope = tokio::select! {
            envelope = result_rx.recv() => envelope,
            _ = shutdown.changed() => return,
        };
        let Some(envelope) = envelope else { return };
        // CASE_START for this cid was already sent by the slot when it claimed the job
        // (scheduler::run_slot); this forwarder only ever emits the terminal CASE_RESULT.
        let result = Message::CaseResult {
            cid: envelope.cid,
            timedout: envelope.timed_out,
            stdout: String::from_utf8_lossy(&envelope.stdout).into_owned(),
            stdout_overflow: envelope.stdout_overflow,
            stderr: String::from_utf8_lossy(&envelope.stderr).into_owned(),
            stderr_overflow: envelope.stderr_overflow,
            exitcode: envelope.exit_code,
            timestamp: envelope.timestamp,
        };
        if send_tx.send(result).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_message_decodes_case_data_into_a_job() {
        let (job_tx, mut job_rx) = mpsc::channel(1);
        let encoded = base85::encode(b"zip-bytes");
        handle_message(
            Message::CaseData {
                cid: "case-1".to_string(),
                ctype: judge_core::CaseType::Carp,
                data: encoded,
            },
            &job_tx,
        )
        .await;
        let job = job_rx.recv().await.unwrap();
        assert_eq!(job.cid, "case-1");
        assert_eq!(job.archive_bytes, b"zip-bytes");
    }

    #[tokio::test]
    async fn handle_message_drops_malformed_archive_data_without_panicking() {
        let (job_tx, mut job_rx) = mpsc::channel(1);
        handle_message(
            Message::CaseData {
                cid: "case-2".to_string(),
                ctype: judge_core::CaseType::Carp,
                data: "not valid base85!!".to_string(),
            },
            &job_tx,
        )
        .await;
        drop(job_tx);
        assert!(job_rx.recv().await.is_none());
    }
}
