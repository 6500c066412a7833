// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Control-plane wire messages (§4.7, §6): JSON objects tagged by a `type` field, with submission
//! archive bytes base85-encoded inline.

use std::time::{SystemTime, UNIX_EPOCH};

use judge_core::CaseType;
use serde::{Deserialize, Serialize};

/// One message on the duplex channel to the dispatcher, tagged by `type` (§4.7 message taxonomy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Server -> worker: carries one job. `data` is the base85-encoded submission archive.
    #[serde(rename = "CASE_DATA")]
    CaseData {
        cid: String,
        ctype: CaseType,
        data: String,
    },
    /// Worker -> server: run has commenced for `cid`. Always sent strictly before the matching
    /// [`Message::CaseResult`] (§5 ordering guarantees).
    #[serde(rename = "CASE_START")]
    CaseStart { cid: String },
    /// Worker -> server: terminal result for `cid` (§6 result envelope fields).
    #[serde(rename = "CASE_RESULT")]
    CaseResult {
        cid: String,
        timedout: bool,
        stdout: String,
        stdout_overflow: bool,
        stderr: String,
        stderr_overflow: bool,
        exitcode: i64,
        timestamp: u64,
    },
    /// Bidirectional heartbeat, sent every 60s while connected (§4.7, §5).
    #[serde(rename = "WORKER_TICK")]
    WorkerTick,
    /// Worker -> server: advertises identity and concurrency once per connection.
    #[serde(rename = "WORKER_INFO")]
    WorkerInfo {
        uid: String,
        #[serde(rename = "maxTasks")]
        max_tasks: usize,
    },
}

/// Seconds since the Unix epoch, for [`Message::CaseResult::timestamp`].
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_data_round_trips_with_wire_type_tags() {
        let msg = Message::CaseData {
            cid: "case-1".to_string(),
            ctype: CaseType::Imp,
            data: "archive-bytes".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "CASE_DATA");
        assert_eq!(json["ctype"], "IMP");

        let round_tripped: Message = serde_json::from_value(json).unwrap();
        match round_tripped {
            Message::CaseData { cid, ctype, .. } => {
                assert_eq!(cid, "case-1");
                assert_eq!(ctype, CaseType::Imp);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn worker_tick_has_no_payload_fields() {
        let json = serde_json::to_value(Message::WorkerTick).unwrap();
        assert_eq!(json, serde_json::json!({"type": "WORKER_TICK"}));
    }
}
