// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use serde::Deserialize;
use strum_macros::EnumString;

use crate::errors::ArchiveError;

/// A submission's adjudication category, as assigned by the dispatcher alongside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, serde::Serialize, serde::Deserialize)]
pub enum CaseType {
    #[strum(serialize = "CARP")]
    #[serde(rename = "CARP")]
    Carp,
    #[strum(serialize = "IMP")]
    #[serde(rename = "IMP")]
    Imp,
    #[strum(serialize = "ISE")]
    #[serde(rename = "ISE")]
    Ise,
}

/// The diffusion model named in a manifest's `model` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum ManifestModel {
    #[strum(serialize = "IC")]
    Ic,
    #[strum(serialize = "LT")]
    Lt,
}

/// `config.json` as deserialized directly from the archive, before any validation beyond what
/// serde's required/optional field handling gives us for free.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    pub entry: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub seeds: Option<String>,
    pub parameters: String,
    pub time: u64,
    pub memory: u64,
    pub cpu: u64,
    #[serde(rename = "seedCount", default)]
    pub seed_count: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
}

/// A manifest that has passed field-presence and value-range validation (§4.1 steps 2-5). Archive
/// entry-existence checks (steps 3-4) happen in [`crate::archive`] once the zip's file list is
/// available; this type only validates what the JSON body alone can tell us.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub entry: String,
    pub data: Option<String>,
    pub network: Option<String>,
    pub seeds: Option<String>,
    pub parameters: String,
    pub time_seconds: u64,
    pub memory_mb: u64,
    pub cpu: u64,
    pub seed_count: Option<u64>,
    pub model: Option<String>,
    pub rng_seed: Option<i64>,
}

impl Manifest {
    /// Parses and validates `config.json` bytes (§4.1 steps 2, 3 (entry non-empty only; archive
    /// presence is checked by the caller), 5).
    pub fn parse(config_json: &[u8]) -> Result<Manifest, ArchiveError> {
        let raw: RawManifest = serde_json::from_slice(config_json)
            .map_err(|e| ArchiveError::new(format!("Invalid config.json: {e}")))?;

        if raw.entry.is_empty() {
            return Err(ArchiveError::new("No entry point"));
        }
        if let Some(seed_count) = raw.seed_count {
            if seed_count == 0 {
                return Err(ArchiveError::new("Invalid seedCount"));
            }
        }
        if raw.time == 0 {
            return Err(ArchiveError::new("Invalid time"));
        }
        if raw.memory == 0 {
            return Err(ArchiveError::new("Invalid memory"));
        }
        if raw.cpu == 0 {
            return Err(ArchiveError::new("Invalid cpu"));
        }

        Ok(Manifest {
            entry: raw.entry,
            data: non_empty(raw.data),
            network: non_empty(raw.network),
            seeds: non_empty(raw.seeds),
            parameters: raw.parameters,
            time_seconds: raw.time,
            memory_mb: raw.memory,
            cpu: raw.cpu,
            seed_count: raw.seed_count,
            model: non_empty(raw.model),
            rng_seed: raw.seed,
        })
    }
}

/// Treats an empty string the same as an absent field, matching the original manifest reader's
/// `self.data = config.get('data', '')` convention where `''` means "not supplied".
fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "entry": "solve.py",
            "parameters": "$data",
            "time": 10,
            "memory": 256,
            "cpu": 1,
        })
    }

    #[test]
    fn parses_minimal_manifest() {
        let manifest = Manifest::parse(minimal_json().to_string().as_bytes()).unwrap();
        assert_eq!(manifest.entry, "solve.py");
        assert_eq!(manifest.data, None);
        assert_eq!(manifest.time_seconds, 10);
    }

    #[test]
    fn rejects_empty_entry() {
        let mut json = minimal_json();
        json["entry"] = serde_json::json!("");
        let err = Manifest::parse(json.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "No entry point");
    }

    #[test]
    fn rejects_zero_seed_count() {
        let mut json = minimal_json();
        json["seedCount"] = serde_json::json!(0);
        let err = Manifest::parse(json.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid seedCount");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Manifest::parse(b"not json").unwrap_err();
        assert!(err.to_string().contains("Invalid config.json"));
    }

    #[test]
    fn empty_optional_string_fields_are_treated_as_absent() {
        let mut json = minimal_json();
        json["data"] = serde_json::json!("");
        let manifest = Manifest::parse(json.to_string().as_bytes()).unwrap();
        assert_eq!(manifest.data, None);
    }
}
