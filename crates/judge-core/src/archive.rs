// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::errors::ArchiveError;
use crate::manifest::Manifest;

/// Fixed sandbox-visible mount point every submission's `/workspace` paths are rooted at (§4.1,
/// §4.2). Shared between parameter substitution here and the bind mount in [`crate::sandbox`].
pub const SANDBOX_MOUNT_POINT: &str = "/workspace";

/// Validates and materializes a submission archive into `scratch_dir` (§4.1), returning the
/// validated manifest. Validation is fail-fast in the order the spec lists: `config.json`
/// presence, manifest parse, entry-point presence, referenced-data-file presence.
pub fn load(archive_bytes: &[u8], scratch_dir: &Path) -> Result<Manifest, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(archive_bytes))
        .map_err(|e| ArchiveError::new(format!("Not a valid zip archive: {e}")))?;

    let config_bytes = read_entry(&mut zip, "config.json")?
        .ok_or_else(|| ArchiveError::new("Missing config.json"))?;
    let manifest = Manifest::parse(&config_bytes)?;

    let entry_path = format!("program/{}", manifest.entry);
    if !entry_exists(&mut zip, &entry_path) {
        return Err(ArchiveError::new(format!(
            "Entry point not found in archive: {entry_path}"
        )));
    }
    for (field, file_name) in [
        ("data", &manifest.data),
        ("network", &manifest.network),
        ("seeds", &manifest.seeds),
    ] {
        if let Some(name) = file_name {
            let path = format!("data/{name}");
            if !entry_exists(&mut zip, &path) {
                return Err(ArchiveError::new(format!(
                    "Missing {field} file in archive: {path}"
                )));
            }
        }
    }

    materialize(&mut zip, scratch_dir)?;
    Ok(manifest)
}

/// Substitutes `$data`/`$network`/`$seeds`/`$seedCount`/`$model`/`$time`/`$cpu`/`$memory`/`$seed`
/// placeholders in the manifest's `parameters` template. Each optional placeholder is substituted
/// only when its source field is present, so an unset field's literal token is left untouched
/// rather than leaking an empty path into the command line.
///
/// `$seed` is replaced last: it is a prefix of both `$seeds` and `$seedCount`, so replacing it
/// first would corrupt those two longer tokens.
pub fn substitute_parameters(manifest: &Manifest, sandbox_root: &str) -> String {
    let mut params = manifest.parameters.clone();
    if let Some(data) = &manifest.data {
        params = params.replace("$data", &format!("{sandbox_root}/data/{data}"));
    }
    if let Some(network) = &manifest.network {
        params = params.replace("$network", &format!("{sandbox_root}/data/{network}"));
    }
    if let Some(seeds) = &manifest.seeds {
        params = params.replace("$seeds", &format!("{sandbox_root}/data/{seeds}"));
    }
    if let Some(seed_count) = manifest.seed_count {
        params = params.replace("$seedCount", &seed_count.to_string());
    }
    if let Some(model) = &manifest.model {
        params = params.replace("$model", model);
    }
    params = params.replace("$time", &manifest.time_seconds.to_string());
    params = params.replace("$cpu", &manifest.cpu.to_string());
    params = params.replace("$memory", &manifest.memory_mb.to_string());
    if let Some(seed) = manifest.rng_seed {
        params = params.replace("$seed", &seed.to_string());
    }
    params
}

fn read_entry(
    zip: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    match zip.by_name(name) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| ArchiveError::new(format!("Failed to read {name}: {e}")))?;
            Ok(Some(buf))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(ArchiveError::new(format!(
            "Failed to read archive entry {name}: {e}"
        ))),
    }
}

fn entry_exists(zip: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> bool {
    zip.by_name(name).is_ok()
}

/// Materializes every `program/` and `data/` entry into `scratch_dir`. Entries outside those two
/// prefixes are skipped silently (the junkfile scenario, §8 #5): extraneous archive contents never
/// appear in the scratch directory.
fn materialize(zip: &mut ZipArchive<Cursor<&[u8]>>, scratch_dir: &Path) -> Result<(), ArchiveError> {
    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| ArchiveError::new(format!("Corrupt archive entry: {e}")))?;
        let name = file.name().to_string();
        if !(name.starts_with("program/") || name.starts_with("data/")) {
            continue;
        }
        if name == "program/" || name == "data/" {
            continue;
        }

        let dest = scratch_dir.join(&name);
        if file.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| {
                ArchiveError::new(format!(
                    "Failed to create directory {}: {e}",
                    dest.display()
                ))
            })?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::new(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ArchiveError::new(format!("Failed to read {name}: {e}")))?;
        let bytes = strip_carriage_returns(bytes);
        fs::write(&dest, &bytes)
            .map_err(|e| ArchiveError::new(format!("Failed to write {}: {e}", dest.display())))?;
    }
    Ok(())
}

/// Strips `\r` bytes from materialized files. The original loader's `bytes.replace(b'\r', b'')`
/// discarded its result without rebinding, making the strip a no-op (§9 Open Question (a)); this
/// implementation actually performs it.
fn strip_carriage_returns(data: Vec<u8>) -> Vec<u8> {
    if data.contains(&b'\r') {
        data.into_iter().filter(|&b| b != b'\r').collect()
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buf);
            let options = SimpleFileOptions::default();
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    fn minimal_config() -> &'static [u8] {
        br#"{"entry":"solve.py","parameters":"$data","time":10,"memory":256,"cpu":1}"#
    }

    #[test]
    fn loads_a_well_formed_archive() {
        let bytes = build_archive(&[
            ("config.json", minimal_config()),
            ("program/solve.py", b"print('hi')\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let manifest = load(&bytes, dir.path()).unwrap();
        assert_eq!(manifest.entry, "solve.py");
        assert!(dir.path().join("program/solve.py").exists());
    }

    #[test]
    fn rejects_missing_config_json() {
        let bytes = build_archive(&[("program/solve.py", b"print(1)\n")]);
        let dir = tempfile::tempdir().unwrap();
        let err = load(&bytes, dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Missing config.json");
    }

    #[test]
    fn rejects_missing_entry_point() {
        let bytes = build_archive(&[("config.json", minimal_config())]);
        let dir = tempfile::tempdir().unwrap();
        let err = load(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Entry point not found"));
    }

    #[test]
    fn rejects_missing_referenced_data_file() {
        let config = br#"{"entry":"solve.py","data":"test.dat","parameters":"$data","time":10,"memory":256,"cpu":1}"#;
        let bytes = build_archive(&[("config.json", config), ("program/solve.py", b"1\n")]);
        let dir = tempfile::tempdir().unwrap();
        let err = load(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Missing data file"));
    }

    #[test]
    fn junk_files_outside_program_and_data_are_never_materialized() {
        let bytes = build_archive(&[
            ("config.json", minimal_config()),
            ("program/solve.py", b"1\n"),
            ("README.md", b"not part of the submission\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        load(&bytes, dir.path()).unwrap();
        assert!(!dir.path().join("README.md").exists());
    }

    #[test]
    fn strips_carriage_returns_from_materialized_files() {
        let bytes = build_archive(&[
            ("config.json", minimal_config()),
            ("program/solve.py", b"line one\r\nline two\r\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        load(&bytes, dir.path()).unwrap();
        let contents = fs::read(dir.path().join("program/solve.py")).unwrap();
        assert!(!contents.contains(&b'\r'));
    }

    #[test]
    fn substitutes_only_present_placeholders() {
        let manifest = Manifest {
            entry: "solve.py".to_string(),
            data: Some("test.dat".to_string()),
            network: None,
            seeds: None,
            parameters: "$data -t $time -c $cpu -m $memory $network".to_string(),
            time_seconds: 10,
            memory_mb: 256,
            cpu: 8,
            seed_count: None,
            model: None,
            rng_seed: None,
        };
        let substituted = substitute_parameters(&manifest, SANDBOX_MOUNT_POINT);
        assert_eq!(
            substituted,
            "/workspace/data/test.dat -t 10 -c 8 -m 256 $network"
        );
    }

    #[test]
    fn substitutes_seed_count_and_seed_without_cross_corruption() {
        let manifest = Manifest {
            entry: "solve.py".to_string(),
            data: None,
            network: None,
            seeds: Some("seeds.txt".to_string()),
            parameters: "$seeds --count $seedCount --seed $seed".to_string(),
            time_seconds: 10,
            memory_mb: 256,
            cpu: 1,
            seed_count: Some(5),
            model: None,
            rng_seed: Some(42),
        };
        let substituted = substitute_parameters(&manifest, SANDBOX_MOUNT_POINT);
        assert_eq!(
            substituted,
            "/workspace/data/seeds.txt --count 5 --seed 42"
        );
    }
}
