//! Offline integrity checking
//!
//! Walks a data directory the way the engine's open path does and reports
//! what it finds without mutating anything. Remediation (quarantine renames,
//! deletion) is left to external tooling; a directory whose name already
//! carries the `.corrupt` marker is reported as quarantined and otherwise
//! ignored, matching the engine's load behavior.

use crate::sstable::{self, SidecarMeta, DATA_FILE, FORMAT_VERSION, META_FILE};
use crate::wal::{sealed_path, WAL_FILE};
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Verdict for one table directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DirectoryStatus {
    /// Sidecar and data file agree
    Ok,
    /// Name carries the `.corrupt` marker, contents not inspected
    Quarantined,
    /// `data.bin` is missing
    MissingData,
    /// `metadata.json` is missing or not valid JSON
    MetadataUnreadable,
    /// Sidecar declares a format this build does not read
    UnsupportedFormatVersion { found: u32 },
    /// Sidecar was written by an incompatible entry encoding
    SchemaMismatch,
    /// `data.bin` does not hash to the sidecar's checksum
    ChecksumMismatch,
}

/// Report line for one table directory
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryReport {
    pub path: PathBuf,
    pub status: DirectoryStatus,
}

/// Full integrity report for a data directory
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub directories: Vec<DirectoryReport>,
    /// A non-empty `wal.log`, or a sealed segment left by a crash mid-flush,
    /// means the last shutdown was unclean and the next open will replay it
    pub wal_present: bool,
}

impl IntegrityReport {
    /// Whether every inspected directory checked out
    pub fn is_healthy(&self) -> bool {
        self.directories
            .iter()
            .all(|d| matches!(d.status, DirectoryStatus::Ok | DirectoryStatus::Quarantined))
    }
}

/// Check a single table directory
pub fn check_table_dir(dir: &Path) -> DirectoryStatus {
    if dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(".corrupt"))
    {
        return DirectoryStatus::Quarantined;
    }

    let data_path = dir.join(DATA_FILE);
    if !data_path.exists() {
        return DirectoryStatus::MissingData;
    }

    let sidecar: SidecarMeta = match fs::read(dir.join(META_FILE))
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
    {
        Some(sidecar) => sidecar,
        None => return DirectoryStatus::MetadataUnreadable,
    };

    if sidecar.format_version != FORMAT_VERSION {
        return DirectoryStatus::UnsupportedFormatVersion {
            found: sidecar.format_version,
        };
    }
    if sidecar.schema_fingerprint != sstable::SCHEMA_FINGERPRINT {
        return DirectoryStatus::SchemaMismatch;
    }

    match sstable::sha256_hex(&data_path) {
        Ok(actual) if actual == sidecar.checksum => DirectoryStatus::Ok,
        Ok(_) => DirectoryStatus::ChecksumMismatch,
        Err(_) => DirectoryStatus::MissingData,
    }
}

/// Check every table directory under `data_dir` and note WAL presence
pub fn check_data_dir(data_dir: &Path) -> Result<IntegrityReport> {
    let mut directories = Vec::new();
    let tables_dir = data_dir.join("tables");
    if tables_dir.exists() {
        let mut paths: Vec<PathBuf> = fs::read_dir(&tables_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        paths.sort();
        for path in paths {
            let status = check_table_dir(&path);
            directories.push(DirectoryReport { path, status });
        }
    }

    let wal_path = data_dir.join(WAL_FILE);
    let wal_present = [wal_path.clone(), sealed_path(&wal_path)]
        .iter()
        .any(|p| fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false));

    Ok(IntegrityReport {
        directories,
        wal_present,
    })
}
