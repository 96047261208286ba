//! Volume-seeding manifests.
//!
//! A manifest is a small JSON document describing the directories and
//! files a demo or test volume should start with, so a card can be
//! populated declaratively instead of by hand.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fat::{FatError, MemoryCard};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("seeding {path} failed: {source}")]
    Seed { path: String, source: FatError },
}

/// File entry in a volume manifest. Contents win over size; a bare size
/// produces a zero-filled file; neither produces an empty file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSeed {
    pub path: String,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Volume manifest schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeManifest {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileSeed>,
}

pub fn parse_manifest(text: &str) -> Result<VolumeManifest, ManifestError> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_manifest(path: &Path) -> Result<VolumeManifest, ManifestError> {
    parse_manifest(&std::fs::read_to_string(path)?)
}

/// Populate `card` with the manifest's directories and files. Paths are
/// stored exactly as written; no hidden-name mangling is applied here.
pub fn seed_card(card: &MemoryCard, manifest: &VolumeManifest) -> Result<(), ManifestError> {
    for dir in &manifest.directories {
        card.seed_dir(dir).map_err(|source| ManifestError::Seed {
            path: dir.clone(),
            source,
        })?;
    }

    for file in &manifest.files {
        let data = match (&file.contents, file.size) {
            (Some(text), _) => text.as_bytes().to_vec(),
            (None, Some(size)) => vec![0u8; size as usize],
            (None, None) => Vec::new(),
        };
        card.seed_file(&file.path, data)
            .map_err(|source| ManifestError::Seed {
                path: file.path.clone(),
                source,
            })?;
    }

    Ok(())
}
