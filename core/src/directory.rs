//! Pod directory snapshots
//!
//! The directory is read once per submission; the returned pods are a fixed
//! snapshot for the rest of that call.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_threshold::{Pod, PodId, PodMember};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read pod directory {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write pod directory {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed pod directory {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of the current pod set
pub trait PodDirectory: Send + Sync {
    fn pods(&self) -> Result<Vec<Pod>, DirectoryError>;
}

/// A fixed pod list
#[derive(Debug, Clone, Default)]
pub struct StaticPodDirectory {
    pods: Vec<Pod>,
}

impl StaticPodDirectory {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self { pods }
    }
}

impl PodDirectory for StaticPodDirectory {
    fn pods(&self) -> Result<Vec<Pod>, DirectoryError> {
        Ok(self.pods.clone())
    }
}

/// One pod as written in a directory file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEntry {
    /// Directory-assigned id; derived from the members when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PodId>,
    pub members: Vec<PodMember>,
}

impl From<PodEntry> for Pod {
    fn from(entry: PodEntry) -> Self {
        match entry.id {
            Some(id) => Pod::with_id(id, entry.members),
            None => Pod::new(entry.members),
        }
    }
}

/// JSON file of [`PodEntry`] values, re-read on every call
#[derive(Debug, Clone)]
pub struct FilePodDirectory {
    path: PathBuf,
}

impl FilePodDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `pods` in the format [`FilePodDirectory`] reads
    pub fn write(&self, pods: &[Pod]) -> Result<(), DirectoryError> {
        let entries: Vec<PodEntry> = pods
            .iter()
            .map(|pod| PodEntry {
                id: Some(pod.id),
                members: pod.members.clone(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries).map_err(|source| {
            DirectoryError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, json).map_err(|source| DirectoryError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl PodDirectory for FilePodDirectory {
    fn pods(&self) -> Result<Vec<Pod>, DirectoryError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| DirectoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        let entries: Vec<PodEntry> =
            serde_json::from_str(&raw).map_err(|source| DirectoryError::Format {
                path: self.path.clone(),
                source,
            })?;

        let pods: Vec<Pod> = entries.into_iter().map(Pod::from).collect();
        debug!(path = %self.path.display(), pods = pods.len(), "loaded pod directory");
        Ok(pods)
    }
}
