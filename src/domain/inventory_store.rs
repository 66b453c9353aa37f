//! InventoryStore: atomic file I/O with SHA-256 integrity for the node set.
//!
//! The whole inventory is rewritten on every save: serialize to a `.tmp`
//! sibling, then rename over the final path so readers never see a partial
//! file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::node::Node;

/// The node set wrapped with integrity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInventory {
    /// SHA-256 checksum of the serialized nodes: "sha256:<hex>"
    pub checksum: String,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
}

impl StoredInventory {
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        Ok(Self {
            checksum: checksum(&nodes)?,
            saved_at: Utc::now(),
            nodes,
        })
    }

    /// Whether the checksum still matches the node data.
    pub fn verify(&self) -> bool {
        checksum(&self.nodes).is_ok_and(|expected| expected == self.checksum)
    }
}

fn checksum(nodes: &[Node]) -> Result<String> {
    let serialized = serde_json::to_string(nodes).context("failed to serialize nodes")?;
    Ok(format!("sha256:{:x}", Sha256::digest(serialized.as_bytes())))
}

pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically replace the inventory file with `nodes`.
    pub fn write(&self, nodes: Vec<Node>) -> Result<StoredInventory> {
        let stored = StoredInventory::new(nodes)?;
        let content = serde_json::to_string_pretty(&stored)
            .context("failed to serialize StoredInventory")?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "renaming {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        Ok(stored)
    }

    /// Read the inventory and verify its checksum.
    pub fn read(&self) -> Result<StoredInventory> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;

        let stored: StoredInventory = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        if !stored.verify() {
            warn!(path = %self.path.display(), "inventory file checksum mismatch");
            bail!("checksum verification failed for {}", self.path.display());
        }

        Ok(stored)
    }
}
