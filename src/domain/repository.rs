//! Node repository: the storage collaborator behind every fleet operation.
//!
//! Reads hand out owned clones so callers always work on a consistent
//! snapshot; writes replace one node at a time, last writer wins. The
//! repository is where fleet-wide alias / public-name uniqueness is enforced.

use std::path::PathBuf;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{ConflictError, PersistenceError};

use super::inventory_store::InventoryStore;
use super::node::Node;

pub trait NodeRepository: Send + Sync {
    /// Consistent snapshot of every node, in insertion order.
    fn all(&self) -> Vec<Node>;

    /// Exact name, or handle when `name` carries no domain part.
    fn find_by_name(&self, name: &str) -> Option<Node>;

    fn find_by_name_or_alias(&self, key: &str) -> Option<Node> {
        self.find_by_name(key)
            .or_else(|| self.all().into_iter().find(|node| node.alias() == key))
    }

    /// Insert or replace `node`.
    fn save(&self, node: &Node) -> Result<(), PersistenceError>;
}

fn lookup<'a>(nodes: &'a IndexMap<String, Node>, name: &str) -> Option<&'a Node> {
    nodes.get(name).or_else(|| {
        if name.contains('.') {
            return None;
        }
        nodes.values().find(|node| node.handle() == name)
    })
}

/// Reject `node` if another node already holds its alias or public name.
fn check_unique(nodes: &IndexMap<String, Node>, node: &Node) -> Result<(), PersistenceError> {
    for other in nodes.values().filter(|other| other.name != node.name) {
        if other.alias() == node.alias() {
            return Err(PersistenceError::Rejected {
                node: node.name.clone(),
                source: ConflictError::DuplicateAlias {
                    alias: node.alias().to_string(),
                    holder: other.name.clone(),
                },
            });
        }
        if let (Some(mine), Some(theirs)) = (node.public_name(), other.public_name()) {
            if mine == theirs {
                return Err(PersistenceError::Rejected {
                    node: node.name.clone(),
                    source: ConflictError::DuplicatePublicName {
                        public_name: mine.to_string(),
                        holder: other.name.clone(),
                    },
                });
            }
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct MemoryNodeRepository {
    nodes: RwLock<IndexMap<String, Node>>,
}

impl MemoryNodeRepository {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: RwLock::new(
                nodes
                    .into_iter()
                    .map(|node| (node.name.clone(), node))
                    .collect(),
            ),
        }
    }
}

impl NodeRepository for MemoryNodeRepository {
    fn all(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    fn find_by_name(&self, name: &str) -> Option<Node> {
        lookup(&self.nodes.read(), name).cloned()
    }

    fn save(&self, node: &Node) -> Result<(), PersistenceError> {
        let _writer = self.write_lock.lock();

        let mut next = {
            let nodes = self.nodes.read();
            check_unique(&nodes, node)?;
            nodes.clone()
        };
        next.insert(node.name.clone(), node.clone());

        let stored = self
            .store
            .write(next.values().cloned().collect())
            .map_err(|e| PersistenceError::Io {
                node: node.name.clone(),
                message: format!("{e:#}"),
            })?;

        *self.nodes.write() = next;
        debug!(node = %node.name, checksum = %stored.checksum, "node saved to inventory");
        Ok(())
    }
}
