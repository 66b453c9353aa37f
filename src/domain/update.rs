//! Single-node edit path: validate, apply an allow-list of fields, save once.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FleetError, FleetResult, NotFound};

use super::node::Node;
use super::repository::NodeRepository;
use super::validator;

/// Fields accepted by the node edit form. Only keys present are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default)]
    pub bios: Option<String>,
    #[serde(default)]
    pub raid: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub intended_role: Option<String>,
    #[serde(default)]
    pub default_fs: Option<String>,
    #[serde(default)]
    pub raid_type: Option<String>,
    #[serde(default)]
    pub raid_disks: Option<Vec<String>>,
    #[serde(default)]
    pub target_platform: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,
    /// Allocate the node after a successful save.
    #[serde(default)]
    pub allocate: bool,
}

impl NodeUpdate {
    pub fn validate(&self) -> Result<(), crate::error::ValidationError> {
        validator::validate(
            self.group.as_deref(),
            self.raid_type.as_deref(),
            self.raid_disks.as_deref(),
        )
    }

    /// Apply the allow-listed fields and, for unallocated nodes, platform
    /// and license.
    pub fn apply_to(&self, node: &mut Node, default_platform: &str) {
        if let Some(bios) = &self.bios {
            node.bios_set = Some(bios.clone());
        }
        if let Some(raid) = &self.raid {
            node.raid_set = Some(raid.clone());
        }
        if let Some(alias) = &self.alias {
            node.alias = Some(alias.clone()).filter(|a| !a.is_empty());
        }
        if let Some(public_name) = &self.public_name {
            node.public_name = Some(public_name.clone()).filter(|p| !p.trim().is_empty());
        }
        if let Some(group) = &self.group {
            node.assign_group(group);
        }
        if let Some(description) = &self.description {
            node.description = Some(description.clone());
        }
        if let Some(zone) = &self.availability_zone {
            node.availability_zone = Some(zone.clone());
        }
        if let Some(role) = &self.intended_role {
            node.intended_role = Some(role.clone());
        }
        if let Some(fs) = &self.default_fs {
            node.default_fs = Some(fs.clone());
        }
        if let Some(raid_type) = &self.raid_type {
            node.raid_type = Some(raid_type.clone());
        }
        if let Some(disks) = &self.raid_disks {
            node.raid_disks = disks.clone();
        }

        if !node.allocated {
            node.target_platform = Some(
                self.target_platform
                    .clone()
                    .unwrap_or_else(|| default_platform.to_string()),
            );
            node.license_key = self.license_key.clone();
        }
    }
}

/// Validate and apply `update` to the node called `name`.
///
/// Validation failures abort before anything is touched. A failed save
/// leaves the repository unchanged; the edited copy is discarded.
pub fn update_one(
    repo: &dyn NodeRepository,
    name: &str,
    update: &NodeUpdate,
    default_platform: &str,
) -> FleetResult<Node> {
    let mut node = repo
        .find_by_name(name)
        .ok_or_else(|| FleetError::node_not_found(name))?;

    update.validate()?;
    update.apply_to(&mut node, default_platform);
    repo.save(&node)?;
    info!(node = %node.name, "node updated");

    if update.allocate && node.allocate() {
        repo.save(&node)?;
        info!(node = %node.name, "node allocated");
    }

    Ok(node)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    pub node: String,
    /// Effective group after the change.
    pub group: Option<String>,
}

/// Move a node (by name or alias) into `group`; `automatic` or `""` hands
/// it back to automatic grouping.
pub fn change_group(repo: &dyn NodeRepository, key: &str, group: &str) -> FleetResult<GroupChange> {
    let mut node = repo
        .find_by_name_or_alias(key)
        .ok_or_else(|| FleetError::NotFound(NotFound::Node { name: key.to_string() }))?;

    if !group.eq_ignore_ascii_case("automatic") {
        validator::validate_group(Some(group))?;
    }
    node.assign_group(group);
    repo.save(&node)?;
    info!(node = %node.name, group = ?node.effective_group(), "group changed");

    Ok(GroupChange {
        node: node.name.clone(),
        group: node.effective_group().map(str::to_string),
    })
}
