//! Node: a managed machine as materialized by the inventory backend.
//!
//! A `Node` carries identity (name, alias, public name), grouping, allocation
//! state, the lifecycle `state` string and the full nested attribute document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

use super::attributes::AttrValue;

/// Reserved network backed by the management controller.
pub const BMC_NETWORK: &str = "bmc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Lifecycle state, e.g. `discovering`, `ready`, `shutdown`.
    pub state: String,
    /// Explicit status override; absent means "derive from state".
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    /// Manually assigned group. `None` means automatic grouping.
    #[serde(default)]
    pub group: Option<String>,
    /// Group computed by the backend, used when no manual group is set.
    #[serde(default)]
    pub auto_group: Option<String>,
    #[serde(default)]
    pub group_order: i64,
    #[serde(default)]
    pub family: String,

    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub intended_role: Option<String>,

    #[serde(default)]
    pub allocated: bool,
    /// Administrative/control node; platform and license are never bulk-edited.
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub target_platform: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,

    #[serde(default)]
    pub bios_set: Option<String>,
    #[serde(default)]
    pub raid_set: Option<String>,
    #[serde(default)]
    pub raid_type: Option<String>,
    #[serde(default)]
    pub raid_disks: Vec<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub default_fs: Option<String>,

    /// Temporary DHCP address, only meaningful while discovered.
    #[serde(default)]
    pub ipaddress: Option<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkPort>,
    #[serde(default)]
    pub conduits: BTreeMap<String, ConduitInterface>,
    #[serde(default)]
    pub unmanaged_interfaces: BTreeMap<String, AttrValue>,

    #[serde(default = "NodeAction::all")]
    pub actions: BTreeSet<NodeAction>,

    #[serde(default)]
    pub attributes: AttrValue,
}

/// Raw per-network data: the conduit it rides on and the assigned address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPort {
    pub conduit: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Physical interfaces backing a conduit on this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConduitInterface {
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub team_mode: Option<u8>,
}

impl Node {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            status: None,
            alias: None,
            public_name: None,
            description: None,
            group: None,
            auto_group: None,
            group_order: 0,
            family: String::new(),
            roles: Vec::new(),
            intended_role: None,
            allocated: false,
            admin: false,
            target_platform: None,
            license_key: None,
            bios_set: None,
            raid_set: None,
            raid_type: None,
            raid_disks: Vec::new(),
            availability_zone: None,
            default_fs: None,
            ipaddress: None,
            networks: BTreeMap::new(),
            conduits: BTreeMap::new(),
            unmanaged_interfaces: BTreeMap::new(),
            actions: NodeAction::all(),
            attributes: AttrValue::default(),
        }
    }

    /// Display identifier: the first DNS label of the name.
    pub fn handle(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Effective alias; falls back to the handle when none was chosen.
    pub fn alias(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => self.handle(),
        }
    }

    pub fn public_name(&self) -> Option<&str> {
        self.public_name.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Whether a group was set by hand rather than computed.
    pub fn has_manual_group(&self) -> bool {
        self.group.as_deref().is_some_and(|g| !g.is_empty())
    }

    /// Manual group if set, otherwise the computed one.
    pub fn effective_group(&self) -> Option<&str> {
        if self.has_manual_group() {
            return self.group.as_deref();
        }
        self.auto_group.as_deref().filter(|g| !g.is_empty())
    }

    pub fn status(&self) -> StatusKind {
        match self.status.as_deref() {
            Some(label) => StatusKind::from_label(label),
            None => StatusKind::from_state(&self.state),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// One-way allocation. Returns `true` when the flag flipped.
    pub fn allocate(&mut self) -> bool {
        if self.allocated {
            return false;
        }
        self.allocated = true;
        true
    }

    /// Set the alias without re-checking uniqueness; callers have already
    /// cleared it against the batch.
    pub fn force_alias(&mut self, alias: Option<String>) {
        self.alias = alias.filter(|a| !a.is_empty());
    }

    pub fn force_public_name(&mut self, public_name: Option<String>) {
        self.public_name = public_name.filter(|p| !p.trim().is_empty());
    }

    /// Clear the manual group on `""` or `automatic` (any case).
    pub fn assign_group(&mut self, group: &str) {
        if group.is_empty() || group.eq_ignore_ascii_case("automatic") {
            self.group = None;
        } else {
            self.group = Some(group.to_string());
        }
    }
}

/// Coarse status classification used by dashboards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Ready,
    Failed,
    Pending,
    Unready,
    Building,
    CrowbarUpgrade,
    Unknown,
}

impl StatusKind {
    pub const ALL: [StatusKind; 7] = [
        StatusKind::Ready,
        StatusKind::Failed,
        StatusKind::Pending,
        StatusKind::Unready,
        StatusKind::Building,
        StatusKind::CrowbarUpgrade,
        StatusKind::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Unready => "unready",
            Self::Building => "building",
            Self::CrowbarUpgrade => "crowbar_upgrade",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored status label. Anything outside the enumeration clamps
    /// to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == label)
            .unwrap_or(Self::Unknown)
    }

    /// Classify a lifecycle state.
    pub fn from_state(state: &str) -> Self {
        match state {
            "ready" => Self::Ready,
            "problem" | "failed" => Self::Failed,
            "applying" | "readying" | "recovering" | "installed" => Self::Pending,
            "discovering" | "discovered" | "hardware-installing" | "hardware-installed"
            | "hardware-updating" | "hardware-updated" | "installing" | "update"
            | "os-upgrading" | "os-upgraded" => Self::Unready,
            "building" => Self::Building,
            "crowbar_upgrade" => Self::CrowbarUpgrade,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle actions a node may be asked to perform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Reinstall,
    Reset,
    Shutdown,
    Reboot,
    Poweron,
    Powercycle,
    Poweroff,
    Allocate,
    Delete,
    Identify,
    Update,
}

impl NodeAction {
    pub const ALL: [NodeAction; 11] = [
        NodeAction::Reinstall,
        NodeAction::Reset,
        NodeAction::Shutdown,
        NodeAction::Reboot,
        NodeAction::Poweron,
        NodeAction::Powercycle,
        NodeAction::Poweroff,
        NodeAction::Allocate,
        NodeAction::Delete,
        NodeAction::Identify,
        NodeAction::Update,
    ];

    pub fn all() -> BTreeSet<NodeAction> {
        Self::ALL.into_iter().collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reinstall => "reinstall",
            Self::Reset => "reset",
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
            Self::Poweron => "poweron",
            Self::Powercycle => "powercycle",
            Self::Poweroff => "poweroff",
            Self::Allocate => "allocate",
            Self::Delete => "delete",
            Self::Identify => "identify",
            Self::Update => "update",
        }
    }
}

impl FromStr for NodeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a state like `hardware-installing` into `Hardware Installing`.
pub fn titlecase_state(state: &str) -> String {
    state
        .split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_first_label() {
        let node = Node::new("d52-54-77-77-77-01.example.com", "ready");
        assert_eq!(node.handle(), "d52-54-77-77-77-01");
        assert_eq!(node.alias(), "d52-54-77-77-77-01");
    }

    #[test]
    fn unknown_status_label_clamps() {
        let mut node = Node::new("n1", "ready");
        node.status = Some("exploded".into());
        assert_eq!(node.status(), StatusKind::Unknown);
        node.status = None;
        assert_eq!(node.status(), StatusKind::Ready);
    }

    #[test]
    fn state_classification() {
        assert_eq!(StatusKind::from_state("discovering"), StatusKind::Unready);
        assert_eq!(StatusKind::from_state("problem"), StatusKind::Failed);
        assert_eq!(StatusKind::from_state("shutdown"), StatusKind::Unknown);
    }

    #[test]
    fn allocation_is_one_way() {
        let mut node = Node::new("n1", "ready");
        assert!(node.allocate());
        assert!(!node.allocate());
        assert!(node.allocated);
    }

    #[test]
    fn automatic_clears_manual_group() {
        let mut node = Node::new("n1", "ready");
        node.auto_group = Some("sw-unknown".into());
        node.assign_group("compute");
        assert_eq!(node.effective_group(), Some("compute"));
        node.assign_group("Automatic");
        assert!(!node.has_manual_group());
        assert_eq!(node.effective_group(), Some("sw-unknown"));
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("powercycle".parse::<NodeAction>(), Ok(NodeAction::Powercycle));
        assert!("explode".parse::<NodeAction>().is_err());
    }

    #[test]
    fn titlecase() {
        assert_eq!(titlecase_state("hardware-installing"), "Hardware Installing");
        assert_eq!(titlecase_state("crowbar_upgrade"), "Crowbar Upgrade");
        assert_eq!(titlecase_state("ready"), "Ready");
    }

    #[test]
    fn deserializes_sparse_document() {
        let node: Node = serde_json::from_str(r#"{"name":"n1","state":"ready"}"#).unwrap();
        assert_eq!(node.actions.len(), 11);
        assert!(node.attributes.as_mapping().is_some_and(|m| m.is_empty()));
    }
}
