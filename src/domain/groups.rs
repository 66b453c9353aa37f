//! Group rollups: per-group status counters, tooltips and ordered members.
//!
//! Always computed fresh from a node snapshot in a single pass; nothing here
//! is cached or persisted.

use std::collections::{BTreeMap, BTreeSet};

use async_graphql::SimpleObject;
use serde::{Deserialize, Serialize};

use super::node::{titlecase_state, Node, StatusKind};

/// One counter per [`StatusKind`], serialized in a fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct StatusCounts {
    pub ready: u64,
    pub failed: u64,
    pub pending: u64,
    pub unready: u64,
    pub building: u64,
    pub crowbar_upgrade: u64,
    pub unknown: u64,
}

impl StatusCounts {
    pub fn increment(&mut self, kind: StatusKind) {
        *self.slot(kind) += 1;
    }

    pub fn get(&self, kind: StatusKind) -> u64 {
        match kind {
            StatusKind::Ready => self.ready,
            StatusKind::Failed => self.failed,
            StatusKind::Pending => self.pending,
            StatusKind::Unready => self.unready,
            StatusKind::Building => self.building,
            StatusKind::CrowbarUpgrade => self.crowbar_upgrade,
            StatusKind::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> u64 {
        StatusKind::ALL.into_iter().map(|kind| self.get(kind)).sum()
    }

    /// `<strong>Total N</strong>` followed by one line per non-zero bucket.
    pub fn tooltip(&self) -> String {
        let mut tooltip = format!("<strong>Total {}</strong>", self.total());
        for kind in StatusKind::ALL {
            let count = self.get(kind);
            if count > 0 {
                tooltip.push_str(&format!("<br />{count} {}", tooltip_label(kind)));
            }
        }
        tooltip
    }

    fn slot(&mut self, kind: StatusKind) -> &mut u64 {
        match kind {
            StatusKind::Ready => &mut self.ready,
            StatusKind::Failed => &mut self.failed,
            StatusKind::Pending => &mut self.pending,
            StatusKind::Unready => &mut self.unready,
            StatusKind::Building => &mut self.building,
            StatusKind::CrowbarUpgrade => &mut self.crowbar_upgrade,
            StatusKind::Unknown => &mut self.unknown,
        }
    }
}

fn tooltip_label(kind: StatusKind) -> &'static str {
    match kind {
        StatusKind::Ready => "Ready",
        StatusKind::Failed => "Failed",
        StatusKind::Pending => "Pending",
        StatusKind::Unready => "Unready",
        StatusKind::Building => "Building",
        StatusKind::CrowbarUpgrade => "Upgrading",
        StatusKind::Unknown => "Not Ready",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct GroupRollup {
    pub status: StatusCounts,
    pub tooltip: String,
    /// Taken from the first node seen in the group and never revised.
    pub automatic: bool,
    /// Member handles ordered by `group_order`, then handle.
    pub nodes: Vec<String>,
}

/// Flat per-node view used by the index listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct NodeView {
    pub alias: String,
    pub description: Option<String>,
    pub status: StatusKind,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetIndex {
    pub nodes: BTreeMap<String, NodeView>,
    pub groups: BTreeMap<String, GroupRollup>,
}

/// Dashboard payload: `nodes[handle] = {class, status}` and
/// `groups[name] = {tooltip, status}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub nodes: BTreeMap<String, NodeStatusEntry>,
    pub groups: BTreeMap<String, GroupStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusEntry {
    pub class: StatusKind,
    /// Human readable state.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub tooltip: String,
    pub status: StatusCounts,
}

struct GroupBuilder {
    status: StatusCounts,
    tooltip: String,
    automatic: bool,
    members: BTreeSet<(i64, String)>,
}

/// Build the index in one pass over `nodes`.
pub fn aggregate(nodes: &[Node], unknown_group: &str) -> FleetIndex {
    let mut groups: BTreeMap<String, GroupBuilder> = BTreeMap::new();
    let mut views = BTreeMap::new();

    for node in nodes {
        let status = node.status();
        let group_name = node.effective_group().unwrap_or(unknown_group);

        let group = groups
            .entry(group_name.to_string())
            .or_insert_with(|| GroupBuilder {
                status: StatusCounts::default(),
                tooltip: String::new(),
                automatic: !node.has_manual_group(),
                members: BTreeSet::new(),
            });
        group.status.increment(status);
        group.tooltip = group.status.tooltip();
        group
            .members
            .insert((node.group_order, node.handle().to_string()));

        views.insert(
            node.handle().to_string(),
            NodeView {
                alias: node.alias().to_string(),
                description: node.description.clone(),
                status,
                state: node.state.clone(),
            },
        );
    }

    FleetIndex {
        nodes: views,
        groups: groups
            .into_iter()
            .map(|(name, group)| {
                (
                    name,
                    GroupRollup {
                        status: group.status,
                        tooltip: group.tooltip,
                        automatic: group.automatic,
                        nodes: group.members.into_iter().map(|(_, handle)| handle).collect(),
                    },
                )
            })
            .collect(),
    }
}

impl From<&FleetIndex> for StatusSnapshot {
    fn from(index: &FleetIndex) -> Self {
        Self {
            nodes: index
                .nodes
                .iter()
                .map(|(handle, view)| {
                    (
                        handle.clone(),
                        NodeStatusEntry {
                            class: view.status,
                            status: titlecase_state(&view.state),
                        },
                    )
                })
                .collect(),
            groups: index
                .groups
                .iter()
                .map(|(name, group)| {
                    (
                        name.clone(),
                        GroupStatus {
                            tooltip: group.tooltip.clone(),
                            status: group.status,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(name: &str, state: &str, group: Option<&str>, order: i64) -> Node {
        let mut node = Node::new(name, state);
        node.group = group.map(str::to_string);
        node.group_order = order;
        node
    }

    #[test]
    fn groups_fall_back_to_unknown_label() {
        let nodes = vec![
            node("a.example.com", "ready", None, 0),
            node("b.example.com", "shutdown", None, 0),
            node("c.example.com", "shutdown", Some("compute"), 0),
        ];
        let index = aggregate(&nodes, "sw-unknown");
        let unknown = &index.groups["sw-unknown"];
        assert_eq!(unknown.status.ready, 1);
        assert_eq!(unknown.status.unknown, 1);
        assert!(unknown.automatic);
        assert!(!index.groups["compute"].automatic);
    }

    #[test]
    fn tooltip_tracks_counts() {
        let nodes = vec![
            node("a", "ready", None, 0),
            node("b", "shutdown", None, 0),
            node("c", "off", None, 0),
        ];
        let index = aggregate(&nodes, "sw-unknown");
        assert_eq!(
            index.groups["sw-unknown"].tooltip,
            "<strong>Total 3</strong><br />1 Ready<br />2 Not Ready"
        );
    }

    #[test]
    fn members_ordered_by_group_order() {
        let nodes = vec![
            node("c", "ready", Some("g"), 2),
            node("a", "ready", Some("g"), 1),
            node("b", "ready", Some("g"), 1),
        ];
        let index = aggregate(&nodes, "unknown");
        assert_eq!(index.groups["g"].nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn automatic_flag_is_first_writer() {
        let mut manual = node("b", "ready", None, 0);
        manual.auto_group = Some("rack1".into());
        let mut auto = node("a", "ready", None, 0);
        auto.auto_group = Some("rack1".into());
        manual.group = Some("rack1".into());

        let index = aggregate(&[auto.clone(), manual.clone()], "unknown");
        assert!(index.groups["rack1"].automatic);
        let index = aggregate(&[manual, auto], "unknown");
        assert!(!index.groups["rack1"].automatic);
    }

    #[test]
    fn out_of_range_status_counts_as_unknown() {
        let mut odd = node("a", "ready", None, 0);
        odd.status = Some("exploded".into());
        let index = aggregate(&[odd], "unknown");
        assert_eq!(index.groups["unknown"].status.unknown, 1);
    }

    #[test]
    fn snapshot_shape() {
        let index = aggregate(&[node("crowbar.example.com", "ready", None, 0)], "unknown");
        let snapshot = StatusSnapshot::from(&index);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["nodes"]["crowbar"]["class"], "ready");
        assert_eq!(json["nodes"]["crowbar"]["status"], "Ready");
        assert_eq!(json["groups"]["unknown"]["status"]["crowbar_upgrade"], 0);
    }

    const STATES: [&str; 6] = ["ready", "problem", "installed", "discovering", "shutdown", "x"];

    proptest! {
        #[test]
        fn rollup_totals_match_node_count(
            specs in proptest::collection::vec((0..6usize, 0..4usize, -3..3i64), 0..60)
        ) {
            let nodes: Vec<Node> = specs
                .iter()
                .enumerate()
                .map(|(i, (state, group, order))| {
                    let group = (*group > 0).then(|| format!("g{group}"));
                    node(&format!("n{i}"), STATES[*state], group.as_deref(), *order)
                })
                .collect();
            let index = aggregate(&nodes, "unknown");
            let total: u64 = index.groups.values().map(|g| g.status.total()).sum();
            prop_assert_eq!(total, nodes.len() as u64);
            let listed: usize = index.groups.values().map(|g| g.nodes.len()).sum();
            prop_assert_eq!(listed, nodes.len());
        }
    }
}
