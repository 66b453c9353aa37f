//! Fleet service: wraps the node repository and the read/write operations.
//!
//! Every read starts from one `NodeRepository::all()` snapshot (or a single
//! node lookup) and computes its view fresh; writes go one node at a time.
//! No lock is held across a whole request.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::FleetSettings;
use crate::error::{FleetError, FleetResult, NotFound};

use super::actions::{self, ActionDispatcher, LoggingDispatcher};
use super::attributes::{self, AttrValue};
use super::groups::{self, FleetIndex, StatusSnapshot};
use super::network::{self, ConduitResolver, NetworkEntry, NodeConduits};
use super::node::{Node, NodeAction};
use super::reconcile::{self, Batch, ReconciliationOutcome, ReconciliationReport};
use super::repository::NodeRepository;
use super::update::{self, GroupChange, NodeUpdate};

pub struct FleetService {
    repo: Arc<dyn NodeRepository>,
    conduits: Arc<dyn ConduitResolver>,
    dispatcher: Arc<dyn ActionDispatcher>,
    settings: FleetSettings,
}

/// Index listing: the whole fleet, or the members of one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeIndex {
    Fleet(FleetIndex),
    RoleNames {
        role: String,
        nodes: Vec<String>,
        count: usize,
    },
    Role(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub alias: String,
    pub description: Option<String>,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub family: String,
    pub names: Vec<FamilyMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: AttrValue,
}

/// Batch report plus its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    #[serde(flatten)]
    pub report: ReconciliationReport,
    pub summary: ReconciliationOutcome,
}

impl FleetService {
    pub fn new(repo: Arc<dyn NodeRepository>, settings: FleetSettings) -> Self {
        Self {
            repo,
            conduits: Arc::new(NodeConduits),
            dispatcher: Arc::new(LoggingDispatcher),
            settings,
        }
    }

    pub fn with_conduits(mut self, conduits: Arc<dyn ConduitResolver>) -> Self {
        self.conduits = conduits;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    fn node(&self, name: &str) -> FleetResult<Node> {
        self.repo
            .find_by_name(name)
            .ok_or_else(|| FleetError::node_not_found(name))
    }

    /// Fleet rollup, or the nodes carrying `role`.
    pub fn index(&self, role: Option<&str>, names_only: bool) -> NodeIndex {
        let nodes = self.repo.all();
        match role {
            None => NodeIndex::Fleet(groups::aggregate(&nodes, &self.settings.unknown_group_label)),
            Some(role) => {
                let members: Vec<Node> = nodes.into_iter().filter(|n| n.has_role(role)).collect();
                if names_only {
                    let names: Vec<String> =
                        members.iter().map(|n| n.handle().to_string()).collect();
                    NodeIndex::RoleNames {
                        role: role.to_string(),
                        count: names.len(),
                        nodes: names,
                    }
                } else {
                    NodeIndex::Role(members)
                }
            }
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let index = groups::aggregate(&self.repo.all(), &self.settings.unknown_group_label);
        StatusSnapshot::from(&index)
    }

    /// Every node keyed by handle.
    pub fn list(&self) -> BTreeMap<String, Node> {
        self.by_handle(|_| true)
    }

    pub fn unallocated(&self) -> BTreeMap<String, Node> {
        self.by_handle(|node| !node.allocated)
    }

    fn by_handle(&self, keep: impl Fn(&Node) -> bool) -> BTreeMap<String, Node> {
        self.repo
            .all()
            .into_iter()
            .filter(|node| keep(node))
            .map(|node| (node.handle().to_string(), node))
            .collect()
    }

    pub fn families(&self) -> BTreeMap<String, Family> {
        let mut families: BTreeMap<String, Family> = BTreeMap::new();
        for node in self.repo.all() {
            families
                .entry(node.family.clone())
                .or_insert_with(|| Family {
                    family: node.family.clone(),
                    names: Vec::new(),
                })
                .names
                .push(FamilyMember {
                    alias: node.alias().to_string(),
                    description: node.description.clone(),
                    handle: node.handle().to_string(),
                });
        }
        families
    }

    /// Full node document, or one top-level key of it.
    pub fn show(&self, name: &str, key: Option<&str>) -> FleetResult<serde_json::Value> {
        let node = self.node(name)?;
        let document = serde_json::to_value(&node).map_err(|e| {
            FleetError::Persistence(crate::error::PersistenceError::Io {
                node: node.name.clone(),
                message: e.to_string(),
            })
        })?;

        let Some(key) = key else {
            return Ok(document);
        };
        document
            .get(key)
            .cloned()
            .ok_or_else(|| {
                FleetError::NotFound(NotFound::Key {
                    node: node.name.clone(),
                    key: key.to_string(),
                })
            })
    }

    pub fn attribute<S: AsRef<str>>(&self, name: &str, path: &[S]) -> FleetResult<AttributeValue> {
        let node = self.node(name)?;
        let value = attributes::resolve(&node.attributes, path)?;
        Ok(AttributeValue {
            value: value.clone(),
        })
    }

    pub fn network(&self, name: &str) -> FleetResult<Vec<NetworkEntry>> {
        let node = self.node(name)?;
        Ok(network::resolve(&node, self.conduits.as_ref()))
    }

    pub fn reconcile_batch(&self, batch: &Batch) -> BulkResult {
        let report = reconcile::reconcile(self.repo.as_ref(), batch);
        BulkResult {
            summary: report.outcome(),
            report,
        }
    }

    /// Dry run of the conflict phase.
    pub fn check_batch(&self, batch: &Batch) -> FleetResult<()> {
        match reconcile::first_conflict(batch) {
            Some(conflict) => Err(conflict.into()),
            None => Ok(()),
        }
    }

    pub fn update_one(&self, name: &str, update: &NodeUpdate) -> FleetResult<Node> {
        update::update_one(
            self.repo.as_ref(),
            name,
            update,
            &self.settings.default_platform,
        )
    }

    pub fn change_group(&self, key: &str, group: &str) -> FleetResult<GroupChange> {
        update::change_group(self.repo.as_ref(), key, group)
    }

    pub fn hit(&self, name: &str, action: &str) -> FleetResult<NodeAction> {
        actions::hit(self.repo.as_ref(), self.dispatcher.as_ref(), name, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::MemoryNodeRepository;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn service() -> FleetService {
        let mut admin = Node::new("crowbar.example.com", "ready");
        admin.admin = true;
        admin.allocated = true;
        admin.roles = vec!["crowbar".into()];
        admin.family = "x86_64-kvm".into();

        let mut compute = Node::new("d52-54-77-77-77-01.example.com", "shutdown");
        compute.roles = vec!["nova-compute".into()];
        compute.family = "x86_64-kvm".into();
        compute.attributes = AttrValue::from(json!({"a": {"c": 1}}));

        FleetService::new(
            Arc::new(MemoryNodeRepository::new([admin, compute])),
            FleetSettings::default(),
        )
    }

    #[test]
    fn index_by_role() {
        let svc = service();
        match svc.index(Some("nova-compute"), true) {
            NodeIndex::RoleNames { nodes, count, .. } => {
                assert_eq!(nodes, vec!["d52-54-77-77-77-01"]);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(svc.index(Some("crowbar"), false), NodeIndex::Role(n) if n.len() == 1));
        assert!(matches!(svc.index(None, false), NodeIndex::Fleet(f) if f.nodes.len() == 2));
    }

    #[test]
    fn unallocated_filters() {
        let svc = service();
        assert_eq!(svc.list().len(), 2);
        let unallocated = svc.unallocated();
        assert_eq!(unallocated.keys().collect::<Vec<_>>(), vec!["d52-54-77-77-77-01"]);
    }

    #[test]
    fn families_group_members() {
        let families = service().families();
        assert_eq!(families["x86_64-kvm"].names.len(), 2);
    }

    #[test]
    fn show_key_and_missing_key() {
        let svc = service();
        assert_eq!(svc.show("crowbar", Some("state")).unwrap(), json!("ready"));
        assert_eq!(
            svc.show("crowbar", Some("nope")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn attribute_lookup() {
        let svc = service();
        let value = svc.attribute("d52-54-77-77-77-01", &["a", "c"]).unwrap();
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"value": 1}));
        let err = svc.attribute("d52-54-77-77-77-01", &["a", "b"]).unwrap_err();
        assert_eq!(
            err,
            FleetError::NotFound(NotFound::Attribute {
                resolved: "a".into(),
                missing: "b".into()
            })
        );
        let empty: [&str; 0] = [];
        assert_eq!(svc.attribute("ghost", &empty).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn bulk_result_flattens_report() {
        let svc = service();
        let mut batch = Batch::new();
        batch.insert(
            "d52-54-77-77-77-01.example.com".into(),
            reconcile::BulkUpdate {
                alias: Some("compute1".into()),
                ..Default::default()
            },
        );
        let result = svc.reconcile_batch(&batch);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["succeeded"], json!(["d52-54-77-77-77-01.example.com"]));
        assert_eq!(json["summary"]["outcome"], "updated");
        assert_eq!(json["summary"]["nodes"], json!(["d52-54-77-77-77-01"]));
    }
}
