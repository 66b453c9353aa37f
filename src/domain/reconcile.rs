//! Bulk reconciliation: apply a batch of per-node edits in one request.
//!
//! Two phases:
//!   1. Conflict detection over the whole batch (read-only). Any alias or
//!      non-empty public name proposed more than once blocks the entire batch.
//!   2. Apply, one node at a time. Each entry yields a `Result`; the report is
//!      a fold over those results, so one failing node never stops its
//!      siblings.
//!
//! Group syntax and RAID checks are not run here; they belong to the
//! single-node edit path.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConflictError, FleetError};

use super::node::Node;
use super::repository::NodeRepository;

/// Proposed attributes for one node. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdate {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub allocate: bool,
    #[serde(default)]
    pub target_platform: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub intended_role: Option<String>,
}

/// Node name → proposed attributes, applied in submission order.
pub type Batch = IndexMap<String, BulkUpdate>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub duplicate_public: bool,
    pub duplicate_alias: bool,
    pub group_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    DuplicateAlias,
    DuplicatePublic,
    GroupError,
    Failed,
}

/// What the caller should be told about a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Failed {
        reason: FailureReason,
        nodes: Vec<String>,
    },
    Updated {
        nodes: Vec<String>,
    },
    NoChange,
}

/// Result of applying one batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Updated(String),
    Unchanged(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub node: String,
    pub error: FleetError,
}

impl ReconciliationReport {
    fn mark_failed(&mut self, node: &str) {
        if !self.failed.iter().any(|n| n == node) {
            self.failed.push(node.to_string());
        }
    }

    fn record(mut self, result: Result<EntryOutcome, EntryFailure>) -> Self {
        match result {
            Ok(EntryOutcome::Updated(node)) => self.succeeded.push(node),
            Ok(EntryOutcome::Unchanged(_)) => {}
            Err(failure) => self.mark_failed(&failure.node),
        }
        self
    }

    pub fn has_conflicts(&self) -> bool {
        self.duplicate_alias || self.duplicate_public
    }

    /// Classify the report. Failure reasons take precedence in the order
    /// duplicate alias, duplicate public name, group error, generic.
    pub fn outcome(&self) -> ReconciliationOutcome {
        if !self.failed.is_empty() {
            let reason = if self.duplicate_alias {
                FailureReason::DuplicateAlias
            } else if self.duplicate_public {
                FailureReason::DuplicatePublic
            } else if self.group_error {
                FailureReason::GroupError
            } else {
                FailureReason::Failed
            };
            ReconciliationOutcome::Failed {
                reason,
                nodes: short_names(&self.failed),
            }
        } else if !self.succeeded.is_empty() {
            ReconciliationOutcome::Updated {
                nodes: short_names(&self.succeeded),
            }
        } else {
            ReconciliationOutcome::NoChange
        }
    }
}

fn short_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.split('.').next().unwrap_or(name).to_string())
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Every submitted alias takes part in duplicate detection, blank included.
fn submitted(value: Option<&str>) -> Option<&str> {
    value.map(str::trim)
}

/// Phase 1: flag every entry whose alias or public name is proposed more
/// than once within the batch. Existing nodes outside the batch are not
/// consulted here; the repository enforces that on save.
pub fn detect_conflicts(batch: &Batch) -> ReconciliationReport {
    let mut aliases: HashMap<&str, usize> = HashMap::new();
    let mut publics: HashMap<&str, usize> = HashMap::new();
    for update in batch.values() {
        if let Some(alias) = submitted(update.alias.as_deref()) {
            *aliases.entry(alias).or_default() += 1;
        }
        if let Some(public) = non_blank(update.public_name.as_deref()) {
            *publics.entry(public).or_default() += 1;
        }
    }

    let mut report = ReconciliationReport::default();
    for (name, update) in batch {
        if non_blank(update.public_name.as_deref()).is_some_and(|p| publics[p] > 1) {
            report.duplicate_public = true;
            report.mark_failed(name);
        }
        if submitted(update.alias.as_deref()).is_some_and(|a| aliases[a] > 1) {
            report.duplicate_alias = true;
            report.mark_failed(name);
        }
    }
    report
}

/// First naming conflict in `batch`, for callers that want to check a batch
/// without applying it. `holder` is the earlier entry claiming the name.
pub fn first_conflict(batch: &Batch) -> Option<ConflictError> {
    let mut aliases: HashMap<&str, &str> = HashMap::new();
    let mut publics: HashMap<&str, &str> = HashMap::new();
    for (name, update) in batch {
        if let Some(alias) = submitted(update.alias.as_deref()) {
            if let Some(holder) = aliases.insert(alias, name) {
                return Some(ConflictError::DuplicateAlias {
                    alias: alias.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
        if let Some(public) = non_blank(update.public_name.as_deref()) {
            if let Some(holder) = publics.insert(public, name) {
                return Some(ConflictError::DuplicatePublicName {
                    public_name: public.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
    }
    None
}

/// Apply the proposed values to `node`, returning whether anything changed.
pub fn apply_update(node: &mut Node, update: &BulkUpdate) -> bool {
    let was_allocated = node.allocated;
    let mut dirty = false;

    if update.allocate && !was_allocated {
        dirty |= node.allocate();
    }

    // platform and license are frozen once allocated, and never bulk-edited
    // on the admin node
    if !was_allocated && !node.admin {
        if let Some(platform) = &update.target_platform {
            if node.target_platform.as_ref() != Some(platform) {
                node.target_platform = Some(platform.clone());
                dirty = true;
            }
        }
        if let Some(license) = &update.license_key {
            if node.license_key.as_ref() != Some(license) {
                node.license_key = Some(license.clone());
                dirty = true;
            }
        }
    }

    if let Some(alias) = update.alias.as_deref() {
        let alias = alias.trim();
        let changed = if alias.is_empty() {
            node.alias.is_some()
        } else {
            node.alias() != alias
        };
        if changed {
            node.force_alias(Some(alias.to_string()));
            dirty = true;
        }
    }

    if let Some(public) = update.public_name.as_deref() {
        let proposed = non_blank(Some(public));
        if node.public_name() != proposed {
            node.force_public_name(proposed.map(str::to_string));
            dirty = true;
        }
    }

    if let Some(role) = &update.intended_role {
        if node.intended_role.as_ref() != Some(role) {
            node.intended_role = Some(role.clone());
            dirty = true;
        }
    }

    dirty
}

fn apply_entry(
    repo: &dyn NodeRepository,
    name: &str,
    update: &BulkUpdate,
) -> Result<EntryOutcome, EntryFailure> {
    let fail = |error: FleetError| EntryFailure {
        node: name.to_string(),
        error,
    };

    let mut node = repo
        .find_by_name(name)
        .ok_or_else(|| fail(FleetError::node_not_found(name)))?;

    if !apply_update(&mut node, update) {
        return Ok(EntryOutcome::Unchanged(name.to_string()));
    }

    repo.save(&node).map_err(|e| fail(e.into()))?;
    Ok(EntryOutcome::Updated(name.to_string()))
}

/// Run both phases over `batch`.
pub fn reconcile(repo: &dyn NodeRepository, batch: &Batch) -> ReconciliationReport {
    let conflicts = detect_conflicts(batch);
    if conflicts.has_conflicts() {
        warn!(
            failed = ?conflicts.failed,
            duplicate_alias = conflicts.duplicate_alias,
            duplicate_public = conflicts.duplicate_public,
            "bulk update rejected: duplicate names in batch"
        );
        return conflicts;
    }

    let report = batch
        .iter()
        .map(|(name, update)| {
            apply_entry(repo, name, update).inspect_err(|failure| {
                warn!(node = %failure.node, error = %failure.error, "bulk update failed for node");
            })
        })
        .fold(ReconciliationReport::default(), ReconciliationReport::record);

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "bulk update finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::MemoryNodeRepository;
    use crate::error::PersistenceError;

    fn update(alias: &str) -> BulkUpdate {
        BulkUpdate {
            alias: Some(alias.to_string()),
            ..Default::default()
        }
    }

    fn repo(names: &[&str]) -> MemoryNodeRepository {
        MemoryNodeRepository::new(names.iter().map(|n| Node::new(*n, "ready")))
    }

    #[test]
    fn duplicate_alias_blocks_whole_batch() {
        let repo = repo(&["a", "b", "c"]);
        let mut batch = Batch::new();
        batch.insert("a".into(), update("web"));
        batch.insert("b".into(), update("web"));
        batch.insert("c".into(), update("db"));

        let report = reconcile(&repo, &batch);
        assert!(report.duplicate_alias);
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed, vec!["a", "b"]);
        // the valid entry was not applied either
        assert_eq!(repo.find_by_name("c").unwrap().alias(), "c");
    }

    #[test]
    fn duplicate_public_name_blocks_batch() {
        let repo = repo(&["a", "b"]);
        let mut batch = Batch::new();
        for name in ["a", "b"] {
            batch.insert(
                name.into(),
                BulkUpdate {
                    alias: Some(name.to_string()),
                    public_name: Some("www".into()),
                    ..Default::default()
                },
            );
        }
        let report = reconcile(&repo, &batch);
        assert!(report.duplicate_public);
        assert!(!report.duplicate_alias);
        assert_eq!(report.failed.len(), 2);
    }

    #[test]
    fn first_conflict_names_earlier_holder() {
        let mut batch = Batch::new();
        batch.insert("a".into(), update("web"));
        batch.insert("b".into(), update("db"));
        batch.insert("c".into(), update("web"));
        assert_eq!(
            first_conflict(&batch),
            Some(ConflictError::DuplicateAlias {
                alias: "web".into(),
                holder: "a".into(),
            })
        );
        batch.shift_remove("c");
        assert_eq!(first_conflict(&batch), None);
    }

    #[test]
    fn blank_public_names_do_not_conflict() {
        let mut batch = Batch::new();
        for name in ["a", "b"] {
            batch.insert(
                name.into(),
                BulkUpdate {
                    public_name: Some(" ".into()),
                    ..Default::default()
                },
            );
        }
        assert!(!detect_conflicts(&batch).has_conflicts());
    }

    #[test]
    fn repeated_blank_alias_conflicts() {
        let repo = repo(&["a", "b"]);
        let mut batch = Batch::new();
        batch.insert("a".into(), update(""));
        batch.insert("b".into(), update(" "));

        let report = detect_conflicts(&batch);
        assert!(report.duplicate_alias);
        assert_eq!(report.failed, vec!["a", "b"]);
        assert_eq!(
            first_conflict(&batch),
            Some(ConflictError::DuplicateAlias {
                alias: String::new(),
                holder: "a".into(),
            })
        );
        assert!(reconcile(&repo, &batch).succeeded.is_empty());

        // an alias left out of an entry is not a proposal
        batch.insert("b".into(), BulkUpdate::default());
        assert!(!detect_conflicts(&batch).has_conflicts());
    }

    #[test]
    fn missing_node_is_isolated() {
        let repo = repo(&["a", "b"]);
        let mut batch = Batch::new();
        batch.insert("a".into(), update("web"));
        batch.insert("ghost".into(), update("ghost-alias"));
        batch.insert("b".into(), update("db"));

        let report = reconcile(&repo, &batch);
        assert_eq!(report.succeeded, vec!["a", "b"]);
        assert_eq!(report.failed, vec!["ghost"]);
        assert_eq!(repo.find_by_name("b").unwrap().alias(), "db");
    }

    #[test]
    fn unchanged_batch_is_noop() {
        let repo = repo(&["a", "b"]);
        let mut batch = Batch::new();
        batch.insert("a".into(), update("a"));
        batch.insert(
            "b".into(),
            BulkUpdate {
                alias: Some("b".into()),
                public_name: Some(String::new()),
                ..Default::default()
            },
        );
        let report = reconcile(&repo, &batch);
        assert_eq!(report, ReconciliationReport::default());
        assert_eq!(report.outcome(), ReconciliationOutcome::NoChange);
    }

    #[test]
    fn allocated_node_keeps_platform_and_license() {
        let mut node = Node::new("a", "ready");
        node.allocated = true;
        node.target_platform = Some("suse-12.3".into());
        node.license_key = Some("KEY-1".into());
        let repo = MemoryNodeRepository::new([node]);

        let mut batch = Batch::new();
        batch.insert(
            "a".into(),
            BulkUpdate {
                target_platform: Some("windows-6.3".into()),
                license_key: Some("KEY-2".into()),
                ..Default::default()
            },
        );
        let report = reconcile(&repo, &batch);
        assert!(report.succeeded.is_empty());
        let stored = repo.find_by_name("a").unwrap();
        assert_eq!(stored.target_platform.as_deref(), Some("suse-12.3"));
        assert_eq!(stored.license_key.as_deref(), Some("KEY-1"));
    }

    #[test]
    fn allocation_in_same_pass_still_takes_platform() {
        let mut node = Node::new("a", "ready");
        node.admin = false;
        let mut admin = Node::new("admin", "ready");
        admin.admin = true;
        let repo = MemoryNodeRepository::new([node, admin]);

        let mut batch = Batch::new();
        for name in ["a", "admin"] {
            batch.insert(
                name.into(),
                BulkUpdate {
                    allocate: true,
                    target_platform: Some("suse-12.3".into()),
                    ..Default::default()
                },
            );
        }
        let report = reconcile(&repo, &batch);
        assert_eq!(report.succeeded, vec!["a", "admin"]);
        let a = repo.find_by_name("a").unwrap();
        assert!(a.allocated);
        assert_eq!(a.target_platform.as_deref(), Some("suse-12.3"));
        let admin = repo.find_by_name("admin").unwrap();
        assert!(admin.allocated);
        assert!(admin.target_platform.is_none());
    }

    #[test]
    fn storage_rejection_is_per_node() {
        // "taken" collides with a node outside the batch
        let mut holder = Node::new("holder", "ready");
        holder.alias = Some("taken".into());
        let repo = MemoryNodeRepository::new([holder, Node::new("a", "ready"), Node::new("b", "ready")]);

        let mut batch = Batch::new();
        batch.insert("a".into(), update("taken"));
        batch.insert("b".into(), update("free"));
        let report = reconcile(&repo, &batch);
        assert!(!report.duplicate_alias);
        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(report.succeeded, vec!["b"]);
    }

    #[test]
    fn entry_failure_carries_typed_error() {
        let repo = MemoryNodeRepository::new([
            {
                let mut n = Node::new("holder", "ready");
                n.alias = Some("taken".into());
                n
            },
            Node::new("a", "ready"),
        ]);
        let failure = apply_entry(&repo, "a", &update("taken")).unwrap_err();
        assert!(matches!(
            failure.error,
            FleetError::Persistence(PersistenceError::Rejected { .. })
        ));
    }

    #[test]
    fn outcome_precedence_and_short_names() {
        let report = ReconciliationReport {
            failed: vec!["a.example.com".into()],
            duplicate_alias: true,
            duplicate_public: true,
            ..Default::default()
        };
        assert_eq!(
            report.outcome(),
            ReconciliationOutcome::Failed {
                reason: FailureReason::DuplicateAlias,
                nodes: vec!["a".into()],
            }
        );

        let report = ReconciliationReport {
            failed: vec!["b".into()],
            duplicate_public: true,
            group_error: true,
            ..Default::default()
        };
        assert!(matches!(
            report.outcome(),
            ReconciliationOutcome::Failed {
                reason: FailureReason::DuplicatePublic,
                ..
            }
        ));

        let report = ReconciliationReport {
            succeeded: vec!["c.example.com".into()],
            ..Default::default()
        };
        assert_eq!(
            report.outcome(),
            ReconciliationOutcome::Updated {
                nodes: vec!["c".into()]
            }
        );
    }

    #[test]
    fn bulk_skips_group_and_raid_validation() {
        use crate::domain::update::NodeUpdate;

        // group and raid keys in a batch entry are dropped on parse, so values
        // the single-node path rejects never reach the reconciler
        let fields = r#"{"alias":"x","group":"9 bad","raidType":"raid6","raidDisks":["sda"]}"#;
        let single: NodeUpdate = serde_json::from_str(fields).unwrap();
        assert!(single.validate().is_err());

        let repo = repo(&["a"]);
        let batch: Batch = serde_json::from_str(&format!(r#"{{"a":{fields}}}"#)).unwrap();
        let report = reconcile(&repo, &batch);

        assert!(!report.group_error);
        assert_eq!(report.succeeded, vec!["a"]);
        assert!(report.failed.is_empty());
        let node = repo.find_by_name("a").unwrap();
        assert_eq!(node.alias(), "x");
        assert_eq!(node.group, None);
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_value(ReconciliationReport::default()).unwrap();
        assert_eq!(json["duplicatePublic"], false);
        assert_eq!(json["duplicateAlias"], false);
        assert_eq!(json["groupError"], false);
    }
}
