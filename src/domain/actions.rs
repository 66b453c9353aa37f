//! Lifecycle action gate. The actual effect lives behind [`ActionDispatcher`].

use tracing::info;

use crate::error::{FleetError, FleetResult};

use super::node::{Node, NodeAction};
use super::repository::NodeRepository;

pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, node: &Node, action: NodeAction) -> FleetResult<()>;
}

/// Records the request in the log; used when no backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl ActionDispatcher for LoggingDispatcher {
    fn dispatch(&self, node: &Node, action: NodeAction) -> FleetResult<()> {
        info!(node = %node.name, action = %action, "node action requested");
        Ok(())
    }
}

/// Check `action` against the node's allowed set, then delegate.
pub fn hit(
    repo: &dyn NodeRepository,
    dispatcher: &dyn ActionDispatcher,
    name: &str,
    action: &str,
) -> FleetResult<NodeAction> {
    let node = repo
        .find_by_name(name)
        .ok_or_else(|| FleetError::node_not_found(name))?;

    let invalid = || FleetError::InvalidAction {
        node: node.name.clone(),
        action: action.to_string(),
    };
    let parsed: NodeAction = action.parse().map_err(|_| invalid())?;
    if !node.actions.contains(&parsed) {
        return Err(invalid());
    }

    dispatcher.dispatch(&node, parsed)?;
    Ok(parsed)
}
