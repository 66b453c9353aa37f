//! Error taxonomy for fleet operations.
//!
//! Every failure carries a machine-checkable [`ErrorKind`]; the transport
//! layer maps kinds to status codes and never has to parse messages.

use serde::{Deserialize, Serialize};

/// Top-level error for every fleet operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FleetError {
    /// Node name/handle or attribute path did not resolve.
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Pre-mutation invariant check failed; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Batch-wide naming conflict; nothing in the batch was written.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Repository rejected or failed to store a node.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Lifecycle action is unknown or not allowed for the node.
    #[error("action '{action}' is not allowed for node {node}")]
    InvalidAction { node: String, action: String },
}

impl FleetError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(ValidationError::InvalidGroupName { .. }) => {
                ErrorKind::InvalidGroupName
            }
            Self::Validation(ValidationError::InsufficientRaidDisks { .. }) => {
                ErrorKind::InsufficientRaidDisks
            }
            Self::Conflict(ConflictError::DuplicateAlias { .. }) => ErrorKind::DuplicateAlias,
            Self::Conflict(ConflictError::DuplicatePublicName { .. }) => {
                ErrorKind::DuplicatePublicName
            }
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::InvalidAction { .. } => ErrorKind::InvalidAction,
        }
    }

    pub fn node_not_found(name: impl Into<String>) -> Self {
        Self::NotFound(NotFound::Node { name: name.into() })
    }
}

/// Flat classification of [`FleetError`], serialized into API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidGroupName,
    InsufficientRaidDisks,
    DuplicateAlias,
    DuplicatePublicName,
    Persistence,
    InvalidAction,
    /// Request body that is not valid JSON or does not fit the expected shape.
    InvalidRequest,
    /// Transport-side failure such as a panicked worker.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    #[error("node {name} not found")]
    Node { name: String },

    /// `resolved` is the deepest prefix that did resolve, joined with `/`.
    #[error("unknown attribute '{missing}' under '{resolved}'")]
    Attribute { resolved: String, missing: String },

    #[error("node {node} has no key '{key}'")]
    Key { node: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid group name '{group}'")]
    InvalidGroupName { group: String },

    #[error("{raid_type} requires at least {required} disks, {selected} selected")]
    InsufficientRaidDisks {
        raid_type: String,
        required: usize,
        selected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("alias '{alias}' is already used by {holder}")]
    DuplicateAlias { alias: String, holder: String },

    #[error("public name '{public_name}' is already used by {holder}")]
    DuplicatePublicName { public_name: String, holder: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Storage-layer uniqueness check against nodes outside the current write.
    #[error("node {node} rejected by storage: {source}")]
    Rejected {
        node: String,
        #[source]
        source: ConflictError,
    },

    #[error("failed to persist node {node}: {message}")]
    Io { node: String, message: String },
}

pub type FleetResult<T> = std::result::Result<T, FleetError>;
