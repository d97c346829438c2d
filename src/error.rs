//! Error types for the ontology engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OntologyError>;

#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Property '{property}' not found on node {node}")]
    PropertyNotFound { node: String, property: String },

    #[error("Property '{property}' on node {node} is not a link list")]
    PropertyKindMismatch { node: String, property: String },

    #[error("Collection '{category}' not found under property '{property}'")]
    CategoryNotFound { property: String, category: String },

    #[error("Link to {id} not found under property '{property}' of node {node}")]
    LinkNotFound {
        node: String,
        property: String,
        id: String,
    },

    #[error("Collection '{category}' already exists under property '{property}'")]
    DuplicateCategory { property: String, category: String },

    #[error("Property '{0}' already exists on this node")]
    DuplicateProperty(String),

    #[error("A node titled '{0}' already exists")]
    DuplicateTitle(String),

    #[error("Collection '{0}' is reserved and cannot be renamed or deleted")]
    ReservedCategory(String),

    #[error("Dangling reference: {from} -> {to}")]
    DanglingReference { from: String, to: String },

    #[error("Removing this link would orphan node {0}")]
    WouldOrphanNode(String),

    #[error("Batch commit failed after retry: {0}")]
    BatchCommitFailure(String),

    #[error("Cycle detected in specialization graph at node {0}")]
    CycleDetected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OntologyError {
    /// Get error code for wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            OntologyError::NodeNotFound(_) => "NODE_NOT_FOUND",
            OntologyError::PropertyNotFound { .. } => "PROPERTY_NOT_FOUND",
            OntologyError::PropertyKindMismatch { .. } => "PROPERTY_KIND_MISMATCH",
            OntologyError::CategoryNotFound { .. } => "COLLECTION_NOT_FOUND",
            OntologyError::LinkNotFound { .. } => "LINK_NOT_FOUND",
            OntologyError::DuplicateCategory { .. } => "DUPLICATE_COLLECTION",
            OntologyError::DuplicateProperty(_) => "DUPLICATE_PROPERTY",
            OntologyError::DuplicateTitle(_) => "DUPLICATE_TITLE",
            OntologyError::ReservedCategory(_) => "RESERVED_COLLECTION",
            OntologyError::DanglingReference { .. } => "DANGLING_REFERENCE",
            OntologyError::WouldOrphanNode(_) => "WOULD_ORPHAN_NODE",
            OntologyError::BatchCommitFailure(_) => "BATCH_COMMIT_FAILURE",
            OntologyError::CycleDetected(_) => "CYCLE_DETECTED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// True for failures the user should simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OntologyError::BatchCommitFailure(_))
    }
}
