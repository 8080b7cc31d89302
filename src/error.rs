use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Rejections raised by [`crate::services::plan_graph::PlanGraph`] mutations.
///
/// A mutation that returns one of these leaves the graph untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanGraphError {
    #[error("adding this edge would create a cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("edge {from} -> {to} references a node that does not exist")]
    OrphanEdge { from: String, to: String },

    #[error("edge {from} -> {to} already exists")]
    DuplicateEdge { from: String, to: String },

    #[error("node id {0} already exists")]
    DuplicateNodeId(String),

    #[error("node {0} cannot depend on itself")]
    SelfLoop(String),

    #[error("node {0} not found")]
    InvalidNodeReference(String),

    #[error("edge {from} -> {to} not found")]
    EdgeNotFound { from: String, to: String },
}

impl PlanGraphError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanGraphError::CycleDetected { .. } => "CYCLE_DETECTED",
            PlanGraphError::OrphanEdge { .. } => "ORPHAN_EDGE",
            PlanGraphError::DuplicateEdge { .. } => "DUPLICATE_EDGE",
            PlanGraphError::DuplicateNodeId(_) => "DUPLICATE_NODE_ID",
            PlanGraphError::SelfLoop(_) => "SELF_LOOP",
            PlanGraphError::InvalidNodeReference(_) => "INVALID_NODE_REFERENCE",
            PlanGraphError::EdgeNotFound { .. } => "EDGE_NOT_FOUND",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("record not found")]
    NotFound,

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("plan graph rejected the change: {0}")]
    Graph(#[from] PlanGraphError),

    #[error("plan store error: {message}")]
    Store { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::plan_store", "resource not found");
        AppError::NotFound
    }

    pub fn store(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::plan_store", %message, "plan store error");
        AppError::Store { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn graph_error(&self) -> Option<&PlanGraphError> {
        match self {
            AppError::Graph(err) => Some(err),
            _ => None,
        }
    }
}
