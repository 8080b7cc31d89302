use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    #[default]
    Task,
    Reading,
    Review,
    Practice,
    Milestone,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Task => write!(f, "task"),
            NodeType::Reading => write!(f, "reading"),
            NodeType::Review => write!(f, "review"),
            NodeType::Practice => write!(f, "practice"),
            NodeType::Milestone => write!(f, "milestone"),
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(NodeType::Task),
            "reading" => Ok(NodeType::Reading),
            "review" => Ok(NodeType::Review),
            "practice" => Ok(NodeType::Practice),
            "milestone" => Ok(NodeType::Milestone),
            _ => Err(format!("Invalid node type: {}", s)),
        }
    }
}

/// A step of a plan; `assignment_id` binds it to a schedulable task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub id: String,
    #[serde(default)]
    pub assignment_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub sort_index: i64,
    /// Minutes.
    #[serde(default)]
    pub estimated_duration: i64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<FixedOffset>>,
}

impl PlanNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, sort_index: i64) -> Self {
        Self {
            id: id.into(),
            assignment_id: None,
            title: title.into(),
            node_type: NodeType::default(),
            sort_index,
            estimated_duration: 0,
            is_completed: false,
            completed_at: None,
        }
    }

    pub fn for_assignment(mut self, assignment_id: impl Into<String>) -> Self {
        self.assignment_id = Some(assignment_id.into());
        self
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.estimated_duration = minutes;
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }
}

/// `from_node_id` must be finished before `to_node_id` can start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PlanEdge {
    pub from_node_id: String,
    pub to_node_id: String,
}

impl PlanEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node_id: from.into(),
            to_node_id: to.into(),
        }
    }
}

/// Persisted form of a plan, as handed over by a plan store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub assignment_id: String,
    pub title: String,
    #[serde(default = "default_enforce")]
    pub enforce_dependencies: bool,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
    #[serde(default)]
    pub edges: Vec<PlanEdge>,
}

impl Plan {
    pub fn new(
        id: impl Into<String>,
        assignment_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            assignment_id: assignment_id.into(),
            title: title.into(),
            enforce_dependencies: true,
            revision: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Task ids this plan speaks for.
    pub fn assignment_ids(&self) -> Vec<String> {
        let mut ids = vec![self.assignment_id.clone()];
        for node in &self.nodes {
            if let Some(id) = &node.assignment_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}

fn default_enforce() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanGraphStatistics {
    pub total_nodes: usize,
    pub completed_nodes: usize,
    pub total_edges: usize,
    pub root_nodes: usize,
    pub leaf_nodes: usize,
    /// Edge count along the longest prerequisite chain.
    pub longest_path: usize,
    pub total_estimated_minutes: i64,
    pub completion_percentage: f64,
}
