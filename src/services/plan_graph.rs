//! In-memory prerequisite DAG for a study plan.
//!
//! Every mutation validates before it touches state, so a rejected call leaves
//! nodes, edges and the revision counter exactly as they were.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlanGraphError;
use crate::models::plan::{Plan, PlanEdge, PlanGraphStatistics, PlanNode};

pub type GraphResult<T> = Result<T, PlanGraphError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanGraphMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub assignment_id: Option<String>,
    /// Bumped on every successful mutation.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanGraph {
    id: String,
    nodes: BTreeMap<String, PlanNode>,
    edges: Vec<PlanEdge>,
    metadata: PlanGraphMetadata,
}

impl PlanGraph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            metadata: PlanGraphMetadata::default(),
        }
    }

    /// Rebuilds a graph from its persisted form, re-running every check.
    pub fn from_plan(plan: &Plan) -> GraphResult<Self> {
        let mut graph = Self::new(plan.id.clone());
        for node in &plan.nodes {
            graph.add_node(node.clone())?;
        }
        for edge in &plan.edges {
            if !graph.nodes.contains_key(&edge.from_node_id)
                || !graph.nodes.contains_key(&edge.to_node_id)
            {
                return Err(reject(PlanGraphError::OrphanEdge {
                    from: edge.from_node_id.clone(),
                    to: edge.to_node_id.clone(),
                }));
            }
            graph.add_edge(&edge.from_node_id, &edge.to_node_id)?;
        }
        graph.metadata = PlanGraphMetadata {
            title: Some(plan.title.clone()),
            assignment_id: Some(plan.assignment_id.clone()),
            revision: plan.revision,
        };
        debug!(
            target: "app::plan_graph",
            plan_id = %plan.id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "built plan graph"
        );
        Ok(graph)
    }

    /// Copies nodes (in topological-friendly `sort_index` order) and edges back
    /// into `plan`.
    pub fn write_into(&self, plan: &mut Plan) {
        plan.nodes = self.ordered_nodes().into_iter().cloned().collect();
        plan.edges = self.edges.clone();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &PlanGraphMetadata {
        &self.metadata
    }

    pub fn revision(&self) -> u64 {
        self.metadata.revision
    }

    pub fn node(&self, node_id: &str) -> Option<&PlanNode> {
        self.nodes.get(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[PlanEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from_node_id == from && edge.to_node_id == to)
    }

    /// Nodes ordered by `(sort_index, id)`.
    pub fn ordered_nodes(&self) -> Vec<&PlanNode> {
        let mut nodes: Vec<&PlanNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
        nodes
    }

    /// The first node (by `sort_index`) bound to `assignment_id`.
    pub fn node_for_assignment(&self, assignment_id: &str) -> Option<&PlanNode> {
        self.ordered_nodes()
            .into_iter()
            .find(|node| node.assignment_id.as_deref() == Some(assignment_id))
    }

    pub fn add_node(&mut self, node: PlanNode) -> GraphResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(reject(PlanGraphError::DuplicateNodeId(node.id)));
        }
        self.nodes.insert(node.id.clone(), node);
        self.touch();
        Ok(())
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> GraphResult<()> {
        if from == to {
            return Err(reject(PlanGraphError::SelfLoop(from.to_string())));
        }
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(reject(PlanGraphError::InvalidNodeReference(
                    endpoint.to_string(),
                )));
            }
        }
        if self.has_edge(from, to) {
            return Err(reject(PlanGraphError::DuplicateEdge {
                from: from.to_string(),
                to: to.to_string(),
            }));
        }

        let adjacency = self.adjacency(Some((from, to)));
        if let Some(path) = self.find_cycle(&adjacency) {
            return Err(reject(PlanGraphError::CycleDetected { path }));
        }

        self.edges.push(PlanEdge::new(from, to));
        self.touch();
        Ok(())
    }

    /// Removes the node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &str) -> GraphResult<PlanNode> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| reject(PlanGraphError::InvalidNodeReference(node_id.to_string())))?;
        self.edges
            .retain(|edge| edge.from_node_id != node_id && edge.to_node_id != node_id);
        self.touch();
        Ok(node)
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> GraphResult<()> {
        let position = self
            .edges
            .iter()
            .position(|edge| edge.from_node_id == from && edge.to_node_id == to)
            .ok_or_else(|| {
                reject(PlanGraphError::EdgeNotFound {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            })?;
        self.edges.remove(position);
        self.touch();
        Ok(())
    }

    pub fn mark_node_completed(
        &mut self,
        node_id: &str,
        at: DateTime<FixedOffset>,
    ) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| reject(PlanGraphError::InvalidNodeReference(node_id.to_string())))?;
        node.is_completed = true;
        node.completed_at = Some(at);
        self.touch();
        Ok(())
    }

    pub fn mark_node_incomplete(&mut self, node_id: &str) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| reject(PlanGraphError::InvalidNodeReference(node_id.to_string())))?;
        node.is_completed = false;
        node.completed_at = None;
        self.touch();
        Ok(())
    }

    /// Path of the first cycle found, closed by repeating its first node.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let adjacency = self.adjacency(None);
        self.find_cycle(&adjacency)
    }

    /// Kahn's algorithm; ready nodes leave in `(sort_index, id)` order.
    /// Returns `None` when a cycle keeps some node from being processed.
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(degree) = in_degree.get_mut(edge.to_node_id.as_str()) {
                *degree += 1;
            }
        }
        let adjacency = self.adjacency(None);

        let mut ready: BTreeSet<(i64, &str)> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| (self.nodes[id].sort_index, id))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some((_, current)) = ready.pop_first() {
            order.push(current.to_string());
            if let Some(neighbors) = adjacency.get(current) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert((self.nodes[neighbor].sort_index, neighbor));
                        }
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }

    pub fn get_prerequisites(&self, node_id: &str) -> Vec<&PlanNode> {
        let mut nodes: Vec<&PlanNode> = self
            .edges
            .iter()
            .filter(|edge| edge.to_node_id == node_id)
            .filter_map(|edge| self.nodes.get(&edge.from_node_id))
            .collect();
        nodes.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
        nodes
    }

    pub fn get_dependents(&self, node_id: &str) -> Vec<&PlanNode> {
        let mut nodes: Vec<&PlanNode> = self
            .edges
            .iter()
            .filter(|edge| edge.from_node_id == node_id)
            .filter_map(|edge| self.nodes.get(&edge.to_node_id))
            .collect();
        nodes.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
        nodes
    }

    /// True when at least one prerequisite is not completed.
    pub fn is_node_blocked(&self, node_id: &str) -> bool {
        self.get_prerequisites(node_id)
            .iter()
            .any(|prerequisite| !prerequisite.is_completed)
    }

    /// Every node with no incomplete prerequisite, completed ones included.
    pub fn get_unblocked_nodes(&self) -> Vec<&PlanNode> {
        self.ordered_nodes()
            .into_iter()
            .filter(|node| !self.is_node_blocked(&node.id))
            .collect()
    }

    pub fn get_root_nodes(&self) -> Vec<&PlanNode> {
        let with_incoming: HashSet<&str> = self
            .edges
            .iter()
            .map(|edge| edge.to_node_id.as_str())
            .collect();
        self.ordered_nodes()
            .into_iter()
            .filter(|node| !with_incoming.contains(node.id.as_str()))
            .collect()
    }

    pub fn get_leaf_nodes(&self) -> Vec<&PlanNode> {
        let with_outgoing: HashSet<&str> = self
            .edges
            .iter()
            .map(|edge| edge.from_node_id.as_str())
            .collect();
        self.ordered_nodes()
            .into_iter()
            .filter(|node| !with_outgoing.contains(node.id.as_str()))
            .collect()
    }

    /// Node ids along the longest prerequisite chain.
    pub fn critical_path(&self) -> Vec<String> {
        let Some(order) = self.topological_sort() else {
            return Vec::new();
        };

        let mut distance: HashMap<&str, usize> = HashMap::new();
        let mut predecessor: HashMap<&str, &str> = HashMap::new();
        for node_id in &order {
            let mut best = 0;
            for prerequisite in self.get_prerequisites(node_id) {
                let candidate = distance.get(prerequisite.id.as_str()).copied().unwrap_or(0) + 1;
                if candidate > best {
                    best = candidate;
                    predecessor.insert(node_id.as_str(), prerequisite.id.as_str());
                }
            }
            distance.insert(node_id.as_str(), best);
        }

        let mut end: Option<(&str, usize)> = None;
        for node_id in &order {
            let dist = distance[node_id.as_str()];
            if end.map_or(true, |(_, best)| dist > best) {
                end = Some((node_id.as_str(), dist));
            }
        }

        let mut path = Vec::new();
        let mut current = end.map(|(id, _)| id);
        while let Some(id) = current {
            path.push(id.to_string());
            current = predecessor.get(id).copied();
        }
        path.reverse();
        path
    }

    pub fn get_statistics(&self) -> PlanGraphStatistics {
        let total_nodes = self.nodes.len();
        let completed_nodes = self.nodes.values().filter(|node| node.is_completed).count();
        let completion_percentage = if total_nodes == 0 {
            0.0
        } else {
            completed_nodes as f64 / total_nodes as f64 * 100.0
        };

        PlanGraphStatistics {
            total_nodes,
            completed_nodes,
            total_edges: self.edges.len(),
            root_nodes: self.get_root_nodes().len(),
            leaf_nodes: self.get_leaf_nodes().len(),
            longest_path: self.critical_path().len().saturating_sub(1),
            total_estimated_minutes: self.nodes.values().map(|node| node.estimated_duration).sum(),
            completion_percentage,
        }
    }

    /// Full consistency check, for graphs assembled outside `add_*`.
    pub fn validate(&self) -> GraphResult<()> {
        let mut seen = HashSet::new();
        for edge in &self.edges {
            if edge.from_node_id == edge.to_node_id {
                return Err(PlanGraphError::SelfLoop(edge.from_node_id.clone()));
            }
            if !self.nodes.contains_key(&edge.from_node_id)
                || !self.nodes.contains_key(&edge.to_node_id)
            {
                return Err(PlanGraphError::OrphanEdge {
                    from: edge.from_node_id.clone(),
                    to: edge.to_node_id.clone(),
                });
            }
            if !seen.insert((edge.from_node_id.as_str(), edge.to_node_id.as_str())) {
                return Err(PlanGraphError::DuplicateEdge {
                    from: edge.from_node_id.clone(),
                    to: edge.to_node_id.clone(),
                });
            }
        }
        if let Some(path) = self.detect_cycle() {
            return Err(PlanGraphError::CycleDetected { path });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.metadata.revision += 1;
    }

    /// Outgoing neighbors per node, each list in `(sort_index, id)` order.
    fn adjacency<'a>(&'a self, extra: Option<(&'a str, &'a str)>) -> BTreeMap<&'a str, Vec<&'a str>> {
        let mut adjacency: BTreeMap<&str, Vec<&str>> =
            self.nodes.keys().map(|id| (id.as_str(), Vec::new())).collect();
        let pairs = self
            .edges
            .iter()
            .map(|edge| (edge.from_node_id.as_str(), edge.to_node_id.as_str()))
            .chain(extra);
        for (from, to) in pairs {
            adjacency.entry(from).or_default().push(to);
        }
        for neighbors in adjacency.values_mut() {
            neighbors.sort_by_key(|id| self.nodes.get(*id).map(|node| (node.sort_index, *id)));
        }
        adjacency
    }

    fn find_cycle(&self, adjacency: &BTreeMap<&str, Vec<&str>>) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in self.ordered_nodes() {
            if !visited.contains(node.id.as_str()) {
                if let Some(cycle) = dfs_cycle(
                    node.id.as_str(),
                    adjacency,
                    &mut visited,
                    &mut rec_stack,
                    &mut path,
                ) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

fn dfs_cycle<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle(neighbor, adjacency, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let start = path.iter().position(|id| *id == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|id| id.to_string()).collect();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

fn order_key(node: &PlanNode) -> (i64, &str) {
    (node.sort_index, node.id.as_str())
}

fn reject(err: PlanGraphError) -> PlanGraphError {
    warn!(target: "app::plan_graph", code = err.code(), error = %err, "plan graph mutation rejected");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 3, 12, 0, 0)
            .unwrap()
    }

    fn chain() -> PlanGraph {
        let mut graph = PlanGraph::new("plan");
        graph.add_node(PlanNode::new("a", "Read chapter", 0)).unwrap();
        graph.add_node(PlanNode::new("b", "Outline", 1)).unwrap();
        graph.add_node(PlanNode::new("c", "Draft", 2)).unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "c").unwrap();
        graph
    }

    fn ids(nodes: Vec<&PlanNode>) -> Vec<&str> {
        nodes.into_iter().map(|node| node.id.as_str()).collect()
    }

    #[test]
    fn unblocked_nodes_follow_completion() {
        let mut graph = chain();
        assert_eq!(ids(graph.get_unblocked_nodes()), vec!["a"]);

        graph.mark_node_completed("a", now()).unwrap();
        assert_eq!(ids(graph.get_unblocked_nodes()), vec!["a", "b"]);
        assert_eq!(graph.node("a").unwrap().completed_at, Some(now()));

        graph.mark_node_incomplete("a").unwrap();
        assert_eq!(ids(graph.get_unblocked_nodes()), vec!["a"]);
        assert!(graph.node("a").unwrap().completed_at.is_none());
    }

    #[test]
    fn closing_edge_is_rejected_and_graph_unchanged() {
        let mut graph = chain();
        let before = graph.clone();

        let err = graph.add_edge("c", "a").unwrap_err();
        match err {
            PlanGraphError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"c".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph, before);
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn rejects_self_loops_duplicates_and_unknown_nodes() {
        let mut graph = chain();
        assert_eq!(
            graph.add_edge("a", "a"),
            Err(PlanGraphError::SelfLoop("a".into()))
        );
        assert_eq!(
            graph.add_edge("a", "zzz"),
            Err(PlanGraphError::InvalidNodeReference("zzz".into()))
        );
        assert_eq!(
            graph.add_edge("a", "b"),
            Err(PlanGraphError::DuplicateEdge {
                from: "a".into(),
                to: "b".into()
            })
        );
        assert_eq!(
            graph.add_node(PlanNode::new("a", "again", 9)),
            Err(PlanGraphError::DuplicateNodeId("a".into()))
        );
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn topological_sort_breaks_ties_by_sort_index() {
        let mut graph = PlanGraph::new("plan");
        graph.add_node(PlanNode::new("z", "Z", 0)).unwrap();
        graph.add_node(PlanNode::new("y", "Y", 2)).unwrap();
        graph.add_node(PlanNode::new("x", "X", 1)).unwrap();
        graph.add_node(PlanNode::new("w", "W", 3)).unwrap();
        graph.add_edge("z", "w").unwrap();
        graph.add_edge("x", "w").unwrap();

        assert_eq!(
            graph.topological_sort().unwrap(),
            vec!["z", "x", "y", "w"]
        );
    }

    #[test]
    fn remove_node_cascades_edges() {
        let mut graph = chain();
        graph.remove_node("b").unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(ids(graph.get_root_nodes()), vec!["a", "c"]);
        assert!(graph.remove_node("b").is_err());
    }

    #[test]
    fn remove_edge_unblocks_dependent() {
        let mut graph = chain();
        assert!(graph.is_node_blocked("c"));
        graph.remove_edge("b", "c").unwrap();
        assert!(!graph.is_node_blocked("c"));
        assert_eq!(
            graph.remove_edge("b", "c"),
            Err(PlanGraphError::EdgeNotFound {
                from: "b".into(),
                to: "c".into()
            })
        );
        assert_eq!(
            graph.remove_edge("c", "b").unwrap_err().code(),
            "EDGE_NOT_FOUND"
        );
    }

    #[test]
    fn statistics_cover_longest_path_and_completion() {
        let mut graph = chain();
        graph
            .add_node(PlanNode::new("d", "Flashcards", 3).with_duration(15))
            .unwrap();
        graph.mark_node_completed("a", now()).unwrap();

        let stats = graph.get_statistics();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.completed_nodes, 1);
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.root_nodes, 2);
        assert_eq!(stats.leaf_nodes, 2);
        assert_eq!(stats.longest_path, 2);
        assert_eq!(stats.total_estimated_minutes, 15);
        assert_eq!(stats.completion_percentage, 25.0);
        assert_eq!(graph.critical_path(), vec!["a", "b", "c"]);
    }

    #[test]
    fn revision_moves_only_on_success() {
        let mut graph = chain();
        let revision = graph.revision();
        assert!(graph.add_edge("c", "a").is_err());
        assert_eq!(graph.revision(), revision);
        graph.add_node(PlanNode::new("d", "D", 4)).unwrap();
        assert_eq!(graph.revision(), revision + 1);
    }

    #[test]
    fn from_plan_flags_orphan_edges() {
        let mut plan = Plan::new("p1", "task-1", "Essay");
        plan.nodes.push(PlanNode::new("a", "A", 0));
        plan.edges.push(PlanEdge::new("a", "ghost"));

        assert_eq!(
            PlanGraph::from_plan(&plan),
            Err(PlanGraphError::OrphanEdge {
                from: "a".into(),
                to: "ghost".into()
            })
        );
    }

    #[test]
    fn plan_round_trip_keeps_structure() {
        let graph = chain();
        let mut plan = Plan::new("plan", "task-1", "Essay");
        plan.revision = 7;
        graph.write_into(&mut plan);

        let rebuilt = PlanGraph::from_plan(&plan).unwrap();
        assert_eq!(rebuilt.revision(), 7);
        assert_eq!(rebuilt.edges(), graph.edges());
        assert_eq!(rebuilt.topological_sort(), graph.topological_sort());
        assert!(rebuilt.validate().is_ok());
    }
}
