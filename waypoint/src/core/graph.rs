//! Checkpoint dependency graph and readiness.
//!
//! An edge `A -> B` means B depends on A. A checkpoint is READY when it is not
//! closed (DONE/SKIP) and every dependency names an existing, closed checkpoint.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::core::types::Marker;
use crate::doc::plan::PlanDocument;
use crate::doc::{DocKind, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Done,
    Skip,
    Ready,
    DepBlocked,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Done => "DONE",
            NodeStatus::Skip => "SKIP",
            NodeStatus::Ready => "READY",
            NodeStatus::DepBlocked => "DEP_BLOCKED",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, NodeStatus::Done | NodeStatus::Skip)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`CheckpointGraph::build_from`]: one checkpoint in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub id: String,
    pub title: String,
    pub marker: Marker,
    pub depends_on: Vec<String>,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    pub status: NodeStatus,
    pub deps: Vec<String>,
    #[serde(skip)]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphError {
    SelfDependency {
        id: String,
        #[serde(skip)]
        line: Option<usize>,
    },
    DanglingDependency {
        id: String,
        missing: String,
        #[serde(skip)]
        line: Option<usize>,
    },
    /// Nodes on the cycle in dependency order; the first node closes the loop.
    Cycle { path: Vec<String> },
    DuplicateNode {
        id: String,
        #[serde(skip)]
        line: Option<usize>,
    },
}

impl GraphError {
    pub fn location(&self) -> Location {
        let line = match self {
            GraphError::SelfDependency { line, .. }
            | GraphError::DanglingDependency { line, .. }
            | GraphError::DuplicateNode { line, .. } => *line,
            GraphError::Cycle { .. } => None,
        };
        match line {
            Some(line) => Location::line(DocKind::Plan, line),
            None => Location::document(DocKind::Plan),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::SelfDependency { id, .. } => {
                write!(f, "checkpoint {id} depends on itself")
            }
            GraphError::DanglingDependency { id, missing, .. } => {
                write!(f, "checkpoint {id} depends on unknown checkpoint {missing}")
            }
            GraphError::Cycle { path } => {
                let mut rendered = path.join(" -> ");
                if let Some(first) = path.first() {
                    rendered.push_str(" -> ");
                    rendered.push_str(first);
                }
                write!(f, "dependency cycle: {rendered}")
            }
            GraphError::DuplicateNode { id, .. } => {
                write!(f, "checkpoint {id} is declared more than once")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    errors: Vec<GraphError>,
}

impl CheckpointGraph {
    /// Build from every checkpoint of the plan, honoring `(SKIP)` stages.
    pub fn build(plan: &PlanDocument) -> Self {
        let specs = plan
            .entries()
            .map(|entry| NodeSpec {
                id: entry.checkpoint.id.to_string(),
                title: entry.checkpoint.title.clone(),
                marker: entry.marker(),
                depends_on: entry.checkpoint.depends_on.clone(),
                line: Some(entry.checkpoint.span.0),
            })
            .collect();
        Self::build_from(specs)
    }

    pub fn build_from(specs: Vec<NodeSpec>) -> Self {
        let mut graph = CheckpointGraph::default();
        let mut markers = Vec::new();

        for spec in specs {
            if graph.index.contains_key(&spec.id) {
                graph.errors.push(GraphError::DuplicateNode {
                    id: spec.id,
                    line: spec.line,
                });
                continue;
            }
            graph.index.insert(spec.id.clone(), graph.nodes.len());
            markers.push(spec.marker);
            graph.nodes.push(GraphNode {
                id: spec.id,
                title: spec.title,
                status: NodeStatus::DepBlocked,
                deps: spec.depends_on,
                line: spec.line,
            });
        }

        for position in 0..graph.nodes.len() {
            let status = match markers[position] {
                Marker::Done => NodeStatus::Done,
                Marker::Skip => NodeStatus::Skip,
                Marker::None => {
                    let satisfied = graph.nodes[position].deps.iter().all(|dep| {
                        graph
                            .index
                            .get(dep)
                            .is_some_and(|&target| markers[target].is_closed())
                    });
                    if satisfied {
                        NodeStatus::Ready
                    } else {
                        NodeStatus::DepBlocked
                    }
                }
            };
            graph.nodes[position].status = status;
        }

        graph.check_references();
        graph.detect_cycles();
        graph
    }

    fn check_references(&mut self) {
        for node in &self.nodes {
            for dep in &node.deps {
                if *dep == node.id {
                    self.errors.push(GraphError::SelfDependency {
                        id: node.id.clone(),
                        line: node.line,
                    });
                } else if !self.index.contains_key(dep) {
                    self.errors.push(GraphError::DanglingDependency {
                        id: node.id.clone(),
                        missing: dep.clone(),
                        line: node.line,
                    });
                }
            }
        }
    }

    /// Three-color DFS following dependency edges. Each distinct cycle is
    /// reported once, rotated to start at its first node in document order.
    fn detect_cycles(&mut self) {
        let mut colors = vec![Color::White; self.nodes.len()];
        let mut stack = Vec::new();
        let mut found: Vec<Vec<usize>> = Vec::new();
        for root in 0..self.nodes.len() {
            if colors[root] == Color::White {
                self.visit(root, &mut colors, &mut stack, &mut found);
            }
        }

        let mut seen = HashSet::new();
        for mut cycle in found {
            if let Some(start) = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, node)| **node)
                .map(|(offset, _)| offset)
            {
                cycle.rotate_left(start);
            }
            if seen.insert(cycle.clone()) {
                let path = cycle.iter().map(|&node| self.nodes[node].id.clone()).collect();
                self.errors.push(GraphError::Cycle { path });
            }
        }
    }

    fn visit(
        &self,
        node: usize,
        colors: &mut [Color],
        stack: &mut Vec<usize>,
        found: &mut Vec<Vec<usize>>,
    ) {
        colors[node] = Color::Gray;
        stack.push(node);
        for dep in &self.nodes[node].deps {
            let Some(&target) = self.index.get(dep) else {
                continue;
            };
            if target == node {
                continue;
            }
            match colors[target] {
                Color::White => self.visit(target, colors, stack, found),
                Color::Gray => {
                    if let Some(start) = stack.iter().position(|&entry| entry == target) {
                        found.push(stack[start..].to_vec());
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        colors[node] = Color::Black;
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        self.node(id).map(|node| node.status)
    }

    pub fn errors(&self) -> &[GraphError] {
        &self.errors
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.deps
                    .iter()
                    .filter(|dep| self.index.contains_key(*dep))
                    .map(|dep| Edge {
                        from: dep.clone(),
                        to: node.id.clone(),
                    })
            })
            .collect()
    }

    /// Up to `limit` READY checkpoint ids in document order.
    pub fn ready_ids(&self, limit: usize) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.status == NodeStatus::Ready)
            .take(limit)
            .map(|node| node.id.as_str())
            .collect()
    }

    /// First READY checkpoint after `current` in document order, falling back
    /// to the first READY checkpoint anywhere else in the plan.
    pub fn next_after(&self, current: &str) -> Option<&GraphNode> {
        let start = self.index.get(current).map_or(0, |&position| position + 1);
        let is_candidate =
            |node: &&GraphNode| node.status == NodeStatus::Ready && node.id != current;
        self.nodes[start..]
            .iter()
            .find(is_candidate)
            .or_else(|| self.nodes[..start].iter().find(is_candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, marker: Marker, deps: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            title: format!("checkpoint {id}"),
            marker,
            depends_on: deps.iter().map(ToString::to_string).collect(),
            line: None,
        }
    }

    #[test]
    fn readiness_follows_closed_dependencies() {
        let graph = CheckpointGraph::build_from(vec![
            spec("1.0", Marker::Done, &[]),
            spec("1.1", Marker::None, &["1.0"]),
            spec("1.2", Marker::None, &["1.1"]),
            spec("1.3", Marker::Skip, &[]),
            spec("1.4", Marker::None, &["1.3", "1.0"]),
        ]);
        assert!(graph.errors().is_empty());
        assert_eq!(graph.status("1.1"), Some(NodeStatus::Ready));
        assert_eq!(graph.status("1.2"), Some(NodeStatus::DepBlocked));
        assert_eq!(graph.status("1.4"), Some(NodeStatus::Ready));
        assert_eq!(graph.ready_ids(5), vec!["1.1", "1.4"]);
        assert_eq!(graph.ready_ids(1), vec!["1.1"]);
        assert_eq!(
            graph.edges()[0],
            Edge {
                from: "1.0".to_string(),
                to: "1.1".to_string()
            }
        );
    }

    #[test]
    fn marking_done_never_shrinks_ready_set_of_dependents() {
        let before = CheckpointGraph::build_from(vec![
            spec("2.0", Marker::None, &[]),
            spec("2.1", Marker::None, &["2.0"]),
            spec("2.2", Marker::None, &[]),
        ]);
        let after = CheckpointGraph::build_from(vec![
            spec("2.0", Marker::Done, &[]),
            spec("2.1", Marker::None, &["2.0"]),
            spec("2.2", Marker::None, &[]),
        ]);
        for id in ["2.1", "2.2"] {
            if before.status(id) == Some(NodeStatus::Ready) {
                assert_eq!(after.status(id), Some(NodeStatus::Ready));
            }
        }
        assert_eq!(before.status("2.1"), Some(NodeStatus::DepBlocked));
        assert_eq!(after.status("2.1"), Some(NodeStatus::Ready));
    }

    #[test]
    fn cycles_report_every_node_once() {
        let graph = CheckpointGraph::build_from(vec![
            spec("3.0", Marker::None, &["3.2"]),
            spec("3.1", Marker::None, &["3.0"]),
            spec("3.2", Marker::None, &["3.1"]),
            spec("3.3", Marker::None, &["3.2"]),
        ]);
        let cycles: Vec<&GraphError> = graph
            .errors()
            .iter()
            .filter(|err| matches!(err, GraphError::Cycle { .. }))
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].to_string(),
            "dependency cycle: 3.0 -> 3.2 -> 3.1 -> 3.0"
        );
        assert!(graph.ready_ids(10).is_empty());
    }

    #[test]
    fn acyclic_diamond_reports_no_cycle() {
        let graph = CheckpointGraph::build_from(vec![
            spec("4.0", Marker::None, &[]),
            spec("4.1", Marker::None, &["4.0"]),
            spec("4.2", Marker::None, &["4.0"]),
            spec("4.3", Marker::None, &["4.1", "4.2"]),
        ]);
        assert!(graph.errors().is_empty());
    }

    #[test]
    fn self_and_dangling_dependencies_are_distinct_errors() {
        let graph = CheckpointGraph::build_from(vec![
            spec("5.0", Marker::None, &["5.0"]),
            spec("5.1", Marker::None, &["9.9"]),
            spec("5.1", Marker::None, &[]),
        ]);
        let rendered: Vec<String> = graph.errors().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "checkpoint 5.1 is declared more than once",
                "checkpoint 5.0 depends on itself",
                "checkpoint 5.1 depends on unknown checkpoint 9.9",
            ]
        );
        assert_eq!(graph.status("5.0"), Some(NodeStatus::DepBlocked));
        assert_eq!(graph.status("5.1"), Some(NodeStatus::DepBlocked));
        assert!(graph.edges().iter().all(|edge| edge.from != "9.9"));
    }

    #[test]
    fn next_after_prefers_later_ready_nodes() {
        let graph = CheckpointGraph::build_from(vec![
            spec("6.0", Marker::None, &[]),
            spec("6.1", Marker::Done, &[]),
            spec("6.2", Marker::None, &["6.1"]),
            spec("6.3", Marker::None, &["6.0"]),
        ]);
        assert_eq!(graph.next_after("6.1").map(|n| n.id.as_str()), Some("6.2"));
        assert_eq!(graph.next_after("6.2").map(|n| n.id.as_str()), Some("6.0"));
        assert_eq!(graph.next_after("missing").map(|n| n.id.as_str()), Some("6.0"));
    }
}
