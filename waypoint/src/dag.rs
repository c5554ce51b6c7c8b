//! `waypoint dag`: the checkpoint dependency graph as JSON or ASCII.

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::core::graph::{CheckpointGraph, Edge, GraphError, GraphNode};
use crate::io::paths::WorkspacePaths;
use crate::io::store::load_plan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagReport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Edge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
    /// PLAN.md parse diagnostics.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DagReport {
    pub fn from_graph(graph: &CheckpointGraph) -> Self {
        Self {
            nodes: graph.nodes().to_vec(),
            edges: graph.edges(),
            errors: graph.errors().to_vec(),
            warnings: Vec::new(),
        }
    }

    /// One line per node in document order, then graph errors.
    ///
    /// ```text
    /// 1.0  DONE         Base
    /// 1.1  READY        Middle  <- 1.0
    /// ```
    pub fn render_ascii(&self) -> String {
        let id_width = self.nodes.iter().map(|n| n.id.len()).max().unwrap_or(0);
        let mut out = String::new();
        for node in &self.nodes {
            let mut line = format!(
                "{:id_width$}  {:<11}  {}",
                node.id,
                node.status.as_str(),
                node.title
            );
            if !node.deps.is_empty() {
                line.push_str(&format!("  <- {}", node.deps.join(", ")));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        for error in &self.errors {
            out.push_str(&format!("error: {error}\n"));
        }
        for warning in &self.warnings {
            out.push_str(&format!("warning: {warning}\n"));
        }
        out
    }
}

pub fn dag_report(paths: &WorkspacePaths) -> Result<DagReport> {
    let plan = load_plan(paths)?;
    let mut report = DagReport::from_graph(&CheckpointGraph::build(&plan.model));
    for diagnostic in &plan.diagnostics {
        warn!(%diagnostic, "document diagnostic");
        report.warnings.push(diagnostic.to_string());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::NodeStatus;
    use crate::test_support::TestWorkspace;

    const PLAN: &str = "\
## Stage 2 — Split

### 2.0 — First
depends_on: []

### 2.1 — Second
depends_on: [2.0]

### 2.2 — Side
depends_on: [9.9]
";

    #[test]
    fn reports_dep_blocked_and_dangling() {
        let ws = TestWorkspace::new();
        ws.write_plan(PLAN);
        let report = dag_report(&ws.paths()).expect("dag");

        let statuses: Vec<(&str, NodeStatus)> = report
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.status))
            .collect();
        assert_eq!(statuses[0], ("2.0", NodeStatus::Ready));
        assert_eq!(statuses[1], ("2.1", NodeStatus::DepBlocked));
        assert_eq!(
            report.edges,
            vec![Edge {
                from: "2.0".to_string(),
                to: "2.1".to_string()
            }]
        );
        assert_eq!(report.errors.len(), 1);

        let ascii = report.render_ascii();
        assert!(ascii.contains("2.1  DEP_BLOCKED  Second  <- 2.0"), "{ascii}");
        assert!(ascii.contains("error: checkpoint 2.2 depends on unknown checkpoint 9.9"), "{ascii}");
    }

    #[test]
    fn plan_diagnostics_are_reported() {
        let ws = TestWorkspace::new();
        ws.write_plan(&format!("{PLAN}\n### 2.x — Broken\n"));
        let report = dag_report(&ws.paths()).expect("dag");
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
        assert!(report.warnings[0].contains("PLAN.md"), "{:?}", report.warnings);
        assert!(report.render_ascii().contains("warning: "));

        ws.write_plan(PLAN);
        let clean = dag_report(&ws.paths()).expect("dag");
        assert!(clean.warnings.is_empty());
        let json = serde_json::to_value(&clean).expect("json");
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn json_shape_has_nodes_and_edges() {
        let ws = TestWorkspace::new();
        ws.write_plan(PLAN);
        let report = dag_report(&ws.paths()).expect("dag");
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["nodes"][1]["status"], "DEP_BLOCKED");
        assert_eq!(json["nodes"][1]["deps"][0], "2.0");
        assert_eq!(json["edges"][0]["from"], "2.0");
        assert_eq!(json["errors"][0]["kind"], "dangling_dependency");
    }
}
