use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use super::analysis::symbol_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Imports,
    Depends,
    References,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Method,
    Function,
    View,
    Component,
    Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// File that declares this node (the file itself for file nodes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            file: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: symbol_key::file(&path),
            kind: NodeKind::File,
            file: Some(path),
            metadata: BTreeMap::new(),
        }
    }

    pub fn declared_in(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub to: String,
    pub edge_type: EdgeType,
}

/// Directed, typed dependency graph. Cycles are allowed; every walk keeps a
/// visited set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, Vec<GraphEdge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, keeping existing metadata if the id is already known.
    pub fn add_node(&mut self, node: GraphNode) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                for (k, v) in node.metadata {
                    existing.metadata.entry(k).or_insert(v);
                }
                if existing.file.is_none() {
                    existing.file = node.file;
                }
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    /// Adds an edge between known nodes. Self-loops and duplicates are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> bool {
        if from == to || !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return false;
        }
        let edges = self.edges.entry(from.to_string()).or_default();
        let edge = GraphEdge {
            to: to.to_string(),
            edge_type,
        };
        if edges.contains(&edge) {
            return false;
        }
        edges.push(edge);
        true
    }

    /// File-to-file dependency: registers both file nodes, then the edge.
    pub fn add_dependency(&mut self, from: &std::path::Path, to: &std::path::Path, edge_type: EdgeType) -> bool {
        let from_node = GraphNode::file(from);
        let to_node = GraphNode::file(to);
        let (from_id, to_id) = (from_node.id.clone(), to_node.id.clone());
        self.add_node(from_node);
        self.add_node(to_node);
        self.add_edge(&from_id, &to_id, edge_type)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn neighbors(&self, id: &str) -> &[GraphEdge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_edge(&self, from: &str, to: &str, edge_type: EdgeType) -> bool {
        self.neighbors(from)
            .iter()
            .any(|e| e.to == to && e.edge_type == edge_type)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Inbound edge sources per target node.
    pub fn inbound(&self) -> HashMap<&str, Vec<(&str, EdgeType)>> {
        let mut inbound: HashMap<&str, Vec<(&str, EdgeType)>> = HashMap::new();
        for (from, edges) in &self.edges {
            for edge in edges {
                inbound
                    .entry(edge.to.as_str())
                    .or_default()
                    .push((from.as_str(), edge.edge_type));
            }
        }
        inbound
    }

    /// Inbound edges of a file node plus those of every symbol it declares.
    pub fn inbound_to_file(&self, path: &std::path::Path) -> Vec<(String, EdgeType)> {
        let file_id = symbol_key::file(path);
        let targets: HashSet<&str> = self
            .nodes
            .values()
            .filter(|n| n.id == file_id || n.file.as_deref() == Some(path))
            .map(|n| n.id.as_str())
            .collect();

        let mut sources = Vec::new();
        for (from, edges) in &self.edges {
            let from_same_file = self
                .nodes
                .get(from)
                .map(|n| n.file.as_deref() == Some(path))
                .unwrap_or(false);
            if from_same_file {
                continue;
            }
            for edge in edges {
                if targets.contains(edge.to.as_str()) {
                    sources.push((from.clone(), edge.edge_type));
                }
            }
        }
        sources
    }

    /// Every node reachable from `starts`, starts included.
    pub fn reachable_from<'a>(&'a self, starts: impl IntoIterator<Item = &'a str>) -> HashSet<&'a str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = starts
            .into_iter()
            .filter_map(|s| self.nodes.get_key_value(s).map(|(k, _)| k.as_str()))
            .collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for edge in self.neighbors(id) {
                if !visited.contains(edge.to.as_str()) {
                    stack.push(edge.to.as_str());
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_add_dependency_creates_nodes() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_dependency(Path::new("a.php"), Path::new("b.php"), EdgeType::Imports));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge("file:a.php", "file:b.php", EdgeType::Imports));
    }

    #[test]
    fn test_duplicate_and_self_edges_ignored() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(Path::new("a.php"), Path::new("b.php"), EdgeType::Imports);
        assert!(!graph.add_dependency(Path::new("a.php"), Path::new("b.php"), EdgeType::Imports));
        assert!(!graph.add_dependency(Path::new("a.php"), Path::new("a.php"), EdgeType::Imports));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_edge_requires_known_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_node(GraphNode::file("a.php"));
        assert!(!graph.add_edge("file:a.php", "file:missing.php", EdgeType::References));
    }

    #[test]
    fn test_reachability_terminates_on_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(Path::new("a"), Path::new("b"), EdgeType::References);
        graph.add_dependency(Path::new("b"), Path::new("c"), EdgeType::References);
        graph.add_dependency(Path::new("c"), Path::new("a"), EdgeType::References);
        graph.add_node(GraphNode::file("d"));

        let reachable = graph.reachable_from(["file:a"]);
        assert_eq!(reachable.len(), 3);
        assert!(!reachable.contains("file:d"));
    }

    #[test]
    fn test_inbound_to_file_counts_symbol_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node(GraphNode::file("routes/web.php"));
        graph.add_node(GraphNode::file("app/C.php"));
        graph.add_node(
            GraphNode::new("method:App\\C::index", NodeKind::Method).declared_in("app/C.php"),
        );
        graph.add_edge("file:routes/web.php", "method:App\\C::index", EdgeType::References);

        let inbound = graph.inbound_to_file(Path::new("app/C.php"));
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].1, EdgeType::References);
    }
}
