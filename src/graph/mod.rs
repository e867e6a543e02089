//! Reference Graph
//!
//! Document-level dependency graph built from `$ref` edges, using petgraph.
//! Used to find the dependents of a changed family and to report groups of
//! documents that reference each other in a cycle.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::resolver::{EdgeResolution, ReferenceResolver};
use crate::store::Corpus;

/// A document in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Document identity (`$id` without fragment, or path)
    pub identity: String,
    /// Repository path
    pub path: String,
    pub family: String,
}

/// Directed graph of document-to-document references
pub struct ReferenceGraph {
    graph: DiGraph<GraphNode, String>,
    node_indices: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    /// Build the graph for every document of `corpus`
    pub fn build(corpus: &Corpus, resolver: &ReferenceResolver<'_>) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::with_capacity(corpus.len());

        for doc in corpus.documents() {
            let idx = graph.add_node(GraphNode {
                identity: doc.identity(),
                path: doc.path_str(),
                family: doc.family.clone(),
            });
            // Duplicate ids keep their first node; the linter reports them
            node_indices.entry(doc.identity()).or_insert(idx);
        }

        for doc in corpus.documents() {
            let Some(&source) = node_indices.get(&doc.identity()) else {
                continue;
            };
            let mut seen = HashSet::new();
            for edge in resolver.outgoing_edges(doc) {
                let EdgeResolution::Resolved { document, .. } = &edge.resolution else {
                    continue;
                };
                let Some(&target) = node_indices.get(document) else {
                    continue;
                };
                if target != source && seen.insert(target) {
                    graph.add_edge(source, target, edge.location.clone());
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "reference graph built"
        );

        Self { graph, node_indices }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Documents `identity` references directly
    pub fn refs_out(&self, identity: &str) -> Vec<&GraphNode> {
        self.neighbors(identity, Direction::Outgoing)
    }

    /// Documents that reference `identity` directly
    pub fn refs_in(&self, identity: &str) -> Vec<&GraphNode> {
        self.neighbors(identity, Direction::Incoming)
    }

    fn neighbors(&self, identity: &str, direction: Direction) -> Vec<&GraphNode> {
        let Some(&idx) = self.node_indices.get(identity) else {
            return Vec::new();
        };
        let mut nodes: Vec<&GraphNode> = self
            .graph
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.graph.node_weight(other)
            })
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// Every document that reaches `identity` through one or more references
    pub fn dependents(&self, identity: &str) -> Vec<&GraphNode> {
        let Some(&start) = self.node_indices.get(identity) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            if idx != start {
                if let Some(node) = self.graph.node_weight(idx) {
                    result.push(node);
                }
            }
            stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
        }

        result.sort_by(|a, b| a.path.cmp(&b.path));
        result
    }

    /// Families that contain a dependent of any document in `families`,
    /// together with `families` themselves
    pub fn expand_families(&self, families: &BTreeSet<String>) -> BTreeSet<String> {
        let mut expanded = families.clone();
        for node in self.graph.node_weights().filter(|n| families.contains(&n.family)) {
            for dependent in self.dependents(&node.identity) {
                expanded.insert(dependent.family.clone());
            }
        }
        expanded
    }

    /// Groups of documents that reference each other in a cycle, each group
    /// sorted by path, groups sorted by their first member
    pub fn cycle_groups(&self) -> Vec<Vec<&GraphNode>> {
        let mut groups: Vec<Vec<&GraphNode>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<&GraphNode> = scc.iter().filter_map(|&idx| self.graph.node_weight(idx)).collect();
                members.sort_by(|a, b| a.path.cmp(&b.path));
                members
            })
            .collect();
        groups.sort_by(|a, b| a[0].path.cmp(&b[0].path));
        groups
    }
}
