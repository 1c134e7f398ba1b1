// Directed link graph observed during one run

use crate::canon::CanonicalUrl;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Pages seen in a run and the links between them. Owned by the crawl coordinator.
#[derive(Debug, Default)]
pub struct LinkGraph {
    graph: DiGraph<CanonicalUrl, ()>,
    index: HashMap<CanonicalUrl, NodeIndex>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, url: &CanonicalUrl) -> NodeIndex {
        if let Some(idx) = self.index.get(url) {
            return *idx;
        }
        let idx = self.graph.add_node(url.clone());
        self.index.insert(url.clone(), idx);
        idx
    }

    /// Record `source -> target`. Repeated links collapse into one edge.
    pub fn add_link(&mut self, source: &CanonicalUrl, target: &CanonicalUrl) {
        let a = self.node(source);
        let b = self.node(target);
        self.graph.update_edge(a, b, ());
    }

    pub fn has_link(&self, source: &CanonicalUrl, target: &CanonicalUrl) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
            _ => false,
        }
    }

    /// Pages that link to `url` and that `url` links back to.
    pub fn mutual_neighbors(&self, url: &CanonicalUrl) -> Vec<&CanonicalUrl> {
        let Some(idx) = self.index.get(url) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*idx, Direction::Incoming)
            .filter(|n| self.graph.contains_edge(*idx, *n))
            .map(|n| &self.graph[n])
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize;

    #[test]
    fn test_mutual_links() {
        let a = canonicalize("https://a.example").unwrap();
        let b = canonicalize("https://b.example").unwrap();
        let c = canonicalize("https://c.example").unwrap();

        let mut graph = LinkGraph::new();
        graph.add_link(&a, &b);
        graph.add_link(&b, &a);
        graph.add_link(&a, &c);
        graph.add_link(&a, &b);

        assert!(graph.has_link(&b, &a));
        assert!(!graph.has_link(&c, &a));
        assert_eq!(graph.mutual_neighbors(&a), vec![&b]);
        assert_eq!(graph.mutual_neighbors(&b), vec![&a]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
    }
}
