//! Cycle-safe traversal of the tech tree and taxonomy graphs.
//!
//! The tech tree is a petgraph `DiGraph` (via `rustworkx-core`); the taxonomy
//! is a parent-link map. Every walk keeps a visited set so a malformed graph
//! yields a truncated answer instead of looping forever.
//! The write path uses [`TechGraph::would_create_cycle`] to keep the tech
//! tree acyclic in the first place.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use rustworkx_core::petgraph::Direction;
use rustworkx_core::petgraph::algo::has_path_connecting;
use rustworkx_core::petgraph::graph::{DiGraph, NodeIndex};
use rustworkx_core::petgraph::visit::{Bfs, Reversed};

use crate::entities::{ArtTaxonomy, TechTreeNode};
use crate::errors::CoreError;

/// Prerequisite DAG over tech tree nodes.
///
/// Edges run from a prerequisite to the node that requires it. A
/// prerequisite id that was never declared as a node still gets a vertex so
/// edges can point at it, but it is not [`contains`](Self::contains)ed.
#[derive(Debug, Default, Clone)]
pub struct TechGraph {
    graph: DiGraph<String, ()>,
    id_to_index: BTreeMap<String, NodeIndex>,
    declared: BTreeSet<String>,
}

impl TechGraph {
    #[must_use]
    pub fn new(nodes: &[TechTreeNode]) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            graph.insert(&node.id, &node.prerequisites);
        }
        graph
    }

    fn index(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.id_to_index.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.id_to_index.insert(id.to_string(), idx);
        idx
    }

    fn insert(&mut self, id: &str, prerequisites: &[String]) {
        let idx = self.index(id);
        self.declared.insert(id.to_string());
        for prereq in prerequisites {
            let from = self.index(prereq);
            self.graph.update_edge(from, idx, ());
        }
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(idx) = self.id_to_index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(*idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.declared.contains(id)
    }

    /// Direct prerequisites of `id`, in id order.
    #[must_use]
    pub fn prerequisites_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Nodes that list `id` as a direct prerequisite, in id order.
    #[must_use]
    pub fn children_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Every transitive prerequisite of `id`, nearest first. Excludes `id`.
    #[must_use]
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let Some(start) = self.id_to_index.get(id) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, *start);
        let mut out = Vec::new();
        while let Some(n) = bfs.next(reversed) {
            if n != *start {
                out.push(self.graph[n].clone());
            }
        }
        out
    }

    /// Every node that transitively depends on `id`, nearest first. Excludes `id`.
    #[must_use]
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let Some(start) = self.id_to_index.get(id) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, *start);
        let mut out = Vec::new();
        while let Some(n) = bfs.next(&self.graph) {
            if n != *start {
                out.push(self.graph[n].clone());
            }
        }
        out
    }

    /// Declared nodes without prerequisites, in id order.
    #[must_use]
    pub fn roots(&self) -> Vec<String> {
        self.declared
            .iter()
            .filter(|id| self.prerequisites_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// BFS layers from the roots. A node sits one layer below its deepest
    /// prerequisite. Nodes on a cycle, or only reachable through one, are
    /// left out.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut pending: BTreeMap<String, usize> = self
            .declared
            .iter()
            .map(|id| {
                let known = self
                    .prerequisites_of(id)
                    .iter()
                    .filter(|p| self.contains(p))
                    .count();
                (id.clone(), known)
            })
            .collect();

        let mut layers = Vec::new();
        let mut current: Vec<String> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| id.clone())
            .collect();

        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for id in &current {
                for child in self.children_of(id) {
                    if let Some(count) = pending.get_mut(&child) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            next.insert(child);
                        }
                    }
                }
            }
            layers.push(std::mem::take(&mut current));
            current = next.into_iter().collect();
        }
        layers
    }

    /// Whether giving `id` the prerequisites `prerequisites` would close a cycle.
    ///
    /// True when `id` is its own prerequisite or when any new prerequisite
    /// already depends on `id`.
    #[must_use]
    pub fn would_create_cycle(&self, id: &str, prerequisites: &[String]) -> bool {
        if prerequisites.iter().any(|p| p == id) {
            return true;
        }
        let Some(from) = self.id_to_index.get(id) else {
            return false;
        };
        prerequisites.iter().any(|p| {
            self.id_to_index
                .get(p)
                .is_some_and(|to| has_path_connecting(&self.graph, *from, *to, None))
        })
    }

    /// Add or replace a node, rejecting edges that would make the graph cyclic.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cycle`] naming the node being written.
    pub fn try_insert(&mut self, id: &str, prerequisites: &[String]) -> Result<(), CoreError> {
        if self.would_create_cycle(id, prerequisites) {
            return Err(CoreError::Cycle {
                node_id: id.to_string(),
            });
        }
        if let Some(idx) = self.id_to_index.get(id).copied() {
            self.graph
                .retain_edges(|g, e| g.edge_endpoints(e).is_none_or(|(_, to)| to != idx));
        }
        self.insert(id, prerequisites);
        Ok(())
    }
}

/// Breadth-first walk from `start` (exclusive) over parent links.
fn walk<'a, F>(start: &str, next: F) -> Vec<String>
where
    F: Fn(&str) -> &'a [String],
{
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut order = Vec::new();
    let mut queue: VecDeque<String> = next(start).iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        queue.extend(next(&id).iter().filter(|n| !visited.contains(*n)).cloned());
        order.push(id);
    }
    order
}

/// Taxonomy hierarchy, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct TaxonomyTree {
    nodes: BTreeMap<String, ArtTaxonomy>,
    children: BTreeMap<String, Vec<String>>,
}

impl TaxonomyTree {
    #[must_use]
    pub fn new(taxonomies: Vec<ArtTaxonomy>) -> Self {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for t in &taxonomies {
            if let Some(parent) = &t.parent_id {
                children.entry(parent.clone()).or_default().push(t.id.clone());
            }
        }
        let nodes = taxonomies.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { nodes, children }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ArtTaxonomy> {
        self.nodes.get(id)
    }

    /// Top-level nodes (no parent, or a parent that is not in the tree).
    #[must_use]
    pub fn roots(&self) -> Vec<&ArtTaxonomy> {
        self.nodes
            .values()
            .filter(|t| t.parent_id.as_ref().is_none_or(|p| !self.nodes.contains_key(p)))
            .collect()
    }

    #[must_use]
    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// All descendant ids of `id`, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: &str) -> Vec<String> {
        walk(id, |n| self.children_of(n))
    }

    /// `id` plus all its descendants.
    #[must_use]
    pub fn subtree(&self, id: &str) -> Vec<String> {
        let mut ids = vec![id.to_string()];
        ids.extend(self.descendants(id));
        ids
    }

    /// Names from the root down to `id`, e.g. `"Arts > Music > Strings"`.
    #[must_use]
    pub fn full_path_display(&self, id: &str) -> Option<String> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.nodes.get(id);
        while let Some(node) = cursor {
            if !seen.insert(node.id.as_str()) {
                break;
            }
            names.push(node.name.as_str());
            cursor = node.parent_id.as_ref().and_then(|p| self.nodes.get(p));
        }
        if names.is_empty() {
            return None;
        }
        names.reverse();
        Some(names.join(" > "))
    }

    /// Top-level ancestor of `id`.
    #[must_use]
    pub fn root_of(&self, id: &str) -> Option<&ArtTaxonomy> {
        let mut seen = HashSet::new();
        let mut node = self.nodes.get(id)?;
        while let Some(parent) = node.parent_id.as_ref().and_then(|p| self.nodes.get(p)) {
            if !seen.insert(parent.id.as_str()) {
                break;
            }
            node = parent;
        }
        Some(node)
    }
}
