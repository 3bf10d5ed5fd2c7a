//! Execution graph reconstruction and reverse leveling
//!
//! [`build_graph`] replays the release dependency graph of a completed forward
//! run from its execution node records. [`Graph::reverse`] then peels the
//! graph from its sinks inward, producing teardown buckets.
//!
//! Edges point from a release to the releases that ran because it completed:
//! an edge `A -> B` means B depended on A. Only edges recorded by the engine
//! are used; nothing is re-derived from the ApplicationGroup.

use super::HELM_RELEASE_ARG;
use super::render::decode_release;
use crate::error::{Error, Result};
use crate::models::{ExecutionNode, HelmRelease};
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A teardown level; members have no ordering among themselves
pub type Bucket = Vec<HelmRelease>;

/// Release dependency graph of one executed workflow
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    graph: DiGraph<HelmRelease, ()>,
    index: HashMap<String, NodeIndex>,
}

/// Rebuild the release graph actually traversed by workflow `workflow_name`
///
/// The traversal starts at the node whose id equals the workflow name. Every
/// `Pod` node reached must carry a decodable release payload; structural nodes
/// (DAG, Retry, Skipped, ...) are walked through. Releases recorded more than
/// once (retries) are merged by `namespace/name`.
pub fn build_graph(workflow_name: &str, nodes: &BTreeMap<String, ExecutionNode>) -> Result<Graph> {
    let root = nodes.get(workflow_name).ok_or_else(|| {
        Error::Graph(format!(
            "root node {} not found among {} execution node(s)",
            workflow_name,
            nodes.len()
        ))
    })?;

    let reachable = reachable_nodes(root, nodes)?;

    let mut graph = Graph {
        name: workflow_name.to_string(),
        graph: DiGraph::new(),
        index: HashMap::new(),
    };

    // Node id -> release vertex
    let mut releases: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &reachable {
        if !node.is_pod() {
            continue;
        }
        let payload = node.input(HELM_RELEASE_ARG).ok_or_else(|| {
            Error::Graph(format!(
                "execution node {} ({}) has no {} input",
                node.id,
                display_name(node),
                HELM_RELEASE_ARG
            ))
        })?;
        let hr = decode_release(payload).map_err(|e| {
            Error::Graph(format!(
                "execution node {} ({}) carries an unreadable release: {}",
                node.id,
                display_name(node),
                e
            ))
        })?;
        releases.insert(node.id.as_str(), graph.insert(hr));
    }

    for node in &reachable {
        if let Some(&from) = releases.get(node.id.as_str()) {
            for to in nearest_releases(node, nodes, &releases) {
                if to != from {
                    graph.graph.update_edge(from, to, ());
                }
            }
        }
    }

    tracing::debug!(
        "Reconstructed graph of {} with {} release(s) and {} edge(s)",
        workflow_name,
        graph.graph.node_count(),
        graph.graph.edge_count()
    );
    Ok(graph)
}

/// Nodes reachable from `root` through `children`, in breadth-first order
fn reachable_nodes<'a>(
    root: &'a ExecutionNode,
    nodes: &'a BTreeMap<String, ExecutionNode>,
) -> Result<Vec<&'a ExecutionNode>> {
    let mut seen: HashSet<&str> = HashSet::from([root.id.as_str()]);
    let mut queue = VecDeque::from([root]);
    let mut out = Vec::new();

    while let Some(node) = queue.pop_front() {
        out.push(node);
        for child_id in &node.children {
            let child = nodes.get(child_id).ok_or_else(|| {
                Error::Graph(format!(
                    "execution node {} references unknown child {}",
                    node.id, child_id
                ))
            })?;
            if seen.insert(child.id.as_str()) {
                queue.push_back(child);
            }
        }
    }
    Ok(out)
}

/// Releases that directly follow `node`, looking through structural nodes
fn nearest_releases(
    node: &ExecutionNode,
    nodes: &BTreeMap<String, ExecutionNode>,
    releases: &HashMap<&str, NodeIndex>,
) -> Vec<NodeIndex> {
    let mut found = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = node.children.iter().map(String::as_str).collect();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(&idx) = releases.get(id) {
            found.push(idx);
        } else if let Some(child) = nodes.get(id) {
            stack.extend(child.children.iter().map(String::as_str));
        }
    }
    found
}

fn display_name(node: &ExecutionNode) -> &str {
    if node.display_name.is_empty() {
        &node.name
    } else {
        &node.display_name
    }
}

impl Graph {
    /// Name of the workflow the graph was rebuilt from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Release keyed by `namespace/name`
    pub fn release(&self, key: &str) -> Option<&HelmRelease> {
        self.index.get(key).map(|&idx| &self.graph[idx])
    }

    /// Keys of the releases that depended on `key`, sorted
    pub fn successors(&self, key: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = self
            .graph
            .neighbors_directed(idx, Outgoing)
            .map(|n| self.graph[n].key())
            .collect();
        keys.sort();
        keys
    }

    fn insert(&mut self, hr: HelmRelease) -> NodeIndex {
        let key = hr.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(hr);
        self.index.insert(key, idx);
        idx
    }

    /// Teardown buckets, first to last
    ///
    /// Bucket 0 holds the sinks (releases nothing depended on). Each later
    /// bucket holds the releases whose dependents all sit in earlier buckets.
    /// Members of a bucket are sorted by `namespace/name`. A cycle is an
    /// error rather than an endless loop.
    pub fn reverse(&self) -> Result<Vec<Bucket>> {
        let mut out_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.neighbors_directed(idx, Outgoing).count()))
            .collect();
        let mut buckets = Vec::new();

        while !out_degree.is_empty() {
            let mut sinks: Vec<NodeIndex> = out_degree
                .iter()
                .filter(|&(_, &degree)| degree == 0)
                .map(|(&idx, _)| idx)
                .collect();

            if sinks.is_empty() {
                let mut stuck: Vec<String> = out_degree
                    .keys()
                    .map(|&idx| self.graph[idx].key())
                    .collect();
                stuck.sort();
                return Err(Error::Graph(format!(
                    "cycle detected among releases: {}",
                    stuck.join(", ")
                )));
            }

            sinks.sort_by_key(|&idx| self.graph[idx].key());
            for &idx in &sinks {
                out_degree.remove(&idx);
            }
            for &idx in &sinks {
                for pred in self.graph.neighbors_directed(idx, Incoming) {
                    if let Some(degree) = out_degree.get_mut(&pred) {
                        *degree -= 1;
                    }
                }
            }

            buckets.push(sinks.into_iter().map(|idx| self.graph[idx].clone()).collect());
        }

        Ok(buckets)
    }
}
