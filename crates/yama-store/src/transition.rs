//! Immutable transition store and the derived transition DAG, with
//! BFS/DFS path finding grounded in the same traversal idioms used for
//! dependency-cycle detection elsewhere in this stack.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use yama_core::Step;

use crate::error::StoreError;
use crate::fslock::DirLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub hash: String,
    pub from_hash: String,
    pub to_hash: String,
    pub steps: Vec<Step>,
    pub metadata: TransitionMetadata,
}

impl Transition {
    pub fn new(
        from_hash: String,
        to_hash: String,
        steps: Vec<Step>,
        metadata: TransitionMetadata,
    ) -> Self {
        let hash = compute_transition_hash(&from_hash, &to_hash, &steps);
        Transition {
            hash,
            from_hash,
            to_hash,
            steps,
            metadata,
        }
    }
}

fn compute_transition_hash(from_hash: &str, to_hash: &str, steps: &[Step]) -> String {
    #[derive(Serialize)]
    struct Hashable<'a> {
        from_hash: &'a str,
        to_hash: &'a str,
        steps: &'a [Step],
    }
    let encoded = serde_json::to_vec(&Hashable {
        from_hash,
        to_hash,
        steps,
    })
    .expect("transition is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub struct TransitionStore {
    root: PathBuf,
}

impl TransitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TransitionStore { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("transitions")
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.dir().join(format!("{hash}.json"))
    }

    fn graph_cache_path(&self) -> PathBuf {
        self.root.join("graph.json")
    }

    pub fn save(&self, transition: &Transition) -> Result<(), StoreError> {
        let _lock = DirLock::acquire(&self.root)?;
        fs::create_dir_all(self.dir())?;
        let path = self.blob_path(&transition.hash);
        if !path.exists() {
            let json = serde_json::to_vec_pretty(transition)?;
            fs::write(&path, json)?;
            debug!(hash = %transition.hash, "wrote transition blob");
        }
        // The cache is a hint; invalidate it rather than patch it in place.
        let _ = fs::remove_file(self.graph_cache_path());
        Ok(())
    }

    pub fn load(&self, hash: &str) -> Result<Transition, StoreError> {
        let path = self.blob_path(hash);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::not_found("transition", hash)
            } else {
                StoreError::Io(e)
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    fn all_transitions(&self) -> Result<Vec<Transition>, StoreError> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut transitions = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path)?;
            transitions.push(serde_json::from_slice(&bytes)?);
        }
        Ok(transitions)
    }

    /// Loads the graph cache, rebuilding it from the transitions directory
    /// if absent or corrupt. The cache is derived state: it is always
    /// reconstructible and never authoritative over the transitions on disk.
    pub fn graph(&self) -> Result<Graph, StoreError> {
        match fs::read(self.graph_cache_path()) {
            Ok(bytes) => match serde_json::from_slice::<GraphCache>(&bytes) {
                Ok(cache) => Ok(Graph { cache }),
                Err(err) => {
                    warn!(?err, "graph cache is corrupt, rebuilding");
                    self.rebuild_graph()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.rebuild_graph(),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn rebuild_graph(&self) -> Result<Graph, StoreError> {
        let transitions = self.all_transitions()?;
        let mut nodes: HashSet<String> = HashSet::new();
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut edge_transitions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut step_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut transition_hashes = Vec::with_capacity(transitions.len());

        for transition in &transitions {
            nodes.insert(transition.from_hash.clone());
            nodes.insert(transition.to_hash.clone());
            edges
                .entry(transition.from_hash.clone())
                .or_default()
                .push(transition.to_hash.clone());
            edge_transitions
                .entry(pair_key(&transition.from_hash, &transition.to_hash))
                .or_default()
                .push(transition.hash.clone());
            step_counts.insert(transition.hash.clone(), transition.steps.len());
            transition_hashes.push(transition.hash.clone());
        }

        let mut nodes: Vec<String> = nodes.into_iter().collect();
        nodes.sort();

        let cache = GraphCache {
            nodes,
            edges,
            transition_hashes,
            edge_transitions,
            step_counts,
        };
        let json = serde_json::to_vec_pretty(&cache)?;
        fs::write(self.graph_cache_path(), json)?;
        Ok(Graph { cache })
    }
}

fn pair_key(from: &str, to: &str) -> String {
    format!("{from}->{to}")
}

/// On-disk graph cache shape. `edge_transitions` and `step_counts` are
/// derived-cache additions beyond the minimal `{nodes, edges,
/// transitionHashes}` shape, kept for cheap path-to-transition resolution;
/// like the rest of the cache, they are fully reconstructible from the
/// transitions directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphCache {
    pub nodes: Vec<String>,
    pub edges: BTreeMap<String, Vec<String>>,
    pub transition_hashes: Vec<String>,
    pub edge_transitions: BTreeMap<String, Vec<String>>,
    pub step_counts: BTreeMap<String, usize>,
}

pub struct Graph {
    cache: GraphCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub node_sequence: Vec<String>,
    pub transition_sequence: Vec<String>,
    pub total_step_count: usize,
}

impl Graph {
    fn transition_for_edge(&self, from: &str, to: &str) -> String {
        self.cache
            .edge_transitions
            .get(&pair_key(from, to))
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    }

    fn step_count(&self, transition_hash: &str) -> usize {
        self.cache
            .step_counts
            .get(transition_hash)
            .copied()
            .unwrap_or(0)
    }

    /// BFS over forward edges, shortest-by-edge-count. Ties are broken by
    /// whichever neighbor was discovered first, i.e. insertion order of
    /// `edges[node]`, which in a freshly rebuilt cache is the order
    /// transitions were found on disk (sorted by transition hash).
    pub fn find_path(&self, from: &str, to: &str) -> Option<PathResult> {
        if from == to {
            return Some(PathResult {
                node_sequence: vec![from.to_string()],
                transition_sequence: Vec::new(),
                total_step_count: 0,
            });
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut predecessor: HashMap<String, String> = HashMap::new();

        visited.insert(from.to_string());
        queue.push_back(from.to_string());

        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            if let Some(neighbors) = self.cache.edges.get(&current) {
                for next in neighbors {
                    if visited.contains(next) {
                        continue;
                    }
                    visited.insert(next.clone());
                    predecessor.insert(next.clone(), current.clone());
                    queue.push_back(next.clone());
                }
            }
        }

        if !visited.contains(to) {
            return None;
        }

        let mut nodes = vec![to.to_string()];
        let mut cursor = to.to_string();
        while cursor != from {
            let prev = predecessor.get(&cursor)?.clone();
            nodes.push(prev.clone());
            cursor = prev;
        }
        nodes.reverse();

        let mut transitions = Vec::with_capacity(nodes.len().saturating_sub(1));
        for pair in nodes.windows(2) {
            transitions.push(self.transition_for_edge(&pair[0], &pair[1]));
        }
        let total_step_count = transitions.iter().map(|h| self.step_count(h)).sum();

        Some(PathResult {
            node_sequence: nodes,
            transition_sequence: transitions,
            total_step_count,
        })
    }

    /// BFS over a reversed adjacency map; same result shape as `find_path`
    /// but built by walking backwards from `to`.
    pub fn find_reverse_path(&self, from: &str, to: &str) -> Option<PathResult> {
        let reversed = self.reversed_edges();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut predecessor: HashMap<String, String> = HashMap::new();

        visited.insert(to.to_string());
        queue.push_back(to.to_string());

        while let Some(current) = queue.pop_front() {
            if current == from {
                break;
            }
            if let Some(neighbors) = reversed.get(&current) {
                for next in neighbors {
                    if visited.contains(next) {
                        continue;
                    }
                    visited.insert(next.clone());
                    predecessor.insert(next.clone(), current.clone());
                    queue.push_back(next.clone());
                }
            }
        }

        if !visited.contains(from) {
            return None;
        }

        let mut nodes = vec![from.to_string()];
        let mut cursor = from.to_string();
        while cursor != to {
            let prev = predecessor.get(&cursor)?.clone();
            nodes.push(prev.clone());
            cursor = prev;
        }

        let mut transitions = Vec::with_capacity(nodes.len().saturating_sub(1));
        for pair in nodes.windows(2) {
            transitions.push(self.transition_for_edge(&pair[0], &pair[1]));
        }
        let total_step_count = transitions.iter().map(|h| self.step_count(h)).sum();

        Some(PathResult {
            node_sequence: nodes,
            transition_sequence: transitions,
            total_step_count,
        })
    }

    /// DFS with a visited set scoped per branch; the same node may appear
    /// on multiple returned paths via different branches.
    pub fn find_all_paths(&self, from: &str, to: &str) -> Vec<PathResult> {
        let mut results = Vec::new();
        let mut stack: Vec<String> = vec![from.to_string()];
        let mut visited: HashSet<String> = HashSet::new();
        self.dfs_all_paths(from, to, &mut stack, &mut visited, &mut results);
        results
    }

    fn dfs_all_paths(
        &self,
        current: &str,
        to: &str,
        stack: &mut Vec<String>,
        visited: &mut HashSet<String>,
        results: &mut Vec<PathResult>,
    ) {
        if current == to {
            let mut transitions = Vec::with_capacity(stack.len().saturating_sub(1));
            for pair in stack.windows(2) {
                transitions.push(self.transition_for_edge(&pair[0], &pair[1]));
            }
            let total_step_count = transitions.iter().map(|h| self.step_count(h)).sum();
            results.push(PathResult {
                node_sequence: stack.clone(),
                transition_sequence: transitions,
                total_step_count,
            });
            return;
        }

        visited.insert(current.to_string());
        if let Some(neighbors) = self.cache.edges.get(current) {
            for next in neighbors {
                if visited.contains(next) {
                    continue;
                }
                stack.push(next.clone());
                self.dfs_all_paths(next, to, stack, visited, results);
                stack.pop();
            }
        }
        visited.remove(current);
    }

    /// Forward BFS over all edges; every node reachable from `from`,
    /// `from` itself excluded.
    pub fn reachable(&self, from: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        visited.insert(from.to_string());
        queue.push_back(from.to_string());
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.cache.edges.get(&current) {
                for next in neighbors {
                    if visited.insert(next.clone()) {
                        out.push(next.clone());
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        out
    }

    /// Reverse BFS over all edges; every node that can reach `to`, `to`
    /// itself excluded.
    pub fn predecessors(&self, to: &str) -> Vec<String> {
        let reversed = self.reversed_edges();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        visited.insert(to.to_string());
        queue.push_back(to.to_string());
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = reversed.get(&current) {
                for next in neighbors {
                    if visited.insert(next.clone()) {
                        out.push(next.clone());
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        out
    }

    fn reversed_edges(&self) -> HashMap<String, Vec<String>> {
        let mut reversed: HashMap<String, Vec<String>> = HashMap::new();
        for (from, tos) in &self.cache.edges {
            for to in tos {
                reversed.entry(to.clone()).or_default().push(from.clone());
            }
        }
        reversed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TransitionMetadata {
        TransitionMetadata {
            description: None,
            created_at: Utc::now(),
        }
    }

    fn chain(store: &TransitionStore, hashes: &[&str]) {
        for pair in hashes.windows(2) {
            let transition =
                Transition::new(pair[0].to_string(), pair[1].to_string(), vec![], metadata());
            store.save(&transition).unwrap();
        }
    }

    #[test]
    fn find_path_returns_shortest_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(dir.path());
        chain(&store, &["a", "b", "c"]);
        let transition = Transition::new("a".into(), "c".into(), vec![], metadata());
        store.save(&transition).unwrap();

        let graph = store.graph().unwrap();
        let result = graph.find_path("a", "c").unwrap();
        assert_eq!(result.node_sequence, vec!["a", "c"]);
    }

    #[test]
    fn find_path_returns_none_when_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(dir.path());
        chain(&store, &["a", "b"]);

        let graph = store.graph().unwrap();
        assert!(graph.find_path("a", "z").is_none());
    }

    #[test]
    fn find_all_paths_finds_both_branches() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(dir.path());
        chain(&store, &["a", "b", "d"]);
        chain(&store, &["a", "c", "d"]);

        let graph = store.graph().unwrap();
        let paths = graph.find_all_paths("a", "d");
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn reachable_and_predecessors_are_symmetric() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(dir.path());
        chain(&store, &["a", "b", "c"]);

        let graph = store.graph().unwrap();
        assert_eq!(graph.reachable("a"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(graph.predecessors("c"), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn graph_cache_is_rebuilt_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(dir.path());
        chain(&store, &["a", "b"]);
        let _ = store.graph().unwrap();
        fs::remove_file(store.graph_cache_path()).unwrap();

        let graph = store.graph().unwrap();
        assert!(graph.find_path("a", "b").is_some());
    }
}
