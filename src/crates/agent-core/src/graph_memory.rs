//! Graph memory layer (component C3.1): nodes and typed edges scoped to an
//! agent, supporting alias lookup and neighbor traversal.
//!
//! Grounded on the same `Arc<RwLock<HashMap<...>>>` shape as
//! [`crate::memory::InMemoryMemoryStore`] / `langgraph-core::store::InMemoryStore`,
//! with an adjacency list kept alongside the node map so [`InMemoryGraphMemory::neighbors`]
//! stays O(degree) per hop instead of scanning every edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::id::Clock;

#[derive(Debug, thiserror::Error)]
pub enum GraphMemoryError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, GraphMemoryError>;

/// Default `node_type` when a caller doesn't supply one via [`NodeOptions`].
pub const DEFAULT_NODE_TYPE: &str = "entity";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub agent_id: String,
    /// §3 `type` — the node's semantic category (e.g. "person", "concept").
    pub node_type: String,
    pub label: String,
    pub aliases: Vec<String>,
    pub properties: serde_json::Value,
    /// Optional embedding vector for semantic (similarity) queries (§3, §1
    /// "semantic ... queries"). `None` until an embedder populates it.
    pub embedding: Option<Vec<f32>>,
    /// Confidence in this node's extraction/merge, in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Incremented on every [`InMemoryGraphMemory::neighbors`] or
    /// [`InMemoryGraphMemory::find_by_alias`] call that resolves this node.
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Stable id shared by both directions of a bidirectional edge, so
    /// `neighbors` exposes the identical id from either endpoint (§3
    /// invariant).
    pub id: String,
    pub from: String,
    pub to: String,
    pub relation: String,
    pub properties: serde_json::Value,
    /// Relative importance of this edge; defaults to `1.0`.
    pub weight: f32,
    /// If `true`, a mirror edge (`to -> from`, same `id`/`relation`) is
    /// maintained alongside this one so traversal works from either
    /// endpoint (§3 invariant).
    pub bidirectional: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Optional attributes for [`InMemoryGraphMemory::upsert_node`], mirroring
/// the `with_*`-override style [`crate::run_engine::agent::Agent`] uses,
/// collapsed into one options struct since these three are always supplied
/// (or defaulted) together rather than chained individually.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub node_type: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub confidence: Option<f32>,
}

/// Optional attributes for [`InMemoryGraphMemory::upsert_edge`].
#[derive(Debug, Clone, Default)]
pub struct EdgeOptions {
    pub weight: Option<f32>,
    pub bidirectional: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
    Both,
}

struct GraphState {
    nodes: HashMap<String, GraphNode>,
    out_edges: HashMap<String, Vec<GraphEdge>>,
    in_edges: HashMap<String, Vec<GraphEdge>>,
    alias_index: HashMap<String, String>,
}

impl GraphState {
    fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            out_edges: HashMap::new(),
            in_edges: HashMap::new(),
            alias_index: HashMap::new(),
        }
    }

    /// Edges incident to `node_id` in the requested direction. Since
    /// bidirectional edges are mirrored into both adjacency maps at upsert
    /// time (see [`InMemoryGraphMemory::upsert_edge`]), this needs no
    /// special-casing for `bidirectional` itself.
    fn direct_edges(&self, node_id: &str, direction: EdgeDirection) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        if matches!(direction, EdgeDirection::Outgoing | EdgeDirection::Both) {
            if let Some(out) = self.out_edges.get(node_id) {
                edges.extend(out.iter().cloned());
            }
        }
        if matches!(direction, EdgeDirection::Incoming | EdgeDirection::Both) {
            if let Some(inn) = self.in_edges.get(node_id) {
                edges.extend(inn.iter().cloned());
            }
        }
        edges
    }

    fn existing_edge_id(&self, from: &str, to: &str, relation: &str) -> Option<String> {
        self.out_edges
            .get(from)
            .and_then(|edges| edges.iter().find(|e| e.to == to && e.relation == relation))
            .map(|e| e.id.clone())
    }

    fn insert_directed(&mut self, edge: GraphEdge) {
        let out = self.out_edges.entry(edge.from.clone()).or_default();
        if let Some(existing) = out.iter_mut().find(|e| e.to == edge.to && e.relation == edge.relation) {
            *existing = edge.clone();
        } else {
            out.push(edge.clone());
        }
        let inn = self.in_edges.entry(edge.to.clone()).or_default();
        if let Some(existing) = inn.iter_mut().find(|e| e.from == edge.from && e.relation == edge.relation) {
            *existing = edge.clone();
        } else {
            inn.push(edge);
        }
    }
}

/// In-process default implementation of the graph memory capability. Like
/// [`crate::memory::InMemoryMemoryStore`], this is the standalone default;
/// concrete graph databases are out of scope.
pub struct InMemoryGraphMemory {
    clock: Arc<dyn Clock>,
    state: RwLock<GraphState>,
}

impl InMemoryGraphMemory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(GraphState::new()),
        }
    }

    /// Inserts a node if `id` is new, otherwise merges `label`/`properties`/
    /// `options` and re-indexes any newly added aliases. Upsert is
    /// idempotent under repeated identical calls.
    pub async fn upsert_node(
        &self,
        id: impl Into<String>,
        agent_id: impl Into<String>,
        label: impl Into<String>,
        aliases: Vec<String>,
        properties: serde_json::Value,
        options: NodeOptions,
    ) -> GraphNode {
        let id = id.into();
        let now = self.clock.now();
        let node_type = options.node_type.unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string());
        let confidence = options.confidence.unwrap_or(1.0);
        let embedding_override = options.embedding.clone();
        let mut state = self.state.write().await;

        let node = state
            .nodes
            .entry(id.clone())
            .and_modify(|n| {
                n.node_type = node_type.clone();
                n.label = label.clone().into();
                n.properties = properties.clone();
                n.confidence = confidence;
                n.updated_at = now;
                if let Some(embedding) = &embedding_override {
                    n.embedding = Some(embedding.clone());
                }
                for alias in &aliases {
                    if !n.aliases.contains(alias) {
                        n.aliases.push(alias.clone());
                    }
                }
            })
            .or_insert_with(|| GraphNode {
                id: id.clone(),
                agent_id: agent_id.into(),
                node_type,
                label: label.into(),
                aliases: aliases.clone(),
                properties,
                embedding: options.embedding,
                confidence,
                access_count: 0,
                created_at: now,
                updated_at: now,
            })
            .clone();

        for alias in &node.aliases {
            state.alias_index.insert(alias.clone(), id.clone());
        }
        node
    }

    /// Inserts or updates the edge `from -> to`. If `options.bidirectional`
    /// is set, a mirror edge `to -> from` sharing the same `id` is
    /// maintained alongside it so both endpoints see it under the same
    /// identity (§3 invariant). Re-upserting the same `(from, to, relation)`
    /// pair reuses its existing `id` rather than minting a new one.
    pub async fn upsert_edge(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        relation: impl Into<String>,
        properties: serde_json::Value,
        options: EdgeOptions,
    ) -> Result<GraphEdge> {
        let from = from.into();
        let to = to.into();
        let relation = relation.into();
        let mut state = self.state.write().await;

        if !state.nodes.contains_key(&from) {
            return Err(GraphMemoryError::NodeNotFound(from));
        }
        if !state.nodes.contains_key(&to) {
            return Err(GraphMemoryError::NodeNotFound(to));
        }

        let id = state
            .existing_edge_id(&from, &to, &relation)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let edge = GraphEdge {
            id,
            from: from.clone(),
            to: to.clone(),
            relation,
            properties,
            weight: options.weight.unwrap_or(1.0),
            bidirectional: options.bidirectional,
            valid_from: options.valid_from,
            valid_until: options.valid_until,
            created_at: self.clock.now(),
        };

        state.insert_directed(edge.clone());

        if edge.bidirectional {
            let mirror = GraphEdge {
                from: edge.to.clone(),
                to: edge.from.clone(),
                ..edge.clone()
            };
            state.insert_directed(mirror);
        }

        Ok(edge)
    }

    /// Traversal from `node_id` up to `depth` hops (§4.2.1,
    /// `neighbors(nodeID, edgeType?, depth=1)`), optionally restricted to
    /// edges whose `relation` matches `edge_type`. `depth` is floored at 1.
    /// Each returned pair carries the edge through which that node was first
    /// reached in the breadth-first expansion; a node already visited at a
    /// shallower depth is not revisited through a longer path.
    pub async fn neighbors(
        &self,
        node_id: &str,
        edge_type: Option<&str>,
        depth: usize,
        direction: EdgeDirection,
    ) -> Result<Vec<(GraphEdge, GraphNode)>> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(node_id) {
            return Err(GraphMemoryError::NodeNotFound(node_id.to_string()));
        }
        let depth = depth.max(1);

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node_id.to_string());
        let mut frontier = vec![node_id.to_string()];
        let mut discovered: Vec<(GraphEdge, String)> = Vec::new();

        for _ in 0..depth {
            let mut next_frontier = Vec::new();
            for current in &frontier {
                for edge in state.direct_edges(current, direction) {
                    if let Some(wanted) = edge_type {
                        if edge.relation != wanted {
                            continue;
                        }
                    }
                    let other_id = if edge.from == *current { edge.to.clone() } else { edge.from.clone() };
                    if !state.nodes.contains_key(&other_id) {
                        continue;
                    }
                    if visited.insert(other_id.clone()) {
                        discovered.push((edge, other_id.clone()));
                        next_frontier.push(other_id);
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        if let Some(origin) = state.nodes.get_mut(node_id) {
            origin.access_count += 1;
        }
        let mut results = Vec::with_capacity(discovered.len());
        for (edge, other_id) in discovered {
            if let Some(node) = state.nodes.get_mut(&other_id) {
                node.access_count += 1;
                results.push((edge, node.clone()));
            }
        }
        Ok(results)
    }

    pub async fn find_by_alias(&self, alias: &str) -> Option<GraphNode> {
        let mut state = self.state.write().await;
        let id = state.alias_index.get(alias)?.clone();
        let node = state.nodes.get_mut(&id)?;
        node.access_count += 1;
        Some(node.clone())
    }

    /// Deletes a node and cascades to every edge touching it, in either
    /// direction (§4.2.1 invariant: no dangling edges after deletion).
    pub async fn delete_node(&self, node_id: &str) {
        let mut state = self.state.write().await;
        let Some(node) = state.nodes.remove(node_id) else {
            return;
        };
        for alias in &node.aliases {
            state.alias_index.remove(alias);
        }

        let touched: HashSet<String> = state
            .out_edges
            .get(node_id)
            .map(|edges| edges.iter().map(|e| e.to.clone()).collect())
            .unwrap_or_default()
            .into_iter()
            .chain(
                state
                    .in_edges
                    .get(node_id)
                    .map(|edges| edges.iter().map(|e| e.from.clone()).collect())
                    .unwrap_or_default(),
            )
            .collect();

        state.out_edges.remove(node_id);
        state.in_edges.remove(node_id);
        for other in touched {
            if let Some(edges) = state.out_edges.get_mut(&other) {
                edges.retain(|e| e.to != node_id);
            }
            if let Some(edges) = state.in_edges.get_mut(&other) {
                edges.retain(|e| e.from != node_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SystemClock;
    use serde_json::json;

    fn graph() -> InMemoryGraphMemory {
        InMemoryGraphMemory::new(Arc::new(SystemClock))
    }

    async fn node(g: &InMemoryGraphMemory, id: &str, agent: &str, label: &str, aliases: Vec<String>) -> GraphNode {
        g.upsert_node(id, agent, label, aliases, json!({}), NodeOptions::default()).await
    }

    async fn edge(g: &InMemoryGraphMemory, from: &str, to: &str, relation: &str) -> Result<GraphEdge> {
        g.upsert_edge(from, to, relation, json!({}), EdgeOptions::default()).await
    }

    #[tokio::test]
    async fn upsert_edge_fails_for_missing_endpoints() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec![]).await;
        let err = edge(&g, "a", "missing", "knows").await.unwrap_err();
        assert!(matches!(err, GraphMemoryError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn upsert_node_applies_options() {
        let g = graph();
        let n = g
            .upsert_node(
                "a",
                "agent-1",
                "Alice",
                vec![],
                json!({}),
                NodeOptions { node_type: Some("person".into()), embedding: Some(vec![0.1, 0.2]), confidence: Some(0.9) },
            )
            .await;
        assert_eq!(n.node_type, "person");
        assert_eq!(n.embedding, Some(vec![0.1, 0.2]));
        assert_eq!(n.confidence, 0.9);
        assert_eq!(n.access_count, 0);
    }

    #[tokio::test]
    async fn neighbors_follows_direction() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec![]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        edge(&g, "a", "b", "knows").await.unwrap();

        let out = g.neighbors("a", None, 1, EdgeDirection::Outgoing).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.id, "b");

        let inc = g.neighbors("b", None, 1, EdgeDirection::Incoming).await.unwrap();
        assert_eq!(inc.len(), 1);
        assert_eq!(inc[0].1.id, "a");

        assert!(g.neighbors("b", None, 1, EdgeDirection::Outgoing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn neighbors_filters_by_edge_type() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec![]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        node(&g, "c", "agent-1", "Acme", vec![]).await;
        edge(&g, "a", "b", "knows").await.unwrap();
        edge(&g, "a", "c", "works_at").await.unwrap();

        let knows_only = g.neighbors("a", Some("knows"), 1, EdgeDirection::Outgoing).await.unwrap();
        assert_eq!(knows_only.len(), 1);
        assert_eq!(knows_only[0].1.id, "b");

        let all = g.neighbors("a", None, 1, EdgeDirection::Outgoing).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn neighbors_traverses_multiple_hops() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec![]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        node(&g, "c", "agent-1", "Carol", vec![]).await;
        edge(&g, "a", "b", "knows").await.unwrap();
        edge(&g, "b", "c", "knows").await.unwrap();

        // depth=1 sees only the direct neighbor.
        let one_hop = g.neighbors("a", None, 1, EdgeDirection::Outgoing).await.unwrap();
        assert_eq!(one_hop.iter().map(|(_, n)| n.id.clone()).collect::<Vec<_>>(), vec!["b"]);

        // depth=2 reaches the second hop without revisiting "a".
        let two_hop = g.neighbors("a", None, 2, EdgeDirection::Outgoing).await.unwrap();
        let mut ids: Vec<_> = two_hop.iter().map(|(_, n)| n.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn bidirectional_edge_exposes_same_id_from_either_endpoint() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec![]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        let forward = g
            .upsert_edge("a", "b", "married_to", json!({}), EdgeOptions { bidirectional: true, ..Default::default() })
            .await
            .unwrap();

        let from_a = g.neighbors("a", None, 1, EdgeDirection::Outgoing).await.unwrap();
        let from_b = g.neighbors("b", None, 1, EdgeDirection::Outgoing).await.unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_a[0].0.id, forward.id);
        assert_eq!(from_b[0].0.id, forward.id);
        assert_eq!(from_a[0].1.id, "b");
        assert_eq!(from_b[0].1.id, "a");
    }

    #[tokio::test]
    async fn neighbors_and_find_by_alias_increment_access_count() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec!["ally".into()]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        edge(&g, "a", "b", "knows").await.unwrap();

        g.neighbors("a", None, 1, EdgeDirection::Outgoing).await.unwrap();
        g.find_by_alias("ally").await.unwrap();

        let a = g.find_by_alias("ally").await.unwrap();
        // One increment from each `neighbors` origin touch, plus two
        // `find_by_alias` calls (this one included).
        assert_eq!(a.access_count, 3);
    }

    #[tokio::test]
    async fn find_by_alias_resolves_node() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec!["ally".into()]).await;
        let found = g.find_by_alias("ally").await.unwrap();
        assert_eq!(found.id, "a");
        assert!(g.find_by_alias("nope").await.is_none());
    }

    #[tokio::test]
    async fn delete_node_cascades_edges_and_aliases() {
        let g = graph();
        node(&g, "a", "agent-1", "Alice", vec!["ally".into()]).await;
        node(&g, "b", "agent-1", "Bob", vec![]).await;
        edge(&g, "a", "b", "knows").await.unwrap();

        g.delete_node("a").await;

        assert!(g.find_by_alias("ally").await.is_none());
        assert!(g.neighbors("b", None, 1, EdgeDirection::Both).await.unwrap().is_empty());
        let err = g.neighbors("a", None, 1, EdgeDirection::Both).await.unwrap_err();
        assert!(matches!(err, GraphMemoryError::NodeNotFound(_)));
    }
}
