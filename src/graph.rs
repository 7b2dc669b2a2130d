//! Time-layered hypotheses graph with property maps.
//!
//! The topology is a `petgraph` [`DiGraph`] whose node weights are the
//! [`Traxel`] records. Everything else (activity, merger counts, arc weights,
//! provenance) lives in separate property maps indexed by the petgraph
//! indices. Elements are never removed, so indices stay valid for the
//! lifetime of the graph and deactivation is the only way to drop something
//! from the accepted solution.
//!
//! ```text
//! t=0        t=1           t=2
//! [A] ────▶ [M (x2)] ────▶ [B]
//!   ╲                     ╱
//!    ───▶  [C]  ─────────
//! ```
//!
//! A property map can be absent entirely; callers that need one check with
//! [`HypothesesGraph::has_property`] and fail early if it is missing.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::traxel::Traxel;

/// Handle of a node.
pub type Node = NodeIndex;
/// Handle of an arc.
pub type Arc = EdgeIndex;

/// Property maps a graph can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    /// Node activity flag.
    NodeActive,
    /// Number of physical objects a node represents.
    MergerCount,
    /// Arc activity flag.
    ArcActive,
    /// Arc distance score.
    ArcWeight,
    /// Identifiers a merger node was split into.
    ResolvedTo,
    /// Identifier of the merger a node was split from.
    OriginatedFrom,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Property::NodeActive => "node_active",
            Property::MergerCount => "merger_count",
            Property::ArcActive => "arc_active",
            Property::ArcWeight => "arc_weight",
            Property::ResolvedTo => "merger_resolved_to",
            Property::OriginatedFrom => "node_originated_from",
        };
        f.write_str(name)
    }
}

/// Directed, time-layered graph of object hypotheses.
#[derive(Debug, Clone, Default)]
pub struct HypothesesGraph {
    graph: DiGraph<Traxel, ()>,
    node_active: Option<Vec<bool>>,
    merger_count: Option<Vec<usize>>,
    arc_active: Option<Vec<bool>>,
    arc_weight: Option<Vec<f64>>,
    resolved_to: Option<HashMap<Node, Vec<u32>>>,
    originated_from: Option<HashMap<Node, u32>>,
}

impl HypothesesGraph {
    /// Create an empty graph carrying the tracking properties
    /// (node activity, merger count, arc activity, arc weight).
    pub fn new() -> Self {
        let mut g = Self::without_properties();
        for p in [
            Property::NodeActive,
            Property::MergerCount,
            Property::ArcActive,
            Property::ArcWeight,
        ] {
            g.add_property(p);
        }
        g
    }

    /// Create an empty graph without any property map.
    pub fn without_properties() -> Self {
        Self::default()
    }

    /// Whether the property map is present.
    pub fn has_property(&self, property: Property) -> bool {
        match property {
            Property::NodeActive => self.node_active.is_some(),
            Property::MergerCount => self.merger_count.is_some(),
            Property::ArcActive => self.arc_active.is_some(),
            Property::ArcWeight => self.arc_weight.is_some(),
            Property::ResolvedTo => self.resolved_to.is_some(),
            Property::OriginatedFrom => self.originated_from.is_some(),
        }
    }

    /// Add a property map if it is missing.
    ///
    /// Existing elements get the map's default: inactive, merger count 1,
    /// weight 0, no provenance. An already present map is left untouched.
    pub fn add_property(&mut self, property: Property) {
        let n = self.graph.node_count();
        let m = self.graph.edge_count();
        match property {
            Property::NodeActive => {
                self.node_active.get_or_insert_with(|| vec![false; n]);
            }
            Property::MergerCount => {
                self.merger_count.get_or_insert_with(|| vec![1; n]);
            }
            Property::ArcActive => {
                self.arc_active.get_or_insert_with(|| vec![false; m]);
            }
            Property::ArcWeight => {
                self.arc_weight.get_or_insert_with(|| vec![0.0; m]);
            }
            Property::ResolvedTo => {
                self.resolved_to.get_or_insert_with(HashMap::new);
            }
            Property::OriginatedFrom => {
                self.originated_from.get_or_insert_with(HashMap::new);
            }
        }
    }

    /// Fail with [`Error::MissingProperty`] unless the map is present.
    pub fn require(&self, property: Property) -> Result<()> {
        if self.has_property(property) {
            Ok(())
        } else {
            Err(Error::MissingProperty(property))
        }
    }

    /// Add a node for `traxel`. New nodes are active with merger count 1.
    pub fn add_node(&mut self, traxel: Traxel) -> Node {
        let node = self.graph.add_node(traxel);
        if let Some(active) = &mut self.node_active {
            active.push(true);
        }
        if let Some(count) = &mut self.merger_count {
            count.push(1);
        }
        node
    }

    /// Add an arc. New arcs are active with weight 0.
    pub fn add_arc(&mut self, from: Node, to: Node) -> Result<Arc> {
        self.check_node(from)?;
        self.check_node(to)?;
        let arc = self.graph.add_edge(from, to, ());
        if let Some(active) = &mut self.arc_active {
            active.push(true);
        }
        if let Some(weight) = &mut self.arc_weight {
            weight.push(0.0);
        }
        Ok(arc)
    }

    /// Number of nodes, active or not.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of arcs, active or not.
    pub fn arc_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.graph.node_indices()
    }

    /// All arcs in creation order.
    pub fn arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.graph.edge_indices()
    }

    /// Active nodes in creation order.
    pub fn active_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes().filter(move |&n| self.is_node_active(n))
    }

    /// Active arcs in creation order.
    pub fn active_arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.arcs().filter(move |&a| self.is_arc_active(a))
    }

    /// Object record of a node.
    pub fn traxel(&self, node: Node) -> Option<&Traxel> {
        self.graph.node_weight(node)
    }

    /// Source and target of an arc.
    pub fn endpoints(&self, arc: Arc) -> Option<(Node, Node)> {
        self.graph.edge_endpoints(arc)
    }

    /// Source of an arc.
    pub fn source(&self, arc: Arc) -> Option<Node> {
        self.endpoints(arc).map(|(s, _)| s)
    }

    /// Target of an arc.
    pub fn target(&self, arc: Arc) -> Option<Node> {
        self.endpoints(arc).map(|(_, t)| t)
    }

    /// Incoming arcs of `node`, in creation order.
    pub fn in_arcs(&self, node: Node) -> Vec<Arc> {
        self.arcs_directed(node, Direction::Incoming)
    }

    /// Outgoing arcs of `node`, in creation order.
    pub fn out_arcs(&self, node: Node) -> Vec<Arc> {
        self.arcs_directed(node, Direction::Outgoing)
    }

    fn arcs_directed(&self, node: Node, dir: Direction) -> Vec<Arc> {
        if self.graph.node_weight(node).is_none() {
            return Vec::new();
        }
        // petgraph walks adjacency lists newest first
        let mut arcs: Vec<Arc> = self.graph.edges_directed(node, dir).map(|e| e.id()).collect();
        arcs.sort_unstable();
        arcs
    }

    /// Sorted, distinct time indices present in the graph.
    pub fn timesteps(&self) -> Vec<i32> {
        self.graph
            .node_weights()
            .map(|t| t.timestep)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Nodes at time index `t`, active or not, in creation order.
    pub fn nodes_at(&self, t: i32) -> impl Iterator<Item = Node> + '_ {
        self.graph
            .node_indices()
            .filter(move |&n| self.graph[n].timestep == t)
    }

    /// Highest identifier at time index `t` among all nodes, active or not.
    pub fn max_id(&self, t: i32) -> Option<u32> {
        self.nodes_at(t).map(|n| self.graph[n].id).max()
    }

    /// Find the node holding identifier `id` at time index `t`.
    pub fn find_node(&self, t: i32, id: u32) -> Option<Node> {
        self.nodes_at(t).find(|&n| self.graph[n].id == id)
    }

    /// Whether a node is active. `false` without the activity map.
    pub fn is_node_active(&self, node: Node) -> bool {
        self.node_active
            .as_ref()
            .and_then(|v| v.get(node.index()).copied())
            .unwrap_or(false)
    }

    /// Set a node's activity flag.
    pub fn set_node_active(&mut self, node: Node, active: bool) -> Result<()> {
        let map = self
            .node_active
            .as_mut()
            .ok_or(Error::MissingProperty(Property::NodeActive))?;
        let slot = map
            .get_mut(node.index())
            .ok_or(Error::UnknownNode(node.index()))?;
        *slot = active;
        Ok(())
    }

    /// Number of objects a node stands for. 1 without the merger map.
    pub fn merger_count(&self, node: Node) -> usize {
        self.merger_count
            .as_ref()
            .and_then(|v| v.get(node.index()).copied())
            .unwrap_or(1)
    }

    /// Set a node's merger count.
    pub fn set_merger_count(&mut self, node: Node, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidParameter {
                name: "count",
                message: "merger count must be at least 1",
            });
        }
        let map = self
            .merger_count
            .as_mut()
            .ok_or(Error::MissingProperty(Property::MergerCount))?;
        let slot = map
            .get_mut(node.index())
            .ok_or(Error::UnknownNode(node.index()))?;
        *slot = count;
        Ok(())
    }

    /// Whether an arc is active. `false` without the activity map.
    pub fn is_arc_active(&self, arc: Arc) -> bool {
        self.arc_active
            .as_ref()
            .and_then(|v| v.get(arc.index()).copied())
            .unwrap_or(false)
    }

    /// Set an arc's activity flag.
    pub fn set_arc_active(&mut self, arc: Arc, active: bool) -> Result<()> {
        let map = self
            .arc_active
            .as_mut()
            .ok_or(Error::MissingProperty(Property::ArcActive))?;
        let slot = map
            .get_mut(arc.index())
            .ok_or(Error::UnknownArc(arc.index()))?;
        *slot = active;
        Ok(())
    }

    /// Distance score of an arc. 0 without the weight map.
    pub fn arc_weight(&self, arc: Arc) -> f64 {
        self.arc_weight
            .as_ref()
            .and_then(|v| v.get(arc.index()).copied())
            .unwrap_or(0.0)
    }

    /// Set an arc's distance score.
    pub fn set_arc_weight(&mut self, arc: Arc, weight: f64) -> Result<()> {
        let map = self
            .arc_weight
            .as_mut()
            .ok_or(Error::MissingProperty(Property::ArcWeight))?;
        let slot = map
            .get_mut(arc.index())
            .ok_or(Error::UnknownArc(arc.index()))?;
        *slot = weight;
        Ok(())
    }

    /// Identifiers a resolved merger was split into.
    pub fn resolved_to(&self, node: Node) -> Option<&[u32]> {
        self.resolved_to
            .as_ref()
            .and_then(|m| m.get(&node))
            .map(Vec::as_slice)
    }

    /// Record the identifiers a merger was split into.
    pub fn set_resolved_to(&mut self, node: Node, ids: Vec<u32>) -> Result<()> {
        self.check_node(node)?;
        self.resolved_to
            .as_mut()
            .ok_or(Error::MissingProperty(Property::ResolvedTo))?
            .insert(node, ids);
        Ok(())
    }

    /// Identifier of the merger a node was split from.
    pub fn originated_from(&self, node: Node) -> Option<u32> {
        self.originated_from
            .as_ref()
            .and_then(|m| m.get(&node).copied())
    }

    /// Record the merger a node was split from.
    pub fn set_originated_from(&mut self, node: Node, id: u32) -> Result<()> {
        self.check_node(node)?;
        self.originated_from
            .as_mut()
            .ok_or(Error::MissingProperty(Property::OriginatedFrom))?
            .insert(node, id);
        Ok(())
    }

    /// Fail unless `node` belongs to this graph.
    pub fn check_node(&self, node: Node) -> Result<()> {
        if node.index() < self.graph.node_count() {
            Ok(())
        } else {
            Err(Error::UnknownNode(node.index()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frames() -> (HypothesesGraph, Node, Node, Arc) {
        let mut g = HypothesesGraph::new();
        let a = g.add_node(Traxel::new(1, 0));
        let b = g.add_node(Traxel::new(1, 1));
        let arc = g.add_arc(a, b).unwrap();
        (g, a, b, arc)
    }

    #[test]
    fn new_elements_are_active() {
        let (g, a, b, arc) = two_frames();
        assert!(g.is_node_active(a));
        assert!(g.is_node_active(b));
        assert!(g.is_arc_active(arc));
        assert_eq!(g.merger_count(a), 1);
        assert_eq!(g.endpoints(arc), Some((a, b)));
    }

    #[test]
    fn deactivation_hides_from_active_view() {
        let (mut g, a, _, arc) = two_frames();
        g.set_node_active(a, false).unwrap();
        g.set_arc_active(arc, false).unwrap();
        assert_eq!(g.active_nodes().count(), 1);
        assert_eq!(g.active_arcs().count(), 0);
        // still in the graph
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.arc_count(), 1);
    }

    #[test]
    fn missing_property_is_reported() {
        let mut g = HypothesesGraph::without_properties();
        let a = g.add_node(Traxel::new(1, 0));
        assert!(!g.has_property(Property::NodeActive));
        assert_eq!(
            g.set_node_active(a, true),
            Err(Error::MissingProperty(Property::NodeActive))
        );
        assert_eq!(
            g.require(Property::ArcWeight),
            Err(Error::MissingProperty(Property::ArcWeight))
        );

        g.add_property(Property::NodeActive);
        assert!(!g.is_node_active(a));
        g.set_node_active(a, true).unwrap();
        assert!(g.is_node_active(a));
    }

    #[test]
    fn add_property_keeps_existing_map() {
        let (mut g, a, _, _) = two_frames();
        g.add_property(Property::NodeActive);
        assert!(g.is_node_active(a));
    }

    #[test]
    fn max_id_counts_inactive_nodes() {
        let mut g = HypothesesGraph::new();
        g.add_node(Traxel::new(3, 5));
        let hidden = g.add_node(Traxel::new(9, 5));
        g.add_node(Traxel::new(20, 6));
        g.set_node_active(hidden, false).unwrap();
        assert_eq!(g.max_id(5), Some(9));
        assert_eq!(g.max_id(6), Some(20));
        assert_eq!(g.max_id(7), None);
        assert_eq!(g.timesteps(), vec![5, 6]);
        assert_eq!(g.find_node(5, 9), Some(hidden));
    }

    #[test]
    fn arcs_are_listed_in_creation_order() {
        let mut g = HypothesesGraph::new();
        let m = g.add_node(Traxel::new(1, 1));
        let sources: Vec<Node> = (0..3).map(|i| g.add_node(Traxel::new(i, 0))).collect();
        let arcs: Vec<Arc> = sources.iter().map(|&s| g.add_arc(s, m).unwrap()).collect();
        assert_eq!(g.in_arcs(m), arcs);
        assert!(g.out_arcs(m).is_empty());
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let (mut g, a, _, _) = two_frames();
        let ghost = NodeIndex::new(17);
        assert_eq!(g.add_arc(a, ghost), Err(Error::UnknownNode(17)));
        assert_eq!(
            g.set_arc_weight(EdgeIndex::new(4), 1.0),
            Err(Error::UnknownArc(4))
        );
        assert!(g.in_arcs(ghost).is_empty());
    }

    #[test]
    fn provenance_requires_maps() {
        let (mut g, a, b, _) = two_frames();
        assert_eq!(
            g.set_originated_from(b, 7),
            Err(Error::MissingProperty(Property::OriginatedFrom))
        );
        g.add_property(Property::OriginatedFrom);
        g.add_property(Property::ResolvedTo);
        g.set_originated_from(b, 7).unwrap();
        g.set_resolved_to(a, vec![2, 3]).unwrap();
        assert_eq!(g.originated_from(b), Some(7));
        assert_eq!(g.resolved_to(a), Some(&[2, 3][..]));
    }
}
