//! Greedy arc resolution.
//!
//! Every node votes for its lightest incoming and its lightest outgoing arc.
//! Decisions are made on a snapshot of the live arcs, then applied at once,
//! so the outcome does not depend on the order nodes are visited in. An arc
//! survives only if no endpoint voted against it; a node may end up with no
//! arc in a direction when its favorite lost at the other end.
//!
//! Ties go to the lower weight, then to the arc created first.

use std::collections::{BTreeMap, BTreeSet};

use super::{lightest, live_arcs, require_arc_properties, ArcResolution};
use crate::error::Result;
use crate::graph::{Arc, HypothesesGraph, Node};

/// Keep the lightest arc per node and direction.
#[derive(Debug, Clone, Default)]
pub struct GreedyArcs;

impl GreedyArcs {
    /// Create the greedy strategy.
    pub fn new() -> Self {
        Self
    }
}

impl ArcResolution for GreedyArcs {
    fn resolve(&self, graph: &mut HypothesesGraph) -> Result<usize> {
        require_arc_properties(graph)?;

        let mut incoming: BTreeMap<Node, Vec<Arc>> = BTreeMap::new();
        let mut outgoing: BTreeMap<Node, Vec<Arc>> = BTreeMap::new();
        for arc in live_arcs(graph) {
            if let Some((s, t)) = graph.endpoints(arc) {
                outgoing.entry(s).or_default().push(arc);
                incoming.entry(t).or_default().push(arc);
            }
        }

        let mut rejected = BTreeSet::new();
        for group in incoming.values().chain(outgoing.values()) {
            if group.len() < 2 {
                continue;
            }
            if let Some(keep) = lightest(graph, group) {
                rejected.extend(group.iter().copied().filter(|&a| a != keep));
            }
        }

        for &arc in &rejected {
            graph.set_arc_active(arc, false)?;
        }
        log::debug!("greedy arc resolution deactivated {} arcs", rejected.len());
        Ok(rejected.len())
    }
}
