//! Resolution of ambiguous arcs.
//!
//! After a merger is split, each of its pieces is wired to every neighbor of
//! the merger. A node can then carry several active arcs per direction:
//!
//! ```text
//!          ┌──▶ [a] ──┐
//!   [X] ───┤          ├──▶ [Y]
//!          └──▶ [b] ──┘
//! ```
//!
//! An [`ArcResolution`] strategy deactivates arcs until every node has at most
//! one active incoming and at most one active outgoing arc.
//!
//! | Strategy | Selection | Cost |
//! |----------|-----------|------|
//! | [`GreedyArcs`] | lightest arc per node and direction | O(E log E) |
//! | [`ExactArcs`] | most arcs, then least total weight | O(n³) per component |
//!
//! Both strategies only look at arcs that are active and whose endpoints are
//! both active. Arcs are never removed, only deactivated.

mod assignment;
mod exact;
mod greedy;

pub use assignment::min_cost_assignment;
pub use exact::ExactArcs;
pub use greedy::GreedyArcs;

use crate::error::Result;
use crate::graph::{Arc, HypothesesGraph, Property};

/// Strategy restoring the one-arc-per-direction constraint.
pub trait ArcResolution {
    /// Deactivate ambiguous arcs in place. Returns how many were deactivated.
    fn resolve(&self, graph: &mut HypothesesGraph) -> Result<usize>;
}

/// Active arcs between active nodes, in creation order.
pub(crate) fn live_arcs(graph: &HypothesesGraph) -> Vec<Arc> {
    graph
        .active_arcs()
        .filter(|&a| {
            graph
                .endpoints(a)
                .is_some_and(|(s, t)| graph.is_node_active(s) && graph.is_node_active(t))
        })
        .collect()
}

pub(crate) fn require_arc_properties(graph: &HypothesesGraph) -> Result<()> {
    graph.require(Property::ArcActive)?;
    graph.require(Property::ArcWeight)?;
    graph.require(Property::NodeActive)
}

/// Lightest arc, ties going to the older arc.
pub(crate) fn lightest(graph: &HypothesesGraph, arcs: &[Arc]) -> Option<Arc> {
    arcs.iter().copied().min_by(|&a, &b| {
        graph
            .arc_weight(a)
            .total_cmp(&graph.arc_weight(b))
            .then(a.cmp(&b))
    })
}
