//! Exact arc resolution.
//!
//! Choosing at most one incoming and one outgoing arc per node is a matching
//! problem: every node contributes an *outgoing side* (rows) and an *incoming
//! side* (columns), and every live arc is a row-column pair. Among all valid
//! selections the solver picks one with the most arcs and, among those, the
//! least total weight. Without the cardinality term the empty selection would
//! always be optimal.
//!
//! The objective is folded into a single assignment problem: a row matched to
//! a column it has no arc to pays a penalty larger than the total weight of
//! the component, so one more real arc always beats any weight saving.
//!
//! ```text
//!           in:a  in:b  in:Y
//!   out:X [   0     4     P  ]      P = penalty
//!   out:a [   P     P     4  ]
//!   out:b [   P     P     0  ]
//!
//!   optimum: X→a (0), b→Y (0); row a pays P, i.e. a gets no outgoing arc
//! ```
//!
//! Weakly connected components of the live arcs are independent and are
//! solved one at a time.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;

use super::{lightest, live_arcs, min_cost_assignment, require_arc_properties, ArcResolution};
use crate::error::{Error, Result};
use crate::graph::{Arc, HypothesesGraph, Node};

/// Select the largest, then lightest, set of arcs with at most one arc per
/// node and direction.
#[derive(Debug, Clone, Default)]
pub struct ExactArcs;

impl ExactArcs {
    /// Create the exact strategy.
    pub fn new() -> Self {
        Self
    }

    /// Arcs to keep within one connected component.
    fn select(&self, graph: &HypothesesGraph, arcs: &[Arc]) -> Result<Vec<Arc>> {
        if arcs.len() == 1 {
            return Ok(arcs.to_vec());
        }

        // lightest arc for every (source, target) pair
        let mut pairs: BTreeMap<(Node, Node), Vec<Arc>> = BTreeMap::new();
        for &arc in arcs {
            if let Some(ends) = graph.endpoints(arc) {
                pairs.entry(ends).or_default().push(arc);
            }
        }
        let rows: Vec<Node> = distinct(pairs.keys().map(|&(s, _)| s));
        let cols: Vec<Node> = distinct(pairs.keys().map(|&(_, t)| t));

        let penalty = arcs.iter().map(|&a| graph.arc_weight(a).abs()).sum::<f64>() + 1.0;
        let n = rows.len().max(cols.len());
        let mut cost = vec![vec![penalty; n]; n];
        let mut best = vec![vec![None; n]; n];
        for (&(s, t), candidates) in &pairs {
            let (Ok(i), Ok(j)) = (rows.binary_search(&s), cols.binary_search(&t)) else {
                continue;
            };
            if let Some(arc) = lightest(graph, candidates) {
                cost[i][j] = graph.arc_weight(arc);
                best[i][j] = Some(arc);
            }
        }

        let assignment = min_cost_assignment(&cost);
        if assignment.len() != n || assignment.iter().any(|&j| j >= n) {
            return Err(Error::InferenceFailed(format!(
                "assignment over {n} nodes returned an incomplete solution"
            )));
        }
        let selected: Vec<Arc> = assignment
            .iter()
            .enumerate()
            .filter_map(|(i, &j)| best[i][j])
            .collect();

        let distinct_cols: BTreeSet<usize> = assignment.iter().copied().collect();
        if distinct_cols.len() != n {
            return Err(Error::InferenceFailed(
                "assignment selected a column twice".to_string(),
            ));
        }
        Ok(selected)
    }
}

fn distinct(nodes: impl Iterator<Item = Node>) -> Vec<Node> {
    nodes.collect::<BTreeSet<_>>().into_iter().collect()
}

impl ArcResolution for ExactArcs {
    fn resolve(&self, graph: &mut HypothesesGraph) -> Result<usize> {
        require_arc_properties(graph)?;

        let arcs = live_arcs(graph);
        if let Some(&bad) = arcs.iter().find(|&&a| !graph.arc_weight(a).is_finite()) {
            return Err(Error::InferenceFailed(format!(
                "arc {} has non-finite weight {}",
                bad.index(),
                graph.arc_weight(bad)
            )));
        }

        let mut components = UnionFind::<usize>::new(graph.node_count());
        for &arc in &arcs {
            if let Some((s, t)) = graph.endpoints(arc) {
                components.union(s.index(), t.index());
            }
        }
        let mut by_component: BTreeMap<usize, Vec<Arc>> = BTreeMap::new();
        for &arc in &arcs {
            if let Some(s) = graph.source(arc) {
                by_component
                    .entry(components.find(s.index()))
                    .or_default()
                    .push(arc);
            }
        }

        let mut keep = BTreeSet::new();
        for component in by_component.values() {
            keep.extend(self.select(graph, component)?);
        }

        let mut dropped = 0;
        for arc in arcs {
            if !keep.contains(&arc) {
                graph.set_arc_active(arc, false)?;
                dropped += 1;
            }
        }
        log::debug!(
            "exact arc resolution kept {} arcs in {} components, deactivated {}",
            keep.len(),
            by_component.len(),
            dropped
        );
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcs::tests::layered;
    use crate::traxel::Traxel;

    #[test]
    fn prefers_more_arcs_over_lighter_arcs() {
        // one cheap arc would block two heavier ones
        let (mut g, _, _) = layered(2, 2, &[(0, 0, 1.0), (0, 1, 10.0), (1, 0, 10.0)]);
        ExactArcs::new().resolve(&mut g).unwrap();
        let kept: Vec<f64> = g.active_arcs().map(|a| g.arc_weight(a)).collect();
        assert_eq!(kept, vec![10.0, 10.0]);
    }

    #[test]
    fn global_minimum_over_local() {
        let (mut g, _, _) = layered(
            2,
            2,
            &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 1.5), (1, 1, 100.0)],
        );
        ExactArcs::new().resolve(&mut g).unwrap();
        let total: f64 = g.active_arcs().map(|a| g.arc_weight(a)).sum();
        assert!((total - 3.5).abs() < 1e-12);
    }

    #[test]
    fn chain_through_split_node() {
        // X(t0) -> a, b (t1) -> Y (t2)
        let mut g = HypothesesGraph::new();
        let x = g.add_node(Traxel::new(1, 0));
        let a = g.add_node(Traxel::new(1, 1));
        let b = g.add_node(Traxel::new(2, 1));
        let y = g.add_node(Traxel::new(1, 2));
        let xa = g.add_arc(x, a).unwrap();
        let xb = g.add_arc(x, b).unwrap();
        let ay = g.add_arc(a, y).unwrap();
        let by = g.add_arc(b, y).unwrap();
        for (arc, w) in [(xa, 0.0), (xb, 4.0), (ay, 4.0), (by, 0.0)] {
            g.set_arc_weight(arc, w).unwrap();
        }
        assert_eq!(ExactArcs::new().resolve(&mut g).unwrap(), 2);
        assert!(g.is_arc_active(xa));
        assert!(g.is_arc_active(by));
        assert!(!g.is_arc_active(xb));
        assert!(!g.is_arc_active(ay));
    }

    #[test]
    fn parallel_arcs_keep_lightest() {
        let (mut g, _, _) = layered(1, 1, &[(0, 0, 3.0), (0, 0, 2.0)]);
        ExactArcs::new().resolve(&mut g).unwrap();
        let active: Vec<_> = g.active_arcs().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(g.arc_weight(active[0]), 2.0);
    }

    #[test]
    fn non_finite_weight_fails() {
        let (mut g, _, _) = layered(1, 2, &[(0, 0, f64::NAN), (0, 1, 1.0)]);
        let err = ExactArcs::new().resolve(&mut g).unwrap_err();
        assert!(matches!(err, Error::InferenceFailed(_)));
        // nothing was touched
        assert_eq!(g.active_arcs().count(), 2);
    }
}
