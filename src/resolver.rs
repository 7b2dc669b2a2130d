//! Merger resolution on a hypotheses graph.
//!
//! A merger node stands for `k >= 2` objects that were detected as one. The
//! resolver replaces it by `k` new nodes and rewires its neighborhood:
//!
//! ```text
//! before               [X] ──▶ [M ×2] ──▶ [Y]
//!
//! after expansion      [X] ──▶ [a] ──▶ [Y]
//!                       └────▶ [b] ─────┘
//!
//! after arc choice     [X] ──▶ [a]
//!                              [b] ──▶ [Y]
//! ```
//!
//! 1. Every active node with merger count `k >= 2` is collected, per time
//!    index.
//! 2. The feature extractor produces `k` object records with fresh
//!    identifiers. The highest identifier of the time index is looked up
//!    again for every merger, since each expansion raises it.
//! 3. Each new node is connected to every active predecessor and successor
//!    of the merger (over active arcs); the distance strategy scores the
//!    candidate arcs.
//! 4. The merger and all its arcs are deactivated, provenance is recorded.
//! 5. An [`ArcResolution`] strategy removes the ambiguity created in step 3.
//!
//! Extraction and scoring for a merger happen before anything is written, so
//! a failing merger leaves no trace; mergers resolved before it stay
//! resolved.

use std::collections::{BTreeMap, BTreeSet};

use crate::arcs::ArcResolution;
use crate::distance::Distance;
use crate::error::{Error, Result};
use crate::extract::FeatureExtractor;
use crate::graph::{Arc, HypothesesGraph, Node, Property};
use crate::traxel::Traxel;

/// Counters from one expansion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    /// Merger nodes replaced.
    pub mergers: usize,
    /// Nodes created.
    pub nodes_created: usize,
    /// Candidate arcs created.
    pub arcs_created: usize,
    /// Original merger arcs deactivated.
    pub arcs_deactivated: usize,
}

/// Everything needed to replace one merger, computed before any mutation.
struct Expansion {
    merger: Node,
    merger_id: u32,
    pieces: Vec<Traxel>,
    incoming: Vec<Arc>,
    outgoing: Vec<Arc>,
    /// `in_weights[p][i]`: weight from the source of `incoming[i]` to piece `p`.
    in_weights: Vec<Vec<f64>>,
    /// `out_weights[p][o]`: weight from piece `p` to the target of `outgoing[o]`.
    out_weights: Vec<Vec<f64>>,
}

/// Splits merger nodes of a graph into their constituent objects.
#[derive(Debug)]
pub struct MergerResolver<'g> {
    graph: &'g mut HypothesesGraph,
}

impl<'g> MergerResolver<'g> {
    /// Wrap a graph for resolution.
    ///
    /// The graph must carry node activity, merger counts, arc activity and arc
    /// weights. The provenance maps are added if missing.
    pub fn new(graph: &'g mut HypothesesGraph) -> Result<Self> {
        for property in [
            Property::NodeActive,
            Property::MergerCount,
            Property::ArcActive,
            Property::ArcWeight,
        ] {
            graph.require(property)?;
        }
        graph.add_property(Property::ResolvedTo);
        graph.add_property(Property::OriginatedFrom);
        Ok(Self { graph })
    }

    /// Read access to the graph.
    pub fn graph(&self) -> &HypothesesGraph {
        &*self.graph
    }

    /// Split every merger, then resolve ambiguous arcs.
    pub fn resolve_mergers(
        &mut self,
        extractor: &dyn FeatureExtractor,
        distance: &dyn Distance,
        arcs: &dyn ArcResolution,
    ) -> Result<&mut HypothesesGraph> {
        let stats = self.expand_mergers(extractor, distance)?;
        let ambiguous = arcs.resolve(&mut *self.graph)?;
        log::info!(
            "resolved {} mergers into {} nodes with {} candidate arcs; deactivated {} merger arcs and {} ambiguous arcs",
            stats.mergers,
            stats.nodes_created,
            stats.arcs_created,
            stats.arcs_deactivated,
            ambiguous
        );
        Ok(&mut *self.graph)
    }

    /// Split every merger without resolving the resulting ambiguity.
    pub fn expand_mergers(
        &mut self,
        extractor: &dyn FeatureExtractor,
        distance: &dyn Distance,
    ) -> Result<ExpansionStats> {
        let mut stats = ExpansionStats::default();
        for (timestep, nodes) in self.merger_nodes() {
            for node in nodes {
                let expansion = self.plan(node, extractor, distance).map_err(|e| {
                    let id = self.graph.traxel(node).map_or(0, |t| t.id);
                    Error::Merger {
                        id,
                        timestep,
                        source: Box::new(e),
                    }
                })?;
                log::debug!(
                    "splitting merger {} at t={} into {} objects ({} in, {} out)",
                    expansion.merger_id,
                    timestep,
                    expansion.pieces.len(),
                    expansion.incoming.len(),
                    expansion.outgoing.len()
                );
                self.commit(expansion, &mut stats)?;
            }
        }
        Ok(stats)
    }

    /// Active nodes with merger count of at least 2, grouped by time index.
    pub fn merger_nodes(&self) -> BTreeMap<i32, Vec<Node>> {
        let mut mergers: BTreeMap<i32, Vec<Node>> = BTreeMap::new();
        for node in self.graph.active_nodes() {
            if self.graph.merger_count(node) < 2 {
                continue;
            }
            if let Some(traxel) = self.graph.traxel(node) {
                mergers.entry(traxel.timestep).or_default().push(node);
            }
        }
        mergers
    }

    /// Collect arcs into a fresh list.
    pub fn collect_arcs<I>(arcs: I) -> Vec<Arc>
    where
        I: IntoIterator<Item = Arc>,
    {
        arcs.into_iter().collect()
    }

    /// Highest identifier at time index `t`, counting inactive nodes.
    pub fn max_id(&self, t: i32) -> Option<u32> {
        self.graph.max_id(t)
    }

    /// Deactivate arcs.
    pub fn deactivate_arcs(&mut self, arcs: &[Arc]) -> Result<()> {
        for &arc in arcs {
            self.graph.set_arc_active(arc, false)?;
        }
        Ok(())
    }

    /// Deactivate nodes.
    pub fn deactivate_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for &node in nodes {
            self.graph.set_node_active(node, false)?;
        }
        Ok(())
    }

    fn plan(
        &self,
        merger: Node,
        extractor: &dyn FeatureExtractor,
        distance: &dyn Distance,
    ) -> Result<Expansion> {
        let g = &*self.graph;
        let traxel = g.traxel(merger).ok_or(Error::UnknownNode(merger.index()))?;
        let count = g.merger_count(merger);

        // only arcs to active neighbors are rewired; the rest die with the merger
        let live = |a: &Arc, end: Option<Node>| {
            g.is_arc_active(*a) && end.is_some_and(|n| g.is_node_active(n))
        };
        let incoming = Self::collect_arcs(
            g.in_arcs(merger)
                .into_iter()
                .filter(|a| live(a, g.source(*a))),
        );
        let outgoing = Self::collect_arcs(
            g.out_arcs(merger)
                .into_iter()
                .filter(|a| live(a, g.target(*a))),
        );

        let max_id = g.max_id(traxel.timestep).unwrap_or(traxel.id);
        let pieces = extractor.extract(traxel, count, max_id)?;
        check_pieces(&pieces, traxel, count, max_id)?;

        let sources = incoming
            .iter()
            .map(|&a| neighbor(g, a, g.source(a)))
            .collect::<Result<Vec<_>>>()?;
        let targets = outgoing
            .iter()
            .map(|&a| neighbor(g, a, g.target(a)))
            .collect::<Result<Vec<_>>>()?;

        let mut in_weights = Vec::with_capacity(pieces.len());
        let mut out_weights = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            in_weights.push(
                sources
                    .iter()
                    .map(|src| distance.distance(src, piece))
                    .collect::<Result<Vec<_>>>()?,
            );
            out_weights.push(
                targets
                    .iter()
                    .map(|dst| distance.distance(piece, dst))
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        Ok(Expansion {
            merger,
            merger_id: traxel.id,
            pieces,
            incoming,
            outgoing,
            in_weights,
            out_weights,
        })
    }

    fn commit(&mut self, expansion: Expansion, stats: &mut ExpansionStats) -> Result<()> {
        let Expansion {
            merger,
            merger_id,
            pieces,
            incoming,
            outgoing,
            in_weights,
            out_weights,
        } = expansion;

        let sources: Vec<Node> = incoming
            .iter()
            .filter_map(|&a| self.graph.source(a))
            .collect();
        let targets: Vec<Node> = outgoing
            .iter()
            .filter_map(|&a| self.graph.target(a))
            .collect();

        let mut new_ids = Vec::with_capacity(pieces.len());
        for ((piece, w_in), w_out) in pieces.into_iter().zip(in_weights).zip(out_weights) {
            new_ids.push(piece.id);
            let node = self.graph.add_node(piece);
            self.graph.set_node_active(node, true)?;
            self.graph.set_merger_count(node, 1)?;
            self.graph.set_originated_from(node, merger_id)?;
            stats.nodes_created += 1;

            for (&src, w) in sources.iter().zip(w_in) {
                let arc = self.graph.add_arc(src, node)?;
                self.graph.set_arc_weight(arc, w)?;
                self.graph.set_arc_active(arc, true)?;
                stats.arcs_created += 1;
            }
            for (&dst, w) in targets.iter().zip(w_out) {
                let arc = self.graph.add_arc(node, dst)?;
                self.graph.set_arc_weight(arc, w)?;
                self.graph.set_arc_active(arc, true)?;
                stats.arcs_created += 1;
            }
        }

        let mut old_arcs = self.graph.in_arcs(merger);
        old_arcs.extend(self.graph.out_arcs(merger));
        stats.arcs_deactivated += old_arcs
            .iter()
            .filter(|&&a| self.graph.is_arc_active(a))
            .count();
        self.deactivate_arcs(&old_arcs)?;
        self.deactivate_nodes(&[merger])?;
        self.graph.set_resolved_to(merger, new_ids)?;
        stats.mergers += 1;
        Ok(())
    }
}

fn neighbor(graph: &HypothesesGraph, arc: Arc, node: Option<Node>) -> Result<&Traxel> {
    let node = node.ok_or(Error::UnknownArc(arc.index()))?;
    graph.traxel(node).ok_or(Error::UnknownNode(node.index()))
}

/// Reject extractor output that would break identifier or layering invariants.
fn check_pieces(pieces: &[Traxel], merger: &Traxel, count: usize, max_id: u32) -> Result<()> {
    if pieces.len() != count {
        return Err(Error::InvalidParameter {
            name: "extractor",
            message: "returned a different number of objects than requested",
        });
    }
    let mut seen = BTreeSet::new();
    for piece in pieces {
        if piece.timestep != merger.timestep {
            return Err(Error::InvalidParameter {
                name: "extractor",
                message: "returned an object at another time index",
            });
        }
        if piece.id <= max_id || !seen.insert(piece.id) {
            return Err(Error::InvalidParameter {
                name: "extractor",
                message: "returned a colliding identifier",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcs::GreedyArcs;
    use crate::distance::CenterDistance;
    use crate::extract::{CentersFromCandidates, CentersFromKmeans};

    fn at(id: u32, t: i32, center: [f32; 2]) -> Traxel {
        Traxel::new(id, t).with_feature("com", center.to_vec())
    }

    #[test]
    fn construction_requires_tracking_properties() {
        let mut g = HypothesesGraph::without_properties();
        g.add_property(Property::NodeActive);
        g.add_property(Property::MergerCount);
        g.add_property(Property::ArcActive);
        let err = MergerResolver::new(&mut g).unwrap_err();
        assert_eq!(err, Error::MissingProperty(Property::ArcWeight));
        assert!(!g.has_property(Property::ResolvedTo));
    }

    #[test]
    fn construction_adds_provenance() {
        let mut g = HypothesesGraph::new();
        MergerResolver::new(&mut g).unwrap();
        assert!(g.has_property(Property::ResolvedTo));
        assert!(g.has_property(Property::OriginatedFrom));
    }

    #[test]
    fn collect_arcs_starts_empty() {
        let mut g = HypothesesGraph::new();
        let a = g.add_node(Traxel::new(1, 0));
        let b = g.add_node(Traxel::new(1, 1));
        let arc = g.add_arc(a, b).unwrap();
        let first = MergerResolver::collect_arcs(g.out_arcs(a));
        let second = MergerResolver::collect_arcs(g.out_arcs(a));
        assert_eq!(first, vec![arc]);
        assert_eq!(second, vec![arc]);
    }

    #[test]
    fn merger_nodes_skip_inactive_and_singletons() {
        let mut g = HypothesesGraph::new();
        let m1 = g.add_node(Traxel::new(1, 0));
        let m2 = g.add_node(Traxel::new(2, 0));
        let m3 = g.add_node(Traxel::new(1, 3));
        g.add_node(Traxel::new(3, 0));
        for m in [m1, m2, m3] {
            g.set_merger_count(m, 2).unwrap();
        }
        g.set_node_active(m2, false).unwrap();
        let r = MergerResolver::new(&mut g).unwrap();
        let mergers = r.merger_nodes();
        assert_eq!(mergers.get(&0), Some(&vec![m1]));
        assert_eq!(mergers.get(&3), Some(&vec![m3]));
    }

    #[test]
    fn ids_stay_unique_across_mergers_at_one_timestep() {
        let mut g = HypothesesGraph::new();
        let candidates = vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let m1 = g.add_node(Traxel::new(1, 0).with_feature("possibleCOMs", candidates.clone()));
        let m2 = g.add_node(Traxel::new(2, 0).with_feature("possibleCOMs", candidates));
        let hidden = g.add_node(Traxel::new(5, 0));
        g.set_node_active(hidden, false).unwrap();
        g.set_merger_count(m1, 2).unwrap();
        g.set_merger_count(m2, 2).unwrap();

        let mut r = MergerResolver::new(&mut g).unwrap();
        let extractor = CentersFromCandidates::new().with_dim(2);
        let stats = r.expand_mergers(&extractor, &CenterDistance::new()).unwrap();
        assert_eq!(stats.mergers, 2);
        assert_eq!(stats.nodes_created, 4);

        assert_eq!(g.resolved_to(m1), Some(&[6, 7][..]));
        assert_eq!(g.resolved_to(m2), Some(&[8, 9][..]));
        let ids: Vec<u32> = g
            .nodes_at(0)
            .filter_map(|n| g.traxel(n))
            .map(|t| t.id)
            .collect();
        let unique: BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn failing_merger_leaves_no_trace() {
        let mut g = HypothesesGraph::new();
        let x = g.add_node(at(1, 0, [0.0, 1.0]));
        let m = g.add_node(
            Traxel::new(1, 1).with_feature("possibleCOMs", vec![0.0, 0.0, 1.0, 1.0]),
        );
        let arc = g.add_arc(x, m).unwrap();
        g.set_merger_count(m, 2).unwrap();
        let (nodes, arcs) = (g.node_count(), g.arc_count());

        let mut r = MergerResolver::new(&mut g).unwrap();
        let err = r
            .resolve_mergers(
                &CentersFromCandidates::new().with_dim(2),
                &CenterDistance::new(),
                &GreedyArcs::new(),
            )
            .unwrap_err();
        match err {
            Error::Merger { id, timestep, source } => {
                assert_eq!((id, timestep), (1, 1));
                assert!(matches!(*source, Error::MissingFeature { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!((g.node_count(), g.arc_count()), (nodes, arcs));
        assert!(g.is_node_active(m));
        assert!(g.is_arc_active(arc));
        assert_eq!(g.resolved_to(m), None);
    }

    #[test]
    fn failing_distance_aborts_before_mutation() {
        let mut g = HypothesesGraph::new();
        // predecessor without a center
        let x = g.add_node(Traxel::new(1, 0));
        let m = g.add_node(
            Traxel::new(1, 1).with_feature("Coord<ValueList>", vec![0.0, 0.0, 4.0, 4.0]),
        );
        g.add_arc(x, m).unwrap();
        g.set_merger_count(m, 2).unwrap();
        let nodes = g.node_count();

        let mut r = MergerResolver::new(&mut g).unwrap();
        let err = r
            .expand_mergers(&CentersFromKmeans::new().with_dim(2), &CenterDistance::new())
            .unwrap_err();
        assert!(matches!(err, Error::Merger { .. }));
        assert_eq!(g.node_count(), nodes);
    }

    #[test]
    fn extractor_output_is_checked() {
        struct Stale;
        impl FeatureExtractor for Stale {
            fn extract(&self, t: &Traxel, n: usize, _max_id: u32) -> Result<Vec<Traxel>> {
                Ok((0..n).map(|_| Traxel::new(t.id, t.timestep)).collect())
            }
        }
        let mut g = HypothesesGraph::new();
        let m = g.add_node(Traxel::new(3, 0));
        g.set_merger_count(m, 2).unwrap();
        let mut r = MergerResolver::new(&mut g).unwrap();
        assert!(r.expand_mergers(&Stale, &CenterDistance::new()).is_err());
        assert!(g.is_node_active(m));
    }
}
