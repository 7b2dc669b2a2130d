//! # cleave
//!
//! Merger resolution for tracking-by-assignment: split hypotheses-graph nodes that stand for
//! several touching objects into one node per object, then restore one-to-one arcs.
//!
//! **Default build** is single-threaded. The `parallel` feature runs the k-means assignment
//! step with rayon.
//!
//! ```rust
//! use cleave::{
//!     CenterDistance, CentersFromMergerCenters, GreedyArcs, HypothesesGraph, MergerResolver,
//!     Traxel,
//! };
//!
//! let mut g = HypothesesGraph::new();
//! let x = g.add_node(Traxel::new(1, 0).with_feature("com", vec![0.0, 1.0]));
//! let m = g.add_node(
//!     Traxel::new(1, 1)
//!         .with_feature("com", vec![2.0, 1.0])
//!         .with_feature("mergerCOMs", vec![0.0, 1.0, 4.0, 1.0]),
//! );
//! g.set_merger_count(m, 2)?;
//! g.add_arc(x, m)?;
//!
//! let extractor = CentersFromMergerCenters::new().with_dim(2);
//! MergerResolver::new(&mut g)?.resolve_mergers(
//!     &extractor,
//!     &CenterDistance::new(),
//!     &GreedyArcs::new(),
//! )?;
//!
//! assert!(!g.is_node_active(m));
//! assert_eq!(g.resolved_to(m), Some(&[2, 3][..]));
//! # Ok::<(), cleave::Error>(())
//! ```

pub mod arcs;
pub mod cluster;
pub mod distance;
/// Error types used across `cleave`.
pub mod error;
pub mod extract;
pub mod graph;
pub mod resolver;
pub mod traxel;
pub mod validate;


pub use arcs::{ArcResolution, ExactArcs, GreedyArcs};
pub use cluster::Kmeans;
pub use distance::{CenterDistance, Distance, Metric};
pub use error::{Error, Result};
pub use extract::{
    CandidateLayout, CentersFromCandidates, CentersFromKmeans, CentersFromMergerCenters,
    FeatureExtractor,
};
pub use graph::{Arc, HypothesesGraph, Node, Property};
pub use resolver::{ExpansionStats, MergerResolver};
pub use traxel::{FeatureArray, FeatureNames, Traxel};
pub use validate::{check_resolution, IssueKind, Severity, ValidationIssue, ValidationReport};
