//! Consistency checks for a resolved hypotheses graph.
//!
//! After [`MergerResolver::resolve_mergers`](crate::MergerResolver::resolve_mergers)
//! the active part of the graph should describe plain one-object tracks:
//!
//! - no active node with merger count of 2 or more
//! - at most one active incoming and one active outgoing arc per active node
//! - unique identifiers per time index
//! - provenance that points both ways between a merger and its pieces
//!
//! [`check_resolution`] collects every violation into a [`ValidationReport`]
//! instead of failing on the first one. Each finding is an [`IssueKind`]
//! anchored to the node or arc it was found on.
//!
//! # Example
//!
//! ```rust
//! use cleave::{check_resolution, HypothesesGraph, Traxel};
//!
//! let mut g = HypothesesGraph::new();
//! let a = g.add_node(Traxel::new(1, 0));
//! let b = g.add_node(Traxel::new(1, 1));
//! g.add_arc(a, b).unwrap();
//!
//! let report = check_resolution(&g);
//! assert!(report.is_clean(), "{report}");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::graph::{Arc, HypothesesGraph, Node, Property};

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, not a problem.
    Info,
    /// Unusual input the resolvers tolerate.
    Warning,
    /// A broken invariant of the resolved graph.
    Error,
    /// Identifiers or property maps can no longer be trusted.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

/// What [`check_resolution`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A property map the check relies on is absent.
    MissingProperty(Property),
    /// Two nodes share an identifier at one time index.
    DuplicateId,
    /// Active node with merger count of 2 or more.
    UnresolvedMerger,
    /// More than one active arc enters the node.
    AmbiguousIncoming,
    /// More than one active arc leaves the node.
    AmbiguousOutgoing,
    /// Active arc with an inactive endpoint.
    InactiveEndpoint,
    /// Arc not going from `t` to `t + 1`.
    NonConsecutiveArc,
    /// A merger with a resolved-to list is still active.
    ResolvedMergerActive,
    /// Resolved-to list length differs from the merger count.
    WrongSplitCount,
    /// A split object does not name its merger as origin.
    BrokenProvenance,
}

impl IssueKind {
    /// Fixed severity of this kind of finding.
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::MissingProperty(_) | IssueKind::DuplicateId => Severity::Critical,
            IssueKind::InactiveEndpoint | IssueKind::NonConsecutiveArc => Severity::Warning,
            IssueKind::UnresolvedMerger
            | IssueKind::AmbiguousIncoming
            | IssueKind::AmbiguousOutgoing
            | IssueKind::ResolvedMergerActive
            | IssueKind::WrongSplitCount
            | IssueKind::BrokenProvenance => Severity::Error,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::MissingProperty(p) => write!(f, "graph lacks the {p} map"),
            IssueKind::DuplicateId => f.write_str("identifier used more than once"),
            IssueKind::UnresolvedMerger => f.write_str("unresolved merger"),
            IssueKind::AmbiguousIncoming => f.write_str("ambiguous incoming arcs"),
            IssueKind::AmbiguousOutgoing => f.write_str("ambiguous outgoing arcs"),
            IssueKind::InactiveEndpoint => f.write_str("active arc touches an inactive node"),
            IssueKind::NonConsecutiveArc => f.write_str("arc skips or reverses time"),
            IssueKind::ResolvedMergerActive => f.write_str("resolved merger is still active"),
            IssueKind::WrongSplitCount => f.write_str("resolved into the wrong number of objects"),
            IssueKind::BrokenProvenance => f.write_str("split object does not point back"),
        }
    }
}

/// One finding, anchored to a node or an arc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// What is wrong.
    pub kind: IssueKind,
    /// Node the finding is about.
    pub node: Option<Node>,
    /// Arc the finding is about.
    pub arc: Option<Arc>,
    /// Counts, identifiers or time indices involved.
    pub detail: Option<String>,
}

impl ValidationIssue {
    fn new(kind: IssueKind) -> Self {
        Self {
            kind,
            node: None,
            arc: None,
            detail: None,
        }
    }

    fn on_node(kind: IssueKind, node: Node) -> Self {
        Self {
            node: Some(node),
            ..Self::new(kind)
        }
    }

    fn on_arc(kind: IssueKind, arc: Arc) -> Self {
        Self {
            arc: Some(arc),
            ..Self::new(kind)
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity(), self.kind)?;
        match (self.node, self.arc) {
            (Some(node), _) => write!(f, " at node {}", node.index())?,
            (None, Some(arc)) => write!(f, " at arc {}", arc.index())?,
            (None, None) => {}
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Findings of one [`check_resolution`] run, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// No `Error` or `Critical` finding.
    pub fn is_healthy(&self) -> bool {
        self.issues.iter().all(|i| i.severity() < Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Findings of `min_severity` or worse.
    pub fn issues_at_level(&self, min_severity: Severity) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() >= min_severity)
            .collect()
    }

    /// Findings of one kind.
    pub fn of_kind(&self, kind: IssueKind) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.kind == kind).collect()
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("graph is consistent");
        }
        let errors = self.issues_at_level(Severity::Error).len();
        writeln!(
            f,
            "{} issues, {} of them errors or worse",
            self.issues.len(),
            errors
        )?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Check the active part of `graph` for leftovers of merger resolution.
///
/// Every active arc counts towards the one-arc-per-direction rule, whatever
/// the state of its other endpoint; such arcs are additionally reported as
/// [`IssueKind::InactiveEndpoint`].
pub fn check_resolution(graph: &HypothesesGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    for property in [
        Property::NodeActive,
        Property::MergerCount,
        Property::ArcActive,
    ] {
        if !graph.has_property(property) {
            report.push(ValidationIssue::new(IssueKind::MissingProperty(property)));
        }
    }
    if !report.is_clean() {
        return report;
    }

    let mut ids: BTreeMap<(i32, u32), Vec<Node>> = BTreeMap::new();
    for node in graph.nodes() {
        if let Some(t) = graph.traxel(node) {
            ids.entry((t.timestep, t.id)).or_default().push(node);
        }
    }
    for ((timestep, id), nodes) in ids.iter().filter(|(_, n)| n.len() > 1) {
        report.push(
            ValidationIssue::on_node(IssueKind::DuplicateId, nodes[0])
                .detail(format!("id {id} at t={timestep} on {} nodes", nodes.len())),
        );
    }

    for node in graph.active_nodes() {
        let count = graph.merger_count(node);
        if count >= 2 {
            report.push(
                ValidationIssue::on_node(IssueKind::UnresolvedMerger, node)
                    .detail(format!("merger count {count}")),
            );
        }
        for (kind, arcs) in [
            (IssueKind::AmbiguousIncoming, graph.in_arcs(node)),
            (IssueKind::AmbiguousOutgoing, graph.out_arcs(node)),
        ] {
            let active = arcs.iter().filter(|&&a| graph.is_arc_active(a)).count();
            if active > 1 {
                report.push(ValidationIssue::on_node(kind, node).detail(format!("{active} active")));
            }
        }
    }

    for arc in graph.active_arcs() {
        let Some((s, t)) = graph.endpoints(arc) else {
            continue;
        };
        if !graph.is_node_active(s) || !graph.is_node_active(t) {
            report.push(ValidationIssue::on_arc(IssueKind::InactiveEndpoint, arc));
        }
        if let (Some(a), Some(b)) = (graph.traxel(s), graph.traxel(t)) {
            if b.timestep != a.timestep + 1 {
                report.push(
                    ValidationIssue::on_arc(IssueKind::NonConsecutiveArc, arc)
                        .detail(format!("t={} to t={}", a.timestep, b.timestep)),
                );
            }
        }
    }

    if graph.has_property(Property::ResolvedTo) {
        check_provenance(graph, &mut report);
    }

    report
}

fn check_provenance(graph: &HypothesesGraph, report: &mut ValidationReport) {
    for node in graph.nodes() {
        let (Some(children), Some(traxel)) = (graph.resolved_to(node), graph.traxel(node)) else {
            continue;
        };
        if graph.is_node_active(node) {
            report.push(ValidationIssue::on_node(IssueKind::ResolvedMergerActive, node));
        }
        if children.len() != graph.merger_count(node) {
            report.push(
                ValidationIssue::on_node(IssueKind::WrongSplitCount, node).detail(format!(
                    "merger count {}, {} objects",
                    graph.merger_count(node),
                    children.len()
                )),
            );
        }
        for &child_id in children {
            let back = graph
                .find_node(traxel.timestep, child_id)
                .and_then(|child| graph.originated_from(child));
            if back != Some(traxel.id) {
                report.push(
                    ValidationIssue::on_node(IssueKind::BrokenProvenance, node)
                        .detail(format!("object {child_id} at t={}", traxel.timestep)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traxel::Traxel;

    fn track() -> (HypothesesGraph, Vec<Node>) {
        let mut g = HypothesesGraph::new();
        let nodes: Vec<Node> = (0..3).map(|t| g.add_node(Traxel::new(1, t))).collect();
        for w in nodes.windows(2) {
            g.add_arc(w[0], w[1]).unwrap();
        }
        (g, nodes)
    }

    #[test]
    fn plain_track_is_clean() {
        let (g, _) = track();
        let report = check_resolution(&g);
        assert!(report.is_clean(), "{report}");
        assert_eq!(report.to_string(), "graph is consistent");
    }

    #[test]
    fn active_merger_is_an_error() {
        let (mut g, nodes) = track();
        g.set_merger_count(nodes[1], 2).unwrap();
        let report = check_resolution(&g);
        assert!(!report.is_healthy());
        let found = report.of_kind(IssueKind::UnresolvedMerger);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, Some(nodes[1]));
        assert_eq!(report.issues_at_level(Severity::Error).len(), 1);
    }

    #[test]
    fn inactive_merger_is_ignored() {
        let (mut g, nodes) = track();
        g.set_merger_count(nodes[1], 2).unwrap();
        g.set_node_active(nodes[1], false).unwrap();
        let report = check_resolution(&g);
        assert!(report.is_healthy(), "{report}");
        // the two arcs now touch an inactive node
        let dangling = report.of_kind(IssueKind::InactiveEndpoint);
        assert_eq!(dangling.len(), 2);
        assert!(dangling.iter().all(|i| i.arc.is_some() && i.node.is_none()));
    }

    #[test]
    fn ambiguous_arcs_are_errors() {
        let (mut g, nodes) = track();
        let extra = g.add_node(Traxel::new(2, 1));
        g.add_arc(nodes[0], extra).unwrap();
        let report = check_resolution(&g);
        assert_eq!(report.issues_at_level(Severity::Error).len(), 1);
        assert_eq!(report.of_kind(IssueKind::AmbiguousOutgoing).len(), 1);
    }

    #[test]
    fn arcs_from_inactive_nodes_still_count() {
        let (mut g, nodes) = track();
        let ghost = g.add_node(Traxel::new(2, 0));
        g.add_arc(ghost, nodes[1]).unwrap();
        g.set_node_active(ghost, false).unwrap();

        let report = check_resolution(&g);
        assert!(!report.is_healthy());
        let ambiguous = report.of_kind(IssueKind::AmbiguousIncoming);
        assert_eq!(ambiguous.len(), 1);
        assert_eq!(ambiguous[0].node, Some(nodes[1]));
        assert_eq!(report.of_kind(IssueKind::InactiveEndpoint).len(), 1);
    }

    #[test]
    fn duplicate_ids_are_critical() {
        let (mut g, _) = track();
        g.add_node(Traxel::new(1, 1));
        let report = check_resolution(&g);
        assert_eq!(report.issues_at_level(Severity::Critical).len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::DuplicateId);
    }

    #[test]
    fn time_skipping_arc_warns() {
        let (mut g, _) = track();
        let late = g.add_node(Traxel::new(2, 2));
        let skip = g.add_node(Traxel::new(2, 0));
        let arc = g.add_arc(skip, late).unwrap();
        let report = check_resolution(&g);
        assert!(report.is_healthy(), "{report}");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::NonConsecutiveArc);
        assert_eq!(report.issues[0].arc, Some(arc));
        assert!(report.to_string().contains("t=0 to t=2"));
    }

    #[test]
    fn broken_provenance_is_reported() {
        let mut g = HypothesesGraph::new();
        g.add_property(Property::ResolvedTo);
        g.add_property(Property::OriginatedFrom);
        let merger = g.add_node(Traxel::new(1, 0));
        g.set_merger_count(merger, 2).unwrap();
        g.set_node_active(merger, false).unwrap();
        let a = g.add_node(Traxel::new(2, 0));
        g.add_node(Traxel::new(3, 0));
        g.set_originated_from(a, 1).unwrap();
        // object 3 never learned where it came from
        g.set_resolved_to(merger, vec![2, 3]).unwrap();

        let report = check_resolution(&g);
        assert_eq!(report.issues_at_level(Severity::Error).len(), 1);
        let broken = report.of_kind(IssueKind::BrokenProvenance);
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].detail.as_deref(), Some("object 3 at t=0"));
    }

    #[test]
    fn missing_maps_short_circuit() {
        let g = HypothesesGraph::without_properties();
        let report = check_resolution(&g);
        assert_eq!(report.issues_at_level(Severity::Critical).len(), 3);
        assert_eq!(
            report.issues[0].kind,
            IssueKind::MissingProperty(Property::NodeActive)
        );
    }
}
