use thiserror::Error;

use crate::graph::Property;

/// Result alias for `cleave`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by clustering, extraction and graph resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// The graph lacks a property map the caller requires.
    #[error("hypotheses graph does not have property {0}")]
    MissingProperty(Property),

    /// An object record lacks (or has too little of) a feature.
    #[error("feature '{feature}' unavailable: {detail}")]
    MissingFeature {
        /// Feature channel name.
        feature: String,
        /// What was wrong with it.
        detail: String,
    },

    /// Node handle does not belong to this graph.
    #[error("unknown node index {0}")]
    UnknownNode(usize),

    /// Arc handle does not belong to this graph.
    #[error("unknown arc index {0}")]
    UnknownArc(usize),

    /// Exact arc selection could not produce a solution.
    #[error("arc inference failed: {0}")]
    InferenceFailed(String),

    /// Resolving one merger node failed.
    #[error("failed to resolve merger {id} at t={timestep}: {source}")]
    Merger {
        /// Identifier of the merger object.
        id: u32,
        /// Time index of the merger object.
        timestep: i32,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn missing_feature(feature: &str, detail: impl Into<String>) -> Self {
        Error::MissingFeature {
            feature: feature.to_string(),
            detail: detail.into(),
        }
    }
}
