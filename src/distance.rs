//! Dissimilarity between two object records.
//!
//! Candidate arcs created for the pieces of a merger are scored with a
//! [`Distance`]; the arc resolvers then prefer low scores. Implementations
//! must be pure: the same pair always yields the same value and nothing is
//! mutated.

use crate::error::{Error, Result};
use crate::traxel::{FeatureNames, Traxel};

/// Scores the transition between two objects.
pub trait Distance {
    /// Non-negative dissimilarity of `from` and `to`.
    fn distance(&self, from: &Traxel, to: &Traxel) -> Result<f64>;
}

/// How center coordinates are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// `||a - b||`
    #[default]
    Euclidean,
    /// `||a - b||²`
    SquaredEuclidean,
}

/// Distance between the estimated centers of two objects.
#[derive(Debug, Clone)]
pub struct CenterDistance {
    feature: String,
    metric: Metric,
}

impl CenterDistance {
    /// Euclidean distance of the default center feature.
    pub fn new() -> Self {
        Self {
            feature: FeatureNames::default().center,
            metric: Metric::default(),
        }
    }

    /// Compare a different feature channel.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = feature.into();
        self
    }

    /// Set the metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    fn center<'a>(&self, traxel: &'a Traxel) -> Result<&'a [f32]> {
        let center = traxel.feature(&self.feature).ok_or_else(|| {
            Error::missing_feature(&self.feature, format!("no center for {traxel}"))
        })?;
        if center.is_empty() {
            return Err(Error::missing_feature(
                &self.feature,
                format!("empty center for {traxel}"),
            ));
        }
        if center.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "center",
                message: "center coordinates must be finite",
            });
        }
        Ok(center)
    }
}

impl Default for CenterDistance {
    fn default() -> Self {
        Self::new()
    }
}

impl Distance for CenterDistance {
    fn distance(&self, from: &Traxel, to: &Traxel) -> Result<f64> {
        let a = self.center(from)?;
        let b = self.center(to)?;
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                found: b.len(),
            });
        }
        let squared: f64 = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (f64::from(x) - f64::from(y)).powi(2))
            .sum();
        Ok(match self.metric {
            Metric::Euclidean => squared.sqrt(),
            Metric::SquaredEuclidean => squared,
        })
    }
}
