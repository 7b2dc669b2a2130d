//! Object records bound to graph nodes.
//!
//! A [`Traxel`] is one detected object at one time index. Its identifier is
//! unique within the time index; everything else the tracker knows about the
//! object lives in a map from feature channel name to a flat `f32` array.
//!
//! Positions are stored flat: a 3-D center is `[x, y, z]`, a list of `n`
//! 3-D coordinate samples is `[x0, y0, z0, x1, y1, z1, ...]`.

use std::collections::BTreeMap;
use std::fmt;

/// A flat feature array.
pub type FeatureArray = Vec<f32>;

/// Names of the feature channels read and written during merger resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureNames {
    /// Estimated center of the object.
    pub center: String,
    /// Candidate centers for every possible merger count.
    pub candidate_centers: String,
    /// Centers a merger was already split into in an earlier round.
    pub merger_centers: String,
    /// Raw coordinate samples of the object's pixels/voxels.
    pub coordinates: String,
    /// Number of physical objects the record stands for.
    pub count: String,
}

impl Default for FeatureNames {
    fn default() -> Self {
        Self {
            center: "com".to_string(),
            candidate_centers: "possibleCOMs".to_string(),
            merger_centers: "mergerCOMs".to_string(),
            coordinates: "Coord<ValueList>".to_string(),
            count: "count".to_string(),
        }
    }
}

/// A detected object at a single time index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traxel {
    /// Identifier, unique within `timestep`.
    pub id: u32,
    /// Discrete time index.
    pub timestep: i32,
    /// Feature channels.
    pub features: BTreeMap<String, FeatureArray>,
}

impl Traxel {
    /// Create a record without features.
    pub fn new(id: u32, timestep: i32) -> Self {
        Self {
            id,
            timestep,
            features: BTreeMap::new(),
        }
    }

    /// Attach a feature, replacing any previous value.
    pub fn with_feature(mut self, name: impl Into<String>, values: FeatureArray) -> Self {
        self.features.insert(name.into(), values);
        self
    }

    /// Look up a feature channel.
    pub fn feature(&self, name: &str) -> Option<&[f32]> {
        self.features.get(name).map(Vec::as_slice)
    }

    /// Set a feature channel.
    pub fn set_feature(&mut self, name: impl Into<String>, values: FeatureArray) {
        self.features.insert(name.into(), values);
    }
}

impl fmt::Display for Traxel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Traxel(t={}, id={})", self.timestep, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_lookup() {
        let t = Traxel::new(4, 2).with_feature("com", vec![1.0, 2.0, 3.0]);
        assert_eq!(t.feature("com"), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(t.feature("missing"), None);
        assert_eq!(t.to_string(), "Traxel(t=2, id=4)");
    }
}
