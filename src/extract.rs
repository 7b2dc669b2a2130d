//! Feature extraction for merger nodes.
//!
//! A [`FeatureExtractor`] turns one merged object record into `n` new records,
//! one per physical object, each carrying an estimated center. Three sources
//! of centers are supported:
//!
//! | Extractor | Reads | Use |
//! |-----------|-------|-----|
//! | [`CentersFromCandidates`] | candidate centers for every count | segmentation already proposed splits |
//! | [`CentersFromKmeans`] | raw coordinate samples | cluster at resolution time |
//! | [`CentersFromMergerCenters`] | centers from an earlier split | nested mergers |
//!
//! New records get identifiers `max_id + 1 ..= max_id + n` at the input's time
//! index.

use crate::cluster::{Kmeans, DEFAULT_SEED};
use crate::error::{Error, Result};
use crate::traxel::{FeatureNames, Traxel};

/// Produces the sub-object records of a merger.
pub trait FeatureExtractor {
    /// Split `traxel` into `n_sub` records with ids above `max_id`.
    fn extract(&self, traxel: &Traxel, n_sub: usize, max_id: u32) -> Result<Vec<Traxel>>;
}

/// How candidate centers for the different merger counts are laid out in one
/// flat feature array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateLayout {
    /// Counts 1, 2, 3, ... back to back: count `n` starts at center
    /// `n * (n - 1) / 2` and spans `n` centers.
    #[default]
    Triangular,
    /// Fixed-size blocks of `width` centers, the first block holding count
    /// `first`; count `n` uses the first `n` centers of block `n - first`.
    Padded {
        /// Count stored in the first block.
        first: usize,
        /// Centers per block.
        width: usize,
    },
}

impl CandidateLayout {
    /// Range of center slots (not coordinates) holding the `n` candidates.
    pub fn slots(&self, n: usize) -> Result<std::ops::Range<usize>> {
        if n == 0 {
            return Err(Error::InvalidParameter {
                name: "n_sub",
                message: "at least one sub-object is required",
            });
        }
        let overflow = Error::InvalidParameter {
            name: "n_sub",
            message: "candidate offset overflows",
        };
        let start = match *self {
            CandidateLayout::Triangular => n.checked_mul(n - 1).map(|s| s / 2),
            CandidateLayout::Padded { first, width } => {
                if n < first || n > width {
                    return Err(Error::InvalidParameter {
                        name: "n_sub",
                        message: "merger count outside the padded candidate layout",
                    });
                }
                (n - first).checked_mul(width)
            }
        };
        let start = start.ok_or_else(|| overflow.clone())?;
        let end = start.checked_add(n).ok_or(overflow)?;
        Ok(start..end)
    }
}

/// Centers sliced from precomputed candidate centers.
#[derive(Debug, Clone)]
pub struct CentersFromCandidates {
    dim: usize,
    layout: CandidateLayout,
    names: FeatureNames,
}

impl CentersFromCandidates {
    /// 3-D centers in triangular layout.
    pub fn new() -> Self {
        Self {
            dim: 3,
            layout: CandidateLayout::default(),
            names: FeatureNames::default(),
        }
    }

    /// Set the number of coordinates per center.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Set the candidate layout.
    pub fn with_layout(mut self, layout: CandidateLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the feature channel names.
    pub fn with_names(mut self, names: FeatureNames) -> Self {
        self.names = names;
        self
    }
}

impl Default for CentersFromCandidates {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for CentersFromCandidates {
    fn extract(&self, traxel: &Traxel, n_sub: usize, max_id: u32) -> Result<Vec<Traxel>> {
        check_request(n_sub, self.dim, max_id)?;
        let feature = &self.names.candidate_centers;
        let candidates = traxel
            .feature(feature)
            .ok_or_else(|| Error::missing_feature(feature, format!("not stored in {traxel}")))?;

        let slots = self.layout.slots(n_sub)?;
        let too_short = |need: String| {
            Error::missing_feature(
                feature,
                format!(
                    "{} values in {traxel}, need {need} for {n_sub} objects",
                    candidates.len()
                ),
            )
        };
        let (Some(start), Some(end)) = (
            slots.start.checked_mul(self.dim),
            slots.end.checked_mul(self.dim),
        ) else {
            return Err(too_short("more than fit in memory".to_string()));
        };
        let centers = candidates
            .get(start..end)
            .ok_or_else(|| too_short(end.to_string()))?;
        Ok(split_centers(traxel, centers, self.dim, max_id, &self.names))
    }
}

/// Centers found by clustering the raw coordinate samples.
#[derive(Debug, Clone)]
pub struct CentersFromKmeans {
    dim: usize,
    seed: u64,
    names: FeatureNames,
}

impl CentersFromKmeans {
    /// Cluster 3-D samples.
    pub fn new() -> Self {
        Self {
            dim: 3,
            seed: DEFAULT_SEED,
            names: FeatureNames::default(),
        }
    }

    /// Set the number of coordinates per sample.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Set the clustering seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the feature channel names.
    pub fn with_names(mut self, names: FeatureNames) -> Self {
        self.names = names;
        self
    }
}

impl Default for CentersFromKmeans {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for CentersFromKmeans {
    fn extract(&self, traxel: &Traxel, n_sub: usize, max_id: u32) -> Result<Vec<Traxel>> {
        check_request(n_sub, self.dim, max_id)?;
        let feature = &self.names.coordinates;
        let samples = traxel
            .feature(feature)
            .ok_or_else(|| Error::missing_feature(feature, format!("not stored in {traxel}")))?;

        let centers = Kmeans::new(n_sub)
            .with_dim(self.dim)
            .with_seed(self.seed)
            .centers(samples)?;
        Ok(split_centers(traxel, &centers, self.dim, max_id, &self.names))
    }
}

/// Centers taken from a merger that was already split in an earlier round.
#[derive(Debug, Clone)]
pub struct CentersFromMergerCenters {
    dim: usize,
    names: FeatureNames,
}

impl CentersFromMergerCenters {
    /// 3-D centers.
    pub fn new() -> Self {
        Self {
            dim: 3,
            names: FeatureNames::default(),
        }
    }

    /// Set the number of coordinates per center.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Set the feature channel names.
    pub fn with_names(mut self, names: FeatureNames) -> Self {
        self.names = names;
        self
    }
}

impl Default for CentersFromMergerCenters {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for CentersFromMergerCenters {
    fn extract(&self, traxel: &Traxel, n_sub: usize, max_id: u32) -> Result<Vec<Traxel>> {
        check_request(n_sub, self.dim, max_id)?;
        let feature = &self.names.merger_centers;
        let centers = traxel
            .feature(feature)
            .ok_or_else(|| Error::missing_feature(feature, format!("not stored in {traxel}")))?;
        if centers.len() != n_sub * self.dim {
            return Err(Error::missing_feature(
                feature,
                format!(
                    "{} values in {traxel}, expected {} for {n_sub} objects",
                    centers.len(),
                    n_sub * self.dim
                ),
            ));
        }
        Ok(split_centers(traxel, centers, self.dim, max_id, &self.names))
    }
}

fn check_request(n_sub: usize, dim: usize, max_id: u32) -> Result<()> {
    if n_sub == 0 {
        return Err(Error::InvalidParameter {
            name: "n_sub",
            message: "at least one sub-object is required",
        });
    }
    if dim == 0 {
        return Err(Error::InvalidParameter {
            name: "dim",
            message: "dimension must be positive",
        });
    }
    let fits = u32::try_from(n_sub)
        .ok()
        .and_then(|n| max_id.checked_add(n))
        .is_some();
    if !fits {
        return Err(Error::InvalidParameter {
            name: "max_id",
            message: "identifier space exhausted",
        });
    }
    Ok(())
}

/// One new record per `dim`-sized chunk of `centers`.
fn split_centers(
    traxel: &Traxel,
    centers: &[f32],
    dim: usize,
    max_id: u32,
    names: &FeatureNames,
) -> Vec<Traxel> {
    // `check_request` guarantees `max_id + n_sub` fits, so no id below wraps
    centers
        .chunks_exact(dim)
        .enumerate()
        .map(|(k, center)| {
            Traxel::new(max_id + (k as u32 + 1), traxel.timestep)
                .with_feature(names.center.clone(), center.to_vec())
                .with_feature(names.count.clone(), vec![1.0])
        })
        .collect()
}
