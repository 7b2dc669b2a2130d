//! Clustering of raw coordinate samples.
//!
//! A merger's raw coordinates (the pixels or voxels of the merged detection)
//! form `k` spatial blobs when the merger stands for `k` objects. K-means
//! recovers one center per blob:
//!
//! ```text
//!   · · ·         · · ·            ×           ×
//!   · · · · · · · · · ·    ──▶
//!   · · ·         · · ·       (k = 2 centers)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cleave::cluster::Kmeans;
//!
//! // four 2-D samples, two per object
//! let samples = [0.0, 0.0, 0.0, 2.0, 4.0, 0.0, 4.0, 2.0];
//! let centers = Kmeans::new(2).with_dim(2).centers(&samples).unwrap();
//! assert_eq!(centers.len(), 4);
//! assert!((centers[1] - 1.0).abs() < 1e-5);
//! ```

mod kmeans;

pub use kmeans::{centers_from_labels, to_matrix, Kmeans, KmeansFit, DEFAULT_SEED};
