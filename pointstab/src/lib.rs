//! # PointStab Library
//!
//! The `pointstab` library stabilizes an image sequence with point features and an
//! affine motion model. Features are tracked against a keyframe, a robust estimator
//! fits the motion from each frame to its keyframe, and the motion accumulated across
//! keyframes warps every frame into a fixed reference frame. Tracking loss and drift
//! re-anchor the reference frame on the current frame.
//!
//! ## Overview of Modules
//!
//! - **`stabilization_controller`**: The per-frame state machine. Decides between
//!   stabilizing, promoting the keyframe, and resetting the reference frame.
//!
//! - **`affine_transform`**: Provides the `AffineTransform` struct for 2D affine maps,
//!   with composition, inversion and point transformation.
//!
//! - **`photo`**: Defines a basic `Photo` struct for storing 8-bit pixel data in grey,
//!   RGB or RGBA layout, with pixel access helpers.
//!
//! - **`feature_pair`**: A tracked point seen in the keyframe and in the current frame.
//!
//! - **`point_tracker`**, **`model_matcher`**, **`affine_warp`**: The collaborator
//!   traits the controller is generic over, plus a bilinear warper.
//!
//! - **`ransac_affine_matcher`**: A RANSAC affine estimator implementing `ModelMatcher`.
//!
//! - **`circular_feature_tracker`**: A point tracker implementing `PointTracker` on top of
//!   circular colour descriptors.
//!
//! - **`circular_feature_grid`** (private): Computes circular descriptors over a strided
//!   grid of image positions.
//!
//! - **`circular_feature_descriptor`**: The "centre of mass" colour descriptor of a
//!   circular region.
//!
//! - **`circular_feature_descriptor_matcher`** (private): kd-tree lookup of descriptor
//!   candidates for a tracked point.
//!
//! - **`config`**: Stabilizer thresholds.

pub mod affine_transform;
pub mod affine_warp;
pub mod config;
pub mod feature_pair;
pub mod model_matcher;
pub mod photo;
pub mod point_tracker;
pub mod stabilization_controller;

pub mod circular_feature_descriptor;
pub mod circular_feature_tracker;
pub mod ransac_affine_matcher;

mod circular_feature_descriptor_matcher;
mod circular_feature_grid;

pub use affine_transform::AffineTransform;
pub use affine_warp::{BilinearAffineWarper, PixelWarper};
pub use circular_feature_tracker::{CircularFeatureTracker, TrackerConfig};
pub use config::StabilizerConfig;
pub use error::{Error, Result};
pub use feature_pair::FeaturePair;
pub use model_matcher::ModelMatcher;
pub use photo::{Photo, PixelFormat};
pub use point_tracker::{PointTracker, SingleImageInput};
pub use ransac_affine_matcher::{RansacAffineMatcher, RansacConfig};
pub use stabilization_controller::{FrameOutcome, ResetReason, StabilizationController};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod error {
    use thiserror::Error;

    /// Errors that can occur in pointstab.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid image: {0}")]
        InvalidImage(String),

        #[error("Transform is not invertible (determinant {0})")]
        SingularTransform(f32),
    }

    /// Result type for pointstab operations.
    pub type Result<T> = std::result::Result<T, Error>;
}
