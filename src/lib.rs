//! Component-segment coordinate engine.
//!
//! Bilinear segment patches, multi-segment `(eta, xsi)` component
//! coordinates with edge elongation, planar polyline helpers, and the
//! nonlinear optimizers that drive point projection.

pub mod error;
pub mod geometry;
pub mod math;
pub mod operations;
pub mod optimize;

pub use error::{AeroSegError, Result};
