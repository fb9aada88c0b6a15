//! Engine data structures: models, materials, and textures.
//!
//! - `model` contains mesh and material definitions, GPU resources for the
//!   loaded product model
//! - `texture` contains the GPU texture wrapper and creation utilities

pub mod model;
pub mod texture;
