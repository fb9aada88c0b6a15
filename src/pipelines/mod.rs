//! Render pipeline definitions: the PBR pass, the environment background
//! pass, and the mipmap generator.

pub mod mipmap;
pub mod pbr;
pub mod sky;
