//! Engine data models: mesh vertex layouts, GPU textures and volumes.

pub mod mesh;
pub mod texture;
pub mod volume;
