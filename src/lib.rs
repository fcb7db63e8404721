//! voxvis
//!
//! An interactive 3D visualizer for volumetric scalar/color data overlaid with
//! mesh geometry. A single render thread owns the graphics context and runs a
//! multi-pass pipeline (geometry, deferred lighting, volume compositing,
//! selection, overlays), while any number of producer threads submit or update
//! geometry and volumes through a thread-safe admission queue.
//!
//! High-level modules
//! - `camera`: orbit camera, controller and uniforms for view/projection
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `admission`: cross-thread inbox for scene mutations and pick requests
//! - `scene`: authoritative store of live geometry and volume records
//! - `data_structures`: engine data models (meshes, textures, volumes)
//! - `pipelines`: definitions for the per-pass render pipelines
//! - `pick`: double-buffered selection targets and texel read-back
//! - `render`: per-frame pass orchestration
//! - `visualizer`: public facade and the window event loop
//!

pub mod admission;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod pick;
pub mod pipelines;
pub mod render;
pub mod scene;
pub mod visualizer;

// Re-exports commonly used types for convenience in downstream code.
pub use crate::admission::{PendingOp, PickResult};
pub use crate::data_structures::mesh::{MeshVertex, unit_cube};
pub use crate::data_structures::volume::{VolumeDescriptor, VolumeKind};
pub use crate::scene::{Light, Material, Transform};
pub use crate::visualizer::{SceneClient, Visualizer};
pub use cgmath::*;
pub use winit::dpi::PhysicalPosition;
