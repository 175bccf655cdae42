//! Core systems of a skinned character viewer, rewritten in Rust.
//!
//! The crate owns the data-layout contract between the CPU-side scene and
//! the GPU pipeline: the packed per-vertex skinning attributes, the
//! per-draw uniform block with its pair of shadow projections, and the
//! four-channel render-target contract a downstream composition stage
//! consumes.  Model parsing, animation solving and the final composition
//! are deliberately kept outside so the core stays testable headless.

pub mod binder;
pub mod mesh;
pub mod passes;
pub mod pose;
pub mod render;
pub mod scene;
pub mod skinning;
pub mod uniforms;

pub use binder::{validate_palette_binding, validate_projection, BindError};
pub use mesh::{rigged_column, SkinnedMesh};
pub use passes::{
    shade_fragment, DepthMap, FragOutput, FragmentSample, OutputChannel, PassGraph, PassId,
    ShadowSchedule, ShadowStage, OUTPUT_CHANNELS,
};
pub use pose::{swing_pose, PoseModel};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{Scene, SceneObject};
pub use skinning::{skin_mesh, skin_vertex, SkinnedVertex};
pub use uniforms::{DrawUniforms, MaterialParams, UniformBlockBuilder, UniformRing};
