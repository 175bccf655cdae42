pub mod common;
pub mod native;
mod shared;

pub use common::{CameraParams, LightParams, DEPTH_FORMAT, GBUFFER_FORMATS};
pub use native::Renderer;
