use glam::{Mat4, Vec3};

use crate::passes::OUTPUT_CHANNELS;

/// Texture format of each main-pass render target, indexed by
/// [`crate::passes::OutputChannel`]: albedo, encoded normal, linear depth,
/// light. The index assignment is part of the composition contract.
pub const GBUFFER_FORMATS: [wgpu::TextureFormat; OUTPUT_CHANNELS] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::R32Float,
    wgpu::TextureFormat::Rgba8Unorm,
];

/// Depth format shared by the shadow maps and the main pass depth buffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Camera parameters consumed by the uniform block builder.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

/// A shadow-casting light: an orthographic frustum aimed at a target plus
/// the resolution of its depth render.
#[derive(Clone, Debug)]
pub struct LightParams {
    pub position: Vec3,
    pub target: Vec3,
    pub extent: f32,
    pub near: f32,
    pub far: f32,
    pub resolution: u32,
    pub color: Vec3,
    pub intensity: f32,
}

impl LightParams {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh(
            -self.extent,
            self.extent,
            -self.extent,
            self.extent,
            self.near,
            self.far,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::OutputChannel;

    #[test]
    fn depth_channel_is_a_single_float_target() {
        assert_eq!(
            GBUFFER_FORMATS[OutputChannel::Depth.index()],
            wgpu::TextureFormat::R32Float
        );
    }

    #[test]
    fn light_projection_spans_the_configured_extent() {
        let light = LightParams {
            position: Vec3::new(-10.0, 12.0, 0.0),
            target: Vec3::new(0.0, 12.0, 0.0),
            extent: 12.0,
            near: 1.0,
            far: 20.0,
            resolution: 1024,
            color: Vec3::ONE,
            intensity: 1.0,
        };
        let corner = light.projection().project_point3(Vec3::new(12.0, 12.0, -1.0));
        assert!((corner.x - 1.0).abs() < 1e-5);
        assert!((corner.y - 1.0).abs() < 1e-5);
        assert!(corner.z.abs() < 1e-5);
    }
}
