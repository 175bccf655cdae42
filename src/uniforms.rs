use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

/// Per-draw uniform block in the exact order the shaders read it.
///
/// All 4x4 matrices are column-major as glam stores them; `normal` is a 3x3
/// whose columns are padded to 16 bytes to match the WGSL `mat3x3<f32>`
/// layout. The block is replaced wholesale every frame and never patched
/// field by field while a draw may be reading it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub shadow: [[f32; 4]; 4],
    pub shadow_gb: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
}

impl DrawUniforms {
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_view)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }

    /// Maps a world-space position into the primary light's clip space.
    pub fn shadow_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.shadow)
    }

    /// Maps a world-space position into the secondary light's clip space.
    pub fn shadow_gb_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.shadow_gb)
    }

    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_cols_array(&[
            self.normal[0][0],
            self.normal[0][1],
            self.normal[0][2],
            self.normal[1][0],
            self.normal[1][1],
            self.normal[1][2],
            self.normal[2][0],
            self.normal[2][1],
            self.normal[2][2],
        ])
    }
}

/// Material constants carried alongside the draw uniforms.
///
/// `specular[3]` holds the specular power; ambient and specular ride through
/// to the composition stage untouched by the geometry pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialParams {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [1.0, 1.0, 1.0, 1.0],
            specular: [0.3, 0.3, 0.3, 16.0],
        }
    }
}

/// Assembles the per-draw uniform block from the camera and the two
/// shadow-casting lights.
///
/// Camera matrices are fixed for the frame; `build` is called once per draw
/// with that draw's node world transform and returns a complete block.
#[derive(Clone, Debug)]
pub struct UniformBlockBuilder {
    view: Mat4,
    projection: Mat4,
    primary_light: Option<(Mat4, Mat4)>,
    secondary_light: Option<(Mat4, Mat4)>,
}

impl UniformBlockBuilder {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            primary_light: None,
            secondary_light: None,
        }
    }

    /// Sets the primary light's view and projection.
    pub fn primary_light(mut self, view: Mat4, projection: Mat4) -> Self {
        self.primary_light = Some((view, projection));
        self
    }

    /// Sets the secondary light's view and projection. Its parameters are
    /// independent of the primary's, so the lighting system may use it for a
    /// cascade, a differently filtered map, or an alternate resolution.
    pub fn secondary_light(mut self, view: Mat4, projection: Mat4) -> Self {
        self.secondary_light = Some((view, projection));
        self
    }

    /// Builds the whole block for one draw.
    ///
    /// `model_view` is cached here so the vertex stage never re-derives it;
    /// an absent light collapses its shadow matrix to the identity, which
    /// downstream sampling treats as fully lit.
    pub fn build(&self, model: Mat4) -> DrawUniforms {
        let model_view = self.view * model;
        let shadow = match self.primary_light {
            Some((view, projection)) => projection * view * model,
            None => Mat4::IDENTITY,
        };
        let shadow_gb = match self.secondary_light {
            Some((view, projection)) => projection * view * model,
            None => Mat4::IDENTITY,
        };
        let normal = Mat3::from_mat4(model).inverse().transpose();

        DrawUniforms {
            model: model.to_cols_array_2d(),
            model_view: model_view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            shadow: shadow.to_cols_array_2d(),
            shadow_gb: shadow_gb.to_cols_array_2d(),
            normal: mat3_to_padded(normal),
        }
    }

    pub fn has_light(&self) -> bool {
        self.primary_light.is_some() || self.secondary_light.is_some()
    }
}

// mat3x3 columns are 16-byte aligned on the GPU, so each column carries a
// trailing pad float.
fn mat3_to_padded(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// Ring of uniform blocks, at least double-buffered, so the CPU can fill
/// the next frame's block while the GPU still reads the previous one.
///
/// A published slot is only written again once the ring has wrapped past
/// it, which keeps every in-flight block immutable.
#[derive(Debug)]
pub struct UniformRing {
    slots: Vec<DrawUniforms>,
    cursor: usize,
}

impl UniformRing {
    pub const DEFAULT_DEPTH: usize = 3;

    pub fn new(depth: usize) -> Self {
        Self {
            slots: vec![DrawUniforms::zeroed(); depth.max(2)],
            cursor: 0,
        }
    }

    /// Writes the next slot wholesale and returns its index.
    pub fn publish(&mut self, block: DrawUniforms) -> usize {
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.slots[self.cursor] = block;
        self.cursor
    }

    pub fn slot(&self, index: usize) -> &DrawUniforms {
        &self.slots[index]
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4Swizzles};

    fn assert_close(a: Mat4, b: Mat4, tolerance: f32) {
        let a = a.to_cols_array();
        let b = b.to_cols_array();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tolerance, "{x} vs {y}");
        }
    }

    #[test]
    fn model_view_is_view_times_model() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);
        let model = Mat4::from_rotation_y(0.7) * Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0));
        let block = UniformBlockBuilder::new(view, Mat4::IDENTITY).build(model);
        assert_close(block.model_view_matrix(), view * model, 1e-5);
    }

    #[test]
    fn shadow_matrices_compose_light_view_projection_with_model() {
        let light_view = Mat4::look_at_rh(Vec3::new(-10.0, 12.0, 0.0), Vec3::new(0.0, 12.0, 0.0), Vec3::Y);
        let light_proj = Mat4::orthographic_rh(-12.0, 12.0, -12.0, 12.0, 1.0, 20.0);
        let model = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let block = UniformBlockBuilder::new(Mat4::IDENTITY, Mat4::IDENTITY)
            .primary_light(light_view, light_proj)
            .build(model);
        assert_close(block.shadow_matrix(), light_proj * light_view * model, 1e-5);
        // absent secondary light collapses to identity
        assert_eq!(block.shadow_gb_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn absent_lights_collapse_both_shadow_matrices() {
        let block = UniformBlockBuilder::new(Mat4::IDENTITY, Mat4::IDENTITY)
            .build(Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(block.shadow_matrix(), Mat4::IDENTITY);
        assert_eq!(block.shadow_gb_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn normal_matrix_preserves_direction_under_uniform_scale() {
        let model = Mat4::from_scale(Vec3::splat(3.5)) * Mat4::from_rotation_x(0.4);
        let block = UniformBlockBuilder::new(Mat4::IDENTITY, Mat4::IDENTITY).build(model);
        let n = Vec3::new(0.0, 1.0, 0.0);
        let expected = (Mat3::from_mat4(model) * n).normalize();
        let transformed = (block.normal_matrix() * n).normalize();
        assert!((transformed - expected).length() < 1e-5);
    }

    #[test]
    fn normal_matrix_corrects_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let block = UniformBlockBuilder::new(Mat4::IDENTITY, Mat4::IDENTITY).build(model);
        // a plane normal along +X must stay along +X after correction
        let transformed = (block.normal_matrix() * Vec3::X).normalize();
        assert!((transformed - Vec3::X).length() < 1e-5);
        // while the naive model transform would shear a diagonal normal,
        // the inverse-transpose keeps it perpendicular to the surface
        let slanted = Vec3::new(1.0, 1.0, 0.0).normalize();
        let surface = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let posed_surface = (Mat3::from_mat4(model) * surface).normalize();
        let posed_normal = (block.normal_matrix() * slanted).normalize();
        assert!(posed_normal.dot(posed_surface).abs() < 1e-5);
    }

    #[test]
    fn block_layout_matches_shader_struct() {
        // five mat4x4 plus one padded mat3x3
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 5 * 64 + 48);
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let block = UniformBlockBuilder::new(Mat4::IDENTITY, projection).build(Mat4::IDENTITY);
        assert_close(block.projection_matrix(), projection, 0.0);
        let w_axis = block.projection_matrix().w_axis;
        assert_eq!(w_axis.xyz(), projection.w_axis.xyz());
    }

    #[test]
    fn ring_is_at_least_double_buffered_and_wraps() {
        let mut ring = UniformRing::new(1);
        assert_eq!(ring.depth(), 2);

        let mut ring = UniformRing::new(UniformRing::DEFAULT_DEPTH);
        let builder = UniformBlockBuilder::new(Mat4::IDENTITY, Mat4::IDENTITY);
        let a = ring.publish(builder.build(Mat4::from_translation(Vec3::X)));
        let b = ring.publish(builder.build(Mat4::from_translation(Vec3::Y)));
        assert_ne!(a, b);
        // the earlier slot is untouched by the later publish
        assert_eq!(ring.slot(a).model_matrix(), Mat4::from_translation(Vec3::X));
        let c = ring.publish(builder.build(Mat4::IDENTITY));
        let d = ring.publish(builder.build(Mat4::IDENTITY));
        assert_ne!(c, d);
        assert_eq!(d, a); // wrapped
    }
}
