use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3};

/// Per-vertex attributes of a skinned mesh, laid out exactly as the GPU
/// vertex buffer expects them: position, normal, texture coordinate, four
/// bone weights and four 16-bit bone indices, tightly packed.
///
/// The field order and widths are a wire contract shared with the shaders
/// in `render::shared`; reordering fields silently corrupts every draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub bone_weights: [f32; 4],
    pub bone_indices: [u16; 4],
}

impl SkinnedVertex {
    /// Packed size in bytes: 12 + 12 + 8 + 16 + 8.
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = [
        // position
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: 0,
        },
        // normal
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 12,
            shader_location: 1,
        },
        // uv
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 24,
            shader_location: 2,
        },
        // weights
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 32,
            shader_location: 3,
        },
        // indices
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Uint16x4,
            offset: 48,
            shader_location: 4,
        },
    ];

    /// Vertex buffer layout matching [`SkinnedVertex`]'s packed fields.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::STRIDE as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    pub fn rest_position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn rest_normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn tex_coord(&self) -> Vec2 {
        Vec2::from_array(self.tex_coord)
    }
}

/// Poses a single vertex against the bone palette.
///
/// The posed position is the weighted sum of `palette[index] * rest_position`
/// over the four influences; the posed normal blends only the linear 3x3
/// part of each bone transform and is renormalized afterwards.
///
/// Two policies are contractual here, not error paths:
/// - An index paired with a nonzero weight that falls outside the palette is
///   clamped to the last valid entry.
/// - A weight sum below 1 leaves the deficit undeformed (the rest pose fills
///   the gap). No renormalization is performed; silently "fixing" the sum
///   would change visual output for meshes authored this way.
pub fn skin_vertex(vertex: &SkinnedVertex, palette: &[Mat4]) -> (Vec3, Vec3) {
    let rest_position = vertex.rest_position();
    let rest_normal = vertex.rest_normal();
    if palette.is_empty() {
        return (rest_position, rest_normal);
    }

    let last = palette.len() - 1;
    let mut position = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut weight_sum = 0.0;

    for influence in 0..4 {
        let weight = vertex.bone_weights[influence];
        if weight == 0.0 {
            // Inert influence; its index need not be valid.
            continue;
        }
        let index = (vertex.bone_indices[influence] as usize).min(last);
        let bone = palette[index];
        position += weight * bone.transform_point3(rest_position);
        normal += weight * (Mat3::from_mat4(bone) * rest_normal);
        weight_sum += weight;
    }

    if weight_sum < 1.0 {
        let deficit = 1.0 - weight_sum;
        position += deficit * rest_position;
        normal += deficit * rest_normal;
    }

    (position, normal.normalize_or_zero())
}

/// Poses every vertex of a mesh against the palette.
///
/// The palette is read-only for the duration and vertices are independent,
/// so callers may partition this work freely.
pub fn skin_mesh(vertices: &[SkinnedVertex], palette: &[Mat4]) -> Vec<(Vec3, Vec3)> {
    vertices
        .iter()
        .map(|vertex| skin_vertex(vertex, palette))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(weights: [f32; 4], indices: [u16; 4]) -> SkinnedVertex {
        SkinnedVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 1.0, 0.0],
            tex_coord: [0.5, 0.5],
            bone_weights: weights,
            bone_indices: indices,
        }
    }

    #[test]
    fn stride_matches_packed_fields() {
        assert_eq!(SkinnedVertex::STRIDE, 56);
        assert_eq!(SkinnedVertex::layout().array_stride, 56);
    }

    #[test]
    fn zero_weights_return_rest_pose_exactly() {
        let v = vertex([0.0; 4], [7, 9, 11, 13]);
        let palette = vec![Mat4::from_translation(Vec3::splat(5.0))];
        let (position, normal) = skin_vertex(&v, &palette);
        assert_eq!(position, v.rest_position());
        assert_eq!(normal, v.rest_normal());
    }

    #[test]
    fn identity_palette_returns_rest_pose() {
        let v = vertex([0.25, 0.25, 0.25, 0.25], [0, 1, 2, 3]);
        let palette = vec![Mat4::IDENTITY; 4];
        let (position, normal) = skin_vertex(&v, &palette);
        assert!((position - v.rest_position()).length() < 1e-6);
        assert!((normal - v.rest_normal()).length() < 1e-6);
    }

    #[test]
    fn single_bone_translation_moves_vertex() {
        let v = vertex([1.0, 0.0, 0.0, 0.0], [0, 0, 0, 0]);
        let palette = vec![Mat4::from_translation(Vec3::new(0.0, 4.0, 0.0))];
        let (position, normal) = skin_vertex(&v, &palette);
        assert!((position - Vec3::new(1.0, 6.0, 3.0)).length() < 1e-6);
        // translation leaves the normal untouched
        assert!((normal - v.rest_normal()).length() < 1e-6);
    }

    #[test]
    fn weight_deficit_blends_toward_rest_pose() {
        let v = vertex([0.5, 0.0, 0.0, 0.0], [0, 0, 0, 0]);
        let palette = vec![Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))];
        let (position, _) = skin_vertex(&v, &palette);
        // half the vertex follows the bone, the deficit stays at rest
        assert!((position - Vec3::new(1.0, 3.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn last_valid_index_is_used_unmodified() {
        let palette = vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        ];
        let v = vertex([1.0, 0.0, 0.0, 0.0], [1, 0, 0, 0]);
        let (position, _) = skin_vertex(&v, &palette);
        assert!((position - Vec3::new(1.0, 3.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn out_of_range_index_clamps_to_last_entry() {
        let palette = vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        ];
        let clamped = vertex([1.0, 0.0, 0.0, 0.0], [2, 0, 0, 0]);
        let last = vertex([1.0, 0.0, 0.0, 0.0], [1, 0, 0, 0]);
        assert_eq!(
            skin_vertex(&clamped, &palette),
            skin_vertex(&last, &palette)
        );
    }

    #[test]
    fn rotation_rotates_normal_through_linear_part() {
        let v = vertex([1.0, 0.0, 0.0, 0.0], [0, 0, 0, 0]);
        let palette = vec![Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2)];
        let (_, normal) = skin_vertex(&v, &palette);
        assert!((normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn skin_mesh_covers_every_vertex() {
        let vertices = vec![vertex([0.0; 4], [0; 4]); 3];
        let posed = skin_mesh(&vertices, &[Mat4::IDENTITY]);
        assert_eq!(posed.len(), 3);
        for (position, _) in posed {
            assert_eq!(position, Vec3::new(1.0, 2.0, 3.0));
        }
    }
}
