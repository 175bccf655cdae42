use crate::skinning::SkinnedVertex;

/// A skinned triangle mesh with 16-bit indices, immutable after load.
///
/// Model file parsing lives outside this crate; meshes arrive either from
/// an external loader or from [`rigged_column`], the built-in demo figure.
#[derive(Debug, Clone, Default)]
pub struct SkinnedMesh {
    pub vertices: Vec<SkinnedVertex>,
    pub indices: Vec<u16>,
}

impl SkinnedMesh {
    /// Number of palette entries the mesh's nonzero-weight indices expect.
    pub fn bone_span(&self) -> usize {
        self.vertices
            .iter()
            .flat_map(|vertex| {
                vertex
                    .bone_weights
                    .iter()
                    .zip(vertex.bone_indices.iter())
                    .filter(|(weight, _)| **weight > 0.0)
                    .map(|(_, index)| *index as usize + 1)
            })
            .max()
            .unwrap_or(0)
    }
}

/// Built-in two-bone demo figure: a vertical ribbon of quads from y = 0 to
/// y = 2, fully weighted to the root at the base and blending toward the
/// second bone with height.
pub fn rigged_column(segments: usize) -> SkinnedMesh {
    let segments = segments.max(1);
    let half_width = 0.25;
    let height = 2.0;

    let mut vertices = Vec::with_capacity((segments + 1) * 2);
    for ring in 0..=segments {
        let t = ring as f32 / segments as f32;
        let y = t * height;
        // weight shifts linearly from the root bone to the upper bone
        let upper = t;
        let lower = 1.0 - t;
        for side in 0..2 {
            let x = if side == 0 { -half_width } else { half_width };
            vertices.push(SkinnedVertex {
                position: [x, y, 0.0],
                normal: [0.0, 0.0, 1.0],
                tex_coord: [side as f32, 1.0 - t],
                bone_weights: [lower, upper, 0.0, 0.0],
                bone_indices: [0, 1, 0, 0],
            });
        }
    }

    let mut indices = Vec::with_capacity(segments * 6);
    for ring in 0..segments as u16 {
        let base = ring * 2;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }

    SkinnedMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_spans_two_bones() {
        let mesh = rigged_column(4);
        assert_eq!(mesh.bone_span(), 2);
        assert_eq!(mesh.vertices.len(), 10);
        assert_eq!(mesh.indices.len(), 24);
    }

    #[test]
    fn column_weights_sum_to_one() {
        for vertex in rigged_column(6).vertices {
            let sum: f32 = vertex.bone_weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn bone_span_ignores_zero_weight_indices() {
        let mut mesh = rigged_column(1);
        // a junk index behind a zero weight must not widen the span
        mesh.vertices[0].bone_indices[3] = 400;
        assert_eq!(mesh.bone_span(), 2);
    }

    #[test]
    fn empty_mesh_spans_no_bones() {
        assert_eq!(SkinnedMesh::default().bone_span(), 0);
    }
}
