use glam::Mat4;
use log::warn;
use thiserror::Error;

use crate::mesh::SkinnedMesh;

/// Configuration errors the CPU-side binder surfaces before a draw is
/// issued. The pipeline core itself never faults on these; the skinner
/// clamps and the shadow path collapses to identity, so rejecting a broken
/// configuration has to happen here.
#[derive(Debug, Error, PartialEq)]
pub enum BindError {
    #[error("vertex {vertex} references bone {index} with nonzero weight, but the palette holds {palette_len} entries")]
    PaletteTooSmall {
        vertex: usize,
        index: u16,
        palette_len: usize,
    },
    #[error("projection matrix contains non-finite values")]
    NonFiniteProjection,
    #[error("projection matrix is singular")]
    DegenerateProjection,
}

const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Checks that every nonzero-weight bone index fits the palette.
///
/// Weight sums off by more than the tolerance are accepted as-is (the
/// skinner's deficit policy covers them) but logged, since they usually
/// point at a broken exporter.
pub fn validate_palette_binding(mesh: &SkinnedMesh, palette_len: usize) -> Result<(), BindError> {
    let mut off_tolerance = 0usize;
    for (vertex_index, vertex) in mesh.vertices.iter().enumerate() {
        let mut sum = 0.0;
        for (weight, index) in vertex.bone_weights.iter().zip(vertex.bone_indices.iter()) {
            if *weight == 0.0 {
                continue;
            }
            sum += weight;
            if *index as usize >= palette_len {
                return Err(BindError::PaletteTooSmall {
                    vertex: vertex_index,
                    index: *index,
                    palette_len,
                });
            }
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            off_tolerance += 1;
        }
    }
    if off_tolerance > 0 {
        warn!(
            "{off_tolerance} of {} vertices have bone weights not summing to 1; the deficit will stay at the rest pose",
            mesh.vertices.len()
        );
    }
    Ok(())
}

/// Rejects projection matrices no draw could meaningfully use.
pub fn validate_projection(projection: Mat4) -> Result<(), BindError> {
    if !projection.is_finite() {
        return Err(BindError::NonFiniteProjection);
    }
    if projection.determinant().abs() < f32::EPSILON {
        return Err(BindError::DegenerateProjection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::rigged_column;

    #[test]
    fn well_formed_mesh_binds() {
        let mesh = rigged_column(4);
        assert_eq!(validate_palette_binding(&mesh, 2), Ok(()));
    }

    #[test]
    fn undersized_palette_is_rejected() {
        let mesh = rigged_column(4);
        let err = validate_palette_binding(&mesh, 1).unwrap_err();
        assert!(matches!(err, BindError::PaletteTooSmall { palette_len: 1, .. }));
    }

    #[test]
    fn zero_weight_indices_do_not_reject() {
        let mut mesh = rigged_column(1);
        mesh.vertices[0].bone_indices[2] = 500;
        assert_eq!(validate_palette_binding(&mesh, 2), Ok(()));
    }

    #[test]
    fn projection_must_be_finite_and_invertible() {
        assert_eq!(
            validate_projection(Mat4::perspective_rh(1.0, 1.6, 0.1, 100.0)),
            Ok(())
        );
        assert_eq!(
            validate_projection(Mat4::from_cols_array(&[f32::NAN; 16])),
            Err(BindError::NonFiniteProjection)
        );
        assert_eq!(
            validate_projection(Mat4::ZERO),
            Err(BindError::DegenerateProjection)
        );
    }
}
