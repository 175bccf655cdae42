use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::RwLock;

/// Thread-safe holder of the current bone palette.
///
/// The animation side replaces the palette wholesale once per frame; the
/// render side takes a snapshot. A snapshot is never mutated after it is
/// handed out, so a draw in flight keeps reading a consistent pose.
#[derive(Debug)]
pub struct PoseModel {
    palette: Arc<RwLock<Vec<Mat4>>>,
}

impl Clone for PoseModel {
    fn clone(&self) -> Self {
        Self {
            palette: Arc::clone(&self.palette),
        }
    }
}

impl PoseModel {
    /// Creates a rest pose: every bone at the identity.
    pub fn new(bone_count: usize) -> Self {
        Self {
            palette: Arc::new(RwLock::new(vec![Mat4::IDENTITY; bone_count])),
        }
    }

    /// Replaces the whole palette. Partial in-place updates are not offered;
    /// a reader must never observe a half-written pose.
    pub fn replace_palette(&self, palette: Vec<Mat4>) {
        *self.palette.write() = palette;
    }

    /// Returns a copy of the current palette.
    pub fn snapshot(&self) -> Vec<Mat4> {
        self.palette.read().clone()
    }

    pub fn bone_count(&self) -> usize {
        self.palette.read().len()
    }
}

/// Demo pose for the built-in figure: the root stays put while every bone
/// above it swings around Z, pivoting at its own rest height.
pub fn swing_pose(bone_count: usize, time: f32) -> Vec<Mat4> {
    (0..bone_count)
        .map(|bone| {
            if bone == 0 {
                Mat4::IDENTITY
            } else {
                let pivot = Vec3::new(0.0, bone as f32, 0.0);
                let angle = (time + bone as f32 * 0.5).sin() * 0.6;
                Mat4::from_translation(pivot)
                    * Mat4::from_rotation_z(angle)
                    * Mat4::from_translation(-pivot)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_holds_identity_palette() {
        let model = PoseModel::new(3);
        assert_eq!(model.bone_count(), 3);
        for bone in model.snapshot() {
            assert_eq!(bone, Mat4::IDENTITY);
        }
    }

    #[test]
    fn replace_is_wholesale() {
        let model = PoseModel::new(2);
        model.replace_palette(vec![Mat4::from_rotation_y(1.0)]);
        assert_eq!(model.bone_count(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_replacements() {
        let model = PoseModel::new(2);
        let snapshot = model.snapshot();
        model.replace_palette(swing_pose(2, 1.0));
        assert_eq!(snapshot, vec![Mat4::IDENTITY; 2]);
    }

    #[test]
    fn swing_pose_keeps_the_root_fixed() {
        let pose = swing_pose(2, 0.8);
        assert_eq!(pose[0], Mat4::IDENTITY);
        assert_ne!(pose[1], Mat4::IDENTITY);
        // the pivot itself does not move
        let pivot = Vec3::new(0.0, 1.0, 0.0);
        assert!((pose[1].transform_point3(pivot) - pivot).length() < 1e-6);
    }
}
