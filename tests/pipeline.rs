//! End-to-end CPU walk of the pipeline contract: a known triangle through
//! skinning, uniform composition and the fragment reference evaluator.

use glam::{Mat4, Vec3};
use once_cell::sync::Lazy;

use marionette_viewer::{
    shade_fragment, skin_vertex, FragmentSample, MaterialParams, OutputChannel, PassGraph, PassId,
    ShadowSchedule, SkinnedVertex, UniformBlockBuilder,
};

const NEAR: f32 = 0.1;
const FAR: f32 = 10.0;
const EYE_Z: f32 = 5.0;

static TRIANGLE: Lazy<Vec<SkinnedVertex>> = Lazy::new(|| {
    [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, -1.0],
        [0.0, 1.0, -2.0],
    ]
    .iter()
    .map(|position| SkinnedVertex {
        position: *position,
        normal: [0.0, 0.0, 1.0],
        tex_coord: [0.0, 0.0],
        bone_weights: [1.0, 0.0, 0.0, 0.0],
        bone_indices: [0, 0, 0, 0],
    })
    .collect()
});

fn origin_facing_camera() -> UniformBlockBuilder {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, EYE_Z), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::orthographic_rh(-2.0, 2.0, -2.0, 2.0, NEAR, FAR);
    UniformBlockBuilder::new(view, projection)
}

// Orthographic depth of a world-space z for the camera above.
fn analytic_depth(world_z: f32) -> f32 {
    ((EYE_Z - world_z) - NEAR) / (FAR - NEAR)
}

#[test]
fn triangle_through_the_whole_pipeline_matches_analytic_depth() {
    let palette = vec![Mat4::IDENTITY];
    let block = origin_facing_camera().build(Mat4::IDENTITY);

    // no light: the schedule skips both shadow renders
    let mut schedule = ShadowSchedule::new(false);
    schedule.begin();
    assert!(schedule.ready());

    for vertex in TRIANGLE.iter() {
        let (posed_position, posed_normal) = skin_vertex(vertex, &palette);
        // identity palette leaves the rest pose untouched
        assert_eq!(posed_position, vertex.rest_position());

        let clip =
            block.projection_matrix() * block.model_view_matrix() * posed_position.extend(1.0);
        let sample = FragmentSample {
            clip_position: clip,
            posed_position,
            world_normal: block.normal_matrix() * posed_normal,
            tex_coord: vertex.tex_coord(),
        };
        let out = shade_fragment(
            &block,
            &sample,
            &MaterialParams::default(),
            &schedule,
            None,
            None,
        );

        let expected = analytic_depth(vertex.position[2]);
        assert!(
            (out.depth() - expected).abs() < 1e-5,
            "depth {} vs analytic {expected}",
            out.depth()
        );
        assert_eq!(out.light_factor(), 1.0);

        // the normal channel encodes the +Z rest normal at the top of range
        let normal = out.channel(OutputChannel::Normal);
        assert!((normal[2] - 1.0).abs() < 1e-5);
    }
}

#[test]
fn pass_graph_gates_the_main_pass_behind_both_shadow_renders() {
    let graph = PassGraph::character_pipeline();
    let order = graph.order();
    let main_at = order.iter().position(|p| *p == PassId::Main).unwrap();
    for shadow in [PassId::ShadowPrimary, PassId::ShadowSecondary] {
        let shadow_at = order.iter().position(|p| *p == shadow).unwrap();
        assert!(shadow_at < main_at);
    }
}
