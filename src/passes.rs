use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use log::debug;

use crate::uniforms::{DrawUniforms, MaterialParams};

/// Lifecycle of the shadow pass pair for one frame.
///
/// `Ready` gates the main pass's ability to sample either depth source.
/// When no light is active the schedule jumps straight to `Ready` with
/// sampling disabled and both renders are skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowStage {
    Idle,
    RenderPrimary,
    RenderSecondary,
    Ready,
}

#[derive(Clone, Debug)]
pub struct ShadowSchedule {
    stage: ShadowStage,
    lit: bool,
}

impl ShadowSchedule {
    pub fn new(lit: bool) -> Self {
        Self {
            stage: ShadowStage::Idle,
            lit,
        }
    }

    pub fn stage(&self) -> ShadowStage {
        self.stage
    }

    /// Starts the frame's shadow work. Unlit frames skip both renders.
    pub fn begin(&mut self) {
        debug_assert_eq!(self.stage, ShadowStage::Idle);
        self.stage = if self.lit {
            ShadowStage::RenderPrimary
        } else {
            debug!("no active light; shadow renders skipped");
            ShadowStage::Ready
        };
    }

    /// Marks the primary depth render as encoded.
    pub fn finish_primary(&mut self) {
        debug_assert_eq!(self.stage, ShadowStage::RenderPrimary);
        self.stage = ShadowStage::RenderSecondary;
    }

    /// Marks the secondary depth render as encoded; sampling is now allowed.
    pub fn finish_secondary(&mut self) {
        debug_assert_eq!(self.stage, ShadowStage::RenderSecondary);
        self.stage = ShadowStage::Ready;
    }

    pub fn ready(&self) -> bool {
        self.stage == ShadowStage::Ready
    }

    /// Whether the main pass may sample the shadow maps. A skipped frame is
    /// `Ready` but not sampleable; its visibility factors are 1.
    pub fn can_sample(&self) -> bool {
        self.ready() && self.lit
    }

    pub fn reset(&mut self) {
        self.stage = ShadowStage::Idle;
    }
}

/// Identifies a render pass in the frame's dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassId {
    ShadowPrimary,
    ShadowSecondary,
    Main,
}

impl PassId {
    pub fn name(self) -> &'static str {
        match self {
            PassId::ShadowPrimary => "shadow-primary",
            PassId::ShadowSecondary => "shadow-secondary",
            PassId::Main => "main",
        }
    }
}

/// Explicit pass-dependency graph. Ordering between passes is encoded here
/// and nowhere else; there are no runtime locks between them.
#[derive(Clone, Debug)]
pub struct PassGraph {
    passes: Vec<PassId>,
    // (before, after)
    edges: Vec<(PassId, PassId)>,
}

impl PassGraph {
    /// The character pipeline: both shadow renders complete before the main
    /// pass samples them.
    pub fn character_pipeline() -> Self {
        Self {
            passes: vec![PassId::ShadowPrimary, PassId::ShadowSecondary, PassId::Main],
            edges: vec![
                (PassId::ShadowPrimary, PassId::ShadowSecondary),
                (PassId::ShadowPrimary, PassId::Main),
                (PassId::ShadowSecondary, PassId::Main),
            ],
        }
    }

    pub fn dependencies_of(&self, pass: PassId) -> Vec<PassId> {
        self.edges
            .iter()
            .filter(|(_, after)| *after == pass)
            .map(|(before, _)| *before)
            .collect()
    }

    /// Topological encode order for the frame.
    pub fn order(&self) -> Vec<PassId> {
        let mut order = Vec::with_capacity(self.passes.len());
        let mut remaining = self.passes.clone();
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .position(|pass| {
                    self.dependencies_of(*pass)
                        .iter()
                        .all(|dependency| order.contains(dependency))
                })
                .expect("pass graph has a cycle");
            order.push(remaining.remove(next));
        }
        order
    }
}

/// Number of main-pass output channels.
pub const OUTPUT_CHANNELS: usize = 4;

/// Positional render-target assignment of the main pass.
///
/// The index values are the contract with the composition stage; reordering
/// them breaks every downstream consumer silently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum OutputChannel {
    Albedo = 0,
    Normal = 1,
    Depth = 2,
    Light = 3,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; OUTPUT_CHANNELS] = [
        OutputChannel::Albedo,
        OutputChannel::Normal,
        OutputChannel::Depth,
        OutputChannel::Light,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One fragment's worth of main-pass output, addressed by channel index.
///
/// Kept as a fixed-length tuple rather than named fields so the positional
/// contract stays visible at the type level. The depth channel is a single
/// float stored in component 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragOutput([[f32; 4]; OUTPUT_CHANNELS]);

impl FragOutput {
    pub fn channel(&self, channel: OutputChannel) -> [f32; 4] {
        self.0[channel.index()]
    }

    pub fn depth(&self) -> f32 {
        self.0[OutputChannel::Depth.index()][0]
    }

    pub fn light_factor(&self) -> f32 {
        self.0[OutputChannel::Light.index()][0]
    }
}

/// Interpolated values arriving at one fragment of the main pass.
#[derive(Clone, Copy, Debug)]
pub struct FragmentSample {
    /// Clip-space position after projection.
    pub clip_position: Vec4,
    /// Posed position in model space (palette applied, model transform not).
    pub posed_position: Vec3,
    /// Posed normal after the normal matrix, expected near unit length.
    pub world_normal: Vec3,
    pub tex_coord: Vec2,
}

/// CPU stand-in for a shadow depth texture: a square grid of depths in
/// [0, 1], sampled with clamping nearest lookup.
#[derive(Clone, Debug)]
pub struct DepthMap {
    size: usize,
    texels: Vec<f32>,
}

impl DepthMap {
    pub fn filled(size: usize, value: f32) -> Self {
        Self {
            size: size.max(1),
            texels: vec![value; size.max(1) * size.max(1)],
        }
    }

    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let x = x.min(self.size - 1);
        let y = y.min(self.size - 1);
        self.texels[y * self.size + x] = value;
    }

    pub fn sample(&self, uv: Vec2) -> f32 {
        let x = ((uv.x * self.size as f32) as isize).clamp(0, self.size as isize - 1) as usize;
        let y = ((uv.y * self.size as f32) as isize).clamp(0, self.size as isize - 1) as usize;
        self.texels[y * self.size + x]
    }
}

const SHADOW_COMPARE_BIAS: f32 = 0.005;

// Visibility of a world position seen through one light. Samples landing
// outside the map or beyond the light's far plane are treated as lit.
fn shadow_visibility(shadow_matrix: glam::Mat4, posed_position: Vec3, map: &DepthMap) -> f32 {
    let clip = shadow_matrix * posed_position.extend(1.0);
    if clip.w.abs() < f32::EPSILON {
        return 1.0;
    }
    let ndc = clip.xyz() / clip.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, ndc.y * -0.5 + 0.5);
    if uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0 {
        return 1.0;
    }
    if ndc.z - SHADOW_COMPARE_BIAS <= map.sample(uv) {
        1.0
    } else {
        0.0
    }
}

/// Reference evaluation of the main pass for one covered pixel.
///
/// Mirrors the fragment shader in `render::shared`: albedo from the
/// material (texturing happens on the GPU path), the posed normal re-encoded
/// into [0, 1], the clip-space depth written verbatim, and the light term as
/// the conservative minimum of the two per-light visibility factors, so a
/// point occluded in either map darkens rather than leaking light at
/// silhouette edges. All four channels are written on every invocation.
pub fn shade_fragment(
    uniforms: &DrawUniforms,
    sample: &FragmentSample,
    material: &MaterialParams,
    schedule: &ShadowSchedule,
    primary: Option<&DepthMap>,
    secondary: Option<&DepthMap>,
) -> FragOutput {
    assert!(
        schedule.ready(),
        "main pass ran before the shadow schedule reached Ready"
    );

    let albedo = material.diffuse;

    let n = sample.world_normal.normalize_or_zero();
    let encoded = n * 0.5 + Vec3::splat(0.5);
    let normal = [encoded.x, encoded.y, encoded.z, 1.0];

    let depth = sample.clip_position.z / sample.clip_position.w;

    let (primary_visibility, secondary_visibility) = if schedule.can_sample() {
        (
            primary
                .map(|map| shadow_visibility(uniforms.shadow_matrix(), sample.posed_position, map))
                .unwrap_or(1.0),
            secondary
                .map(|map| {
                    shadow_visibility(uniforms.shadow_gb_matrix(), sample.posed_position, map)
                })
                .unwrap_or(1.0),
        )
    } else {
        (1.0, 1.0)
    };
    let visibility = primary_visibility.min(secondary_visibility);

    FragOutput([
        albedo,
        normal,
        [depth, 0.0, 0.0, 0.0],
        [visibility, visibility, visibility, 1.0],
    ])
}
