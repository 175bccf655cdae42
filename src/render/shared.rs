//! WGSL sources for the three pipelines. The `DrawUniforms` struct and the
//! vertex layout here mirror `uniforms::DrawUniforms` and
//! `skinning::SkinnedVertex` field for field; the two must change together.

/// Depth-only shadow pipeline. Two vertex entry points share the skinning
/// code and differ only in which shadow matrix they project through.
pub(crate) const SHADOW_SHADER: &str = r#"
struct DrawUniforms {
    model: mat4x4<f32>,
    model_view: mat4x4<f32>,
    projection: mat4x4<f32>,
    shadow: mat4x4<f32>,
    shadow_gb: mat4x4<f32>,
    normal: mat3x3<f32>,
}

@group(0) @binding(0)
var<uniform> draw: DrawUniforms;

@group(1) @binding(0)
var<storage, read> palette: array<mat4x4<f32>>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
    @location(3) bone_weights: vec4<f32>,
    @location(4) bone_indices: vec4<u32>,
}

fn skin_position(input: VertexInput) -> vec3<f32> {
    let bone_count = arrayLength(&palette);
    var posed = vec3<f32>(0.0);
    var weight_sum = 0.0;
    for (var i = 0u; i < 4u; i += 1u) {
        let weight = input.bone_weights[i];
        if (weight == 0.0) {
            continue;
        }
        let index = min(input.bone_indices[i], bone_count - 1u);
        posed += weight * (palette[index] * vec4<f32>(input.position, 1.0)).xyz;
        weight_sum += weight;
    }
    // a sub-1 weight sum leaves the deficit at the rest pose, by contract
    if (weight_sum < 1.0) {
        posed += (1.0 - weight_sum) * input.position;
    }
    return posed;
}

@vertex
fn shadow_primary_vs(input: VertexInput) -> @builtin(position) vec4<f32> {
    return draw.shadow * vec4<f32>(skin_position(input), 1.0);
}

@vertex
fn shadow_secondary_vs(input: VertexInput) -> @builtin(position) vec4<f32> {
    return draw.shadow_gb * vec4<f32>(skin_position(input), 1.0);
}
"#;

/// Geometry pass: skins the vertex, then writes the four output channels.
/// The `@location` indices on `FragOutput` are the composition contract.
pub(crate) const GBUFFER_SHADER: &str = r#"
struct DrawUniforms {
    model: mat4x4<f32>,
    model_view: mat4x4<f32>,
    projection: mat4x4<f32>,
    shadow: mat4x4<f32>,
    shadow_gb: mat4x4<f32>,
    normal: mat3x3<f32>,
}

struct MaterialParams {
    ambient: vec4<f32>,
    diffuse: vec4<f32>,
    specular: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> draw: DrawUniforms;

@group(1) @binding(0)
var<storage, read> palette: array<mat4x4<f32>>;

@group(2) @binding(0)
var<uniform> material: MaterialParams;
@group(2) @binding(1)
var base_texture: texture_2d<f32>;
@group(2) @binding(2)
var base_sampler: sampler;

@group(3) @binding(0)
var shadow_primary: texture_depth_2d;
@group(3) @binding(1)
var shadow_secondary: texture_depth_2d;
@group(3) @binding(2)
var shadow_sampler: sampler_comparison;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
    @location(3) bone_weights: vec4<f32>,
    @location(4) bone_indices: vec4<u32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
    @location(2) shadow_position: vec4<f32>,
    @location(3) shadow_gb_position: vec4<f32>,
}

struct FragOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) depth: f32,
    @location(3) light: vec4<f32>,
}

fn skin(input: VertexInput) -> array<vec3<f32>, 2> {
    let bone_count = arrayLength(&palette);
    var posed = vec3<f32>(0.0);
    var posed_normal = vec3<f32>(0.0);
    var weight_sum = 0.0;
    for (var i = 0u; i < 4u; i += 1u) {
        let weight = input.bone_weights[i];
        if (weight == 0.0) {
            continue;
        }
        let index = min(input.bone_indices[i], bone_count - 1u);
        let bone = palette[index];
        posed += weight * (bone * vec4<f32>(input.position, 1.0)).xyz;
        let linear = mat3x3<f32>(bone[0].xyz, bone[1].xyz, bone[2].xyz);
        posed_normal += weight * (linear * input.normal);
        weight_sum += weight;
    }
    // a sub-1 weight sum leaves the deficit at the rest pose, by contract
    if (weight_sum < 1.0) {
        let deficit = 1.0 - weight_sum;
        posed += deficit * input.position;
        posed_normal += deficit * input.normal;
    }
    return array<vec3<f32>, 2>(posed, normalize(posed_normal));
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let posed = skin(input);
    var output: VertexOutput;
    output.position = draw.projection * draw.model_view * vec4<f32>(posed[0], 1.0);
    output.normal = draw.normal * posed[1];
    output.tex_coord = input.tex_coord;
    output.shadow_position = draw.shadow * vec4<f32>(posed[0], 1.0);
    output.shadow_gb_position = draw.shadow_gb * vec4<f32>(posed[0], 1.0);
    return output;
}

// Light-space position to shadow map uv plus comparison depth.
fn shadow_uvz(position: vec4<f32>) -> vec3<f32> {
    let ndc = position.xyz / position.w;
    let uv = ndc.xy * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
    return vec3<f32>(uv, ndc.z);
}

fn inside_map(uvz: vec3<f32>) -> bool {
    return uvz.x >= 0.0 && uvz.x <= 1.0 && uvz.y >= 0.0 && uvz.y <= 1.0 && uvz.z <= 1.0;
}

@fragment
fn fs_main(input: VertexOutput) -> FragOutput {
    let uvz_primary = shadow_uvz(input.shadow_position);
    let uvz_secondary = shadow_uvz(input.shadow_gb_position);
    let compare_primary = textureSampleCompareLevel(
        shadow_primary, shadow_sampler, uvz_primary.xy, uvz_primary.z - 0.005);
    let compare_secondary = textureSampleCompareLevel(
        shadow_secondary, shadow_sampler, uvz_secondary.xy, uvz_secondary.z - 0.005);
    // samples outside a map (or with no light bound at all) stay fully lit
    let visibility_primary = select(1.0, compare_primary, inside_map(uvz_primary));
    let visibility_secondary = select(1.0, compare_secondary, inside_map(uvz_secondary));
    let visibility = min(visibility_primary, visibility_secondary);

    var output: FragOutput;
    output.albedo = textureSample(base_texture, base_sampler, input.tex_coord) * material.diffuse;
    output.normal = vec4<f32>(normalize(input.normal) * 0.5 + vec3<f32>(0.5), 1.0);
    output.depth = input.position.z;
    output.light = vec4<f32>(vec3<f32>(visibility), 1.0);
    return output;
}
"#;

/// Debug present blit: albedo modulated by the light term, drawn as a
/// fullscreen triangle. The real composition stage lives outside this crate
/// and consumes the targets directly.
pub(crate) const COMPOSITE_SHADER: &str = r#"
@group(0) @binding(0)
var albedo_texture: texture_2d<f32>;
@group(0) @binding(1)
var light_texture: texture_2d<f32>;
@group(0) @binding(2)
var blit_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    // one oversized triangle covering the viewport
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var output: VertexOutput;
    output.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    output.tex_coord = vec2<f32>(uv.x, 1.0 - uv.y);
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(albedo_texture, blit_sampler, input.tex_coord);
    let light = textureSample(light_texture, blit_sampler, input.tex_coord);
    return vec4<f32>(albedo.rgb * light.rgb, 1.0);
}
"#;
