/// WGSL displacement shader.
///
/// `offset_uv = (depth.rg - 0.5) * scale / size`, then the base layer is
/// sampled at the offset coordinate clamped to the layer edges.
pub const DISPLACEMENT_SHADER: &str = r#"
struct Displacement {
    scale: vec2<f32>,
    size: vec2<f32>,
};

@group(0) @binding(0)
var<uniform> displacement: Displacement;

@group(1) @binding(0)
var base_texture: texture_2d<f32>;
@group(1) @binding(1)
var depth_texture: texture_2d<f32>;
@group(1) @binding(2)
var layer_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

// Full-viewport triangle; uv runs top-left (0,0) to bottom-right (1,1).
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let map = textureSample(depth_texture, layer_sampler, in.uv).rg - vec2<f32>(0.5, 0.5);
    let offset = map * displacement.scale / max(displacement.size, vec2<f32>(1.0, 1.0));
    let uv = clamp(in.uv + offset, vec2<f32>(0.0, 0.0), vec2<f32>(1.0, 1.0));
    return textureSample(base_texture, layer_sampler, uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_declares_entry_points() {
        assert!(DISPLACEMENT_SHADER.contains("fn vs_main"));
        assert!(DISPLACEMENT_SHADER.contains("fn fs_main"));
        assert!(DISPLACEMENT_SHADER.contains("@group(1) @binding(2)"));
    }
}
