//! WGSL source for the multi-texture sprite shader.
//!
//! Each sprite vertex carries the texture unit it samples from. The fragment
//! stage picks the texture with an `if` chain, one branch per unit, so the
//! shader has to be generated for a fixed unit count.

use std::fmt::Write;

const SHADER_HEAD: &str = r#"struct Projection {
    row0: vec4<f32>,
    row1: vec4<f32>,
};

@group(0) @binding(0) var<uniform> projection: Projection;
@group(0) @binding(1) var sprite_sampler: sampler;
"#;

const SHADER_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
    @location(2) @interpolate(flat) texture_id: f32,
};

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec4<f32>,
    @location(3) texture_id: f32,
) -> VertexOutput {
    let p = vec3<f32>(position, 1.0);
    var out: VertexOutput;
    out.clip_position = vec4<f32>(dot(projection.row0.xyz, p), dot(projection.row1.xyz, p), 0.0, 1.0);
    out.uv = uv;
    out.color = vec4<f32>(color.rgb * color.a, color.a);
    out.texture_id = texture_id;
    return out;
}
"#;

/// Binding index of texture unit 0; units follow consecutively.
pub const FIRST_TEXTURE_BINDING: u32 = 2;

/// Generate the sprite shader for `max_textures` texture units.
pub fn generate_multi_texture_shader(max_textures: u32) -> String {
    let max_textures = max_textures.max(1);
    let mut src = String::with_capacity(2048 + max_textures as usize * 160);
    src.push_str(SHADER_HEAD);
    for unit in 0..max_textures {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var texture{}: texture_2d<f32>;",
            FIRST_TEXTURE_BINDING + unit,
            unit
        );
    }
    src.push_str(SHADER_VERTEX);

    src.push_str("\n@fragment\nfn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n");
    src.push_str("    var color: vec4<f32>;\n");
    src.push_str("    let texture_id = floor(in.texture_id + 0.5);\n");
    src.push_str(&generate_sample_src(max_textures));
    src.push_str("    return color * in.color;\n}\n");
    src
}

fn generate_sample_src(max_textures: u32) -> String {
    let mut src = String::new();
    for unit in 0..max_textures {
        src.push_str(if unit == 0 { "    " } else { " else " });
        if unit < max_textures - 1 {
            let _ = write!(src, "if (texture_id == {}.0) ", unit);
        }
        let _ = write!(
            src,
            "{{\n        color = textureSampleLevel(texture{}, sprite_sampler, in.uv, 0.0);\n    }}",
            unit
        );
    }
    src.push('\n');
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unit_has_no_branch() {
        let src = generate_multi_texture_shader(1);
        assert!(src.contains("var texture0: texture_2d<f32>"));
        assert!(!src.contains("if (texture_id"));
        assert!(src.contains("textureSampleLevel(texture0"));
    }

    #[test]
    fn test_branch_per_unit() {
        let src = generate_multi_texture_shader(4);
        for unit in 0..4 {
            assert!(src.contains(&format!("@binding({}) var texture{}", unit + 2, unit)));
        }
        assert_eq!(src.matches("if (texture_id ==").count(), 3);
        assert!(src.contains("else {"));
    }

    #[test]
    fn test_zero_units_clamped() {
        assert_eq!(generate_multi_texture_shader(0), generate_multi_texture_shader(1));
    }
}
