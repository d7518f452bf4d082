//! Built-in GLSL sources and dialect helpers.
//!
//! Sources are written in GLSL ES 1.00. [`prepare_source`] adds the
//! `#version` line, a default float precision and the `#define` shims that
//! let the same text compile as GLSL ES 3.00 or desktop GLSL 3.30.

use std::fmt::Write;

use crate::device::GlslDialect;
use crate::settings::{Precision, ShaderPrecision};

/// Shader stage, for stage-specific shims.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// Vertex shader of the batch renderer.
///
/// # Attributes
///
/// | Name              | Type    | Description                               |
/// |-------------------|---------|-------------------------------------------|
/// | `aVertexPosition` | `vec2`  | World-space position                      |
/// | `aTextureCoord`   | `vec2`  | Texture coordinate                        |
/// | `aColor`          | `vec4`  | Premultiplied tint, normalized bytes      |
/// | `aTextureId`      | `float` | Index into `uSamplers`                    |
///
/// # Uniforms
///
/// | Name                | Type   | Description                            |
/// |---------------------|--------|----------------------------------------|
/// | `projectionMatrix`  | `mat3` | From the renderer's `globals` group    |
/// | `translationMatrix` | `mat3` | Extra transform, identity when batched |
/// | `tint`              | `vec4` | Premultiplied tint for the whole batch |
pub const BATCH_VERTEX_SRC: &str = r"attribute vec2 aVertexPosition;
attribute vec2 aTextureCoord;
attribute vec4 aColor;
attribute float aTextureId;

uniform mat3 projectionMatrix;
uniform mat3 translationMatrix;
uniform vec4 tint;

varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;

void main(void) {
    gl_Position = vec4((projectionMatrix * translationMatrix * vec3(aVertexPosition, 1.0)).xy, 0.0, 1.0);

    vTextureCoord = aTextureCoord;
    vTextureId = aTextureId;
    vColor = aColor * tint;
}
";

const BATCH_FRAGMENT_TEMPLATE: &str = r"varying vec2 vTextureCoord;
varying vec4 vColor;
varying float vTextureId;
uniform sampler2D uSamplers[%count%];

void main(void) {
    vec4 color;
%forloop%
    gl_FragColor = color * vColor;
}
";

/// Fragment shader of the batch renderer, sampling from `count` textures.
///
/// `uSamplers[i]` is selected by the interpolated `vTextureId`. GLSL ES 1.00
/// only allows constant sampler indices, hence the `if` chain.
pub fn batch_fragment_src(count: u32) -> String {
    let count = count.max(1);
    let mut chain = String::new();
    for i in 0..count {
        if i > 0 {
            chain.push_str("\n    else ");
        } else {
            chain.push_str("    ");
        }
        if i + 1 < count {
            let _ = write!(chain, "if (vTextureId < {i}.5) ");
        }
        let _ = write!(chain, "{{\n        color = texture2D(uSamplers[{i}], vTextureCoord);\n    }}");
    }
    BATCH_FRAGMENT_TEMPLATE
        .replace("%count%", &count.to_string())
        .replace("%forloop%", &chain)
}

/// Vertex shader for meshes with their own geometry.
///
/// # Uniforms
///
/// | Name                | Type   | Description                          |
/// |---------------------|--------|--------------------------------------|
/// | `projectionMatrix`  | `mat3` | From the renderer's `globals` group  |
/// | `translationMatrix` | `mat3` | The mesh's world transform           |
/// | `uvMatrix`          | `mat3` | Texture coordinate transform         |
pub const MESH_VERTEX_SRC: &str = r"attribute vec2 aVertexPosition;
attribute vec2 aTextureCoord;

uniform mat3 projectionMatrix;
uniform mat3 translationMatrix;
uniform mat3 uvMatrix;

varying vec2 vTextureCoord;

void main(void) {
    gl_Position = vec4((projectionMatrix * translationMatrix * vec3(aVertexPosition, 1.0)).xy, 0.0, 1.0);
    vTextureCoord = (uvMatrix * vec3(aTextureCoord, 1.0)).xy;
}
";

/// Fragment shader for textured meshes.
///
/// # Uniforms
///
/// | Name       | Type        | Description                    |
/// |------------|-------------|--------------------------------|
/// | `uSampler` | `sampler2D` | Mesh texture                   |
/// | `uColor`   | `vec4`      | Premultiplied tint and alpha   |
pub const MESH_FRAGMENT_SRC: &str = r"varying vec2 vTextureCoord;
uniform vec4 uColor;

uniform sampler2D uSampler;

void main(void) {
    gl_FragColor = texture2D(uSampler, vTextureCoord) * uColor;
}
";

/// Make an ES 1.00 source compile under `dialect`.
///
/// Sources that already start with `#version` are returned unchanged. A
/// default float precision is added unless the source declares one.
pub fn prepare_source(
    source: &str,
    stage: ShaderStage,
    dialect: GlslDialect,
    precision: Precision,
) -> String {
    if source.trim_start().starts_with("#version") {
        return source.to_owned();
    }

    let mut out = String::with_capacity(source.len() + 160);
    match dialect {
        GlslDialect::Es100 => {}
        GlslDialect::Es300 => out.push_str("#version 300 es\n"),
        GlslDialect::Core330 => out.push_str("#version 330 core\n"),
    }
    if dialect != GlslDialect::Core330 && !source.contains("precision ") {
        let _ = writeln!(out, "precision {} float;", precision.as_str());
    }
    if dialect != GlslDialect::Es100 {
        match stage {
            ShaderStage::Vertex => {
                out.push_str("#define attribute in\n#define varying out\n");
            }
            ShaderStage::Fragment => {
                out.push_str(
                    "#define varying in\n#define gl_FragColor fragColor\nout vec4 fragColor;\n",
                );
            }
        }
        out.push_str("#define texture2D texture\n");
    }
    out.push_str(source);
    out
}

/// Prepare both stages of a program.
pub fn prepare_program(
    vertex: &str,
    fragment: &str,
    dialect: GlslDialect,
    precision: ShaderPrecision,
) -> (String, String) {
    (
        prepare_source(vertex, ShaderStage::Vertex, dialect, precision.vertex),
        prepare_source(fragment, ShaderStage::Fragment, dialect, precision.fragment),
    )
}
