//! What the renderer consumes from a scene graph.
//!
//! The scene graph itself lives elsewhere. Per frame it flattens into an
//! ordered list of [`RenderLeaf`]s; for texture unloading it exposes its
//! tree through [`DisplayNode`] and [`Container`].

use glam::{Affine2, Vec2};

use crate::math::{affine_to_mat3, Rect};
use crate::resources::geometry::{Geometry, Topology};
use crate::resources::state::{BlendMode, State};
use crate::resources::texture::BaseTexture;
use crate::resources::uniforms::{Shader, UniformValue};

/// Pack a straight-alpha RGB tint and alpha into premultiplied RGBA8, in
/// the byte order the batch vertex format expects.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn premultiply_tint(rgb: [f32; 3], alpha: f32) -> u32 {
    let alpha = alpha.clamp(0.0, 1.0);
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    u32::from_le_bytes([
        byte(rgb[0] * alpha),
        byte(rgb[1] * alpha),
        byte(rgb[2] * alpha),
        byte(alpha),
    ])
}

/// Textured triangles merged with others into a shared draw.
///
/// Positions are already in world space.
#[derive(Clone, Debug)]
pub struct BatchElement {
    /// World-space positions.
    pub vertices: Vec<[f32; 2]>,
    /// Texture coordinates, one per vertex.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u16>,
    /// Texture sampled by the element.
    pub texture: BaseTexture,
    /// Premultiplied RGBA8 tint, see [`premultiply_tint`].
    pub tint: u32,
    /// How the element composites.
    pub blend_mode: BlendMode,
}

impl BatchElement {
    /// A textured rectangle: `frame` in local units, placed by `transform`.
    pub fn quad(texture: BaseTexture, frame: Rect, transform: &Affine2) -> Self {
        let corners = [
            Vec2::new(frame.x, frame.y),
            Vec2::new(frame.x + frame.width, frame.y),
            Vec2::new(frame.x + frame.width, frame.y + frame.height),
            Vec2::new(frame.x, frame.y + frame.height),
        ];
        Self {
            vertices: corners
                .iter()
                .map(|&c| transform.transform_point2(c).to_array())
                .collect(),
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: vec![0, 1, 2, 0, 2, 3],
            texture,
            tint: u32::MAX,
            blend_mode: BlendMode::Normal,
        }
    }

    /// Set the tint.
    #[must_use]
    pub fn with_tint(mut self, rgb: [f32; 3], alpha: f32) -> Self {
        self.tint = premultiply_tint(rgb, alpha);
        self
    }

    /// Set the blend mode.
    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }
}

/// Geometry drawn on its own with its own shader.
#[derive(Clone, Debug)]
pub struct MeshElement {
    /// Vertex data.
    pub geometry: Geometry,
    /// Program and material uniforms.
    pub shader: Shader,
    /// Fixed-function state, including the blend mode.
    pub state: State,
    /// World transform, published as `translationMatrix`.
    pub transform: Affine2,
    /// Primitive type; the geometry's own when `None`.
    pub topology: Option<Topology>,
}

impl MeshElement {
    /// A triangle mesh with 2D state and an identity transform.
    pub fn new(geometry: Geometry, shader: Shader) -> Self {
        Self {
            geometry,
            shader,
            state: State::for_2d(),
            transform: Affine2::IDENTITY,
            topology: None,
        }
    }

    /// Place the mesh.
    #[must_use]
    pub fn with_transform(mut self, transform: Affine2) -> Self {
        self.transform = transform;
        self
    }

    /// Copy the transform into the shader's `translationMatrix`, if the
    /// shader declares one.
    pub(crate) fn publish_transform(&self) {
        if self.shader.uniforms.get("translationMatrix").is_some() {
            self.shader
                .uniforms
                .set("translationMatrix", UniformValue::Mat3(affine_to_mat3(&self.transform)));
        }
    }
}

/// One step of a flattened frame.
#[derive(Clone, Debug)]
pub enum RenderLeaf {
    /// Merge into the current batch.
    Batched(BatchElement),
    /// Draw alone.
    Mesh(MeshElement),
    /// Restrict following leaves to the union of these shapes, nested inside
    /// any active mask.
    PushMask(Vec<RenderLeaf>),
    /// Remove the innermost mask.
    PopMask,
}

/// A node of the host's scene tree, as seen by texture unloading.
pub trait DisplayNode {
    /// The texture this node draws, if any.
    fn texture(&self) -> Option<BaseTexture> {
        None
    }

    /// The node as a container, if it has children.
    fn as_container(&self) -> Option<&dyn Container> {
        None
    }
}

/// A node with children.
pub trait Container: DisplayNode {
    /// Direct children.
    fn children(&self) -> Vec<&dyn DisplayNode>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::texture::TextureOptions;

    #[test]
    fn tint_is_premultiplied() {
        let tint = premultiply_tint([1.0, 0.5, 0.0], 0.5);
        assert_eq!(tint.to_le_bytes(), [128, 64, 0, 128]);
        assert_eq!(premultiply_tint([1.0; 3], 1.0), u32::MAX);
    }

    #[test]
    fn quad_is_transformed() {
        let texture = BaseTexture::from_pixels(1, 1, vec![0; 4], TextureOptions::default());
        let quad = BatchElement::quad(
            texture,
            Rect::from_size(10.0, 20.0),
            &Affine2::from_translation(Vec2::new(5.0, 5.0)),
        );
        assert_eq!(
            quad.vertices,
            vec![[5.0, 5.0], [15.0, 5.0], [15.0, 25.0], [5.0, 25.0]]
        );
        assert_eq!(quad.indices.len(), 6);
    }
}
