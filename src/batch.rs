//! Collapses many textured elements into few indexed draws.
//!
//! Elements are queued by [`BatchRenderer::push`] and packed into one
//! interleaved vertex buffer and one 16-bit index buffer at
//! [`flush`](BatchRenderer::flush). The packed range is split into draw
//! groups wherever the blend mode changes or a new texture would exceed the
//! sampler units of the batch shader; each group is one `drawElements`.

use bytemuck::{Pod, Zeroable};
use glam::Mat3;
use log::warn;

use crate::device::Device;
use crate::error::{RenderError, Result};
use crate::resources::buffer::{Buffer, BufferUsage};
use crate::resources::geometry::{Attribute, Geometry, IndexFormat, Topology, VertexFormat};
use crate::resources::state::{BlendMode, State};
use crate::resources::texture::BaseTexture;
use crate::resources::uniforms::{Shader, UniformGroup, UniformValue};
use crate::scene::BatchElement;
use crate::shaders::{batch_fragment_src, BATCH_VERTEX_SRC};
use crate::systems::{ContextInfo, Systems};

/// Vertices addressable by 16-bit indices.
const MAX_BATCH_VERTICES: usize = u16::MAX as usize + 1;

/// One packed batch vertex, 24 bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BatchVertex {
    /// World-space position.
    pub position: [f32; 2],
    /// Texture coordinate.
    pub uv: [f32; 2],
    /// Premultiplied RGBA8 tint.
    pub color: u32,
    /// Sampler slot within the draw group.
    pub texture_id: f32,
}

/// A contiguous index range drawn with one texture set and blend mode.
#[derive(Clone, Debug)]
struct DrawGroup {
    textures: Vec<BaseTexture>,
    blend_mode: BlendMode,
    start: u32,
    size: u32,
}

/// The batch renderer.
#[derive(Debug)]
pub struct BatchRenderer {
    elements: Vec<BatchElement>,
    queued_vertices: usize,
    capacity: usize,
    requested_textures: u32,
    max_textures: u32,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    geometry: Geometry,
    shader: Shader,
    state: State,
    vertices: Vec<BatchVertex>,
    indices: Vec<u16>,
    groups: Vec<DrawGroup>,
}

impl BatchRenderer {
    /// Create a batcher flushing every `batch_size` vertices and sampling up
    /// to `max_textures` textures per draw.
    pub fn new(batch_size: usize, max_textures: u32) -> Self {
        let vertex_buffer = Buffer::new(Vec::new(), BufferUsage::VERTEX);
        let index_buffer = Buffer::new(Vec::new(), BufferUsage::INDEX);
        let geometry = Geometry::builder()
            .attribute(
                "aVertexPosition",
                Attribute::new(vertex_buffer.clone(), VertexFormat::Float32x2),
            )
            .attribute(
                "aTextureCoord",
                Attribute::new(vertex_buffer.clone(), VertexFormat::Float32x2),
            )
            .attribute(
                "aColor",
                Attribute::new(vertex_buffer.clone(), VertexFormat::Unorm8x4),
            )
            .attribute(
                "aTextureId",
                Attribute::new(vertex_buffer.clone(), VertexFormat::Float32),
            )
            .index(index_buffer.clone(), IndexFormat::U16)
            .topology(Topology::Triangles)
            .build();
        let max_textures = max_textures.max(1);
        Self {
            elements: Vec::new(),
            queued_vertices: 0,
            capacity: batch_size.clamp(4, MAX_BATCH_VERTICES),
            requested_textures: max_textures,
            max_textures,
            vertex_buffer,
            index_buffer,
            geometry,
            shader: batch_shader(max_textures),
            state: State::for_2d(),
            vertices: Vec::new(),
            indices: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Textures sampled by one draw.
    pub fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// The interleaved geometry drawn by every flush.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Fit the sampler count to a new context and rebuild the shader if it
    /// changed.
    pub fn context_change(&mut self, context: &ContextInfo) {
        let max = self
            .requested_textures
            .min(context.capabilities.max_texture_units)
            .max(1);
        if max != self.max_textures {
            self.max_textures = max;
            self.shader = batch_shader(max);
        }
    }

    /// Queue `element`, flushing first when it would overflow the buffers.
    ///
    /// Returns the number of draw calls issued by that flush.
    pub fn push<D: Device>(
        &mut self,
        gl: &D,
        systems: &mut Systems<D>,
        element: BatchElement,
    ) -> Result<u32> {
        let count = element.vertices.len();
        if count == 0 || element.indices.is_empty() {
            return Ok(0);
        }
        if count > self.capacity || element.uvs.len() != count {
            warn!("skipping batch element with {count} vertices and {} uvs", element.uvs.len());
            return Ok(0);
        }
        if let Some(&index) = element.indices.iter().find(|&&i| usize::from(i) >= count) {
            warn!("skipping batch element with index {index} past its {count} vertices");
            return Ok(0);
        }
        let mut draws = 0;
        if self.queued_vertices + count > self.capacity {
            draws = self.flush(gl, systems)?;
        }
        self.queued_vertices += count;
        self.elements.push(element);
        Ok(draws)
    }

    /// Draw everything queued. Returns the number of draw calls.
    pub fn flush<D: Device>(&mut self, gl: &D, systems: &mut Systems<D>) -> Result<u32> {
        if self.elements.is_empty() {
            return Ok(0);
        }
        self.pack();
        self.elements.clear();
        self.queued_vertices = 0;

        self.vertex_buffer.write(&self.vertices);
        self.index_buffer.write(&self.indices);

        let globals = systems.render_target.globals().clone();
        systems.shader.bind(
            gl,
            &self.shader,
            &globals,
            &mut systems.texture,
            &mut systems.buffer,
            false,
        )?;
        let gl_program = systems
            .shader
            .gl_program(&self.shader.program)
            .ok_or_else(|| RenderError::Device("batch program missing after bind".into()))?;
        systems.geometry.bind(
            gl,
            &self.geometry,
            &self.shader.program,
            gl_program,
            &mut systems.buffer,
        )?;

        let mut draws = 0;
        for group in &self.groups {
            for (slot, texture) in (0u32..).zip(&group.textures) {
                systems.texture.bind(gl, Some(texture), slot)?;
            }
            self.state.set_blend_mode(group.blend_mode);
            systems.state.set_state(gl, &self.state);
            systems
                .geometry
                .draw(gl, Topology::Triangles, Some(group.size), group.start, None)?;
            draws += 1;
        }
        Ok(draws)
    }

    /// Build vertices, indices and draw groups from the queue.
    #[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn pack(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.groups.clear();

        let mut group: Option<DrawGroup> = None;
        for element in &self.elements {
            let id = element.texture.id();
            let fits = group.as_ref().is_some_and(|g| {
                g.blend_mode == element.blend_mode
                    && (g.textures.iter().any(|t| t.id() == id)
                        || g.textures.len() < self.max_textures as usize)
            });
            if !fits {
                if let Some(done) = group.take() {
                    self.groups.push(done);
                }
                group = Some(DrawGroup {
                    textures: Vec::new(),
                    blend_mode: element.blend_mode,
                    start: self.indices.len() as u32,
                    size: 0,
                });
            }
            let Some(current) = group.as_mut() else {
                continue;
            };
            let slot = match current.textures.iter().position(|t| t.id() == id) {
                Some(slot) => slot,
                None => {
                    current.textures.push(element.texture.clone());
                    current.textures.len() - 1
                }
            };

            let base = self.vertices.len() as u16;
            self.vertices.extend(element.vertices.iter().zip(&element.uvs).map(
                |(&position, &uv)| BatchVertex {
                    position,
                    uv,
                    color: element.tint,
                    texture_id: slot as f32,
                },
            ));
            self.indices
                .extend(element.indices.iter().map(|&i| base.wrapping_add(i)));
            current.size += element.indices.len() as u32;
        }
        if let Some(done) = group {
            self.groups.push(done);
        }
    }
}

fn batch_shader(max_textures: u32) -> Shader {
    let samplers = (0..i32::try_from(max_textures).unwrap_or(i32::MAX)).collect();
    Shader::from_sources(
        BATCH_VERTEX_SRC,
        &batch_fragment_src(max_textures),
        "batch",
        UniformGroup::new([
            ("translationMatrix", UniformValue::Mat3(Mat3::IDENTITY)),
            ("tint", UniformValue::Vec4([1.0; 4])),
            ("uSamplers", UniformValue::Ints(samplers)),
        ]),
    )
}
