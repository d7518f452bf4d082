//! The seam between the renderer and a live GL context.
//!
//! [`Device`] lists exactly the GL entry points the systems issue. GL enum
//! arguments are the [`glow`] constants. [`GlDevice`] implements it on top
//! of a [`glow::Context`]; tests use a call-recording implementation.

mod gl;
#[cfg(test)]
pub(crate) mod recording;

use std::fmt::Debug;
use std::hash::Hash;

pub use gl::GlDevice;

/// `UNPACK_PREMULTIPLY_ALPHA_WEBGL`; ignored by desktop drivers.
pub const UNPACK_PREMULTIPLY_ALPHA: u32 = 0x9241;

/// The API generation of a device context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiVersion {
    /// WebGL 1 / OpenGL ES 2.0 feature level.
    WebGl1,
    /// WebGL 2 / OpenGL ES 3.0 (or desktop 3.3) feature level.
    WebGl2,
}

/// Shading language dialect accepted by the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlslDialect {
    /// GLSL ES 1.00 (`attribute`, `varying`, `gl_FragColor`).
    Es100,
    /// GLSL ES 3.00.
    Es300,
    /// Desktop GLSL 3.30 core.
    Core330,
}

/// What a device context can do. Queried once per context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// API generation.
    pub api: ApiVersion,
    /// Shading language dialect.
    pub glsl: GlslDialect,
    /// Native vertex array objects.
    pub vertex_array_objects: bool,
    /// Instanced drawing and attribute divisors.
    pub instancing: bool,
    /// Uniform buffer objects.
    pub uniform_buffers: bool,
    /// `UNSIGNED_INT` element indices.
    pub element_index_uint: bool,
    /// Multisampled renderbuffers and framebuffer blits.
    pub multisample: bool,
    /// Multiple color attachments via `drawBuffers`.
    pub draw_buffers: bool,
    /// Number of fragment texture image units.
    pub max_texture_units: u32,
    /// The default surface carries a stencil buffer.
    pub stencil: bool,
}

impl Capabilities {
    /// The guaranteed feature set of a WebGL2-class context.
    pub const fn webgl2() -> Self {
        Self {
            api: ApiVersion::WebGl2,
            glsl: GlslDialect::Es300,
            vertex_array_objects: true,
            instancing: true,
            uniform_buffers: true,
            element_index_uint: true,
            multisample: true,
            draw_buffers: true,
            max_texture_units: 16,
            stencil: true,
        }
    }

    /// The guaranteed feature set of a bare WebGL1 context (no extensions).
    pub const fn webgl1() -> Self {
        Self {
            api: ApiVersion::WebGl1,
            glsl: GlslDialect::Es100,
            vertex_array_objects: false,
            instancing: false,
            uniform_buffers: false,
            element_index_uint: false,
            multisample: false,
            draw_buffers: false,
            max_texture_units: 8,
            stencil: true,
        }
    }
}

/// Attributes requested when a context is created.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextAttributes {
    /// Antialiased default surface.
    pub antialias: bool,
    /// The default surface must have a stencil buffer (masks need it).
    pub stencil: bool,
    /// Premultiplied-alpha compositing of the default surface.
    pub premultiplied_alpha: bool,
}

/// Something that can produce device contexts, e.g. a canvas or a window.
pub trait DeviceProvider {
    /// The device type produced.
    type Device: Device;

    /// Request a context of exactly `api`; `None` if unavailable.
    fn request_device(
        &mut self,
        api: ApiVersion,
        attributes: &ContextAttributes,
    ) -> Option<Self::Device>;
}

impl<D, F> DeviceProvider for F
where
    D: Device,
    F: FnMut(ApiVersion, &ContextAttributes) -> Option<D>,
{
    type Device = D;

    fn request_device(&mut self, api: ApiVersion, attributes: &ContextAttributes) -> Option<D> {
        self(api, attributes)
    }
}

/// Reflection data for one active attribute or uniform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveVariable {
    /// Name as reported by the driver (arrays may end in `[0]`).
    pub name: String,
    /// GL type enum, e.g. `glow::FLOAT_VEC2`.
    pub gl_type: u32,
    /// Array length, 1 for non-arrays.
    pub size: i32,
}

/// Storage description for a texture image upload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TexImageDesc {
    /// Internal (possibly sized) format.
    pub internal_format: i32,
    /// Width in texels.
    pub width: i32,
    /// Height in texels.
    pub height: i32,
    /// Client pixel format.
    pub format: u32,
    /// Client component type.
    pub data_type: u32,
}

/// One `vertexAttribPointer` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttributePointer {
    /// Components per vertex (1-4).
    pub size: i32,
    /// Component type enum.
    pub data_type: u32,
    /// Normalize fixed-point values.
    pub normalized: bool,
    /// Bytes between consecutive elements, 0 for tightly packed.
    pub stride: i32,
    /// Byte offset of the first element.
    pub offset: i32,
    /// Use the integer pointer variant.
    pub integer: bool,
}

/// The GL entry points used by the renderer.
///
/// Implementations must only be constructed for a context that is current
/// on the calling thread; afterwards every method is safe to call.
#[expect(missing_docs)]
pub trait Device {
    type Buffer: Copy + Eq + Hash + Debug;
    type Texture: Copy + Eq + Hash + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type VertexArray: Copy + Eq + Hash + Debug;
    type Framebuffer: Copy + Eq + Hash + Debug;
    type Renderbuffer: Copy + Eq + Hash + Debug;
    type UniformLocation: Clone + Debug;

    /// Feature report for this context.
    fn capabilities(&self) -> Capabilities;

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]);
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<Self::Buffer>);
    fn bind_buffer_range(
        &self,
        target: u32,
        index: u32,
        buffer: Option<Self::Buffer>,
        offset: i32,
        size: i32,
    );

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_image_2d(&self, target: u32, level: i32, desc: &TexImageDesc, pixels: Option<&[u8]>);
    fn tex_sub_image_2d(&self, target: u32, level: i32, desc: &TexImageDesc, pixels: &[u8]);
    fn tex_image_3d(
        &self,
        target: u32,
        level: i32,
        desc: &TexImageDesc,
        depth: i32,
        pixels: Option<&[u8]>,
    );
    fn tex_sub_image_3d(
        &self,
        target: u32,
        level: i32,
        layer: i32,
        desc: &TexImageDesc,
        pixels: &[u8],
    );
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    fn generate_mipmap(&self, target: u32);
    fn pixel_store_i32(&self, parameter: u32, value: i32);
    fn pixel_store_bool(&self, parameter: u32, value: bool);

    /// Compile both stages and link them. The error carries the info log.
    fn create_program(&self, vertex: &str, fragment: &str) -> Result<Self::Program, String>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);
    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: Self::Program, name: &str)
        -> Option<Self::UniformLocation>;
    fn uniform_block_index(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_block_binding(&self, program: Self::Program, index: u32, binding: u32);
    /// `uniform{components}fv`
    fn uniform_f32(&self, location: &Self::UniformLocation, components: u32, data: &[f32]);
    /// `uniform{components}iv`
    fn uniform_i32(&self, location: &Self::UniformLocation, components: u32, data: &[i32]);
    /// `uniform{components}uiv`
    fn uniform_u32(&self, location: &Self::UniformLocation, components: u32, data: &[u32]);
    /// `uniformMatrix{dimension}fv`, column-major.
    fn uniform_matrix_f32(&self, location: &Self::UniformLocation, dimension: u32, data: &[f32]);

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer(&self, index: u32, pointer: &AttributePointer);
    fn vertex_attrib_divisor(&self, index: u32, divisor: u32);

    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32);
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    );

    fn enable(&self, capability: u32);
    fn disable(&self, capability: u32);
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&self, rgb: u32, alpha: u32);
    fn polygon_offset(&self, factor: f32, units: f32);
    fn front_face(&self, mode: u32);
    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool);
    fn stencil_func(&self, func: u32, reference: i32, mask: u32);
    fn stencil_op(&self, stencil_fail: u32, depth_fail: u32, pass: u32);

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn bind_framebuffer(&self, target: u32, framebuffer: Option<Self::Framebuffer>);
    fn framebuffer_texture_2d(
        &self,
        attachment: u32,
        texture_target: u32,
        texture: Option<Self::Texture>,
        level: i32,
    );
    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);
    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>);
    /// Allocate storage; `samples == 0` selects the single-sample call.
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32, samples: i32);
    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<Self::Renderbuffer>);
    fn draw_buffers(&self, attachments: &[u32]);
    fn blit_framebuffer(&self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32);
    fn clear_stencil(&self, value: i32);
    fn clear(&self, mask: u32);
}
