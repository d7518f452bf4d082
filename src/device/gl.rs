//! [`Device`] implementation over [`glow`].

use std::sync::Arc;

use glow::{HasContext, PixelUnpackData};

use super::{
    ActiveVariable, ApiVersion, AttributePointer, Capabilities, Device, GlslDialect, TexImageDesc,
    UNPACK_PREMULTIPLY_ALPHA,
};

/// A [`glow::Context`] plus its capability report.
///
/// The context is shared via [`Arc`] so the host can keep issuing its own GL
/// calls alongside the renderer.
pub struct GlDevice {
    gl: Arc<glow::Context>,
    capabilities: Capabilities,
}

impl GlDevice {
    /// Wrap a context and probe its capabilities.
    ///
    /// # Safety
    ///
    /// `gl` must be current on this thread for as long as the device is used,
    /// and every later call on the device assumes this.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Self {
        let capabilities = unsafe { probe(&gl) };
        log::debug!(
            "GL context {:?}, {} texture units, vao: {}, instancing: {}",
            capabilities.api,
            capabilities.max_texture_units,
            capabilities.vertex_array_objects,
            capabilities.instancing,
        );
        Self { gl, capabilities }
    }

    /// Override the stencil report, for hosts that know the surface layout
    /// better than the driver query.
    #[must_use]
    pub fn with_stencil(mut self, stencil: bool) -> Self {
        self.capabilities.stencil = stencil;
        self
    }

    /// The wrapped context.
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }
}

/// Derive the capability report from version and extension strings.
unsafe fn probe(gl: &glow::Context) -> Capabilities {
    let version = gl.version();
    let extensions = gl.supported_extensions();
    let has = |name: &str| extensions.contains(name);

    let (api, glsl) = if version.is_embedded {
        if version.major >= 3 {
            (ApiVersion::WebGl2, GlslDialect::Es300)
        } else {
            (ApiVersion::WebGl1, GlslDialect::Es100)
        }
    } else {
        (ApiVersion::WebGl2, GlslDialect::Core330)
    };
    let modern = api == ApiVersion::WebGl2;

    let units = unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS) };
    let stencil_bits = unsafe { gl.get_parameter_i32(glow::STENCIL_BITS) };

    Capabilities {
        api,
        glsl,
        vertex_array_objects: modern
            || has("OES_vertex_array_object")
            || has("GL_OES_vertex_array_object"),
        instancing: modern || has("ANGLE_instanced_arrays"),
        uniform_buffers: modern,
        element_index_uint: modern
            || has("OES_element_index_uint")
            || has("GL_OES_element_index_uint"),
        multisample: modern,
        draw_buffers: modern || has("WEBGL_draw_buffers"),
        max_texture_units: u32::try_from(units).unwrap_or(0).max(1),
        stencil: stencil_bits > 0 || !version.is_embedded,
    }
}

/// Compile a single shader stage from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(shader_type)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(format!("shader compile error: {log}"));
        }

        Ok(shader)
    }
}

/// `Some(slice)` pixel data in the form `tex_image_*` expects.
fn unpack(pixels: Option<&[u8]>) -> PixelUnpackData<'_> {
    PixelUnpackData::Slice(pixels)
}

impl Device for GlDevice {
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type Program = glow::Program;
    type VertexArray = glow::VertexArray;
    type Framebuffer = glow::Framebuffer;
    type Renderbuffer = glow::Renderbuffer;
    type UniformLocation = glow::UniformLocation;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { self.gl.create_buffer() }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(target, buffer) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset, data) }
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer_base(target, index, buffer) }
    }

    fn bind_buffer_range(
        &self,
        target: u32,
        index: u32,
        buffer: Option<Self::Buffer>,
        offset: i32,
        size: i32,
    ) {
        unsafe { self.gl.bind_buffer_range(target, index, buffer, offset, size) }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(target, texture) }
    }

    fn tex_image_2d(&self, target: u32, level: i32, desc: &TexImageDesc, pixels: Option<&[u8]>) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                level,
                desc.internal_format,
                desc.width,
                desc.height,
                0,
                desc.format,
                desc.data_type,
                unpack(pixels),
            );
        }
    }

    fn tex_sub_image_2d(&self, target: u32, level: i32, desc: &TexImageDesc, pixels: &[u8]) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                level,
                0,
                0,
                desc.width,
                desc.height,
                desc.format,
                desc.data_type,
                unpack(Some(pixels)),
            );
        }
    }

    fn tex_image_3d(
        &self,
        target: u32,
        level: i32,
        desc: &TexImageDesc,
        depth: i32,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            self.gl.tex_image_3d(
                target,
                level,
                desc.internal_format,
                desc.width,
                desc.height,
                depth,
                0,
                desc.format,
                desc.data_type,
                unpack(pixels),
            );
        }
    }

    fn tex_sub_image_3d(
        &self,
        target: u32,
        level: i32,
        layer: i32,
        desc: &TexImageDesc,
        pixels: &[u8],
    ) {
        unsafe {
            self.gl.tex_sub_image_3d(
                target,
                level,
                0,
                0,
                layer,
                desc.width,
                desc.height,
                1,
                desc.format,
                desc.data_type,
                unpack(Some(pixels)),
            );
        }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn generate_mipmap(&self, target: u32) {
        unsafe { self.gl.generate_mipmap(target) }
    }

    fn pixel_store_i32(&self, parameter: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(parameter, value) }
    }

    fn pixel_store_bool(&self, parameter: u32, value: bool) {
        // The premultiply unpack flag only exists in WebGL.
        if parameter == UNPACK_PREMULTIPLY_ALPHA && !cfg!(target_arch = "wasm32") {
            return;
        }
        unsafe { self.gl.pixel_store_bool(parameter, value) }
    }

    fn create_program(&self, vertex: &str, fragment: &str) -> Result<Self::Program, String> {
        let gl = &*self.gl;
        let program = unsafe { gl.create_program() }?;

        let vs = unsafe { compile_shader(gl, glow::VERTEX_SHADER, vertex) };
        let vs = match vs {
            Ok(vs) => vs,
            Err(err) => {
                unsafe { gl.delete_program(program) };
                return Err(err);
            }
        };
        let fs = match unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, fragment) } {
            Ok(fs) => fs,
            Err(err) => {
                unsafe {
                    gl.delete_shader(vs);
                    gl.delete_program(program);
                }
                return Err(err);
            }
        };

        unsafe {
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(format!("program link error: {log}"));
            }

            // Shaders can be detached and deleted after successful linking.
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
        }

        Ok(program)
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = self.gl.get_active_attributes(program);
            (0..count)
                .filter_map(|index| self.gl.get_active_attribute(program, index))
                .map(|a| ActiveVariable {
                    name: a.name,
                    gl_type: a.atype,
                    size: a.size,
                })
                .collect()
        }
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = self.gl.get_active_uniforms(program);
            (0..count)
                .filter_map(|index| self.gl.get_active_uniform(program, index))
                .map(|u| ActiveVariable {
                    name: u.name,
                    gl_type: u.utype,
                    size: u.size,
                })
                .collect()
        }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn uniform_block_index(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_uniform_block_index(program, name) }
    }

    fn uniform_block_binding(&self, program: Self::Program, index: u32, binding: u32) {
        unsafe { self.gl.uniform_block_binding(program, index, binding) }
    }

    fn uniform_f32(&self, location: &Self::UniformLocation, components: u32, data: &[f32]) {
        let location = Some(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(location, data),
                2 => self.gl.uniform_2_f32_slice(location, data),
                3 => self.gl.uniform_3_f32_slice(location, data),
                _ => self.gl.uniform_4_f32_slice(location, data),
            }
        }
    }

    fn uniform_i32(&self, location: &Self::UniformLocation, components: u32, data: &[i32]) {
        let location = Some(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(location, data),
                2 => self.gl.uniform_2_i32_slice(location, data),
                3 => self.gl.uniform_3_i32_slice(location, data),
                _ => self.gl.uniform_4_i32_slice(location, data),
            }
        }
    }

    fn uniform_u32(&self, location: &Self::UniformLocation, components: u32, data: &[u32]) {
        let location = Some(location);
        unsafe {
            match components {
                1 => self.gl.uniform_1_u32_slice(location, data),
                2 => self.gl.uniform_2_u32_slice(location, data),
                3 => self.gl.uniform_3_u32_slice(location, data),
                _ => self.gl.uniform_4_u32_slice(location, data),
            }
        }
    }

    fn uniform_matrix_f32(&self, location: &Self::UniformLocation, dimension: u32, data: &[f32]) {
        let location = Some(location);
        unsafe {
            match dimension {
                2 => self.gl.uniform_matrix_2_f32_slice(location, false, data),
                3 => self.gl.uniform_matrix_3_f32_slice(location, false, data),
                _ => self.gl.uniform_matrix_4_f32_slice(location, false, data),
            }
        }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer(&self, index: u32, p: &AttributePointer) {
        unsafe {
            if p.integer {
                self.gl
                    .vertex_attrib_pointer_i32(index, p.size, p.data_type, p.stride, p.offset);
            } else {
                self.gl.vertex_attrib_pointer_f32(
                    index,
                    p.size,
                    p.data_type,
                    p.normalized,
                    p.stride,
                    p.offset,
                );
            }
        }
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(index, divisor) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, element_type, offset) }
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        unsafe { self.gl.draw_arrays_instanced(mode, first, count, instances) }
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    ) {
        unsafe {
            self.gl
                .draw_elements_instanced(mode, count, element_type, offset, instances);
        }
    }

    fn enable(&self, capability: u32) {
        unsafe { self.gl.enable(capability) }
    }

    fn disable(&self, capability: u32) {
        unsafe { self.gl.disable(capability) }
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe {
            self.gl
                .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        }
    }

    fn blend_equation_separate(&self, rgb: u32, alpha: u32) {
        unsafe { self.gl.blend_equation_separate(rgb, alpha) }
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn front_face(&self, mode: u32) {
        unsafe { self.gl.front_face(mode) }
    }

    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool) {
        unsafe { self.gl.color_mask(red, green, blue, alpha) }
    }

    fn stencil_func(&self, func: u32, reference: i32, mask: u32) {
        unsafe { self.gl.stencil_func(func, reference, mask) }
    }

    fn stencil_op(&self, stencil_fail: u32, depth_fail: u32, pass: u32) {
        unsafe { self.gl.stencil_op(stencil_fail, depth_fail, pass) }
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        unsafe { self.gl.create_framebuffer() }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(target, framebuffer) }
    }

    fn framebuffer_texture_2d(
        &self,
        attachment: u32,
        texture_target: u32,
        texture: Option<Self::Texture>,
        level: i32,
    ) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                texture_target,
                texture,
                level,
            );
        }
    }

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String> {
        unsafe { self.gl.create_renderbuffer() }
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe { self.gl.bind_renderbuffer(glow::RENDERBUFFER, renderbuffer) }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32, samples: i32) {
        unsafe {
            if samples > 0 {
                self.gl.renderbuffer_storage_multisample(
                    glow::RENDERBUFFER,
                    samples,
                    internal_format,
                    width,
                    height,
                );
            } else {
                self.gl
                    .renderbuffer_storage(glow::RENDERBUFFER, internal_format, width, height);
            }
        }
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer,
            );
        }
    }

    fn draw_buffers(&self, attachments: &[u32]) {
        unsafe { self.gl.draw_buffers(attachments) }
    }

    fn blit_framebuffer(&self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32) {
        unsafe {
            self.gl.blit_framebuffer(
                src[0], src[1], src[2], src[3], dst[0], dst[1], dst[2], dst[3], mask, filter,
            );
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32) {
        unsafe { self.gl.clear_color(red, green, blue, alpha) }
    }

    fn clear_stencil(&self, value: i32) {
        unsafe { self.gl.clear_stencil(value) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }
}
