//! A [`Device`] that records every call instead of talking to a driver.
//!
//! Program reflection is fabricated from the GLSL sources: every
//! `attribute`/`in` declaration in the vertex stage becomes an active
//! attribute (locations in declaration order), every `uniform` declaration in
//! either stage becomes an active uniform, and `uniform Name {` opens a block.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::{ActiveVariable, AttributePointer, Capabilities, Device, TexImageDesc};

/// One recorded device call. Handles are plain integers.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateBuffer(u32),
    DeleteBuffer(u32),
    BindBuffer(u32, Option<u32>),
    BufferData { target: u32, len: usize, usage: u32 },
    BufferSubData { target: u32, offset: i32, len: usize },
    BindBufferBase { index: u32, buffer: Option<u32> },
    BindBufferRange { index: u32, buffer: Option<u32>, offset: i32, size: i32 },
    CreateTexture(u32),
    DeleteTexture(u32),
    ActiveTexture(u32),
    BindTexture(u32, Option<u32>),
    TexImage2d { target: u32, width: i32, height: i32, has_data: bool },
    TexSubImage2d { target: u32, width: i32, height: i32 },
    TexImage3d { depth: i32 },
    TexSubImage3d { layer: i32 },
    TexParameter(u32, i32),
    GenerateMipmap(u32),
    PixelStore(u32, i32),
    CreateProgram(u32),
    DeleteProgram(u32),
    UseProgram(Option<u32>),
    UniformBlockBinding { index: u32, binding: u32 },
    Uniform { location: u32, values: Vec<f32> },
    UniformMatrix { location: u32, dimension: u32 },
    CreateVertexArray(u32),
    DeleteVertexArray(u32),
    BindVertexArray(Option<u32>),
    EnableAttrib(u32),
    DisableAttrib(u32),
    AttribPointer { index: u32, pointer: AttributePointer },
    AttribDivisor { index: u32, divisor: u32 },
    DrawArrays { mode: u32, first: i32, count: i32, instances: i32 },
    DrawElements { mode: u32, count: i32, element_type: u32, offset: i32, instances: i32 },
    Enable(u32),
    Disable(u32),
    BlendFunc([u32; 4]),
    BlendEquation(u32, u32),
    PolygonOffset(f32, f32),
    FrontFace(u32),
    ColorMask([bool; 4]),
    StencilFunc { func: u32, reference: i32 },
    StencilOp([u32; 3]),
    CreateFramebuffer(u32),
    DeleteFramebuffer(u32),
    BindFramebuffer(u32, Option<u32>),
    FramebufferTexture { attachment: u32, texture: Option<u32> },
    CreateRenderbuffer(u32),
    DeleteRenderbuffer(u32),
    BindRenderbuffer(Option<u32>),
    RenderbufferStorage { format: u32, width: i32, height: i32, samples: i32 },
    FramebufferRenderbuffer { attachment: u32, renderbuffer: Option<u32> },
    DrawBuffers(Vec<u32>),
    Blit,
    Viewport([i32; 4]),
    ClearColor([f32; 4]),
    ClearStencil(i32),
    Clear(u32),
}

#[derive(Default)]
struct Reflection {
    attributes: Vec<ActiveVariable>,
    uniforms: Vec<ActiveVariable>,
    blocks: Vec<String>,
}

/// The recording device.
pub struct RecordingDevice {
    capabilities: Capabilities,
    calls: RefCell<Vec<Call>>,
    next_handle: Cell<u32>,
    programs: RefCell<HashMap<u32, Reflection>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::webgl2())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            calls: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
            programs: RefCell::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u32 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }
}

fn gl_type_of(name: &str) -> Option<u32> {
    Some(match name {
        "float" => glow::FLOAT,
        "vec2" => glow::FLOAT_VEC2,
        "vec3" => glow::FLOAT_VEC3,
        "vec4" => glow::FLOAT_VEC4,
        "int" => glow::INT,
        "ivec2" => glow::INT_VEC2,
        "ivec3" => glow::INT_VEC3,
        "ivec4" => glow::INT_VEC4,
        "uint" => glow::UNSIGNED_INT,
        "bool" => glow::BOOL,
        "mat2" => glow::FLOAT_MAT2,
        "mat3" => glow::FLOAT_MAT3,
        "mat4" => glow::FLOAT_MAT4,
        "sampler2D" => glow::SAMPLER_2D,
        "samplerCube" => glow::SAMPLER_CUBE,
        "sampler2DArray" => glow::SAMPLER_2D_ARRAY,
        _ => return None,
    })
}

/// Parse `[qualifiers] type name[N];` into a variable.
fn declaration(tokens: &[&str]) -> Option<ActiveVariable> {
    let mut rest = tokens
        .iter()
        .copied()
        .skip_while(|t| matches!(*t, "highp" | "mediump" | "lowp" | "flat"));
    let gl_type = gl_type_of(rest.next()?)?;
    let raw = rest.next()?.trim_end_matches(';');
    let (name, size) = match raw.split_once('[') {
        Some((name, len)) => (
            format!("{name}[0]"),
            len.trim_end_matches(']').parse().unwrap_or(1),
        ),
        None => (raw.to_owned(), 1),
    };
    Some(ActiveVariable {
        name,
        gl_type,
        size,
    })
}

fn reflect(vertex: &str, fragment: &str) -> Reflection {
    let mut reflection = Reflection::default();
    let mut in_block = false;
    for (stage, source) in [(0, vertex), (1, fragment)] {
        for line in source.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                ["}", ..] | ["};", ..] if in_block => in_block = false,
                ["uniform", block, "{"] => {
                    in_block = true;
                    if !reflection.blocks.iter().any(|b| b == block) {
                        reflection.blocks.push((*block).to_owned());
                    }
                }
                ["uniform", rest @ ..] => {
                    if let Some(var) = declaration(rest) {
                        if !reflection.uniforms.iter().any(|u| u.name == var.name) {
                            reflection.uniforms.push(var);
                        }
                    }
                }
                ["attribute" | "in", rest @ ..] if stage == 0 => {
                    if let Some(var) = declaration(rest) {
                        reflection.attributes.push(var);
                    }
                }
                _ if in_block => {
                    if let Some(var) = declaration(&tokens) {
                        reflection.uniforms.push(var);
                    }
                }
                _ => {}
            }
        }
    }
    reflection
}

fn strip_array(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}

impl Device for RecordingDevice {
    type Buffer = u32;
    type Texture = u32;
    type Program = u32;
    type VertexArray = u32;
    type Framebuffer = u32;
    type Renderbuffer = u32;
    type UniformLocation = u32;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&self) -> Result<u32, String> {
        let h = self.handle();
        self.record(Call::CreateBuffer(h));
        Ok(h)
    }

    fn delete_buffer(&self, buffer: u32) {
        self.record(Call::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: u32, buffer: Option<u32>) {
        self.record(Call::BindBuffer(target, buffer));
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        self.record(Call::BufferData {
            target,
            len: data.len(),
            usage,
        });
    }

    fn buffer_sub_data(&self, target: u32, offset: i32, data: &[u8]) {
        self.record(Call::BufferSubData {
            target,
            offset,
            len: data.len(),
        });
    }

    fn bind_buffer_base(&self, _target: u32, index: u32, buffer: Option<u32>) {
        self.record(Call::BindBufferBase { index, buffer });
    }

    fn bind_buffer_range(
        &self,
        _target: u32,
        index: u32,
        buffer: Option<u32>,
        offset: i32,
        size: i32,
    ) {
        self.record(Call::BindBufferRange {
            index,
            buffer,
            offset,
            size,
        });
    }

    fn create_texture(&self) -> Result<u32, String> {
        let h = self.handle();
        self.record(Call::CreateTexture(h));
        Ok(h)
    }

    fn delete_texture(&self, texture: u32) {
        self.record(Call::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(Call::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: Option<u32>) {
        self.record(Call::BindTexture(target, texture));
    }

    fn tex_image_2d(&self, target: u32, _level: i32, desc: &TexImageDesc, pixels: Option<&[u8]>) {
        self.record(Call::TexImage2d {
            target,
            width: desc.width,
            height: desc.height,
            has_data: pixels.is_some(),
        });
    }

    fn tex_sub_image_2d(&self, target: u32, _level: i32, desc: &TexImageDesc, _pixels: &[u8]) {
        self.record(Call::TexSubImage2d {
            target,
            width: desc.width,
            height: desc.height,
        });
    }

    fn tex_image_3d(
        &self,
        _target: u32,
        _level: i32,
        _desc: &TexImageDesc,
        depth: i32,
        _pixels: Option<&[u8]>,
    ) {
        self.record(Call::TexImage3d { depth });
    }

    fn tex_sub_image_3d(
        &self,
        _target: u32,
        _level: i32,
        layer: i32,
        _desc: &TexImageDesc,
        _pixels: &[u8],
    ) {
        self.record(Call::TexSubImage3d { layer });
    }

    fn tex_parameter_i32(&self, _target: u32, parameter: u32, value: i32) {
        self.record(Call::TexParameter(parameter, value));
    }

    fn generate_mipmap(&self, target: u32) {
        self.record(Call::GenerateMipmap(target));
    }

    fn pixel_store_i32(&self, parameter: u32, value: i32) {
        self.record(Call::PixelStore(parameter, value));
    }

    fn pixel_store_bool(&self, parameter: u32, value: bool) {
        self.record(Call::PixelStore(parameter, i32::from(value)));
    }

    fn create_program(&self, vertex: &str, fragment: &str) -> Result<u32, String> {
        if vertex.contains("SYNTAX_ERROR") || fragment.contains("SYNTAX_ERROR") {
            return Err("0:1: syntax error".to_owned());
        }
        let h = self.handle();
        self.programs.borrow_mut().insert(h, reflect(vertex, fragment));
        self.record(Call::CreateProgram(h));
        Ok(h)
    }

    fn delete_program(&self, program: u32) {
        self.record(Call::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<u32>) {
        self.record(Call::UseProgram(program));
    }

    fn active_attributes(&self, program: u32) -> Vec<ActiveVariable> {
        self.programs
            .borrow()
            .get(&program)
            .map(|r| r.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: u32) -> Vec<ActiveVariable> {
        self.programs
            .borrow()
            .get(&program)
            .map(|r| r.uniforms.clone())
            .unwrap_or_default()
    }

    fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
        let programs = self.programs.borrow();
        let position = programs
            .get(&program)?
            .attributes
            .iter()
            .position(|a| a.name == name)?;
        u32::try_from(position).ok()
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32> {
        let programs = self.programs.borrow();
        let position = programs
            .get(&program)?
            .uniforms
            .iter()
            .position(|u| strip_array(&u.name) == strip_array(name))?;
        u32::try_from(position).ok()
    }

    fn uniform_block_index(&self, program: u32, name: &str) -> Option<u32> {
        let programs = self.programs.borrow();
        let position = programs.get(&program)?.blocks.iter().position(|b| b == name)?;
        u32::try_from(position).ok()
    }

    fn uniform_block_binding(&self, _program: u32, index: u32, binding: u32) {
        self.record(Call::UniformBlockBinding { index, binding });
    }

    fn uniform_f32(&self, location: &u32, _components: u32, data: &[f32]) {
        self.record(Call::Uniform {
            location: *location,
            values: data.to_vec(),
        });
    }

    #[expect(clippy::cast_precision_loss)]
    fn uniform_i32(&self, location: &u32, _components: u32, data: &[i32]) {
        self.record(Call::Uniform {
            location: *location,
            values: data.iter().map(|v| *v as f32).collect(),
        });
    }

    #[expect(clippy::cast_precision_loss)]
    fn uniform_u32(&self, location: &u32, _components: u32, data: &[u32]) {
        self.record(Call::Uniform {
            location: *location,
            values: data.iter().map(|v| *v as f32).collect(),
        });
    }

    fn uniform_matrix_f32(&self, location: &u32, dimension: u32, _data: &[f32]) {
        self.record(Call::UniformMatrix {
            location: *location,
            dimension,
        });
    }

    fn create_vertex_array(&self) -> Result<u32, String> {
        let h = self.handle();
        self.record(Call::CreateVertexArray(h));
        Ok(h)
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        self.record(Call::DeleteVertexArray(vertex_array));
    }

    fn bind_vertex_array(&self, vertex_array: Option<u32>) {
        self.record(Call::BindVertexArray(vertex_array));
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(Call::EnableAttrib(index));
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        self.record(Call::DisableAttrib(index));
    }

    fn vertex_attrib_pointer(&self, index: u32, pointer: &AttributePointer) {
        self.record(Call::AttribPointer {
            index,
            pointer: *pointer,
        });
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        self.record(Call::AttribDivisor { index, divisor });
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(Call::DrawArrays {
            mode,
            first,
            count,
            instances: 1,
        });
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        self.record(Call::DrawElements {
            mode,
            count,
            element_type,
            offset,
            instances: 1,
        });
    }

    fn draw_arrays_instanced(&self, mode: u32, first: i32, count: i32, instances: i32) {
        self.record(Call::DrawArrays {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: i32,
        element_type: u32,
        offset: i32,
        instances: i32,
    ) {
        self.record(Call::DrawElements {
            mode,
            count,
            element_type,
            offset,
            instances,
        });
    }

    fn enable(&self, capability: u32) {
        self.record(Call::Enable(capability));
    }

    fn disable(&self, capability: u32) {
        self.record(Call::Disable(capability));
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(Call::BlendFunc([src_rgb, dst_rgb, src_alpha, dst_alpha]));
    }

    fn blend_equation_separate(&self, rgb: u32, alpha: u32) {
        self.record(Call::BlendEquation(rgb, alpha));
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record(Call::PolygonOffset(factor, units));
    }

    fn front_face(&self, mode: u32) {
        self.record(Call::FrontFace(mode));
    }

    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.record(Call::ColorMask([red, green, blue, alpha]));
    }

    fn stencil_func(&self, func: u32, reference: i32, _mask: u32) {
        self.record(Call::StencilFunc { func, reference });
    }

    fn stencil_op(&self, stencil_fail: u32, depth_fail: u32, pass: u32) {
        self.record(Call::StencilOp([stencil_fail, depth_fail, pass]));
    }

    fn create_framebuffer(&self) -> Result<u32, String> {
        let h = self.handle();
        self.record(Call::CreateFramebuffer(h));
        Ok(h)
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.record(Call::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<u32>) {
        self.record(Call::BindFramebuffer(target, framebuffer));
    }

    fn framebuffer_texture_2d(
        &self,
        attachment: u32,
        _texture_target: u32,
        texture: Option<u32>,
        _level: i32,
    ) {
        self.record(Call::FramebufferTexture {
            attachment,
            texture,
        });
    }

    fn create_renderbuffer(&self) -> Result<u32, String> {
        let h = self.handle();
        self.record(Call::CreateRenderbuffer(h));
        Ok(h)
    }

    fn delete_renderbuffer(&self, renderbuffer: u32) {
        self.record(Call::DeleteRenderbuffer(renderbuffer));
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<u32>) {
        self.record(Call::BindRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32, samples: i32) {
        self.record(Call::RenderbufferStorage {
            format: internal_format,
            width,
            height,
            samples,
        });
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<u32>) {
        self.record(Call::FramebufferRenderbuffer {
            attachment,
            renderbuffer,
        });
    }

    fn draw_buffers(&self, attachments: &[u32]) {
        self.record(Call::DrawBuffers(attachments.to_vec()));
    }

    fn blit_framebuffer(&self, _src: [i32; 4], _dst: [i32; 4], _mask: u32, _filter: u32) {
        self.record(Call::Blit);
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(Call::Viewport([x, y, width, height]));
    }

    fn clear_color(&self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.record(Call::ClearColor([red, green, blue, alpha]));
    }

    fn clear_stencil(&self, value: i32) {
        self.record(Call::ClearStencil(value));
    }

    fn clear(&self, mask: u32) {
        self.record(Call::Clear(mask));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reflection_reads_attributes_uniforms_and_blocks() {
        let vs = "attribute vec2 aPosition;\nattribute vec4 aColor;\nuniform mat3 projectionMatrix;";
        let fs = "uniform sampler2D uSamplers[4];\nuniform Globals {\n  vec4 tint;\n};";
        let device = RecordingDevice::new();
        let program = device.create_program(vs, fs).unwrap();

        let attributes = device.active_attributes(program);
        assert_eq!(attributes.len(), 2);
        assert_eq!(device.attrib_location(program, "aColor"), Some(1));

        let uniforms = device.active_uniforms(program);
        assert!(uniforms.iter().any(|u| u.name == "uSamplers[0]" && u.size == 4));
        assert!(uniforms.iter().any(|u| u.name == "tint"));
        assert_eq!(device.uniform_block_index(program, "Globals"), Some(0));
    }

    #[test]
    fn syntax_error_fails_compile() {
        let device = RecordingDevice::new();
        assert!(device.create_program("SYNTAX_ERROR", "").is_err());
        assert!(device.is_empty());
    }
}
