//! Compiles programs per context and keeps their uniforms in sync.

use std::collections::HashMap;

use log::{debug, warn};

use super::buffer::BufferSystem;
use super::texture::TextureSystem;
use super::ubo_layout::{self, UboLayout};
use super::uniform_sync::{self, Procedure, UniformOp};
use super::{ContextCache, ContextInfo, System};
use crate::device::{ActiveVariable, Capabilities, Device};
use crate::error::{RenderError, Result};
use crate::resources::program::Program;
use crate::resources::uniforms::{Shader, UniformGroup, UniformValue, GLOBALS};
use crate::resources::{DisposeQueue, ResourceId};
use crate::settings::ShaderPrecision;
use crate::shaders;

/// One active attribute of a linked program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramAttribute {
    /// Name in the source.
    pub name: String,
    /// GL type enum.
    pub gl_type: u32,
    /// Bound location.
    pub location: u32,
}

/// One active uniform of a linked program, with the words last uploaded.
#[derive(Debug)]
pub struct ProgramUniform<D: Device> {
    /// Name without any `[0]` suffix.
    pub name: String,
    /// GL type enum.
    pub gl_type: u32,
    /// Array length.
    pub size: i32,
    /// Location, `None` for members of uniform blocks.
    pub location: Option<D::UniformLocation>,
    cache: Vec<u32>,
}

/// The device side of one program.
pub struct GlProgram<D: Device> {
    /// Native handle.
    pub handle: D::Program,
    /// Active attributes sorted by name.
    pub attributes: Vec<ProgramAttribute>,
    /// Active uniforms in reflection order.
    pub uniforms: Vec<ProgramUniform<D>>,
    /// Attribute names and locations; programs with equal signatures can
    /// share vertex arrays.
    pub signature: String,
    reflection: Vec<ActiveVariable>,
    procedures: HashMap<String, Procedure<D>>,
    dirty_groups: HashMap<ResourceId, u64>,
    block_bindings: HashMap<ResourceId, u32>,
    ubo_layouts: HashMap<ResourceId, UboLayout>,
}

impl<D: Device> GlProgram<D> {
    /// Index of the uniform called `name` in [`uniforms`](Self::uniforms).
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        let name = name.trim_end_matches("[0]");
        self.uniforms.iter().position(|u| u.name == name)
    }

    /// Location of the attribute called `name`.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    /// Number of cached sync procedures.
    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }
}

/// Compiles programs lazily and syncs uniform groups into them.
pub struct ShaderSystem<D: Device> {
    programs: ContextCache<GlProgram<D>>,
    current: Option<ResourceId>,
    texture_count: u32,
    capabilities: Capabilities,
    precision: ShaderPrecision,
    scratch: Vec<u32>,
    disposed: DisposeQueue,
}

impl<D: Device> ShaderSystem<D> {
    /// Create with the precision injected into sources that lack one.
    pub fn new(precision: ShaderPrecision) -> Self {
        Self {
            programs: ContextCache::default(),
            current: None,
            texture_count: 0,
            capabilities: Capabilities::webgl1(),
            precision,
            scratch: Vec::new(),
            disposed: DisposeQueue::new(),
        }
    }

    /// The device side of `program`, if compiled in this context.
    pub fn gl_program(&self, program: &Program) -> Option<&GlProgram<D>> {
        self.programs.get(program.id())
    }

    /// The program in use.
    pub fn current(&self) -> Option<ResourceId> {
        self.current
    }

    /// Compile `program` for this context unless already done.
    pub fn compile(&mut self, gl: &D, program: &Program) -> Result<&GlProgram<D>> {
        let id = program.id();
        if !self.programs.contains(id) {
            let gl_program = self.build(gl, program)?;
            program.on_dispose(&self.disposed);
            self.programs.insert(id, gl_program);
        }
        self.programs
            .get(id)
            .ok_or_else(|| RenderError::Device("program cache miss".into()))
    }

    fn build(&self, gl: &D, program: &Program) -> Result<GlProgram<D>> {
        let (vertex, fragment) = shaders::prepare_program(
            program.vertex_source(),
            program.fragment_source(),
            self.capabilities.glsl,
            self.precision,
        );
        let handle = gl
            .create_program(&vertex, &fragment)
            .map_err(|log| RenderError::ShaderCompile {
                name: program.name().to_owned(),
                log,
            })?;
        debug!("compiled program `{}`", program.name());

        let mut attributes: Vec<ProgramAttribute> = gl
            .active_attributes(handle)
            .into_iter()
            .filter_map(|a| {
                let location = gl.attrib_location(handle, &a.name)?;
                Some(ProgramAttribute {
                    name: a.name,
                    gl_type: a.gl_type,
                    location,
                })
            })
            .collect();
        attributes.sort_by(|a, b| a.name.cmp(&b.name));
        let signature = attributes
            .iter()
            .map(|a| format!("{}:{}", a.name, a.location))
            .collect::<Vec<_>>()
            .join(",");

        let reflection = gl.active_uniforms(handle);
        let uniforms = reflection
            .iter()
            .map(|u| ProgramUniform {
                name: u.name.trim_end_matches("[0]").to_owned(),
                gl_type: u.gl_type,
                size: u.size,
                location: gl.uniform_location(handle, &u.name),
                cache: Vec::new(),
            })
            .collect();

        Ok(GlProgram {
            handle,
            attributes,
            uniforms,
            signature,
            reflection,
            procedures: HashMap::new(),
            dirty_groups: HashMap::new(),
            block_bindings: HashMap::new(),
            ubo_layouts: HashMap::new(),
        })
    }

    /// Make `shader` current and sync its uniforms.
    ///
    /// The renderer's `globals` group is attached to the shader's group
    /// first. A compile failure returns the error and leaves the program in
    /// use unchanged.
    pub fn bind(
        &mut self,
        gl: &D,
        shader: &Shader,
        globals: &UniformGroup,
        textures: &mut TextureSystem<D>,
        buffers: &mut BufferSystem<D>,
        dont_sync: bool,
    ) -> Result<()> {
        let id = shader.program.id();
        let handle = self.compile(gl, &shader.program)?.handle;

        shader
            .uniforms
            .set_silent(GLOBALS, UniformValue::Group(globals.clone()));

        if self.current != Some(id) {
            self.current = Some(id);
            gl.use_program(Some(handle));
        }

        if !dont_sync {
            self.texture_count = 0;
            self.sync_uniform_group(gl, &shader.uniforms, textures, buffers)?;
        }
        Ok(())
    }

    /// Upload the values of `group` to the current program.
    ///
    /// Static groups whose `dirty_id` has not moved since the last sync into
    /// this program are skipped. Values equal to the last upload are not
    /// uploaded again.
    pub fn sync_uniform_group(
        &mut self,
        gl: &D,
        group: &UniformGroup,
        textures: &mut TextureSystem<D>,
        buffers: &mut BufferSystem<D>,
    ) -> Result<()> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let Some(program) = self.programs.get_mut(current) else {
            return Ok(());
        };

        if group.is_static() && program.dirty_groups.get(&group.id()) == Some(&group.dirty_id()) {
            return Ok(());
        }
        program.dirty_groups.insert(group.id(), group.dirty_id());

        let signature = group.signature();
        let procedure = match program.procedures.get(&*signature) {
            Some(procedure) => procedure.clone(),
            None => {
                let procedure = uniform_sync::generate(gl, program, group);
                program.procedures.insert(signature.to_string(), procedure.clone());
                procedure
            }
        };

        let mut nested = Vec::new();
        {
            let uniforms = group.uniforms();
            for op in procedure.iter() {
                match *op {
                    UniformOp::Value {
                        entry,
                        uniform,
                        encode,
                        upload,
                    } => {
                        self.scratch.clear();
                        encode(&uniforms[entry].1, &mut self.scratch);
                        let target = &mut program.uniforms[uniform];
                        if target.cache != self.scratch {
                            target.cache.clone_from(&self.scratch);
                            if let Some(location) = &target.location {
                                upload(gl, location, &self.scratch);
                            }
                        }
                    }
                    UniformOp::Sampler { entry, uniform } => {
                        let unit = self.texture_count;
                        if unit >= self.capabilities.max_texture_units {
                            warn!("out of texture units for `{}`", uniforms[entry].0);
                            continue;
                        }
                        self.texture_count += 1;
                        let texture = match &uniforms[entry].1 {
                            UniformValue::Texture(texture) => texture.as_ref(),
                            _ => None,
                        };
                        textures.bind(gl, texture, unit)?;

                        let target = &mut program.uniforms[uniform];
                        if target.cache.as_slice() != [unit] {
                            target.cache = vec![unit];
                            if let Some(location) = &target.location {
                                gl.uniform_i32(location, 1, &[bytemuck::cast(unit)]);
                            }
                        }
                    }
                    UniformOp::Group { entry } => {
                        if let UniformValue::Group(g) = &uniforms[entry].1 {
                            nested.push(g.clone());
                        }
                    }
                    UniformOp::UniformBuffer { entry, block_index } => {
                        let UniformValue::Group(g) = &uniforms[entry].1 else {
                            continue;
                        };
                        sync_uniform_buffer(gl, program, g, block_index, buffers)?;
                    }
                }
            }
        }

        for group in nested {
            self.sync_uniform_group(gl, &group, textures, buffers)?;
        }
        Ok(())
    }

    /// Release programs disposed since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        for id in self.disposed.drain() {
            if let Some(program) = self.programs.remove(id) {
                gl.delete_program(program.handle);
            }
            if self.current == Some(id) {
                self.current = None;
            }
        }
    }

    /// Forget the program in use so the next bind issues `use_program`.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Number of compiled programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether nothing is compiled.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Write a uniform-buffer group when it changed and bind its buffer to the
/// block's binding point.
fn sync_uniform_buffer<D: Device>(
    gl: &D,
    program: &mut GlProgram<D>,
    group: &UniformGroup,
    block_index: u32,
    buffers: &mut BufferSystem<D>,
) -> Result<()> {
    let Some(buffer) = group.buffer() else {
        return Ok(());
    };

    let binding = match program.block_bindings.get(&group.id()) {
        Some(binding) => *binding,
        None => {
            let binding = u32::try_from(program.block_bindings.len()).unwrap_or(u32::MAX);
            gl.uniform_block_binding(program.handle, block_index, binding);
            program.block_bindings.insert(group.id(), binding);
            binding
        }
    };

    if program.dirty_groups.get(&group.id()) != Some(&group.dirty_id()) {
        program.dirty_groups.insert(group.id(), group.dirty_id());
        let uniforms = group.uniforms();
        let reflection = &program.reflection;
        let layout = program
            .ubo_layouts
            .entry(group.id())
            .or_insert_with(|| ubo_layout::layout_for_group(&uniforms, reflection));
        let mut data = vec![0u8; layout.size as usize];
        ubo_layout::write(layout, &uniforms, &mut data);
        buffer.set_data(data);
    }

    buffers.bind_buffer_base(gl, buffer, binding)
}

impl<D: Device> System<D> for ShaderSystem<D> {
    fn context_change(&mut self, _gl: &D, context: &ContextInfo) {
        self.programs.reset(context.uid);
        self.disposed.drain();
        self.capabilities = context.capabilities;
        self.current = None;
        self.texture_count = 0;
    }

    fn destroy(&mut self, gl: Option<&D>) {
        for (_, program) in self.programs.drain() {
            if let Some(gl) = gl {
                gl.delete_program(program.handle);
            }
        }
        self.current = None;
    }
}
