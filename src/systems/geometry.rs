//! Binds geometries to programs through cached vertex arrays and issues draws.

use std::collections::HashMap;

use log::warn;

use super::buffer::BufferSystem;
use super::shader::GlProgram;
use super::{ContextCache, ContextInfo, System};
use crate::device::{AttributePointer, Capabilities, Device};
use crate::error::{RenderError, Result};
use crate::resources::geometry::{Geometry, IndexFormat, Topology};
use crate::resources::program::Program;
use crate::resources::{DisposeQueue, ResourceId};

/// Vertex arrays of one geometry.
///
/// Programs with the same attribute signature share a vertex array, so
/// `by_signature` holds each array exactly once.
struct GeometryVaos<D: Device> {
    by_program: HashMap<ResourceId, D::VertexArray>,
    by_signature: HashMap<String, D::VertexArray>,
}

impl<D: Device> Default for GeometryVaos<D> {
    fn default() -> Self {
        Self {
            by_program: HashMap::new(),
            by_signature: HashMap::new(),
        }
    }
}

/// Tracks the bound geometry and the vertex arrays built for it.
pub struct GeometrySystem<D: Device> {
    vaos: ContextCache<GeometryVaos<D>>,
    current_geometry: Option<Geometry>,
    current_program: Option<ResourceId>,
    current_vao: Option<D::VertexArray>,
    enabled: Vec<u32>,
    capabilities: Capabilities,
    disposed: DisposeQueue,
}

impl<D: Device> Default for GeometrySystem<D> {
    fn default() -> Self {
        Self {
            vaos: ContextCache::default(),
            current_geometry: None,
            current_program: None,
            current_vao: None,
            enabled: Vec::new(),
            capabilities: Capabilities::webgl1(),
            disposed: DisposeQueue::new(),
        }
    }
}

impl<D: Device> GeometrySystem<D> {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// The geometry bound last.
    pub fn current(&self) -> Option<&Geometry> {
        self.current_geometry.as_ref()
    }

    /// The vertex array used for `geometry` with `program`, if built.
    pub fn vertex_array(&self, geometry: &Geometry, program: &Program) -> Option<D::VertexArray> {
        self.vaos
            .get(geometry.id())?
            .by_program
            .get(&program.id())
            .copied()
    }

    /// Fail if `program` reads an attribute `geometry` does not provide.
    pub fn check_compatibility(
        geometry: &Geometry,
        program: &Program,
        gl_program: &GlProgram<D>,
    ) -> Result<()> {
        for attribute in &gl_program.attributes {
            if geometry.attribute(&attribute.name).is_none() {
                return Err(RenderError::IncompatibleGeometry {
                    attribute: attribute.name.clone(),
                    program: program.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Bind `geometry` for drawing with `program`, then bring its buffers up
    /// to date.
    ///
    /// The vertex array is built once per geometry and attribute signature.
    /// Without vertex-array support the attribute pointers are set up again
    /// whenever the geometry or program changes.
    pub fn bind(
        &mut self,
        gl: &D,
        geometry: &Geometry,
        program: &Program,
        gl_program: &GlProgram<D>,
        buffers: &mut BufferSystem<D>,
    ) -> Result<()> {
        let same_geometry = self
            .current_geometry
            .as_ref()
            .is_some_and(|g| g.id() == geometry.id());
        if !same_geometry || self.current_program != Some(program.id()) {
            Self::check_compatibility(geometry, program, gl_program)?;
            self.check_instancing(geometry, gl_program)?;

            if self.capabilities.vertex_array_objects {
                let vao = match self.vertex_array(geometry, program) {
                    Some(vao) => vao,
                    None => self.init_vao(gl, geometry, program, gl_program, buffers)?,
                };
                self.bind_vao(gl, Some(vao));
            } else {
                self.activate(gl, geometry, gl_program, buffers)?;
            }
            self.current_geometry = Some(geometry.clone());
            self.current_program = Some(program.id());
        }
        self.update_buffers(gl, buffers)
    }

    fn check_instancing(&self, geometry: &Geometry, gl_program: &GlProgram<D>) -> Result<()> {
        if self.capabilities.instancing {
            return Ok(());
        }
        for (name, attribute) in geometry.attributes() {
            if attribute.instance && gl_program.attribute_location(name).is_some() {
                return Err(RenderError::InstancingUnsupported {
                    attribute: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn init_vao(
        &mut self,
        gl: &D,
        geometry: &Geometry,
        program: &Program,
        gl_program: &GlProgram<D>,
        buffers: &mut BufferSystem<D>,
    ) -> Result<D::VertexArray> {
        if !self.vaos.contains(geometry.id()) {
            geometry.on_dispose(&self.disposed);
            self.vaos.insert(geometry.id(), GeometryVaos::default());
        }

        let shared = self
            .vaos
            .get(geometry.id())
            .and_then(|vaos| vaos.by_signature.get(&gl_program.signature).copied());
        let vao = match shared {
            Some(vao) => vao,
            None => {
                let vao = gl.create_vertex_array().map_err(RenderError::Device)?;
                self.bind_vao(gl, Some(vao));
                for buffer in geometry.buffers() {
                    buffers.update(gl, &buffer)?;
                }
                self.activate(gl, geometry, gl_program, buffers)?;
                if let Some(vaos) = self.vaos.get_mut(geometry.id()) {
                    vaos.by_signature.insert(gl_program.signature.clone(), vao);
                }
                vao
            }
        };
        if let Some(vaos) = self.vaos.get_mut(geometry.id()) {
            vaos.by_program.insert(program.id(), vao);
        }
        Ok(vao)
    }

    fn bind_vao(&mut self, gl: &D, vao: Option<D::VertexArray>) {
        if self.current_vao != vao {
            self.current_vao = vao;
            gl.bind_vertex_array(vao);
        }
    }

    /// Point every attribute the program reads at its buffer.
    #[expect(clippy::cast_possible_wrap)]
    fn activate(
        &mut self,
        gl: &D,
        geometry: &Geometry,
        gl_program: &GlProgram<D>,
        buffers: &mut BufferSystem<D>,
    ) -> Result<()> {
        let mut last_buffer = None;
        let mut enabled = Vec::with_capacity(gl_program.attributes.len());

        for ((name, attribute), layout) in geometry.attributes().iter().zip(geometry.layout()) {
            let Some(location) = gl_program.attribute_location(name) else {
                continue;
            };
            if last_buffer != Some(attribute.buffer.id()) {
                buffers.bind(gl, &attribute.buffer)?;
                last_buffer = Some(attribute.buffer.id());
            }

            gl.enable_vertex_attrib_array(location);
            enabled.push(location);
            gl.vertex_attrib_pointer(
                location,
                &AttributePointer {
                    size: layout.format.components(),
                    data_type: layout.format.data_type(),
                    normalized: layout.format.normalized(),
                    stride: layout.stride as i32,
                    offset: layout.offset as i32,
                    integer: layout.format.integer(),
                },
            );
            if layout.instance {
                gl.vertex_attrib_divisor(location, 1);
            }
        }

        if let Some((index, _)) = geometry.index() {
            buffers.bind(gl, index)?;
        }

        if self.current_vao.is_none() {
            for location in self.enabled.drain(..) {
                if !enabled.contains(&location) {
                    gl.disable_vertex_attrib_array(location);
                }
            }
            self.enabled = enabled;
        }
        Ok(())
    }

    /// Upload whichever buffers of the bound geometry changed.
    pub fn update_buffers(&mut self, gl: &D, buffers: &mut BufferSystem<D>) -> Result<()> {
        let Some(geometry) = &self.current_geometry else {
            return Ok(());
        };
        for buffer in geometry.buffers() {
            buffers.update(gl, &buffer)?;
        }
        Ok(())
    }

    /// Draw the bound geometry.
    ///
    /// `size` defaults to the index count (or vertex count when not
    /// indexed), `instances` to the geometry's instance count. `start` is in
    /// elements.
    #[expect(clippy::cast_possible_wrap)]
    pub fn draw(
        &self,
        gl: &D,
        topology: Topology,
        size: Option<u32>,
        start: u32,
        instances: Option<u32>,
    ) -> Result<()> {
        let Some(geometry) = &self.current_geometry else {
            warn!("draw with no geometry bound");
            return Ok(());
        };
        let mode = topology.gl_mode();
        let instanced = geometry.instanced();
        let instances = instances.unwrap_or_else(|| geometry.instance_count()) as i32;

        match geometry.index() {
            Some((_, format)) => {
                if format == IndexFormat::U32 && !self.capabilities.element_index_uint {
                    return Err(RenderError::Uint32IndicesUnsupported);
                }
                let count = size.or_else(|| geometry.index_count()).unwrap_or(0) as i32;
                let offset = (start * format.byte_size()) as i32;
                if instanced {
                    gl.draw_elements_instanced(mode, count, format.gl_type(), offset, instances);
                } else {
                    gl.draw_elements(mode, count, format.gl_type(), offset);
                }
            }
            None => {
                let count = size.unwrap_or_else(|| geometry.size()) as i32;
                if instanced {
                    gl.draw_arrays_instanced(mode, start as i32, count, instances);
                } else {
                    gl.draw_arrays(mode, start as i32, count);
                }
            }
        }
        Ok(())
    }

    /// Unbind the vertex array and forget the bound geometry.
    pub fn unbind(&mut self, gl: &D) {
        self.bind_vao(gl, None);
        self.current_geometry = None;
        self.current_program = None;
    }

    /// Forget what is bound without touching the device.
    pub fn reset(&mut self) {
        self.current_geometry = None;
        self.current_program = None;
        self.current_vao = None;
        self.enabled.clear();
    }

    /// Delete the vertex arrays of geometries disposed since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        for id in self.disposed.drain() {
            let Some(vaos) = self.vaos.remove(id) else {
                continue;
            };
            for vao in vaos.by_signature.into_values() {
                if self.current_vao == Some(vao) {
                    self.current_vao = None;
                    gl.bind_vertex_array(None);
                }
                gl.delete_vertex_array(vao);
            }
            if self.current_geometry.as_ref().is_some_and(|g| g.id() == id) {
                self.current_geometry = None;
                self.current_program = None;
            }
        }
    }

    /// Number of geometries with vertex arrays.
    pub fn len(&self) -> usize {
        self.vaos.len()
    }

    /// Whether no vertex array exists.
    pub fn is_empty(&self) -> bool {
        self.vaos.is_empty()
    }
}

impl<D: Device> System<D> for GeometrySystem<D> {
    fn context_change(&mut self, _gl: &D, context: &ContextInfo) {
        self.vaos.reset(context.uid);
        self.disposed.drain();
        self.capabilities = context.capabilities;
        self.reset();
    }

    fn destroy(&mut self, gl: Option<&D>) {
        for (_, vaos) in self.vaos.drain() {
            if let Some(gl) = gl {
                for vao in vaos.by_signature.into_values() {
                    gl.delete_vertex_array(vao);
                }
            }
        }
        self.reset();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};
    use crate::resources::geometry::{Attribute, VertexFormat};
    use crate::resources::buffer::Buffer;
    use crate::systems::{ContextUid, ShaderSystem};
    use crate::settings::ShaderPrecision;

    const QUAD_VS: &str = "attribute vec2 aVertexPosition;\nvoid main() {}";
    const UV_VS: &str = "attribute vec2 aVertexPosition;\nattribute vec2 aTextureCoord;\nvoid main() {}";
    const FS: &str = "void main() {}";

    struct Fixture {
        gl: RecordingDevice,
        shaders: ShaderSystem<RecordingDevice>,
        geometry: GeometrySystem<RecordingDevice>,
        buffers: BufferSystem<RecordingDevice>,
    }

    impl Fixture {
        fn new(capabilities: Capabilities) -> Self {
            let gl = RecordingDevice::with_capabilities(capabilities);
            let info = ContextInfo {
                uid: ContextUid(1),
                capabilities,
            };
            let mut shaders = ShaderSystem::new(ShaderPrecision::default());
            let mut geometry = GeometrySystem::new();
            let mut buffers = BufferSystem::new();
            shaders.context_change(&gl, &info);
            geometry.context_change(&gl, &info);
            buffers.context_change(&gl, &info);
            Self {
                gl,
                shaders,
                geometry,
                buffers,
            }
        }

        fn bind(&mut self, geometry: &Geometry, program: &Program) -> Result<()> {
            let gl_program = self.shaders.compile(&self.gl, program)?;
            self.geometry
                .bind(&self.gl, geometry, program, gl_program, &mut self.buffers)
        }
    }

    fn quad() -> Geometry {
        Geometry::builder()
            .attribute_data(
                "aVertexPosition",
                &[0.0f32, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
                VertexFormat::Float32x2,
            )
            .indices_u16(&[0, 1, 2, 0, 2, 3])
            .build()
    }

    #[test]
    fn quad_draws_once_and_reuses_its_vertex_array() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let geometry = quad();
        let program = Program::from_sources(QUAD_VS, FS, "quad");

        f.bind(&geometry, &program).unwrap();
        f.geometry
            .draw(&f.gl, Topology::Triangles, None, 0, None)
            .unwrap();
        let draws: Vec<_> = f
            .gl
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::DrawElements { .. }))
            .collect();
        assert_eq!(
            draws,
            vec![Call::DrawElements {
                mode: glow::TRIANGLES,
                count: 6,
                element_type: glow::UNSIGNED_SHORT,
                offset: 0,
                instances: 1,
            }]
        );

        f.gl.clear();
        f.bind(&geometry, &program).unwrap();
        f.geometry
            .draw(&f.gl, Topology::Triangles, None, 0, None)
            .unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::AttribPointer { .. })), 0);
        assert_eq!(f.gl.count(|c| matches!(c, Call::BufferData { .. })), 0);
        assert_eq!(f.gl.count(|c| matches!(c, Call::DrawElements { count: 6, .. })), 1);
    }

    #[test]
    fn new_geometry_uploads_inside_its_own_vertex_array() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let program = Program::from_sources(QUAD_VS, FS, "quad");
        let first = quad();
        let second = quad();

        f.bind(&first, &program).unwrap();
        let first_vao = f.geometry.vertex_array(&first, &program);
        f.gl.clear();
        f.bind(&second, &program).unwrap();

        let mut bound = first_vao;
        for call in f.gl.calls() {
            match call {
                Call::BindVertexArray(vao) => bound = vao,
                Call::BindBuffer(glow::ELEMENT_ARRAY_BUFFER, _) => {
                    assert_ne!(bound, first_vao, "index buffer bound into another vertex array");
                }
                _ => {}
            }
        }
        assert_eq!(f.geometry.vertex_array(&second, &program), bound);
    }

    #[test]
    fn distinct_program_gets_its_own_vertex_array() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let buffer = Buffer::vertex(&[0.0f32; 16]);
        let geometry = Geometry::builder()
            .attribute("aVertexPosition", Attribute::new(buffer.clone(), VertexFormat::Float32x2))
            .attribute("aTextureCoord", Attribute::new(buffer, VertexFormat::Float32x2))
            .build();
        let plain = Program::from_sources(QUAD_VS, FS, "plain");
        let textured = Program::from_sources(UV_VS, FS, "textured");

        f.bind(&geometry, &plain).unwrap();
        let first = f.geometry.vertex_array(&geometry, &plain).unwrap();
        f.bind(&geometry, &textured).unwrap();
        let second = f.geometry.vertex_array(&geometry, &textured).unwrap();

        assert_ne!(first, second);
        assert_eq!(f.geometry.vertex_array(&geometry, &plain), Some(first));

        f.bind(&geometry, &plain).unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::CreateVertexArray(_))), 2);
    }

    #[test]
    fn shared_buffer_is_bound_once() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let buffer = Buffer::vertex(&[0.0f32; 16]);
        let geometry = Geometry::builder()
            .attribute("aVertexPosition", Attribute::new(buffer.clone(), VertexFormat::Float32x2))
            .attribute("aTextureCoord", Attribute::new(buffer, VertexFormat::Float32x2))
            .build();
        let program = Program::from_sources(UV_VS, FS, "textured");
        f.gl.clear();
        f.bind(&geometry, &program).unwrap();

        let pointers: Vec<_> = f
            .gl
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AttribPointer { pointer, .. } => Some((pointer.stride, pointer.offset)),
                _ => None,
            })
            .collect();
        assert_eq!(pointers, vec![(16, 0), (16, 8)]);
        assert_eq!(
            f.gl.count(|c| matches!(c, Call::BindBuffer(glow::ARRAY_BUFFER, _))),
            2,
            "one for the upload, one for the pointers"
        );
    }

    #[test]
    fn missing_attribute_is_fatal() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let geometry = quad();
        let program = Program::from_sources(UV_VS, FS, "needs-uv");
        let err = f.bind(&geometry, &program).unwrap_err();
        assert_eq!(
            err,
            RenderError::IncompatibleGeometry {
                attribute: "aTextureCoord".into(),
                program: "needs-uv".into(),
            }
        );
        assert!(f.geometry.current().is_none());
    }

    #[test]
    fn instanced_attribute_needs_instancing() {
        let mut caps = Capabilities::webgl1();
        caps.vertex_array_objects = true;
        let mut f = Fixture::new(caps);
        let geometry = quad()
            .to_builder()
            .attribute(
                "aTextureCoord",
                Attribute::new(Buffer::vertex(&[0.0f32; 2]), VertexFormat::Float32x2).instanced(),
            )
            .build();
        let program = Program::from_sources(UV_VS, FS, "instanced");
        let err = f.bind(&geometry, &program).unwrap_err();
        assert_eq!(
            err,
            RenderError::InstancingUnsupported {
                attribute: "aTextureCoord".into()
            }
        );
        assert_eq!(f.gl.count(|c| matches!(c, Call::CreateVertexArray(_))), 0);
    }

    #[test]
    fn instanced_geometry_uses_instanced_draw() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let geometry = quad()
            .to_builder()
            .attribute(
                "aTextureCoord",
                Attribute::new(Buffer::vertex(&[0.0f32; 6]), VertexFormat::Float32x2).instanced(),
            )
            .instance_count(3)
            .build();
        let program = Program::from_sources(UV_VS, FS, "instanced");
        f.bind(&geometry, &program).unwrap();
        assert!(f.gl.calls().contains(&Call::AttribDivisor { index: 1, divisor: 1 }));

        f.geometry
            .draw(&f.gl, Topology::Triangles, None, 0, None)
            .unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::DrawElements { instances: 3, .. })), 1);
    }

    #[test]
    fn u32_indices_need_support() {
        let mut f = Fixture::new(Capabilities::webgl1());
        let geometry = Geometry::builder()
            .attribute_data("aVertexPosition", &[0.0f32; 8], VertexFormat::Float32x2)
            .indices_u32(&[0, 1, 2])
            .build();
        let program = Program::from_sources(QUAD_VS, FS, "wide");
        f.bind(&geometry, &program).unwrap();
        assert_eq!(
            f.geometry.draw(&f.gl, Topology::Triangles, None, 0, None),
            Err(RenderError::Uint32IndicesUnsupported)
        );
    }

    #[test]
    fn without_vertex_arrays_pointers_follow_program_changes() {
        let mut f = Fixture::new(Capabilities::webgl1());
        let buffer = Buffer::vertex(&[0.0f32; 16]);
        let geometry = Geometry::builder()
            .attribute("aVertexPosition", Attribute::new(buffer.clone(), VertexFormat::Float32x2))
            .attribute("aTextureCoord", Attribute::new(buffer, VertexFormat::Float32x2))
            .build();
        let textured = Program::from_sources(UV_VS, FS, "textured");
        let plain = Program::from_sources(QUAD_VS, FS, "plain");

        f.bind(&geometry, &textured).unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::CreateVertexArray(_))), 0);

        f.gl.clear();
        f.bind(&geometry, &textured).unwrap();
        assert!(f.gl.is_empty());

        f.bind(&geometry, &plain).unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::AttribPointer { .. })), 1);
        assert!(f.gl.calls().contains(&Call::DisableAttrib(1)));
    }

    #[test]
    fn buffer_changes_upload_without_rebuilding() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let geometry = quad();
        let program = Program::from_sources(QUAD_VS, FS, "quad");
        f.bind(&geometry, &program).unwrap();

        geometry.attributes()[0].1.buffer.write(&[2.0f32; 8]);
        f.gl.clear();
        f.bind(&geometry, &program).unwrap();
        assert_eq!(f.gl.count(|c| matches!(c, Call::BufferSubData { .. })), 1);
        assert_eq!(f.gl.count(|c| matches!(c, Call::CreateVertexArray(_))), 0);
    }

    #[test]
    fn disposed_geometry_releases_vertex_arrays() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let geometry = quad();
        let program = Program::from_sources(QUAD_VS, FS, "quad");
        f.bind(&geometry, &program).unwrap();
        geometry.destroy(false);
        f.geometry.collect_disposed(&f.gl);
        assert!(f.geometry.is_empty());
        assert_eq!(f.gl.count(|c| matches!(c, Call::DeleteVertexArray(_))), 1);
        assert!(f.geometry.current().is_none());
    }
}
