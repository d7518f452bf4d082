//! Mirrors [`Buffer`]s into device buffer objects.

use std::collections::HashMap;

use super::{ContextCache, ContextInfo, System};
use crate::device::Device;
use crate::error::{RenderError, Result};
use crate::resources::buffer::Buffer;
use crate::resources::{DisposeQueue, ResourceId};

/// Uniform-buffer range bindings are made in blocks of this many bytes.
pub const UNIFORM_BLOCK_ALIGNMENT: i32 = 256;

/// The device side of one buffer.
#[derive(Debug)]
pub struct GlBuffer<D: Device> {
    /// Native handle.
    pub handle: D::Buffer,
    /// `update_id` of the last upload, `None` before the first.
    pub update_id: Option<u64>,
    /// Bytes allocated on the device.
    pub byte_length: usize,
}

/// Uploads buffers and tracks uniform-buffer binding points.
pub struct BufferSystem<D: Device> {
    buffers: ContextCache<GlBuffer<D>>,
    bound_bases: HashMap<u32, ResourceId>,
    disposed: DisposeQueue,
}

impl<D: Device> Default for BufferSystem<D> {
    fn default() -> Self {
        Self {
            buffers: ContextCache::default(),
            bound_bases: HashMap::new(),
            disposed: DisposeQueue::new(),
        }
    }
}

impl<D: Device> BufferSystem<D> {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// The device side of `buffer`, if it exists in this context.
    pub fn gl_buffer(&self, buffer: &Buffer) -> Option<&GlBuffer<D>> {
        self.buffers.get(buffer.id())
    }

    fn ensure(&mut self, gl: &D, buffer: &Buffer) -> Result<&mut GlBuffer<D>> {
        if !self.buffers.contains(buffer.id()) {
            let handle = gl.create_buffer().map_err(RenderError::Device)?;
            buffer.on_dispose(&self.disposed);
            self.buffers.insert(
                buffer.id(),
                GlBuffer {
                    handle,
                    update_id: None,
                    byte_length: 0,
                },
            );
        }
        self.buffers
            .get_mut(buffer.id())
            .ok_or_else(|| RenderError::Device("buffer cache miss".into()))
    }

    /// Bind `buffer` to its usage target, creating it on first use.
    pub fn bind(&mut self, gl: &D, buffer: &Buffer) -> Result<()> {
        let handle = self.ensure(gl, buffer)?.handle;
        gl.bind_buffer(buffer.usage().target(), Some(handle));
        Ok(())
    }

    /// Bring the device copy up to date.
    ///
    /// Does nothing while the `update_id` matches the last upload. Otherwise
    /// uploads in place when the allocation is large enough, or reallocates.
    pub fn update(&mut self, gl: &D, buffer: &Buffer) -> Result<()> {
        let gl_buffer = self.ensure(gl, buffer)?;
        let update_id = buffer.update_id();
        if gl_buffer.update_id == Some(update_id) {
            return Ok(());
        }
        gl_buffer.update_id = Some(update_id);

        let usage = buffer.usage();
        let target = usage.target();
        let data = buffer.data();
        gl.bind_buffer(target, Some(gl_buffer.handle));
        if gl_buffer.byte_length >= data.len() {
            let size = buffer.update_size().unwrap_or(data.len()).min(data.len());
            gl.buffer_sub_data(target, 0, &data[..size]);
        } else {
            gl_buffer.byte_length = data.len();
            gl.buffer_data(target, &data, usage.draw_hint());
        }
        Ok(())
    }

    /// Bind a uniform buffer to binding point `index`, uploading it first.
    pub fn bind_buffer_base(&mut self, gl: &D, buffer: &Buffer, index: u32) -> Result<()> {
        self.update(gl, buffer)?;
        if self.bound_bases.get(&index) != Some(&buffer.id()) {
            let handle = self.ensure(gl, buffer)?.handle;
            self.bound_bases.insert(index, buffer.id());
            gl.bind_buffer_base(glow::UNIFORM_BUFFER, index, Some(handle));
        }
        Ok(())
    }

    /// Bind one [`UNIFORM_BLOCK_ALIGNMENT`]-sized block of a uniform buffer.
    ///
    /// `offset` counts blocks, not bytes.
    pub fn bind_buffer_range(
        &mut self,
        gl: &D,
        buffer: &Buffer,
        index: u32,
        offset: i32,
    ) -> Result<()> {
        self.update(gl, buffer)?;
        let handle = self.ensure(gl, buffer)?.handle;
        self.bound_bases.remove(&index);
        gl.bind_buffer_range(
            glow::UNIFORM_BUFFER,
            index,
            Some(handle),
            offset * UNIFORM_BLOCK_ALIGNMENT,
            UNIFORM_BLOCK_ALIGNMENT,
        );
        Ok(())
    }

    /// Release the device copy of a buffer now.
    pub fn dispose_buffer(&mut self, gl: &D, id: ResourceId) {
        if let Some(gl_buffer) = self.buffers.remove(id) {
            gl.delete_buffer(gl_buffer.handle);
        }
        self.bound_bases.retain(|_, bound| *bound != id);
    }

    /// Release buffers destroyed or dropped since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        for id in self.disposed.drain() {
            self.dispose_buffer(gl, id);
        }
    }

    /// Number of live device buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no device buffers exist.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<D: Device> System<D> for BufferSystem<D> {
    fn context_change(&mut self, _gl: &D, context: &ContextInfo) {
        self.buffers.reset(context.uid);
        self.bound_bases.clear();
        self.disposed.drain();
    }

    fn destroy(&mut self, gl: Option<&D>) {
        for (_, gl_buffer) in self.buffers.drain() {
            if let Some(gl) = gl {
                gl.delete_buffer(gl_buffer.handle);
            }
        }
        self.bound_bases.clear();
    }
}
