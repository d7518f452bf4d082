//! The GPU systems.
//!
//! Each system converges one slice of device state and owns the native
//! objects for it, keyed by resource id in a [`ContextCache`]. A cache is
//! stamped with the [`ContextUid`] of the context it was filled under and is
//! emptied, without device calls, when a new context arrives: after a loss
//! the old handles are meaningless.

use std::collections::HashMap;

use crate::device::{Capabilities, Device};
use crate::resources::ResourceId;
use crate::settings::RendererOptions;

pub mod buffer;
pub mod context;
pub mod framebuffer;
pub mod geometry;
pub mod render_target;
pub mod shader;
pub mod state;
pub mod stencil;
pub mod texture;
pub mod texture_gc;
pub mod ubo_layout;
mod uniform_sync;

pub use buffer::BufferSystem;
pub use context::ContextSystem;
pub use framebuffer::FramebufferSystem;
pub use geometry::GeometrySystem;
pub use render_target::RenderTargetSystem;
pub use shader::ShaderSystem;
pub use state::StateSystem;
pub use stencil::StencilSystem;
pub use texture::TextureSystem;
pub use texture_gc::TextureGcSystem;

/// Generation number of a device context. Bumped on every (re)creation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextUid(pub(crate) u32);

/// What every system learns when a context arrives.
#[derive(Copy, Clone, Debug)]
pub struct ContextInfo {
    /// Generation of the new context.
    pub uid: ContextUid,
    /// Its feature report.
    pub capabilities: Capabilities,
}

/// Hooks run by the renderer for every registered system.
pub trait System<D: Device> {
    /// A context was created or restored. Caches from the previous one must
    /// be dropped without touching the device.
    fn context_change(&mut self, _gl: &D, _context: &ContextInfo) {}

    /// Release everything. `gl` is `None` when the context is already gone.
    fn destroy(&mut self, _gl: Option<&D>) {}
}

/// Native objects for one context, keyed by the resource they mirror.
pub struct ContextCache<V> {
    uid: Option<ContextUid>,
    entries: HashMap<ResourceId, V>,
}

impl<V> Default for ContextCache<V> {
    fn default() -> Self {
        Self {
            uid: None,
            entries: HashMap::new(),
        }
    }
}

impl<V> ContextCache<V> {
    /// Switch to `uid`, forgetting every entry.
    pub fn reset(&mut self, uid: ContextUid) {
        self.uid = Some(uid);
        self.entries.clear();
    }

    /// The context the entries belong to.
    pub fn uid(&self) -> Option<ContextUid> {
        self.uid
    }

    /// Look up an entry.
    pub fn get(&self, id: ResourceId) -> Option<&V> {
        self.entries.get(&id)
    }

    /// Look up an entry mutably.
    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut V> {
        self.entries.get_mut(&id)
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Add an entry.
    pub fn insert(&mut self, id: ResourceId, value: V) -> &mut V {
        self.entries.entry(id).insert_entry(value).into_mut()
    }

    /// Remove an entry, returning it for native cleanup.
    pub fn remove(&mut self, id: ResourceId) -> Option<V> {
        self.entries.remove(&id)
    }

    /// Take every entry, for native cleanup.
    pub fn drain(&mut self) -> impl Iterator<Item = (ResourceId, V)> + '_ {
        self.entries.drain()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every system the renderer drives, in broadcast order.
pub struct Systems<D: Device> {
    /// Vertex, index and uniform buffers.
    pub buffer: BufferSystem<D>,
    /// Texture objects and sampler slots.
    pub texture: TextureSystem<D>,
    /// Idle texture eviction.
    pub texture_gc: TextureGcSystem,
    /// Fixed-function state.
    pub state: StateSystem,
    /// Programs and uniforms.
    pub shader: ShaderSystem<D>,
    /// Vertex arrays and draws.
    pub geometry: GeometrySystem<D>,
    /// Framebuffer objects and the viewport.
    pub framebuffer: FramebufferSystem<D>,
    /// Target binding and projection.
    pub render_target: RenderTargetSystem,
    /// Stencil masks.
    pub stencil: StencilSystem,
}

impl<D: Device> Systems<D> {
    /// Build every system from the renderer options. Nothing touches the
    /// device until the first `context_change`.
    #[expect(clippy::cast_precision_loss)]
    pub fn new(options: &RendererOptions) -> Self {
        Self {
            buffer: BufferSystem::new(),
            texture: TextureSystem::new(),
            texture_gc: TextureGcSystem::new(options.texture_gc),
            state: StateSystem::new(),
            shader: ShaderSystem::new(options.precision),
            geometry: GeometrySystem::new(),
            framebuffer: FramebufferSystem::new(),
            render_target: RenderTargetSystem::new(
                options.width as f32,
                options.height as f32,
                options.resolution,
            ),
            stencil: StencilSystem::new(),
        }
    }

    /// Broadcast list.
    pub fn runners(&mut self) -> [&mut dyn System<D>; 9] {
        [
            &mut self.buffer,
            &mut self.texture,
            &mut self.texture_gc,
            &mut self.state,
            &mut self.shader,
            &mut self.geometry,
            &mut self.framebuffer,
            &mut self.render_target,
            &mut self.stencil,
        ]
    }

    /// Run `context_change` on every system.
    pub fn context_change(&mut self, gl: &D, context: &ContextInfo) {
        for system in self.runners() {
            system.context_change(gl, context);
        }
    }

    /// Run `destroy` on every system.
    pub fn destroy(&mut self, gl: Option<&D>) {
        for system in self.runners() {
            system.destroy(gl);
        }
    }

    /// Release native objects of resources disposed since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        self.geometry.collect_disposed(gl);
        self.shader.collect_disposed(gl);
        self.framebuffer.collect_disposed(gl);
        self.texture.collect_disposed(gl);
        self.buffer.collect_disposed(gl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_forgets_entries_and_stamps_uid() {
        let mut cache = ContextCache::default();
        cache.reset(ContextUid(1));
        let id = ResourceId::next();
        cache.insert(id, 7u32);
        assert_eq!(cache.get(id), Some(&7));

        cache.reset(ContextUid(2));
        assert!(cache.is_empty());
        assert_eq!(cache.uid(), Some(ContextUid(2)));
    }

    #[test]
    fn drain_empties() {
        let mut cache = ContextCache::default();
        cache.insert(ResourceId::next(), 'a');
        cache.insert(ResourceId::next(), 'b');
        assert_eq!(cache.drain().count(), 2);
        assert_eq!(cache.len(), 0);
    }
}
