//! Evicts textures that have not been bound for a while.

use log::debug;

use super::texture::TextureSystem;
use super::System;
use crate::device::Device;
use crate::scene::DisplayNode;
use crate::settings::{GcMode, TextureGcOptions};

/// Frame counter and sweep policy for idle textures.
///
/// Evicted textures keep their pixels and are uploaded again when next bound.
#[derive(Debug)]
pub struct TextureGcSystem {
    count: u64,
    check_count: u64,
    options: TextureGcOptions,
}

impl TextureGcSystem {
    /// Create with the given thresholds.
    pub fn new(options: TextureGcOptions) -> Self {
        Self {
            count: 0,
            check_count: 0,
            options,
        }
    }

    /// Frames rendered to the screen so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Change the sweep mode.
    pub fn set_mode(&mut self, mode: GcMode) {
        self.options.mode = mode;
    }

    /// Advance the frame counter after a frame. Only frames rendered to the
    /// screen count. Returns the number of textures evicted.
    pub fn post_render<D: Device>(
        &mut self,
        gl: &D,
        textures: &mut TextureSystem<D>,
        rendering_to_screen: bool,
    ) -> usize {
        if !rendering_to_screen {
            return 0;
        }
        self.count += 1;
        textures.set_touch_frame(self.count);

        if self.options.mode != GcMode::Auto {
            return 0;
        }
        self.check_count += 1;
        if self.check_count > self.options.check_count_max {
            self.check_count = 0;
            return self.run(gl, textures);
        }
        0
    }

    /// Evict every managed texture idle for more than `max_idle` frames.
    /// Render targets are never evicted.
    pub fn run<D: Device>(&mut self, gl: &D, textures: &mut TextureSystem<D>) -> usize {
        if self.options.mode == GcMode::Disabled {
            return 0;
        }
        let (count, max_idle) = (self.count, self.options.max_idle);
        let evicted = textures.evict(gl, |texture| {
            !texture.is_render_target() && count.saturating_sub(texture.touched()) > max_idle
        });
        debug!("texture sweep at frame {count} evicted {evicted}");
        evicted
    }

    /// Evict the textures of `node` and, for containers, of every descendant.
    pub fn unload<D: Device>(&self, gl: &D, textures: &mut TextureSystem<D>, node: &dyn DisplayNode) {
        if let Some(texture) = node.texture() {
            if !texture.is_render_target() {
                textures.destroy_texture(gl, &texture);
            }
        }
        if let Some(container) = node.as_container() {
            for child in container.children() {
                self.unload(gl, textures, child);
            }
        }
    }
}

impl<D: Device> System<D> for TextureGcSystem {}
