//! The renderer facade: one device, every system and the batcher.

use log::{debug, warn};

use crate::batch::BatchRenderer;
use crate::device::{ContextAttributes, Device, DeviceProvider};
use crate::error::{RenderError, Result};
use crate::resources::framebuffer::RenderTexture;
use crate::scene::{DisplayNode, MeshElement, RenderLeaf};
use crate::settings::RendererOptions;
use crate::systems::{ContextInfo, ContextSystem, Systems};

/// Work done by one [`Renderer::render`] call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// `drawElements`/`drawArrays` calls issued.
    pub draw_calls: u32,
    /// Batch flushes that drew something.
    pub batches: u32,
    /// Textures evicted by the sweep after the frame.
    pub textures_evicted: usize,
}

/// Draws flattened scenes to the screen or to render textures.
///
/// Every entry point is a no-op while the device context is lost. Call
/// [`lose_context`](Self::lose_context) when the host reports a loss and
/// [`restore_context`](Self::restore_context) with the new device; the
/// systems then rebuild their native objects lazily on next use.
pub struct Renderer<D: Device> {
    context: ContextSystem<D>,
    systems: Systems<D>,
    batch: BatchRenderer,
    options: RendererOptions,
}

impl<D: Device> Renderer<D> {
    /// Acquire a device from `provider` and set every system up for it.
    pub fn new<P>(options: RendererOptions, provider: &mut P) -> Result<Self>
    where
        P: DeviceProvider<Device = D>,
    {
        let attributes = ContextAttributes {
            antialias: options.antialias,
            stencil: true,
            premultiplied_alpha: true,
        };
        let context = ContextSystem::init(provider, attributes, options.prefer_webgl2)?;
        let info = context
            .info()
            .ok_or_else(|| RenderError::Device("context lost during creation".into()))?;
        let mut renderer = Self {
            context,
            systems: Systems::new(&options),
            batch: BatchRenderer::new(options.batch_size, options.max_batch_textures),
            options,
        };
        renderer.context_change(&info);
        Ok(renderer)
    }

    /// The options the renderer was built with, with the current size.
    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// The context manager.
    pub fn context(&self) -> &ContextSystem<D> {
        &self.context
    }

    /// The live device, `None` while lost.
    pub fn device(&self) -> Option<&D> {
        self.context.device()
    }

    /// The systems, for direct use alongside [`render`](Self::render).
    pub fn systems(&self) -> &Systems<D> {
        &self.systems
    }

    /// Mutable access to the systems.
    pub fn systems_mut(&mut self) -> &mut Systems<D> {
        &mut self.systems
    }

    /// Whether the context is lost.
    pub fn is_lost(&self) -> bool {
        self.context.is_lost()
    }

    /// Record a context loss reported by the host.
    pub fn lose_context(&mut self) {
        self.context.lose();
        self.batch = BatchRenderer::new(self.options.batch_size, self.options.max_batch_textures);
    }

    /// Continue on `device` after a loss. Every system drops the old
    /// context's objects once.
    pub fn restore_context(&mut self, device: D) {
        let info = self.context.restore(device);
        self.context_change(&info);
    }

    fn context_change(&mut self, info: &ContextInfo) {
        let Some(gl) = self.context.device() else {
            return;
        };
        debug!("context change to generation {:?}", info.uid);
        self.systems.context_change(gl, info);
        self.batch.context_change(info);
        let (width, height) = self.systems.render_target.view_size();
        self.systems.framebuffer.set_screen_size(width, height);
    }

    /// Change the logical screen size. The host resizes the surface itself.
    #[expect(clippy::cast_precision_loss)]
    pub fn resize(&mut self, width: u32, height: u32) {
        self.options.width = width;
        self.options.height = height;
        self.systems
            .render_target
            .resize(width as f32, height as f32);
        let (width, height) = self.systems.render_target.view_size();
        self.systems.framebuffer.set_screen_size(width, height);
    }

    /// Draw `leaves` to the screen, then run the texture sweep.
    pub fn render(&mut self, leaves: &[RenderLeaf]) -> Result<FrameStats> {
        self.render_to(leaves, None)
    }

    /// Draw `leaves` into `target`, or the screen for `None`.
    pub fn render_to(
        &mut self,
        leaves: &[RenderLeaf],
        target: Option<&RenderTexture>,
    ) -> Result<FrameStats> {
        let Some(gl) = self.context.device() else {
            return Ok(FrameStats::default());
        };
        let systems = &mut self.systems;
        systems.collect_disposed(gl);

        systems.render_target.bind(
            gl,
            target,
            None,
            None,
            &mut systems.framebuffer,
            &mut systems.texture,
        )?;
        systems
            .stencil
            .switch_target(gl, target.map(|t| t.framebuffer().id()));
        if self.options.clear_before_render {
            let [r, g, b] = self.options.background_color;
            let a = self.options.background_alpha;
            systems.framebuffer.clear(gl, r * a, g * a, b * a, a);
        }

        let mut frame = Frame {
            gl,
            systems,
            batch: &mut self.batch,
            masks: Vec::new(),
            stats: FrameStats::default(),
        };
        for leaf in leaves {
            frame.draw(leaf)?;
        }
        frame.flush()?;
        frame.close_masks()?;

        let mut stats = frame.stats;
        stats.textures_evicted =
            self.systems
                .texture_gc
                .post_render(gl, &mut self.systems.texture, target.is_none());
        Ok(stats)
    }

    /// Evict the textures of `node` and its descendants.
    pub fn unload(&mut self, node: &dyn DisplayNode) {
        if let Some(gl) = self.context.device() {
            self.systems
                .texture_gc
                .unload(gl, &mut self.systems.texture, node);
        }
    }

    /// Run a texture sweep now. Returns the number evicted.
    pub fn run_texture_gc(&mut self) -> usize {
        match self.context.device() {
            Some(gl) => self.systems.texture_gc.run(gl, &mut self.systems.texture),
            None => 0,
        }
    }

    /// Release every native object and the device.
    pub fn destroy(&mut self) {
        self.systems.destroy(self.context.device());
        self.context.destroy();
    }
}

/// State of one `render` call.
struct Frame<'a, D: Device> {
    gl: &'a D,
    systems: &'a mut Systems<D>,
    batch: &'a mut BatchRenderer,
    masks: Vec<&'a [RenderLeaf]>,
    stats: FrameStats,
}

impl<'a, D: Device> Frame<'a, D> {
    fn draw(&mut self, leaf: &'a RenderLeaf) -> Result<()> {
        match leaf {
            RenderLeaf::Batched(element) => {
                let draws = self.batch.push(self.gl, self.systems, element.clone())?;
                self.count(draws);
            }
            RenderLeaf::Mesh(mesh) => {
                self.flush()?;
                self.draw_mesh(mesh)?;
            }
            RenderLeaf::PushMask(shapes) => {
                self.flush()?;
                self.systems.stencil.push_begin(self.gl);
                self.draw_shapes(shapes)?;
                self.systems.stencil.push_end(self.gl);
                self.masks.push(shapes);
            }
            RenderLeaf::PopMask => {
                self.flush()?;
                match self.masks.pop() {
                    Some(shapes) => self.pop_mask(shapes)?,
                    None => warn!("mask pop without a matching push"),
                }
            }
        }
        Ok(())
    }

    fn pop_mask(&mut self, shapes: &'a [RenderLeaf]) -> Result<()> {
        if self.systems.stencil.pop_begin(self.gl) {
            self.draw_shapes(shapes)?;
            self.systems.stencil.pop_end(self.gl);
        }
        Ok(())
    }

    /// Masks still open at the end of the frame are popped in order.
    fn close_masks(&mut self) -> Result<()> {
        if !self.masks.is_empty() {
            warn!("{} masks left open at the end of the frame", self.masks.len());
        }
        while let Some(shapes) = self.masks.pop() {
            self.pop_mask(shapes)?;
        }
        Ok(())
    }

    fn draw_shapes(&mut self, shapes: &'a [RenderLeaf]) -> Result<()> {
        for shape in shapes {
            match shape {
                RenderLeaf::Batched(element) => {
                    let draws = self.batch.push(self.gl, self.systems, element.clone())?;
                    self.count(draws);
                }
                RenderLeaf::Mesh(mesh) => {
                    self.flush()?;
                    self.draw_mesh(mesh)?;
                }
                RenderLeaf::PushMask(_) | RenderLeaf::PopMask => {
                    warn!("mask leaves inside a mask shape are ignored");
                }
            }
        }
        self.flush()
    }

    fn draw_mesh(&mut self, mesh: &MeshElement) -> Result<()> {
        let gl = self.gl;
        let systems = &mut *self.systems;
        mesh.publish_transform();
        let globals = systems.render_target.globals().clone();
        systems.shader.bind(
            gl,
            &mesh.shader,
            &globals,
            &mut systems.texture,
            &mut systems.buffer,
            false,
        )?;
        systems.state.set_state(gl, &mesh.state);
        let gl_program = systems
            .shader
            .gl_program(&mesh.shader.program)
            .ok_or_else(|| RenderError::Device("program missing after bind".into()))?;
        systems.geometry.bind(
            gl,
            &mesh.geometry,
            &mesh.shader.program,
            gl_program,
            &mut systems.buffer,
        )?;
        let topology = mesh.topology.unwrap_or_else(|| mesh.geometry.topology());
        systems.geometry.draw(gl, topology, None, 0, None)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let draws = self.batch.flush(self.gl, self.systems)?;
        self.count(draws);
        Ok(())
    }

    fn count(&mut self, draws: u32) {
        if draws > 0 {
            self.stats.draw_calls += draws;
            self.stats.batches += 1;
        }
    }
}
