//! Framebuffer objects, their attachments, and the viewport.

use log::debug;

use super::texture::TextureSystem;
use super::{ContextCache, ContextInfo, System};
use crate::device::{ApiVersion, Capabilities, Device};
use crate::error::{RenderError, Result};
use crate::math::Rect;
use crate::resources::framebuffer::Framebuffer;
use crate::resources::texture::BaseTexture;
use crate::resources::{DisposeQueue, ResourceId};

/// The device side of one framebuffer.
#[derive(Debug)]
pub struct GlFramebuffer<D: Device> {
    /// Native handle.
    pub handle: D::Framebuffer,
    /// Depth-stencil renderbuffer.
    pub stencil: Option<D::Renderbuffer>,
    /// Multisampled color renderbuffer standing in for color attachment 0.
    pub msaa_buffer: Option<D::Renderbuffer>,
    /// Single-sample framebuffer the multisampled one resolves into.
    pub resolve: Option<D::Framebuffer>,
    /// Sample count of the renderbuffers, 0 when single-sample.
    pub samples: i32,
    /// Mip level the color attachments were attached at.
    pub mip_level: i32,
    dirty_id: Option<u64>,
    dirty_format: Option<u64>,
    dirty_size: Option<u64>,
}

/// Binds framebuffers, keeping their attachments in step with the
/// [`Framebuffer`] descriptors, and tracks the viewport.
pub struct FramebufferSystem<D: Device> {
    framebuffers: ContextCache<GlFramebuffer<D>>,
    current: Option<Framebuffer>,
    viewport: Option<[i32; 4]>,
    screen_size: (u32, u32),
    capabilities: Capabilities,
    disposed: DisposeQueue,
}

impl<D: Device> Default for FramebufferSystem<D> {
    fn default() -> Self {
        Self {
            framebuffers: ContextCache::default(),
            current: None,
            viewport: None,
            screen_size: (0, 0),
            capabilities: Capabilities::webgl1(),
            disposed: DisposeQueue::new(),
        }
    }
}

#[expect(clippy::cast_possible_wrap)]
fn pixels(value: u32) -> i32 {
    value as i32
}

impl<D: Device> FramebufferSystem<D> {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the default surface in device pixels.
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen_size = (width, height);
    }

    /// The bound framebuffer, `None` for the default surface.
    pub fn current(&self) -> Option<&Framebuffer> {
        self.current.as_ref()
    }

    /// The viewport last set.
    pub fn viewport(&self) -> Option<[i32; 4]> {
        self.viewport
    }

    /// The device side of `framebuffer`, if it exists in this context.
    pub fn gl_framebuffer(&self, framebuffer: &Framebuffer) -> Option<&GlFramebuffer<D>> {
        self.framebuffers.get(framebuffer.id())
    }

    /// Set the viewport unless it is already `rect`.
    pub fn set_viewport(&mut self, gl: &D, rect: [i32; 4]) {
        if self.viewport != Some(rect) {
            self.viewport = Some(rect);
            let [x, y, width, height] = rect;
            gl.viewport(x, y, width, height);
        }
    }

    /// Bind `framebuffer`, or the default surface for `None`, and set the
    /// viewport to `frame` (device pixels) or the whole target.
    ///
    /// Attachments are rebuilt only when the attachment set or mip level
    /// changed, and resized only when the size changed. Attached textures
    /// are taken out of every sampler slot.
    #[expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn bind(
        &mut self,
        gl: &D,
        framebuffer: Option<&Framebuffer>,
        frame: Option<Rect>,
        mip_level: i32,
        textures: &mut TextureSystem<D>,
    ) -> Result<()> {
        let Some(framebuffer) = framebuffer else {
            if self.current.take().is_some() {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            }
            let (width, height) = self.screen_size;
            let rect = frame.map_or([0, 0, pixels(width), pixels(height)], Rect::to_i32);
            self.set_viewport(gl, rect);
            return Ok(());
        };

        let id = framebuffer.id();
        if !self.framebuffers.contains(id) {
            self.init_framebuffer(gl, framebuffer)?;
        }
        let Some(fbo) = self.framebuffers.get_mut(id) else {
            return Err(RenderError::Device("framebuffer cache miss".into()));
        };
        let handle = fbo.handle;

        Self::release_attachments(gl, framebuffer, textures);
        if self.current.as_ref() != Some(framebuffer) {
            self.current = Some(framebuffer.clone());
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(handle));
        }

        if fbo.mip_level != mip_level {
            fbo.mip_level = mip_level;
            fbo.dirty_id = None;
            fbo.dirty_format = None;
        }
        if fbo.dirty_id != Some(framebuffer.dirty_id()) {
            fbo.dirty_id = Some(framebuffer.dirty_id());
            if fbo.dirty_format != Some(framebuffer.dirty_format()) {
                fbo.dirty_format = Some(framebuffer.dirty_format());
                fbo.dirty_size = Some(framebuffer.dirty_size());
                self.update_framebuffer(gl, framebuffer, mip_level, textures)?;
                Self::release_attachments(gl, framebuffer, textures);
            } else if fbo.dirty_size != Some(framebuffer.dirty_size()) {
                fbo.dirty_size = Some(framebuffer.dirty_size());
                self.resize_framebuffer(gl, framebuffer, textures)?;
                Self::release_attachments(gl, framebuffer, textures);
            }
        }

        let shift = mip_level.clamp(0, 31);
        let rect = match frame {
            Some(frame) => {
                let scale = 1.0 / (1u32 << shift) as f32;
                [
                    (frame.x * scale) as i32,
                    (frame.y * scale) as i32,
                    (frame.width * scale) as i32,
                    (frame.height * scale) as i32,
                ]
            }
            None => [
                0,
                0,
                pixels(framebuffer.width() >> shift),
                pixels(framebuffer.height() >> shift),
            ],
        };
        self.set_viewport(gl, rect);
        Ok(())
    }

    /// Take attached textures out of every sampler slot.
    fn release_attachments(gl: &D, framebuffer: &Framebuffer, textures: &mut TextureSystem<D>) {
        for texture in framebuffer.color_textures() {
            textures.unbind(gl, &texture);
        }
        if let Some(depth) = framebuffer.depth_texture() {
            textures.unbind(gl, &depth);
        }
    }

    fn init_framebuffer(&mut self, gl: &D, framebuffer: &Framebuffer) -> Result<()> {
        let handle = gl.create_framebuffer().map_err(RenderError::Device)?;
        framebuffer.on_dispose(&self.disposed);
        self.framebuffers.insert(
            framebuffer.id(),
            GlFramebuffer {
                handle,
                stencil: None,
                msaa_buffer: None,
                resolve: None,
                samples: 0,
                mip_level: 0,
                dirty_id: None,
                dirty_format: None,
                dirty_size: None,
            },
        );
        Ok(())
    }

    fn samples_for(&self, framebuffer: &Framebuffer) -> i32 {
        if self.capabilities.multisample {
            framebuffer.multisample().samples()
        } else {
            0
        }
    }

    /// Make sure `texture` has device storage and return its handle.
    fn texture_handle(
        gl: &D,
        textures: &mut TextureSystem<D>,
        texture: &BaseTexture,
    ) -> Result<Option<D::Texture>> {
        textures.bind(gl, Some(texture), 0)?;
        Ok(textures.gl_texture(texture).map(|t| t.handle))
    }

    /// Re-attach everything.
    fn update_framebuffer(
        &mut self,
        gl: &D,
        framebuffer: &Framebuffer,
        mip_level: i32,
        textures: &mut TextureSystem<D>,
    ) -> Result<()> {
        let samples = self.samples_for(framebuffer);
        let write_depth_texture = self.capabilities.api == ApiVersion::WebGl2;
        let width = pixels(framebuffer.width());
        let height = pixels(framebuffer.height());
        let Some(fbo) = self.framebuffers.get_mut(framebuffer.id()) else {
            return Ok(());
        };

        if samples > 0 {
            let msaa = match fbo.msaa_buffer {
                Some(buffer) => buffer,
                None => gl.create_renderbuffer().map_err(RenderError::Device)?,
            };
            fbo.msaa_buffer = Some(msaa);
            gl.bind_renderbuffer(Some(msaa));
            gl.renderbuffer_storage(glow::RGBA8, width, height, samples);
            gl.framebuffer_renderbuffer(glow::COLOR_ATTACHMENT0, Some(msaa));
        } else if let Some(msaa) = fbo.msaa_buffer.take() {
            gl.delete_renderbuffer(msaa);
            if let Some(resolve) = fbo.resolve.take() {
                gl.delete_framebuffer(resolve);
            }
        }
        fbo.samples = samples;

        let mut attachments = Vec::new();
        for (index, texture) in framebuffer.color_textures().iter().enumerate() {
            let handle = Self::texture_handle(gl, textures, texture)?;
            if index == 0 && samples > 0 {
                continue;
            }
            let attachment = glow::COLOR_ATTACHMENT0 + u32::try_from(index).unwrap_or(0);
            gl.framebuffer_texture_2d(attachment, texture.target().gl_target(), handle, mip_level);
            attachments.push(attachment);
        }
        if attachments.len() > 1 {
            if self.capabilities.draw_buffers {
                gl.draw_buffers(&attachments);
            } else {
                debug!("framebuffer has {} color attachments but only one can be drawn", attachments.len());
            }
        }

        let depth_texture = framebuffer.depth_texture().filter(|_| write_depth_texture);
        if let Some(depth) = &depth_texture {
            let handle = Self::texture_handle(gl, textures, depth)?;
            gl.framebuffer_texture_2d(glow::DEPTH_ATTACHMENT, glow::TEXTURE_2D, handle, mip_level);
        }

        let Some(fbo) = self.framebuffers.get_mut(framebuffer.id()) else {
            return Ok(());
        };
        if (framebuffer.stencil() || framebuffer.depth()) && depth_texture.is_none() {
            let stencil = match fbo.stencil {
                Some(buffer) => buffer,
                None => gl.create_renderbuffer().map_err(RenderError::Device)?,
            };
            fbo.stencil = Some(stencil);
            gl.bind_renderbuffer(Some(stencil));
            if samples > 0 {
                gl.renderbuffer_storage(glow::DEPTH24_STENCIL8, width, height, samples);
            } else {
                gl.renderbuffer_storage(glow::DEPTH_STENCIL, width, height, 0);
            }
            gl.framebuffer_renderbuffer(glow::DEPTH_STENCIL_ATTACHMENT, Some(stencil));
        } else if let Some(stencil) = fbo.stencil.take() {
            gl.delete_renderbuffer(stencil);
        }
        Ok(())
    }

    /// Resize renderbuffers and attached textures.
    fn resize_framebuffer(
        &mut self,
        gl: &D,
        framebuffer: &Framebuffer,
        textures: &mut TextureSystem<D>,
    ) -> Result<()> {
        let width = pixels(framebuffer.width());
        let height = pixels(framebuffer.height());
        if let Some(fbo) = self.framebuffers.get(framebuffer.id()) {
            if let Some(msaa) = fbo.msaa_buffer {
                gl.bind_renderbuffer(Some(msaa));
                gl.renderbuffer_storage(glow::RGBA8, width, height, fbo.samples);
            }
            if let Some(stencil) = fbo.stencil {
                gl.bind_renderbuffer(Some(stencil));
                if fbo.samples > 0 {
                    gl.renderbuffer_storage(glow::DEPTH24_STENCIL8, width, height, fbo.samples);
                } else {
                    gl.renderbuffer_storage(glow::DEPTH_STENCIL, width, height, 0);
                }
            }
        }

        for texture in framebuffer.color_textures() {
            textures.bind(gl, Some(&texture), 0)?;
        }
        if let Some(depth) = framebuffer.depth_texture() {
            if self.capabilities.api == ApiVersion::WebGl2 {
                textures.bind(gl, Some(&depth), 0)?;
            }
        }
        Ok(())
    }

    /// Resolve the multisampled color buffer of the bound framebuffer into
    /// its first color texture. Does nothing for single-sample targets.
    ///
    /// `source` and `dest` default to the whole framebuffer.
    #[expect(clippy::cast_precision_loss)]
    pub fn blit(
        &mut self,
        gl: &D,
        textures: &TextureSystem<D>,
        source: Option<Rect>,
        dest: Option<Rect>,
    ) -> Result<()> {
        let Some(framebuffer) = self.current.clone() else {
            return Ok(());
        };
        let Some(color) = framebuffer.color_textures().into_iter().next() else {
            return Ok(());
        };
        let Some(fbo) = self.framebuffers.get_mut(framebuffer.id()) else {
            return Ok(());
        };
        if fbo.msaa_buffer.is_none() {
            return Ok(());
        }
        let handle = fbo.handle;
        let resolve = match fbo.resolve {
            Some(resolve) => resolve,
            None => {
                let resolve = gl.create_framebuffer().map_err(RenderError::Device)?;
                fbo.resolve = Some(resolve);
                gl.bind_framebuffer(glow::FRAMEBUFFER, Some(resolve));
                gl.framebuffer_texture_2d(
                    glow::COLOR_ATTACHMENT0,
                    color.target().gl_target(),
                    textures.gl_texture(&color).map(|t| t.handle),
                    0,
                );
                resolve
            }
        };

        let whole = Rect::from_size(framebuffer.width() as f32, framebuffer.height() as f32);
        let corners = |[x, y, w, h]: [i32; 4]| [x, y, x + w, y + h];
        gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(handle));
        gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(resolve));
        gl.blit_framebuffer(
            corners(source.unwrap_or(whole).to_i32()),
            corners(dest.unwrap_or(whole).to_i32()),
            glow::COLOR_BUFFER_BIT,
            glow::NEAREST,
        );
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(handle));
        Ok(())
    }

    /// Clear color and depth of the bound target.
    pub fn clear(&self, gl: &D, red: f32, green: f32, blue: f32, alpha: f32) {
        gl.clear_color(red, green, blue, alpha);
        gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
    }

    /// Forget the binding and viewport so the next calls are issued.
    pub fn reset(&mut self) {
        self.current = None;
        self.viewport = None;
    }

    fn delete(gl: &D, fbo: GlFramebuffer<D>) {
        gl.delete_framebuffer(fbo.handle);
        for buffer in [fbo.stencil, fbo.msaa_buffer].into_iter().flatten() {
            gl.delete_renderbuffer(buffer);
        }
        if let Some(resolve) = fbo.resolve {
            gl.delete_framebuffer(resolve);
        }
    }

    /// Release framebuffers disposed since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        for id in self.disposed.drain() {
            self.dispose_framebuffer(gl, id);
        }
    }

    fn dispose_framebuffer(&mut self, gl: &D, id: ResourceId) {
        let Some(fbo) = self.framebuffers.remove(id) else {
            return;
        };
        if self.current.as_ref().is_some_and(|f| f.id() == id) {
            self.current = None;
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        Self::delete(gl, fbo);
    }

    /// Number of framebuffers with device objects.
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Whether no framebuffer has device objects.
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl<D: Device> System<D> for FramebufferSystem<D> {
    fn context_change(&mut self, _gl: &D, context: &ContextInfo) {
        self.framebuffers.reset(context.uid);
        self.disposed.drain();
        self.capabilities = context.capabilities;
        self.reset();
    }

    fn destroy(&mut self, gl: Option<&D>) {
        for (_, fbo) in self.framebuffers.drain() {
            if let Some(gl) = gl {
                Self::delete(gl, fbo);
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
    use crate::resources::framebuffer::{MsaaQuality, RenderTexture};
    use crate::systems::ContextUid;

    struct Fixture {
        gl: RecordingDevice,
        framebuffers: FramebufferSystem<RecordingDevice>,
        textures: TextureSystem<RecordingDevice>,
    }

    impl Fixture {
        fn new(capabilities: Capabilities) -> Self {
            let gl = RecordingDevice::with_capabilities(capabilities);
            let info = ContextInfo {
                uid: ContextUid(1),
                capabilities,
            };
            let mut framebuffers = FramebufferSystem::new();
            let mut textures = TextureSystem::new();
            framebuffers.context_change(&gl, &info);
            textures.context_change(&gl, &info);
            framebuffers.set_screen_size(800, 600);
            gl.clear();
            Self {
                gl,
                framebuffers,
                textures,
            }
        }

        fn bind(&mut self, framebuffer: Option<&Framebuffer>) {
            self.framebuffers
                .bind(&self.gl, framebuffer, None, 0, &mut self.textures)
                .unwrap();
        }
    }

    #[test]
    fn screen_binding_sets_full_viewport_once() {
        let mut f = Fixture::new(Capabilities::webgl2());
        f.bind(None);
        f.bind(None);
        assert_eq!(f.gl.take_calls(), vec![Call::Viewport([0, 0, 800, 600])]);
    }

    #[test]
    fn first_bind_attaches_and_later_binds_do_not() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(32.0, 16.0, 1.0);
        f.bind(Some(target.framebuffer()));

        let calls = f.gl.take_calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::CreateFramebuffer(_))).count(), 1);
        assert!(calls.iter().any(|c| matches!(c, Call::FramebufferTexture { attachment: glow::COLOR_ATTACHMENT0, texture: Some(_) })));
        assert!(calls.contains(&Call::RenderbufferStorage {
            format: glow::DEPTH_STENCIL,
            width: 32,
            height: 16,
            samples: 0
        }));
        assert!(calls.contains(&Call::Viewport([0, 0, 32, 16])));

        f.bind(None);
        f.gl.clear();
        f.bind(Some(target.framebuffer()));
        let calls = f.gl.take_calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::FramebufferTexture { .. } | Call::RenderbufferStorage { .. })));
        assert!(calls.iter().any(|c| matches!(c, Call::BindFramebuffer(glow::FRAMEBUFFER, Some(_)))));
    }

    #[test]
    fn resize_restores_storage_without_reattaching() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let mut target = RenderTexture::new(32.0, 16.0, 1.0);
        f.bind(Some(target.framebuffer()));
        target.resize(64.0, 64.0);
        f.gl.clear();
        f.bind(Some(target.framebuffer()));

        let calls = f.gl.take_calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::FramebufferTexture { .. })));
        assert!(calls.contains(&Call::RenderbufferStorage {
            format: glow::DEPTH_STENCIL,
            width: 64,
            height: 64,
            samples: 0
        }));
        assert!(calls.iter().any(|c| matches!(c, Call::TexImage2d { width: 64, height: 64, .. })));
        assert!(calls.contains(&Call::Viewport([0, 0, 64, 64])));
    }

    #[test]
    fn attached_textures_leave_sampler_slots() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(8.0, 8.0, 1.0);
        f.textures.bind(&f.gl, Some(target.texture()), 3).unwrap();
        f.gl.clear();
        f.bind(Some(target.framebuffer()));
        let calls = f.gl.calls();
        let rebind = calls.iter().rposition(|c| *c == Call::ActiveTexture(3));
        assert!(rebind.is_some());
        assert!(calls[rebind.unwrap()..].contains(&Call::BindTexture(glow::TEXTURE_2D, Some(1))));
    }

    #[test]
    fn attachments_are_released_before_the_framebuffer_binds() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(8.0, 8.0, 1.0);
        f.bind(Some(target.framebuffer()));
        f.bind(None);

        let other = BaseTexture::from_pixels(1, 1, vec![255; 4], Default::default());
        f.textures.bind(&f.gl, Some(target.texture()), 2).unwrap();
        f.textures.bind(&f.gl, Some(&other), 0).unwrap();
        f.gl.clear();
        f.bind(Some(target.framebuffer()));
        let calls = f.gl.take_calls();
        let released = calls.iter().position(|c| *c == Call::ActiveTexture(2)).unwrap();
        let bound = calls
            .iter()
            .position(|c| matches!(c, Call::BindFramebuffer(glow::FRAMEBUFFER, Some(_))))
            .unwrap();
        assert!(released < bound);
        assert_eq!(calls[released + 1], Call::BindTexture(glow::TEXTURE_2D, Some(1)));
    }

    #[test]
    fn multiple_color_attachments_set_draw_buffers() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let framebuffer = Framebuffer::new(4, 4);
        framebuffer.add_color_texture(0, None);
        framebuffer.add_color_texture(1, None);
        f.bind(Some(&framebuffer));
        assert!(f.gl.calls().contains(&Call::DrawBuffers(vec![
            glow::COLOR_ATTACHMENT0,
            glow::COLOR_ATTACHMENT1
        ])));
    }

    #[test]
    fn depth_texture_replaces_depth_renderbuffer_on_webgl2() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let framebuffer = Framebuffer::new(4, 4);
        framebuffer.add_color_texture(0, None);
        framebuffer.add_depth_texture(None);
        framebuffer.enable_depth();
        f.bind(Some(&framebuffer));
        let calls = f.gl.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::FramebufferTexture { attachment: glow::DEPTH_ATTACHMENT, .. })));
        assert!(!calls.iter().any(|c| matches!(c, Call::RenderbufferStorage { .. })));
    }

    #[test]
    fn multisampled_target_resolves_with_blit() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(16.0, 16.0, 1.0);
        target.framebuffer().set_multisample(MsaaQuality::Medium);
        f.bind(Some(target.framebuffer()));

        let calls = f.gl.calls();
        assert!(calls.contains(&Call::RenderbufferStorage {
            format: glow::RGBA8,
            width: 16,
            height: 16,
            samples: 4
        }));
        assert!(calls.contains(&Call::RenderbufferStorage {
            format: glow::DEPTH24_STENCIL8,
            width: 16,
            height: 16,
            samples: 4
        }));
        assert!(!calls.iter().any(|c| matches!(c, Call::FramebufferTexture { attachment: glow::COLOR_ATTACHMENT0, .. })));

        f.gl.clear();
        f.framebuffers.blit(&f.gl, &f.textures, None, None).unwrap();
        assert_eq!(f.gl.count(|c| *c == Call::Blit), 1);
        assert!(f.framebuffers.gl_framebuffer(target.framebuffer()).unwrap().resolve.is_some());
    }

    #[test]
    fn multisample_ignored_without_support() {
        let mut f = Fixture::new(Capabilities::webgl1());
        let target = RenderTexture::new(16.0, 16.0, 1.0);
        target.framebuffer().set_multisample(MsaaQuality::High);
        f.bind(Some(target.framebuffer()));
        assert!(f.framebuffers.gl_framebuffer(target.framebuffer()).unwrap().msaa_buffer.is_none());
        f.framebuffers.blit(&f.gl, &f.textures, None, None).unwrap();
        assert_eq!(f.gl.count(|c| *c == Call::Blit), 0);
    }

    #[test]
    fn mip_level_halves_viewport_and_reattaches() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(64.0, 32.0, 1.0);
        f.bind(Some(target.framebuffer()));
        f.gl.clear();
        f.framebuffers
            .bind(&f.gl, Some(target.framebuffer()), None, 1, &mut f.textures)
            .unwrap();
        let calls = f.gl.calls();
        assert!(calls.contains(&Call::Viewport([0, 0, 32, 16])));
        assert!(calls.iter().any(|c| matches!(c, Call::FramebufferTexture { .. })));
    }

    #[test]
    fn clear_uses_color_and_depth() {
        let f = Fixture::new(Capabilities::webgl2());
        f.framebuffers.clear(&f.gl, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(
            f.gl.take_calls(),
            vec![
                Call::ClearColor([0.0, 0.0, 0.0, 1.0]),
                Call::Clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT)
            ]
        );
    }

    #[test]
    fn disposal_and_context_change() {
        let mut f = Fixture::new(Capabilities::webgl2());
        let target = RenderTexture::new(8.0, 8.0, 1.0);
        f.bind(Some(target.framebuffer()));
        target.framebuffer().dispose();
        f.framebuffers.collect_disposed(&f.gl);
        assert!(f.framebuffers.is_empty());
        assert!(f.framebuffers.current().is_none());
        assert_eq!(f.gl.count(|c| matches!(c, Call::DeleteFramebuffer(_))), 1);

        f.bind(Some(target.framebuffer()));
        f.framebuffers.context_change(
            &f.gl,
            &ContextInfo {
                uid: ContextUid(2),
                capabilities: Capabilities::webgl2(),
            },
        );
        assert!(f.framebuffers.is_empty());
        assert!(f.framebuffers.viewport().is_none());
    }
}
