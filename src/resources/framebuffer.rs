//! Offscreen render targets.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::texture::{BaseTexture, MipmapMode, ScaleMode, TextureOptions};
use super::{DisposeQueue, DisposeRunner, ResourceId};
use crate::math::Rect;

/// Requested multisampling level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MsaaQuality {
    /// Single sample.
    #[default]
    None,
    /// Two samples.
    Low,
    /// Four samples.
    Medium,
    /// Eight samples.
    High,
}

impl MsaaQuality {
    /// Sample count, 0 for single-sample storage.
    pub const fn samples(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Low => 2,
            Self::Medium => 4,
            Self::High => 8,
        }
    }
}

struct FramebufferInner {
    id: ResourceId,
    width: Cell<u32>,
    height: Cell<u32>,
    color_textures: RefCell<Vec<BaseTexture>>,
    depth_texture: RefCell<Option<BaseTexture>>,
    depth: Cell<bool>,
    stencil: Cell<bool>,
    multisample: Cell<MsaaQuality>,
    dirty_id: Cell<u64>,
    dirty_format: Cell<u64>,
    dirty_size: Cell<u64>,
    dispose: DisposeRunner,
}

impl Drop for FramebufferInner {
    fn drop(&mut self) {
        self.dispose.emit(self.id);
    }
}

/// A set of attachments rendered into together.
///
/// Attachment changes bump the format counter, size changes the size
/// counter; the framebuffer system re-attaches or resizes accordingly.
#[derive(Clone)]
pub struct Framebuffer {
    inner: Rc<FramebufferInner>,
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.inner.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("colors", &self.inner.color_textures.borrow().len())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Framebuffer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Framebuffer {
    /// A framebuffer of `width` by `height` device pixels with no attachments.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Rc::new(FramebufferInner {
                id: ResourceId::next(),
                width: Cell::new(width),
                height: Cell::new(height),
                color_textures: RefCell::new(Vec::new()),
                depth_texture: RefCell::new(None),
                depth: Cell::new(false),
                stencil: Cell::new(false),
                multisample: Cell::new(MsaaQuality::None),
                dirty_id: Cell::new(0),
                dirty_format: Cell::new(0),
                dirty_size: Cell::new(0),
                dispose: DisposeRunner::default(),
            }),
        }
    }

    /// Identity of this framebuffer.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Width in device pixels.
    pub fn width(&self) -> u32 {
        self.inner.width.get()
    }

    /// Height in device pixels.
    pub fn height(&self) -> u32 {
        self.inner.height.get()
    }

    /// Attach a color texture at `index`, or a fresh one sized to match.
    #[expect(clippy::cast_precision_loss)]
    pub fn add_color_texture(&self, index: usize, texture: Option<BaseTexture>) -> BaseTexture {
        let texture = texture.unwrap_or_else(|| {
            BaseTexture::render_target(
                self.width() as f32,
                self.height() as f32,
                TextureOptions {
                    scale_mode: ScaleMode::Nearest,
                    mipmap: MipmapMode::Off,
                    ..TextureOptions::default()
                },
            )
        });
        {
            let mut colors = self.inner.color_textures.borrow_mut();
            if index < colors.len() {
                colors[index] = texture.clone();
            } else {
                colors.push(texture.clone());
            }
        }
        self.bump_format();
        texture
    }

    /// Attach a depth texture, or a fresh one sized to match.
    #[expect(clippy::cast_precision_loss)]
    pub fn add_depth_texture(&self, texture: Option<BaseTexture>) -> BaseTexture {
        let texture = texture.unwrap_or_else(|| {
            BaseTexture::render_target(
                self.width() as f32,
                self.height() as f32,
                TextureOptions {
                    scale_mode: ScaleMode::Nearest,
                    mipmap: MipmapMode::Off,
                    format: super::texture::PixelFormat::Depth,
                    pixel_type: super::texture::PixelType::UnsignedShort,
                    ..TextureOptions::default()
                },
            )
        });
        *self.inner.depth_texture.borrow_mut() = Some(texture.clone());
        self.bump_format();
        texture
    }

    /// Request a depth renderbuffer.
    pub fn enable_depth(&self) {
        self.inner.depth.set(true);
        self.bump_format();
    }

    /// Request a stencil renderbuffer.
    pub fn enable_stencil(&self) {
        self.inner.stencil.set(true);
        self.bump_format();
    }

    /// Request multisampled storage.
    pub fn set_multisample(&self, quality: MsaaQuality) {
        self.inner.multisample.set(quality);
        self.bump_format();
    }

    /// Resize every attachment.
    pub fn resize(&self, width: u32, height: u32) {
        if width == self.width() && height == self.height() {
            return;
        }
        self.inner.width.set(width);
        self.inner.height.set(height);
        self.inner.dirty_id.set(self.inner.dirty_id.get() + 1);
        self.inner.dirty_size.set(self.inner.dirty_size.get() + 1);
        for texture in self.inner.color_textures.borrow().iter() {
            texture.set_real_size(width, height);
        }
        if let Some(depth) = &*self.inner.depth_texture.borrow() {
            depth.set_real_size(width, height);
        }
    }

    pub(crate) fn bump_format(&self) {
        self.inner.dirty_id.set(self.inner.dirty_id.get() + 1);
        self.inner.dirty_format.set(self.inner.dirty_format.get() + 1);
    }

    /// Color attachments.
    pub fn color_textures(&self) -> Vec<BaseTexture> {
        self.inner.color_textures.borrow().clone()
    }

    /// Depth attachment.
    pub fn depth_texture(&self) -> Option<BaseTexture> {
        self.inner.depth_texture.borrow().clone()
    }

    /// Depth renderbuffer requested.
    pub fn depth(&self) -> bool {
        self.inner.depth.get()
    }

    /// Stencil renderbuffer requested.
    pub fn stencil(&self) -> bool {
        self.inner.stencil.get()
    }

    /// Requested multisampling.
    pub fn multisample(&self) -> MsaaQuality {
        self.inner.multisample.get()
    }

    /// Any change counter.
    pub fn dirty_id(&self) -> u64 {
        self.inner.dirty_id.get()
    }

    /// Attachment set change counter.
    pub fn dirty_format(&self) -> u64 {
        self.inner.dirty_format.get()
    }

    /// Size change counter.
    pub fn dirty_size(&self) -> u64 {
        self.inner.dirty_size.get()
    }

    /// Release device framebuffers in every context.
    pub fn dispose(&self) {
        self.inner.dispose.emit(self.inner.id);
    }

    pub(crate) fn on_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.add(queue);
    }
}

/// A texture that can be rendered into.
#[derive(Clone, Debug)]
pub struct RenderTexture {
    texture: BaseTexture,
    framebuffer: Framebuffer,
    frame: Rect,
}

impl RenderTexture {
    /// A render texture of `width` by `height` logical units.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(width: f32, height: f32, resolution: f32) -> Self {
        let texture = BaseTexture::render_target(
            width,
            height,
            TextureOptions {
                resolution,
                mipmap: MipmapMode::Off,
                ..TextureOptions::default()
            },
        );
        let framebuffer = Framebuffer::new(
            (width * resolution).round() as u32,
            (height * resolution).round() as u32,
        );
        framebuffer.add_color_texture(0, Some(texture.clone()));
        framebuffer.enable_stencil();
        Self {
            texture,
            framebuffer,
            frame: Rect::from_size(width, height),
        }
    }

    /// The color texture, usable as a sampler input.
    pub fn texture(&self) -> &BaseTexture {
        &self.texture
    }

    /// The attachment set.
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Logical area rendered into.
    pub fn frame(&self) -> Rect {
        self.frame
    }

    /// Resize in logical units.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resize(&mut self, width: f32, height: f32) {
        let resolution = self.texture.resolution();
        self.frame = Rect::from_size(width, height);
        self.framebuffer.resize(
            (width * resolution).round() as u32,
            (height * resolution).round() as u32,
        );
    }

    /// Release device objects for both the texture and the framebuffer.
    pub fn destroy(&self) {
        self.framebuffer.dispose();
        self.texture.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_changes_bump_format() {
        let framebuffer = Framebuffer::new(4, 4);
        let before = framebuffer.dirty_format();
        framebuffer.add_color_texture(0, None);
        framebuffer.enable_depth();
        assert_eq!(framebuffer.dirty_format(), before + 2);
        assert_eq!(framebuffer.dirty_size(), 0);
    }

    #[test]
    fn resize_propagates_to_attachments() {
        let framebuffer = Framebuffer::new(4, 4);
        let color = framebuffer.add_color_texture(0, None);
        let depth = framebuffer.add_depth_texture(None);
        framebuffer.resize(16, 8);
        assert_eq!(framebuffer.dirty_size(), 1);
        assert_eq!((color.real_width(), color.real_height()), (16, 8));
        assert_eq!(depth.real_width(), 16);

        let id = framebuffer.dirty_id();
        framebuffer.resize(16, 8);
        assert_eq!(framebuffer.dirty_id(), id);
    }

    #[test]
    fn render_texture_shares_its_texture() {
        let mut target = RenderTexture::new(10.0, 20.0, 2.0);
        assert!(target.texture().is_render_target());
        assert_eq!(target.framebuffer().color_textures()[0], *target.texture());
        assert_eq!((target.framebuffer().width(), target.framebuffer().height()), (20, 40));

        target.resize(5.0, 5.0);
        assert_eq!(target.texture().real_width(), 10);
        assert_eq!(target.frame(), Rect::from_size(5.0, 5.0));
    }
}
