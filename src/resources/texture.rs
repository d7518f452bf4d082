//! Pixel sources and their sampling style.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;

use super::{DisposeQueue, DisposeRunner, ResourceId};

/// Client pixel layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Red, green, blue, alpha.
    #[default]
    Rgba,
    /// Red, green, blue.
    Rgb,
    /// Single red channel (WebGL2).
    Red,
    /// Red and green (WebGL2).
    Rg,
    /// Alpha only.
    Alpha,
    /// Luminance only.
    Luminance,
    /// Depth.
    Depth,
    /// Packed depth and stencil.
    DepthStencil,
}

impl PixelFormat {
    /// GL format enum.
    pub const fn gl_format(self) -> u32 {
        match self {
            Self::Rgba => glow::RGBA,
            Self::Rgb => glow::RGB,
            Self::Red => glow::RED,
            Self::Rg => glow::RG,
            Self::Alpha => glow::ALPHA,
            Self::Luminance => glow::LUMINANCE,
            Self::Depth => glow::DEPTH_COMPONENT,
            Self::DepthStencil => glow::DEPTH_STENCIL,
        }
    }
}

/// Client component type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelType {
    /// `u8` per component.
    #[default]
    UnsignedByte,
    /// `u16` per component.
    UnsignedShort,
    /// `u32` per component.
    UnsignedInt,
    /// Packed 24-bit depth, 8-bit stencil.
    UnsignedInt24_8,
    /// `f32` per component.
    Float,
    /// `f16` per component.
    HalfFloat,
}

impl PixelType {
    /// GL type enum for the given API generation.
    pub const fn gl_type(self, webgl2: bool) -> u32 {
        match self {
            Self::UnsignedByte => glow::UNSIGNED_BYTE,
            Self::UnsignedShort => glow::UNSIGNED_SHORT,
            Self::UnsignedInt => glow::UNSIGNED_INT,
            Self::UnsignedInt24_8 => glow::UNSIGNED_INT_24_8,
            Self::Float => glow::FLOAT,
            // WebGL1 only knows the OES extension constant.
            Self::HalfFloat if webgl2 => glow::HALF_FLOAT,
            Self::HalfFloat => 0x8D61,
        }
    }
}

/// Texture binding target.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// A single 2D image.
    #[default]
    Texture2d,
    /// Six square faces.
    CubeMap,
    /// Layers of equally sized 2D images (WebGL2).
    Texture2dArray,
}

impl TextureTarget {
    /// GL target enum.
    pub const fn gl_target(self) -> u32 {
        match self {
            Self::Texture2d => glow::TEXTURE_2D,
            Self::CubeMap => glow::TEXTURE_CUBE_MAP,
            Self::Texture2dArray => glow::TEXTURE_2D_ARRAY,
        }
    }
}

/// Coordinate wrapping outside `0..=1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Clamp to the edge texel.
    #[default]
    Clamp,
    /// Repeat.
    Repeat,
    /// Repeat, mirroring every other tile.
    MirroredRepeat,
}

impl WrapMode {
    /// GL wrap enum.
    #[expect(clippy::cast_possible_wrap)]
    pub const fn gl_wrap(self) -> i32 {
        match self {
            Self::Clamp => glow::CLAMP_TO_EDGE as i32,
            Self::Repeat => glow::REPEAT as i32,
            Self::MirroredRepeat => glow::MIRRORED_REPEAT as i32,
        }
    }
}

/// Magnification and minification filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
}

/// When to build a mip chain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    /// Never.
    Off,
    /// Only for power-of-two sizes.
    #[default]
    Pow2,
    /// Always; WebGL1 still refuses non-power-of-two sizes.
    On,
}

/// How alpha is stored in the source pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    /// Straight alpha, left as is.
    NoPremultiply,
    /// Straight alpha, premultiplied by the driver during upload.
    #[default]
    Unpack,
    /// Already premultiplied.
    Premultiplied,
}

/// Sampling and storage defaults for a texture.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TextureOptions {
    /// Wrap mode.
    pub wrap_mode: WrapMode,
    /// Filter.
    pub scale_mode: ScaleMode,
    /// Mip chain policy.
    pub mipmap: MipmapMode,
    /// Alpha storage.
    pub alpha_mode: AlphaMode,
    /// Client pixel layout.
    pub format: PixelFormat,
    /// Client component type.
    pub pixel_type: PixelType,
    /// Binding target.
    pub target: TextureTarget,
    /// Device pixels per logical unit.
    pub resolution: f32,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            wrap_mode: WrapMode::default(),
            scale_mode: ScaleMode::default(),
            mipmap: MipmapMode::default(),
            alpha_mode: AlphaMode::default(),
            format: PixelFormat::default(),
            pixel_type: PixelType::default(),
            target: TextureTarget::default(),
            resolution: 1.0,
        }
    }
}

/// Where pixel data comes from.
#[derive(Clone, Default)]
pub enum TextureResource {
    /// Storage only; contents are produced on the device (render targets).
    #[default]
    None,
    /// A raw pixel array matching the texture's format and type.
    Pixels(Arc<[u8]>),
    /// A decoded RGBA8 image, uploaded as an opaque surface.
    Image(Arc<RgbaImage>),
    /// Six raw faces in +X, -X, +Y, -Y, +Z, -Z order.
    Cube(Arc<[Vec<u8>; 6]>),
    /// Raw layers of a 2D array.
    Array(Arc<[Vec<u8>]>),
}

impl fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Pixels(p) => write!(f, "Pixels({} bytes)", p.len()),
            Self::Image(i) => write!(f, "Image({}x{})", i.width(), i.height()),
            Self::Cube(_) => f.write_str("Cube"),
            Self::Array(layers) => write!(f, "Array({} layers)", layers.len()),
        }
    }
}

struct TextureInner {
    id: ResourceId,
    resource: RefCell<TextureResource>,
    width: Cell<f32>,
    height: Cell<f32>,
    options: Cell<TextureOptions>,
    dirty_id: Cell<u64>,
    dirty_style_id: Cell<u64>,
    touched: Cell<u64>,
    render_target: bool,
    dispose: DisposeRunner,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.dispose.emit(self.id);
    }
}

/// The logical owner of a texture's pixels.
///
/// One device texture per context is created lazily by the texture system.
/// Content changes bump [`dirty_id`](Self::dirty_id); sampling changes bump
/// [`dirty_style_id`](Self::dirty_style_id).
#[derive(Clone)]
pub struct BaseTexture {
    inner: Rc<TextureInner>,
}

impl fmt::Debug for BaseTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseTexture")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width.get())
            .field("height", &self.inner.height.get())
            .field("resource", &*self.inner.resource.borrow())
            .finish()
    }
}

impl PartialEq for BaseTexture {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl BaseTexture {
    fn with_resource(
        resource: TextureResource,
        width: f32,
        height: f32,
        options: TextureOptions,
        render_target: bool,
    ) -> Self {
        Self {
            inner: Rc::new(TextureInner {
                id: ResourceId::next(),
                resource: RefCell::new(resource),
                width: Cell::new(width),
                height: Cell::new(height),
                options: Cell::new(options),
                dirty_id: Cell::new(0),
                dirty_style_id: Cell::new(0),
                touched: Cell::new(0),
                render_target,
                dispose: DisposeRunner::default(),
            }),
        }
    }

    /// A texture over a raw pixel array of `width` by `height` device pixels.
    #[expect(clippy::cast_precision_loss)]
    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: impl Into<Arc<[u8]>>,
        options: TextureOptions,
    ) -> Self {
        let r = options.resolution;
        Self::with_resource(
            TextureResource::Pixels(pixels.into()),
            width as f32 / r,
            height as f32 / r,
            options,
            false,
        )
    }

    /// A texture over a decoded image.
    #[expect(clippy::cast_precision_loss)]
    pub fn from_image(image: impl Into<Arc<RgbaImage>>, options: TextureOptions) -> Self {
        let image = image.into();
        let r = options.resolution;
        let (width, height) = image.dimensions();
        Self::with_resource(
            TextureResource::Image(image),
            width as f32 / r,
            height as f32 / r,
            options,
            false,
        )
    }

    /// A cube map over six square raw faces.
    #[expect(clippy::cast_precision_loss)]
    pub fn from_cube(size: u32, faces: [Vec<u8>; 6], mut options: TextureOptions) -> Self {
        options.target = TextureTarget::CubeMap;
        let r = options.resolution;
        Self::with_resource(
            TextureResource::Cube(Arc::new(faces)),
            size as f32 / r,
            size as f32 / r,
            options,
            false,
        )
    }

    /// A 2D array over raw layers.
    #[expect(clippy::cast_precision_loss)]
    pub fn from_layers(
        width: u32,
        height: u32,
        layers: Vec<Vec<u8>>,
        mut options: TextureOptions,
    ) -> Self {
        options.target = TextureTarget::Texture2dArray;
        let r = options.resolution;
        Self::with_resource(
            TextureResource::Array(layers.into()),
            width as f32 / r,
            height as f32 / r,
            options,
            false,
        )
    }

    /// Storage without initial contents, in logical units.
    pub fn empty(width: f32, height: f32, options: TextureOptions) -> Self {
        Self::with_resource(TextureResource::None, width, height, options, false)
    }

    pub(crate) fn render_target(width: f32, height: f32, options: TextureOptions) -> Self {
        Self::with_resource(TextureResource::None, width, height, options, true)
    }

    /// Identity of this texture.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Logical width.
    pub fn width(&self) -> f32 {
        self.inner.width.get()
    }

    /// Logical height.
    pub fn height(&self) -> f32 {
        self.inner.height.get()
    }

    /// Device pixels per logical unit.
    pub fn resolution(&self) -> f32 {
        self.inner.options.get().resolution
    }

    /// Width in device pixels.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn real_width(&self) -> u32 {
        (self.width() * self.resolution()).round() as u32
    }

    /// Height in device pixels.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn real_height(&self) -> u32 {
        (self.height() * self.resolution()).round() as u32
    }

    /// Both device dimensions are powers of two.
    pub fn is_power_of_two(&self) -> bool {
        self.real_width().is_power_of_two() && self.real_height().is_power_of_two()
    }

    /// Has a non-zero size.
    pub fn valid(&self) -> bool {
        self.real_width() > 0 && self.real_height() > 0
    }

    /// Current sampling and storage options.
    pub fn options(&self) -> TextureOptions {
        self.inner.options.get()
    }

    /// Binding target.
    pub fn target(&self) -> TextureTarget {
        self.inner.options.get().target
    }

    /// Borrow the pixel source.
    pub fn resource(&self) -> Ref<'_, TextureResource> {
        self.inner.resource.borrow()
    }

    /// Content change counter.
    pub fn dirty_id(&self) -> u64 {
        self.inner.dirty_id.get()
    }

    /// Sampling change counter.
    pub fn dirty_style_id(&self) -> u64 {
        self.inner.dirty_style_id.get()
    }

    /// Garbage-collector frame at which this texture was last bound.
    pub fn touched(&self) -> u64 {
        self.inner.touched.get()
    }

    pub(crate) fn touch(&self, frame: u64) {
        self.inner.touched.set(frame);
    }

    /// Backed by a framebuffer; never garbage collected.
    pub fn is_render_target(&self) -> bool {
        self.inner.render_target
    }

    /// Mark the contents changed.
    pub fn update(&self) {
        self.inner.dirty_id.set(self.inner.dirty_id.get() + 1);
    }

    /// Swap the pixel source. Image sources also set the size.
    #[expect(clippy::cast_precision_loss)]
    pub fn set_resource(&self, resource: TextureResource) {
        if let TextureResource::Image(image) = &resource {
            let r = self.resolution();
            self.inner.width.set(image.width() as f32 / r);
            self.inner.height.set(image.height() as f32 / r);
        }
        *self.inner.resource.borrow_mut() = resource;
        self.update();
    }

    /// Resize in logical units.
    pub fn set_size(&self, width: f32, height: f32) {
        self.inner.width.set(width);
        self.inner.height.set(height);
        self.update();
    }

    /// Resize in device pixels, keeping the resolution.
    #[expect(clippy::cast_precision_loss)]
    pub fn set_real_size(&self, width: u32, height: u32) {
        let r = self.resolution();
        self.set_size(width as f32 / r, height as f32 / r);
    }

    /// Change the resolution, keeping the logical size.
    pub fn set_resolution(&self, resolution: f32) {
        self.modify_options(|o| o.resolution = resolution);
        self.update();
    }

    /// Change the wrap mode.
    pub fn set_wrap_mode(&self, wrap_mode: WrapMode) {
        self.set_style(|o| o.wrap_mode = wrap_mode);
    }

    /// Change the filter.
    pub fn set_scale_mode(&self, scale_mode: ScaleMode) {
        self.set_style(|o| o.scale_mode = scale_mode);
    }

    /// Change the mip chain policy.
    pub fn set_mipmap(&self, mipmap: MipmapMode) {
        self.set_style(|o| o.mipmap = mipmap);
    }

    fn set_style(&self, f: impl FnOnce(&mut TextureOptions)) {
        self.modify_options(f);
        self.inner
            .dirty_style_id
            .set(self.inner.dirty_style_id.get() + 1);
    }

    fn modify_options(&self, f: impl FnOnce(&mut TextureOptions)) {
        let mut options = self.inner.options.get();
        f(&mut options);
        self.inner.options.set(options);
    }

    /// Release the device texture in every context. The pixels survive.
    pub fn dispose(&self) {
        self.inner.dispose.emit(self.inner.id);
    }

    /// Drop the pixel source and release device textures.
    pub fn destroy(&self) {
        *self.inner.resource.borrow_mut() = TextureResource::None;
        self.dispose();
    }

    pub(crate) fn on_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.add(queue);
    }

    pub(crate) fn off_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.remove(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_size_applies_resolution() {
        let options = TextureOptions {
            resolution: 2.0,
            ..TextureOptions::default()
        };
        let texture = BaseTexture::from_pixels(64, 32, vec![0; 64 * 32 * 4], options);
        assert_eq!(texture.width(), 32.0);
        assert_eq!(texture.real_width(), 64);
        assert_eq!(texture.real_height(), 32);
        assert!(texture.is_power_of_two());
    }

    #[test]
    fn content_and_style_counters_are_separate() {
        let texture = BaseTexture::empty(3.0, 5.0, TextureOptions::default());
        assert!(!texture.is_power_of_two());
        texture.set_wrap_mode(WrapMode::Repeat);
        assert_eq!((texture.dirty_id(), texture.dirty_style_id()), (0, 1));
        texture.set_size(4.0, 4.0);
        assert_eq!((texture.dirty_id(), texture.dirty_style_id()), (1, 1));
        assert_eq!(texture.options().wrap_mode, WrapMode::Repeat);
    }

    #[test]
    fn image_resource_sets_size() {
        let texture = BaseTexture::empty(0.0, 0.0, TextureOptions::default());
        assert!(!texture.valid());
        texture.set_resource(TextureResource::Image(Arc::new(RgbaImage::new(8, 2))));
        assert!(texture.valid());
        assert_eq!((texture.real_width(), texture.real_height()), (8, 2));
    }

    #[test]
    fn constructors_pick_targets() {
        let cube = BaseTexture::from_cube(1, Default::default(), TextureOptions::default());
        assert_eq!(cube.target(), TextureTarget::CubeMap);
        let array = BaseTexture::from_layers(1, 1, vec![vec![0; 4]; 3], TextureOptions::default());
        assert_eq!(array.target(), TextureTarget::Texture2dArray);
    }

    #[test]
    fn destroy_clears_resource() {
        let queue = DisposeQueue::new();
        let texture = BaseTexture::from_pixels(1, 1, vec![255; 4], TextureOptions::default());
        texture.on_dispose(&queue);
        texture.destroy();
        assert!(matches!(*texture.resource(), TextureResource::None));
        assert_eq!(queue.drain(), vec![texture.id()]);
    }
}
