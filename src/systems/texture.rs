//! Mirrors [`BaseTexture`]s into device textures and tracks sampler slots.

use log::{trace, warn};

use super::{ContextCache, ContextInfo, System};
use crate::device::{ApiVersion, Capabilities, Device, TexImageDesc, UNPACK_PREMULTIPLY_ALPHA};
use crate::error::{RenderError, Result};
use crate::resources::texture::{
    AlphaMode, BaseTexture, MipmapMode, PixelFormat, PixelType, ScaleMode, TextureResource,
    TextureTarget, WrapMode,
};
use crate::resources::{DisposeQueue, ResourceId};

/// The device side of one texture.
#[derive(Debug)]
pub struct GlTexture<D: Device> {
    /// Native handle.
    pub handle: D::Texture,
    /// Bind target.
    pub target: TextureTarget,
    /// Allocated width in texels.
    pub width: u32,
    /// Allocated height in texels.
    pub height: u32,
    /// Allocated layers of an array texture.
    pub layers: usize,
    /// `dirty_id` of the last upload.
    pub dirty_id: Option<u64>,
    /// `dirty_style_id` of the last style sync.
    pub dirty_style_id: Option<u64>,
    /// Mip chain in use.
    pub mipmap: bool,
    /// Effective wrap mode.
    pub wrap_mode: WrapMode,
    /// Internal format used for allocation.
    pub internal_format: i32,
    /// Component type used for upload.
    pub data_type: u32,
}

/// What a sampler slot holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Slot {
    /// Not known since the last reset.
    Unknown,
    /// The empty placeholder.
    Empty,
    /// A managed texture.
    Texture(ResourceId),
}

/// Binds textures to units, uploads stale content and keeps the list of
/// textures the garbage collector may evict.
pub struct TextureSystem<D: Device> {
    textures: ContextCache<GlTexture<D>>,
    managed: Vec<BaseTexture>,
    bound: Vec<Slot>,
    current_location: Option<u32>,
    empty_2d: Option<D::Texture>,
    empty_cube: Option<D::Texture>,
    capabilities: Capabilities,
    touch_frame: u64,
    disposed: DisposeQueue,
}

impl<D: Device> Default for TextureSystem<D> {
    fn default() -> Self {
        Self {
            textures: ContextCache::default(),
            managed: Vec::new(),
            bound: Vec::new(),
            current_location: None,
            empty_2d: None,
            empty_cube: None,
            capabilities: Capabilities::webgl1(),
            touch_frame: 0,
            disposed: DisposeQueue::new(),
        }
    }
}

/// Sized internal format on WebGL2, the client format otherwise.
#[expect(clippy::cast_possible_wrap)]
fn internal_format(format: PixelFormat, pixel_type: PixelType, webgl2: bool) -> i32 {
    if !webgl2 {
        return format.gl_format() as i32;
    }
    let sized = match (format, pixel_type) {
        (PixelFormat::Rgba, PixelType::UnsignedByte) => glow::RGBA8,
        (PixelFormat::Rgb, PixelType::UnsignedByte) => glow::RGB8,
        (PixelFormat::Rg, PixelType::UnsignedByte) => glow::RG8,
        (PixelFormat::Red, PixelType::UnsignedByte) => glow::R8,
        (PixelFormat::Rgba, PixelType::Float) => glow::RGBA32F,
        (PixelFormat::Rgb, PixelType::Float) => glow::RGB32F,
        (PixelFormat::Rg, PixelType::Float) => glow::RG32F,
        (PixelFormat::Red, PixelType::Float) => glow::R32F,
        (PixelFormat::Rgba, PixelType::HalfFloat) => glow::RGBA16F,
        (PixelFormat::Rgb, PixelType::HalfFloat) => glow::RGB16F,
        (PixelFormat::Rg, PixelType::HalfFloat) => glow::RG16F,
        (PixelFormat::Red, PixelType::HalfFloat) => glow::R16F,
        (PixelFormat::Depth, PixelType::UnsignedShort) => glow::DEPTH_COMPONENT16,
        (PixelFormat::Depth, PixelType::UnsignedInt) => glow::DEPTH_COMPONENT24,
        (PixelFormat::Depth, PixelType::Float) => glow::DEPTH_COMPONENT32F,
        (PixelFormat::DepthStencil, PixelType::UnsignedInt24_8) => glow::DEPTH24_STENCIL8,
        _ => format.gl_format(),
    };
    sized as i32
}

#[expect(clippy::cast_possible_wrap)]
const fn param(value: u32) -> i32 {
    value as i32
}

impl<D: Device> TextureSystem<D> {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    fn webgl2(&self) -> bool {
        self.capabilities.api == ApiVersion::WebGl2
    }

    /// Frame stamp written into every texture bound from now on.
    pub fn set_touch_frame(&mut self, frame: u64) {
        self.touch_frame = frame;
    }

    /// Textures with device storage in this context, in creation order.
    pub fn managed_textures(&self) -> &[BaseTexture] {
        &self.managed
    }

    /// The device side of `texture`, if it exists in this context.
    pub fn gl_texture(&self, texture: &BaseTexture) -> Option<&GlTexture<D>> {
        self.textures.get(texture.id())
    }

    fn activate(&mut self, gl: &D, location: u32) {
        if self.current_location != Some(location) {
            self.current_location = Some(location);
            gl.active_texture(location);
        }
    }

    fn empty_for(&self, target: TextureTarget) -> Option<D::Texture> {
        match target {
            TextureTarget::Texture2d => self.empty_2d,
            TextureTarget::CubeMap => self.empty_cube,
            TextureTarget::Texture2dArray => None,
        }
    }

    fn slot_mut(&mut self, location: u32) -> &mut Slot {
        let index = location as usize;
        if index >= self.bound.len() {
            self.bound.resize(index + 1, Slot::Unknown);
        }
        &mut self.bound[index]
    }

    /// Bind `texture` to unit `location`, or the empty placeholder for
    /// `None` and zero-sized textures.
    ///
    /// Creates the device texture on first use and uploads content whose
    /// `dirty_id` has moved since the last upload.
    pub fn bind(&mut self, gl: &D, texture: Option<&BaseTexture>, location: u32) -> Result<()> {
        let Some(texture) = texture.filter(|t| t.valid()) else {
            if *self.slot_mut(location) != Slot::Empty {
                self.activate(gl, location);
                gl.bind_texture(glow::TEXTURE_2D, self.empty_2d);
                *self.slot_mut(location) = Slot::Empty;
            }
            return Ok(());
        };

        texture.touch(self.touch_frame);
        let id = texture.id();
        if !self.textures.contains(id) {
            self.init_texture(gl, texture)?;
        }
        let (handle, dirty_id, dirty_style_id) = match self.textures.get(id) {
            Some(t) => (t.handle, t.dirty_id, t.dirty_style_id),
            None => return Err(RenderError::Device("texture cache miss".into())),
        };

        if *self.slot_mut(location) != Slot::Texture(id) {
            self.activate(gl, location);
            gl.bind_texture(texture.target().gl_target(), Some(handle));
        }
        if dirty_id != Some(texture.dirty_id()) {
            self.activate(gl, location);
            self.update_texture(gl, texture);
        } else if dirty_style_id != Some(texture.dirty_style_id()) {
            self.activate(gl, location);
            self.update_texture_style(gl, texture);
        }
        *self.slot_mut(location) = Slot::Texture(id);
        Ok(())
    }

    /// Replace `texture` with the placeholder in every slot holding it.
    pub fn unbind(&mut self, gl: &D, texture: &BaseTexture) {
        self.unbind_id(gl, texture.id(), texture.target());
    }

    fn unbind_id(&mut self, gl: &D, id: ResourceId, target: TextureTarget) {
        for location in 0..self.bound.len() {
            if self.bound[location] == Slot::Texture(id) {
                let location = u32::try_from(location).unwrap_or(u32::MAX);
                self.activate(gl, location);
                gl.bind_texture(target.gl_target(), self.empty_for(target));
                *self.slot_mut(location) = Slot::Empty;
            }
        }
    }

    /// Forget slot contents so the next binds are issued unconditionally.
    pub fn reset_bindings(&mut self) {
        self.current_location = None;
        self.bound.iter_mut().for_each(|slot| *slot = Slot::Unknown);
    }

    fn init_texture(&mut self, gl: &D, texture: &BaseTexture) -> Result<()> {
        let handle = gl.create_texture().map_err(RenderError::Device)?;
        let options = texture.options();
        self.textures.insert(
            texture.id(),
            GlTexture {
                handle,
                target: options.target,
                width: 0,
                height: 0,
                layers: 0,
                dirty_id: None,
                dirty_style_id: None,
                mipmap: false,
                wrap_mode: WrapMode::Clamp,
                internal_format: internal_format(options.format, options.pixel_type, self.webgl2()),
                data_type: options.pixel_type.gl_type(self.webgl2()),
            },
        );
        self.managed.push(texture.clone());
        texture.on_dispose(&self.disposed);
        Ok(())
    }

    /// Upload content. The texture must be bound on the active unit.
    #[expect(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    fn update_texture(&mut self, gl: &D, texture: &BaseTexture) {
        let webgl2 = self.webgl2();
        let options = texture.options();
        let Some(gl_texture) = self.textures.get_mut(texture.id()) else {
            return;
        };
        gl_texture.internal_format = internal_format(options.format, options.pixel_type, webgl2);
        gl_texture.data_type = options.pixel_type.gl_type(webgl2);

        let (width, height) = (texture.real_width(), texture.real_height());
        let resized =
            gl_texture.width != width || gl_texture.height != height || gl_texture.dirty_id.is_none();
        let mut desc = TexImageDesc {
            internal_format: gl_texture.internal_format,
            width: width as i32,
            height: height as i32,
            format: options.format.gl_format(),
            data_type: gl_texture.data_type,
        };
        let target = options.target.gl_target();

        let upload_2d = |target: u32, desc: &TexImageDesc, pixels: Option<&[u8]>| match pixels {
            Some(pixels) if !resized => gl.tex_sub_image_2d(target, 0, desc, pixels),
            pixels => gl.tex_image_2d(target, 0, desc, pixels),
        };

        match &*texture.resource() {
            TextureResource::Pixels(pixels) => {
                gl.pixel_store_bool(UNPACK_PREMULTIPLY_ALPHA, options.alpha_mode == AlphaMode::Unpack);
                upload_2d(target, &desc, Some(&pixels[..]));
            }
            TextureResource::Image(image) => {
                desc.internal_format = internal_format(PixelFormat::Rgba, PixelType::UnsignedByte, webgl2);
                desc.format = glow::RGBA;
                desc.data_type = glow::UNSIGNED_BYTE;
                gl.pixel_store_bool(UNPACK_PREMULTIPLY_ALPHA, options.alpha_mode == AlphaMode::Unpack);
                upload_2d(target, &desc, Some(image.as_raw().as_slice()));
            }
            TextureResource::Cube(faces) => {
                gl.pixel_store_bool(UNPACK_PREMULTIPLY_ALPHA, options.alpha_mode == AlphaMode::Unpack);
                for (face, pixels) in (0u32..).zip(faces.iter()) {
                    upload_2d(glow::TEXTURE_CUBE_MAP_POSITIVE_X + face, &desc, Some(pixels.as_slice()));
                }
            }
            TextureResource::Array(layers) => {
                if !webgl2 {
                    warn!("array textures need a WebGL2-class context; skipping upload");
                } else {
                    if resized || gl_texture.layers != layers.len() {
                        gl.tex_image_3d(target, 0, &desc, layers.len() as i32, None);
                        gl_texture.layers = layers.len();
                    }
                    for (layer, pixels) in (0i32..).zip(layers.iter()) {
                        gl.tex_sub_image_3d(target, 0, layer, &desc, pixels);
                    }
                }
            }
            TextureResource::None => {
                if resized {
                    if options.target == TextureTarget::CubeMap {
                        for face in 0..6 {
                            gl.tex_image_2d(glow::TEXTURE_CUBE_MAP_POSITIVE_X + face, 0, &desc, None);
                        }
                    } else {
                        gl.tex_image_2d(target, 0, &desc, None);
                    }
                }
            }
        }

        gl_texture.width = width;
        gl_texture.height = height;
        gl_texture.dirty_id = Some(texture.dirty_id());
        let mipmap = gl_texture.mipmap;
        let style_stale = gl_texture.dirty_style_id != Some(texture.dirty_style_id());

        if style_stale {
            self.update_texture_style(gl, texture);
        } else if mipmap {
            gl.generate_mipmap(target);
        }
    }

    /// Apply wrap and filter settings. The texture must be bound.
    fn update_texture_style(&mut self, gl: &D, texture: &BaseTexture) {
        let webgl2 = self.webgl2();
        let Some(gl_texture) = self.textures.get_mut(texture.id()) else {
            return;
        };
        let options = texture.options();
        let pow2 = texture.is_power_of_two();

        gl_texture.mipmap = match options.mipmap {
            MipmapMode::Off => false,
            MipmapMode::Pow2 => pow2,
            MipmapMode::On => webgl2 || pow2,
        };
        gl_texture.wrap_mode = if !webgl2 && !pow2 {
            WrapMode::Clamp
        } else {
            options.wrap_mode
        };

        let target = options.target.gl_target();
        let wrap = gl_texture.wrap_mode.gl_wrap();
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap);
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap);

        let linear = options.scale_mode == ScaleMode::Linear;
        let min_filter = if gl_texture.mipmap {
            gl.generate_mipmap(target);
            if linear {
                glow::LINEAR_MIPMAP_LINEAR
            } else {
                glow::NEAREST_MIPMAP_NEAREST
            }
        } else if linear {
            glow::LINEAR
        } else {
            glow::NEAREST
        };
        let mag_filter = if linear { glow::LINEAR } else { glow::NEAREST };
        gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, param(min_filter));
        gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, param(mag_filter));
        gl_texture.dirty_style_id = Some(texture.dirty_style_id());
    }

    fn release(&mut self, gl: &D, id: ResourceId) {
        if let Some(gl_texture) = self.textures.remove(id) {
            self.unbind_id(gl, id, gl_texture.target);
            gl.delete_texture(gl_texture.handle);
        }
    }

    /// Delete the device texture now. The pixels survive and are uploaded
    /// again on the next bind.
    pub fn destroy_texture(&mut self, gl: &D, texture: &BaseTexture) {
        self.release(gl, texture.id());
        texture.off_dispose(&self.disposed);
        self.managed.retain(|t| t != texture);
    }

    /// Delete every managed texture matching `evict`, compacting the managed
    /// list in place. Returns how many were deleted.
    pub fn evict(&mut self, gl: &D, mut evict: impl FnMut(&BaseTexture) -> bool) -> usize {
        let mut kept = 0;
        for index in 0..self.managed.len() {
            if evict(&self.managed[index]) {
                let texture = self.managed[index].clone();
                trace!("evicting idle texture {:?}", texture.id());
                self.release(gl, texture.id());
                texture.off_dispose(&self.disposed);
            } else {
                self.managed.swap(kept, index);
                kept += 1;
            }
        }
        let evicted = self.managed.len() - kept;
        self.managed.truncate(kept);
        evicted
    }

    /// Release textures disposed since the last call.
    pub fn collect_disposed(&mut self, gl: &D) {
        for id in self.disposed.drain() {
            self.release(gl, id);
            self.managed.retain(|t| t.id() != id);
        }
    }

    fn create_empty(&self, gl: &D, target: TextureTarget) -> Option<D::Texture> {
        let handle = match gl.create_texture() {
            Ok(handle) => handle,
            Err(err) => {
                warn!("could not create placeholder texture: {err}");
                return None;
            }
        };
        let desc = TexImageDesc {
            internal_format: param(glow::RGBA),
            width: 1,
            height: 1,
            format: glow::RGBA,
            data_type: glow::UNSIGNED_BYTE,
        };
        let pixels = [0u8; 4];
        gl.bind_texture(target.gl_target(), Some(handle));
        if target == TextureTarget::CubeMap {
            for face in 0..6 {
                gl.tex_image_2d(glow::TEXTURE_CUBE_MAP_POSITIVE_X + face, 0, &desc, Some(&pixels[..]));
            }
        } else {
            gl.tex_image_2d(glow::TEXTURE_2D, 0, &desc, Some(&pixels[..]));
        }
        Some(handle)
    }
}

impl<D: Device> System<D> for TextureSystem<D> {
    fn context_change(&mut self, gl: &D, context: &ContextInfo) {
        self.textures.reset(context.uid);
        self.managed.clear();
        self.disposed.drain();
        self.capabilities = context.capabilities;

        self.empty_2d = self.create_empty(gl, TextureTarget::Texture2d);
        self.empty_cube = self.create_empty(gl, TextureTarget::CubeMap);
        self.bound = vec![Slot::Unknown; self.capabilities.max_texture_units as usize];
        self.current_location = None;
        for location in 0..self.capabilities.max_texture_units {
            // Binding the placeholder cannot fail.
            let _ = self.bind(gl, None, location);
        }
    }

    fn destroy(&mut self, gl: Option<&D>) {
        let handles: Vec<D::Texture> = self
            .textures
            .drain()
            .map(|(_, t)| t.handle)
            .chain(self.empty_2d.take())
            .chain(self.empty_cube.take())
            .collect();
        if let Some(gl) = gl {
            for handle in handles {
                gl.delete_texture(handle);
            }
        }
        for texture in self.managed.drain(..) {
            texture.off_dispose(&self.disposed);
        }
        self.bound.clear();
        self.current_location = None;
    }
}
