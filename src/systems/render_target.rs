//! Chooses the surface drawn into and the projection mapping onto it.

use glam::{Mat3, Vec3};

use super::framebuffer::FramebufferSystem;
use super::texture::TextureSystem;
use super::{ContextInfo, System};
use crate::device::Device;
use crate::error::Result;
use crate::math::Rect;
use crate::resources::framebuffer::RenderTexture;
use crate::resources::uniforms::{UniformGroup, UniformValue};

/// Name of the projection uniform in the `globals` group.
pub const PROJECTION_MATRIX: &str = "projectionMatrix";

/// Binds the screen or a [`RenderTexture`] and keeps the renderer's
/// `globals` uniform group pointing at the matching projection.
#[derive(Debug)]
pub struct RenderTargetSystem {
    current: Option<RenderTexture>,
    screen: Rect,
    resolution: f32,
    source_frame: Rect,
    destination_frame: Rect,
    projection: Mat3,
    transform: Option<Mat3>,
    globals: UniformGroup,
}

impl RenderTargetSystem {
    /// Create for a screen of `width` by `height` logical units.
    pub fn new(width: f32, height: f32, resolution: f32) -> Self {
        Self {
            current: None,
            screen: Rect::from_size(width, height),
            resolution,
            source_frame: Rect::default(),
            destination_frame: Rect::default(),
            projection: Mat3::IDENTITY,
            transform: None,
            globals: UniformGroup::new_static([(PROJECTION_MATRIX, UniformValue::Mat3(Mat3::IDENTITY))]),
        }
    }

    /// Uniforms shared by every shader, attached as `globals`.
    pub fn globals(&self) -> &UniformGroup {
        &self.globals
    }

    /// The projection in use.
    pub fn projection(&self) -> Mat3 {
        self.projection
    }

    /// Extra transform appended to every projection, e.g. a camera.
    pub fn set_transform(&mut self, transform: Option<Mat3>) {
        self.transform = transform;
    }

    /// The bound render texture, `None` for the screen.
    pub fn current(&self) -> Option<&RenderTexture> {
        self.current.as_ref()
    }

    /// Logical area mapped onto the target.
    pub fn source_frame(&self) -> Rect {
        self.source_frame
    }

    /// Logical area of the target drawn into.
    pub fn destination_frame(&self) -> Rect {
        self.destination_frame
    }

    /// Logical screen area.
    pub fn screen(&self) -> Rect {
        self.screen
    }

    /// Screen size in device pixels.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn view_size(&self) -> (u32, u32) {
        (
            (self.screen.width * self.resolution).round() as u32,
            (self.screen.height * self.resolution).round() as u32,
        )
    }

    /// Change the logical screen size.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.screen = Rect::from_size(width, height);
    }

    /// Bind `target`, or the screen for `None`.
    ///
    /// `source` is the logical area to map and defaults to the whole
    /// target; `destination` is where on the target it lands and defaults
    /// to the source size at the target's origin. The screen viewport is
    /// flipped vertically because its origin is bottom-left.
    #[expect(clippy::cast_precision_loss)]
    pub fn bind<D: Device>(
        &mut self,
        gl: &D,
        target: Option<&RenderTexture>,
        source: Option<Rect>,
        destination: Option<Rect>,
        framebuffers: &mut FramebufferSystem<D>,
        textures: &mut TextureSystem<D>,
    ) -> Result<()> {
        let (resolution, source, destination) = match target {
            Some(target) => {
                let frame = target.frame();
                let source = source.unwrap_or(Rect::from_size(frame.width, frame.height));
                let destination = destination
                    .unwrap_or(Rect::new(frame.x, frame.y, source.width, source.height));
                (target.texture().resolution(), source, destination)
            }
            None => {
                let source =
                    source.unwrap_or(Rect::from_size(self.screen.width, self.screen.height));
                let destination =
                    destination.unwrap_or(Rect::from_size(source.width, source.height));
                (self.resolution, source, destination)
            }
        };

        let mut viewport = destination.scaled(resolution);
        if target.is_none() {
            let (_, view_height) = self.view_size();
            viewport.y = view_height as f32 - (viewport.y + viewport.height);
        }

        framebuffers.bind(
            gl,
            target.map(RenderTexture::framebuffer),
            Some(viewport.ceil()),
            0,
            textures,
        )?;
        self.current = target.cloned();
        self.source_frame = source;
        self.destination_frame = destination;
        self.update_projection(source, target.is_none());
        Ok(())
    }

    /// Recompute the projection mapping `source` to clip space and publish
    /// it in the `globals` group.
    ///
    /// The screen has a bottom-left origin, so its Y axis is negated;
    /// offscreen targets keep texture orientation.
    pub fn update_projection(&mut self, source: Rect, screen: bool) {
        let sign = if screen { -1.0 } else { 1.0 };
        let a = 2.0 / source.width;
        let d = sign * 2.0 / source.height;
        let tx = -1.0 - source.x * a;
        let ty = -sign - source.y * d;
        self.projection = Mat3::from_cols(
            Vec3::new(a, 0.0, 0.0),
            Vec3::new(0.0, d, 0.0),
            Vec3::new(tx, ty, 1.0),
        );
        if let Some(transform) = self.transform {
            self.projection *= transform;
        }
        self.globals.set(PROJECTION_MATRIX, self.projection);
    }

    /// Forget the bound target.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl<D: Device> System<D> for RenderTargetSystem {
    fn context_change(&mut self, _gl: &D, _context: &ContextInfo) {
        self.reset();
    }

    fn destroy(&mut self, _gl: Option<&D>) {
        self.reset();
    }
}
