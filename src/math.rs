//! Small geometric value types.
//!
//! Matrices come from [`glam`]; the renderer only adds a pixel rectangle.

pub use glam::{Affine2, Mat3, Vec2};

/// An axis-aligned rectangle in either logical or pixel units.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin with the given size.
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Scale every component by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Round outward to whole pixels, as a viewport.
    #[must_use]
    pub fn ceil(self) -> Self {
        Self::new(
            self.x.ceil(),
            self.y.ceil(),
            self.width.ceil(),
            self.height.ceil(),
        )
    }

    /// Integer components for GL viewport calls.
    #[expect(clippy::cast_possible_truncation)]
    pub fn to_i32(self) -> [i32; 4] {
        [
            self.x as i32,
            self.y as i32,
            self.width as i32,
            self.height as i32,
        ]
    }
}

/// Flatten an affine transform into the column-major `mat3` GL expects.
pub fn affine_to_mat3(transform: &Affine2) -> Mat3 {
    Mat3::from(*transform)
}
