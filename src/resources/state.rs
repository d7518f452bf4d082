//! Fixed-function render state packed into a bitmask.

/// Blending enabled.
pub const BLEND: u8 = 1 << 0;
/// Polygon offset enabled.
pub const OFFSET: u8 = 1 << 1;
/// Face culling enabled.
pub const CULLING: u8 = 1 << 2;
/// Depth test enabled.
pub const DEPTH_TEST: u8 = 1 << 3;
/// Clockwise front faces.
pub const WINDING: u8 = 1 << 4;

/// Number of switches in the mask.
pub const STATE_BITS: usize = 5;

/// Blend equations for premultiplied (and a few straight-alpha) sources.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source over.
    #[default]
    Normal,
    /// Additive.
    Add,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Source over, straight alpha.
    NormalNpm,
    /// Additive, straight alpha.
    AddNpm,
    /// Screen, straight alpha.
    ScreenNpm,
    /// Source in destination.
    SrcIn,
    /// Source out of destination.
    SrcOut,
    /// Source atop destination.
    SrcAtop,
    /// Destination over source.
    DstOver,
    /// Destination in source.
    DstIn,
    /// Destination out of source; erases.
    DstOut,
    /// Destination atop source.
    DstAtop,
    /// Exclusive or.
    Xor,
    /// Reverse subtract.
    Subtract,
    /// Blending forced off.
    None,
}

impl BlendMode {
    /// `[src_rgb, dst_rgb, src_alpha, dst_alpha]` factors.
    pub const fn factors(self) -> [u32; 4] {
        use glow::{
            DST_ALPHA, DST_COLOR, ONE, ONE_MINUS_DST_ALPHA, ONE_MINUS_SRC_ALPHA,
            ONE_MINUS_SRC_COLOR, SRC_ALPHA, ZERO,
        };
        match self {
            Self::Normal => [ONE, ONE_MINUS_SRC_ALPHA, ONE, ONE_MINUS_SRC_ALPHA],
            Self::Add | Self::Subtract => [ONE, ONE, ONE, ONE],
            Self::Multiply => [DST_COLOR, ONE_MINUS_SRC_ALPHA, ONE, ONE_MINUS_SRC_ALPHA],
            Self::Screen => [ONE, ONE_MINUS_SRC_COLOR, ONE, ONE_MINUS_SRC_ALPHA],
            Self::NormalNpm => [SRC_ALPHA, ONE_MINUS_SRC_ALPHA, ONE, ONE_MINUS_SRC_ALPHA],
            Self::AddNpm => [SRC_ALPHA, ONE, ONE, ONE],
            Self::ScreenNpm => [SRC_ALPHA, ONE_MINUS_SRC_COLOR, ONE, ONE_MINUS_SRC_ALPHA],
            Self::SrcIn => [DST_ALPHA, ZERO, DST_ALPHA, ZERO],
            Self::SrcOut => [ONE_MINUS_DST_ALPHA, ZERO, ONE_MINUS_DST_ALPHA, ZERO],
            Self::SrcAtop => [DST_ALPHA, ONE_MINUS_SRC_ALPHA, DST_ALPHA, ONE_MINUS_SRC_ALPHA],
            Self::DstOver => [ONE_MINUS_DST_ALPHA, ONE, ONE_MINUS_DST_ALPHA, ONE],
            Self::DstIn => [ZERO, SRC_ALPHA, ZERO, SRC_ALPHA],
            Self::DstOut => [ZERO, ONE_MINUS_SRC_ALPHA, ZERO, ONE_MINUS_SRC_ALPHA],
            Self::DstAtop => [ONE_MINUS_DST_ALPHA, SRC_ALPHA, ONE_MINUS_DST_ALPHA, SRC_ALPHA],
            Self::Xor => [
                ONE_MINUS_DST_ALPHA,
                ONE_MINUS_SRC_ALPHA,
                ONE_MINUS_DST_ALPHA,
                ONE_MINUS_SRC_ALPHA,
            ],
            Self::None => [ZERO, ZERO, ZERO, ZERO],
        }
    }

    /// `(rgb, alpha)` equations when not plain addition.
    pub const fn equation(self) -> Option<(u32, u32)> {
        match self {
            Self::Subtract => Some((glow::FUNC_REVERSE_SUBTRACT, glow::FUNC_ADD)),
            _ => None,
        }
    }
}

/// Render state: five switches plus the values two of them govern.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct State {
    data: u8,
    blend_mode: BlendMode,
    polygon_offset: f32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            data: 0,
            blend_mode: BlendMode::Normal,
            polygon_offset: 0.0,
        }
    }
}

impl State {
    /// Blending on, everything else off.
    pub fn for_2d() -> Self {
        Self {
            data: BLEND,
            ..Self::default()
        }
    }

    /// Build from raw bits.
    pub fn from_bits(data: u8) -> Self {
        Self {
            data: data & ((1 << STATE_BITS) - 1),
            ..Self::default()
        }
    }

    /// Raw switch bits.
    pub const fn data(&self) -> u8 {
        self.data
    }

    fn toggle(&mut self, bit: u8, on: bool) {
        if on {
            self.data |= bit;
        } else {
            self.data &= !bit;
        }
    }

    /// Blending enabled.
    pub const fn blend(&self) -> bool {
        self.data & BLEND != 0
    }

    /// Enable or disable blending.
    pub fn set_blend(&mut self, on: bool) {
        self.toggle(BLEND, on);
    }

    /// Polygon offset enabled.
    pub const fn offsets(&self) -> bool {
        self.data & OFFSET != 0
    }

    /// Enable or disable polygon offset.
    pub fn set_offsets(&mut self, on: bool) {
        self.toggle(OFFSET, on);
    }

    /// Face culling enabled.
    pub const fn culling(&self) -> bool {
        self.data & CULLING != 0
    }

    /// Enable or disable face culling.
    pub fn set_culling(&mut self, on: bool) {
        self.toggle(CULLING, on);
    }

    /// Depth test enabled.
    pub const fn depth_test(&self) -> bool {
        self.data & DEPTH_TEST != 0
    }

    /// Enable or disable the depth test.
    pub fn set_depth_test(&mut self, on: bool) {
        self.toggle(DEPTH_TEST, on);
    }

    /// Front faces wind clockwise.
    pub const fn clockwise_front_face(&self) -> bool {
        self.data & WINDING != 0
    }

    /// Choose front-face winding.
    pub fn set_clockwise_front_face(&mut self, on: bool) {
        self.toggle(WINDING, on);
    }

    /// Blend mode applied while blending is on.
    pub const fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Set the blend mode; [`BlendMode::None`] turns blending off.
    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.set_blend(mode != BlendMode::None);
        self.blend_mode = mode;
    }

    /// Polygon offset units applied while offsets are on.
    pub const fn polygon_offset(&self) -> f32 {
        self.polygon_offset
    }

    /// Set the polygon offset; zero turns offsets off.
    pub fn set_polygon_offset(&mut self, value: f32) {
        self.set_offsets(value != 0.0);
        self.polygon_offset = value;
    }
}
