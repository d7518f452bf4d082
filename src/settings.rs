//! Renderer configuration.
//!
//! Options are read once at construction. Each system copies the handful of
//! fields it needs; nothing here is mutated by the renderer afterwards.

use crate::resources::texture::TextureOptions;

/// Float precision qualifier injected into shader sources.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    /// `lowp`
    Low,
    /// `mediump`
    Medium,
    /// `highp`
    High,
}

impl Precision {
    /// The GLSL keyword.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}

/// Default precision for each shader stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderPrecision {
    /// Vertex stage precision.
    pub vertex: Precision,
    /// Fragment stage precision.
    pub fragment: Precision,
}

impl Default for ShaderPrecision {
    fn default() -> Self {
        Self {
            vertex: Precision::High,
            fragment: Precision::Medium,
        }
    }
}

/// How idle textures are evicted from device memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcMode {
    /// Sweep periodically after rendering.
    Auto,
    /// Sweep only when [`TextureGcSystem::run`] is called.
    ///
    /// [`TextureGcSystem::run`]: crate::systems::texture_gc::TextureGcSystem::run
    Manual,
    /// Never evict.
    Disabled,
}

/// Texture garbage-collection thresholds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureGcOptions {
    /// Sweep mode.
    pub mode: GcMode,
    /// Frames a texture may go unused before eviction.
    pub max_idle: u64,
    /// Frames between automatic sweeps.
    pub check_count_max: u64,
}

impl Default for TextureGcOptions {
    fn default() -> Self {
        Self {
            mode: GcMode::Auto,
            max_idle: 60 * 60,
            check_count_max: 60 * 10,
        }
    }
}

/// Everything needed to construct a [`Renderer`](crate::Renderer).
#[derive(Clone, Debug)]
pub struct RendererOptions {
    /// Logical surface width.
    pub width: u32,
    /// Logical surface height.
    pub height: u32,
    /// Device pixel ratio.
    pub resolution: f32,
    /// Clear color (RGB).
    pub background_color: [f32; 3],
    /// Clear alpha.
    pub background_alpha: f32,
    /// Clear the target at the start of every `render`.
    pub clear_before_render: bool,
    /// Request an antialiased default surface.
    pub antialias: bool,
    /// Try a WebGL2-class context before falling back to WebGL1.
    pub prefer_webgl2: bool,
    /// Target frame rate; informational for the host's ticker.
    pub target_fps: f32,
    /// Shader precision qualifiers.
    pub precision: ShaderPrecision,
    /// Texture garbage collection.
    pub texture_gc: TextureGcOptions,
    /// Default sampling style for new textures.
    pub texture_defaults: TextureOptions,
    /// Upper bound on textures sampled by one batch draw.
    pub max_batch_textures: u32,
    /// Vertices per batch before a forced flush.
    pub batch_size: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            resolution: 1.0,
            background_color: [0.0, 0.0, 0.0],
            background_alpha: 1.0,
            clear_before_render: true,
            antialias: false,
            prefer_webgl2: true,
            target_fps: 60.0,
            precision: ShaderPrecision::default(),
            texture_gc: TextureGcOptions::default(),
            texture_defaults: TextureOptions::default(),
            max_batch_textures: 16,
            batch_size: 4096,
        }
    }
}
