//! A retained-mode 2D renderer core for WebGL and OpenGL via [glow].
//!
//! The crate keeps CPU-side resources ([`Buffer`], [`Geometry`],
//! [`BaseTexture`], [`Program`], [`Framebuffer`]) in sync with their device
//! counterparts, issues only the state changes that differ from what the
//! device already has, and merges textured elements into few draw calls.
//!
//! # Structure
//!
//! - [`device`]: the [`Device`] trait every GL call goes through, with a
//!   [`GlDevice`] implementation over a [`glow::Context`].
//! - [`resources`]: descriptors with dirty ids, shareable between renderers.
//! - [`systems`]: one system per slice of device state, each owning the
//!   native objects for its resources in the current context.
//! - [`batch`]: the multi-texture batcher.
//! - [`Renderer`]: drives the systems over a flattened scene of
//!   [`RenderLeaf`]s.
//!
//! # Context loss
//!
//! Native objects are tied to one context generation. After
//! [`Renderer::lose_context`] every entry point is a no-op until
//! [`Renderer::restore_context`]; the systems then drop their caches once and
//! rebuild objects on first use. CPU-side resources survive untouched.
//!
//! # Features
//!
//! - `tessellation` (default): path filling and stroking via [lyon] in
//!   [`graphics`].
//!
//! [glow]: https://docs.rs/glow
//! [lyon]: https://docs.rs/lyon

pub mod batch;
pub mod device;
pub mod error;
#[cfg(feature = "tessellation")]
pub mod graphics;
pub mod math;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod systems;

pub use batch::{BatchRenderer, BatchVertex};
pub use device::{ApiVersion, Capabilities, ContextAttributes, Device, DeviceProvider, GlDevice};
pub use error::{RenderError, Result};
pub use renderer::{FrameStats, Renderer};
pub use resources::buffer::{Buffer, BufferUsage};
pub use resources::framebuffer::{Framebuffer, MsaaQuality, RenderTexture};
pub use resources::geometry::{Attribute, Geometry, IndexFormat, Topology, VertexFormat};
pub use resources::program::Program;
pub use resources::state::{BlendMode, State};
pub use resources::texture::{BaseTexture, TextureOptions, TextureResource};
pub use resources::uniforms::{Shader, UniformGroup, UniformValue};
pub use scene::{BatchElement, Container, DisplayNode, MeshElement, RenderLeaf};
pub use settings::{GcMode, Precision, RendererOptions, ShaderPrecision, TextureGcOptions};
