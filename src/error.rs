//! Error taxonomy for the renderer core.
//!
//! Only fatal conditions are represented here. Context loss is not an error:
//! every entry point becomes a no-op while the context is lost. Cache misses
//! (buffers, textures, programs, vertex arrays) are ordinary first-use paths.

use thiserror::Error;

use crate::device::ApiVersion;

/// Fatal renderer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No device context of any acceptable API version could be obtained.
    #[error("no usable graphics context could be obtained (tried {tried:?})")]
    UnsupportedDevice {
        /// The API versions requested, in order.
        tried: Vec<ApiVersion>,
    },

    /// A geometry lacks an attribute that the bound program consumes.
    #[error("geometry is missing attribute `{attribute}` required by program `{program}`")]
    IncompatibleGeometry {
        /// Name of the missing attribute.
        attribute: String,
        /// Name of the program that requires it.
        program: String,
    },

    /// An instanced attribute was requested on a device without instancing.
    #[error("attribute `{attribute}` is instanced but the device does not support instancing")]
    InstancingUnsupported {
        /// Name of the instanced attribute.
        attribute: String,
    },

    /// A geometry uses 32-bit indices on a device limited to 16-bit indices.
    #[error("32-bit index buffers are not supported by this device")]
    Uint32IndicesUnsupported,

    /// Shader compilation or program linking failed.
    #[error("failed to build program `{name}`: {log}")]
    ShaderCompile {
        /// Program name.
        name: String,
        /// Driver info log.
        log: String,
    },

    /// Native object creation failed.
    #[error("device object creation failed: {0}")]
    Device(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;
