//! Ownership of the live device and its loss/restore lifecycle.

use log::{info, warn};

use super::{ContextInfo, ContextUid};
use crate::device::{ApiVersion, Capabilities, ContextAttributes, Device, DeviceProvider};
use crate::error::{RenderError, Result};

/// Holds the device the other systems draw with.
///
/// While the context is lost [`device`](Self::device) returns `None`, which
/// turns every renderer entry point into a no-op until a replacement device
/// is handed to [`restore`](Self::restore).
pub struct ContextSystem<D: Device> {
    device: Option<D>,
    info: Option<ContextInfo>,
    lost: bool,
    next_uid: u32,
    attributes: ContextAttributes,
}

impl<D: Device> ContextSystem<D> {
    /// Acquire a device from `provider`, trying WebGL2 first when
    /// `prefer_webgl2` is set and falling back to WebGL1.
    pub fn init<P>(provider: &mut P, attributes: ContextAttributes, prefer_webgl2: bool) -> Result<Self>
    where
        P: DeviceProvider<Device = D>,
    {
        let order: &[ApiVersion] = if prefer_webgl2 {
            &[ApiVersion::WebGl2, ApiVersion::WebGl1]
        } else {
            &[ApiVersion::WebGl1]
        };
        let mut tried = Vec::with_capacity(order.len());
        for &api in order {
            tried.push(api);
            if let Some(device) = provider.request_device(api, &attributes) {
                let mut system = Self {
                    device: None,
                    info: None,
                    lost: false,
                    next_uid: 0,
                    attributes,
                };
                system.install(device);
                return Ok(system);
            }
        }
        Err(RenderError::UnsupportedDevice { tried })
    }

    /// The live device, `None` while lost.
    pub fn device(&self) -> Option<&D> {
        if self.lost {
            None
        } else {
            self.device.as_ref()
        }
    }

    /// Generation and capabilities of the live context.
    pub fn info(&self) -> Option<ContextInfo> {
        if self.lost {
            None
        } else {
            self.info
        }
    }

    /// Attributes the context was requested with.
    pub fn attributes(&self) -> ContextAttributes {
        self.attributes
    }

    /// Whether the context is currently lost.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Record a context loss. Native handles held anywhere are dead from
    /// here on; the device is dropped without further calls.
    pub fn lose(&mut self) {
        if !self.lost {
            info!("device context lost");
        }
        self.lost = true;
        self.device = None;
    }

    /// Install a replacement device after a loss and return the info the
    /// systems must receive in their single `context_change`.
    pub fn restore(&mut self, device: D) -> ContextInfo {
        self.install(device)
    }

    /// Release the device.
    pub fn destroy(&mut self) -> Option<D> {
        self.info = None;
        self.device.take()
    }

    fn install(&mut self, device: D) -> ContextInfo {
        self.next_uid += 1;
        let info = ContextInfo {
            uid: ContextUid(self.next_uid),
            capabilities: device.capabilities(),
        };
        info!(
            "acquired {:?} context (generation {})",
            info.capabilities.api, self.next_uid
        );
        validate_context(&info.capabilities, &self.attributes);
        self.device = Some(device);
        self.info = Some(info);
        self.lost = false;
        info
    }
}

/// Warn about capabilities the renderer degrades without.
pub fn validate_context(capabilities: &Capabilities, attributes: &ContextAttributes) {
    if attributes.stencil && !capabilities.stencil {
        warn!("context has no stencil buffer, masks will not render correctly");
    }
    if !capabilities.vertex_array_objects {
        warn!("context has no vertex array objects, attributes are rebound on every geometry switch");
    }
}
