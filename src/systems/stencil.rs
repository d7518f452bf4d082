//! Nested stencil masks.
//!
//! Each mask level increments the stencil value inside the mask shape, so
//! content at depth `n` is drawn where the stencil equals `n`. Every render
//! target keeps its own depth.

use std::collections::HashMap;

use super::{ContextInfo, System};
use crate::device::Device;
use crate::resources::ResourceId;

/// Tracks mask depth per render target and issues the stencil calls around
/// mask drawing.
///
/// Drawing the mask shape itself is up to the caller, between
/// [`push_begin`](Self::push_begin) and [`push_end`](Self::push_end) (or the
/// pop pair).
#[derive(Debug, Default)]
pub struct StencilSystem {
    depth: u32,
    target: Option<ResourceId>,
    stacks: HashMap<Option<ResourceId>, u32>,
}

impl StencilSystem {
    /// Create with no masks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask depth of the current target.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Switch to the depth of another target, `None` being the screen.
    pub fn switch_target<D: Device>(&mut self, gl: &D, target: Option<ResourceId>) {
        if self.target == target {
            return;
        }
        self.stacks.insert(self.target, self.depth);
        let depth = self.stacks.get(&target).copied().unwrap_or(0);
        self.target = target;
        if depth != self.depth {
            self.depth = depth;
            if depth == 0 {
                gl.disable(glow::STENCIL_TEST);
            } else {
                gl.enable(glow::STENCIL_TEST);
                self.use_current(gl);
            }
        }
    }

    /// Start writing a new mask level. The first level clears the stencil.
    pub fn push_begin<D: Device>(&mut self, gl: &D) {
        let previous = self.depth;
        if previous == 0 {
            gl.clear_stencil(0);
            gl.clear(glow::STENCIL_BUFFER_BIT);
            gl.enable(glow::STENCIL_TEST);
        }
        self.depth += 1;
        gl.color_mask(false, false, false, false);
        gl.stencil_func(glow::EQUAL, reference(previous), u32::MAX);
        gl.stencil_op(glow::KEEP, glow::KEEP, glow::INCR);
    }

    /// Finish writing a mask level and draw content inside it.
    pub fn push_end<D: Device>(&mut self, gl: &D) {
        gl.color_mask(true, true, true, true);
        self.use_current(gl);
    }

    /// Start removing the innermost mask level.
    ///
    /// Returns whether the mask shape must be drawn to undo it; popping the
    /// last level just turns the stencil test off.
    pub fn pop_begin<D: Device>(&mut self, gl: &D) -> bool {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            gl.disable(glow::STENCIL_TEST);
            return false;
        }
        gl.color_mask(false, false, false, false);
        gl.stencil_op(glow::KEEP, glow::KEEP, glow::DECR);
        true
    }

    /// Finish removing a mask level.
    pub fn pop_end<D: Device>(&mut self, gl: &D) {
        gl.color_mask(true, true, true, true);
        self.use_current(gl);
    }

    fn use_current<D: Device>(&self, gl: &D) {
        gl.stencil_func(glow::EQUAL, reference(self.depth), u32::MAX);
        gl.stencil_op(glow::KEEP, glow::KEEP, glow::KEEP);
    }
}

fn reference(depth: u32) -> i32 {
    i32::try_from(depth).unwrap_or(i32::MAX)
}

impl<D: Device> System<D> for StencilSystem {
    fn context_change(&mut self, _gl: &D, _context: &ContextInfo) {
        self.depth = 0;
        self.target = None;
        self.stacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};

    #[test]
    fn first_push_clears_and_enables() {
        let gl = RecordingDevice::new();
        let mut stencil = StencilSystem::new();
        stencil.push_begin(&gl);
        stencil.push_end(&gl);
        assert_eq!(
            gl.take_calls(),
            vec![
                Call::ClearStencil(0),
                Call::Clear(glow::STENCIL_BUFFER_BIT),
                Call::Enable(glow::STENCIL_TEST),
                Call::ColorMask([false; 4]),
                Call::StencilFunc { func: glow::EQUAL, reference: 0 },
                Call::StencilOp([glow::KEEP, glow::KEEP, glow::INCR]),
                Call::ColorMask([true; 4]),
                Call::StencilFunc { func: glow::EQUAL, reference: 1 },
                Call::StencilOp([glow::KEEP; 3]),
            ]
        );
    }

    #[test]
    fn nested_masks_count_up_and_down() {
        let gl = RecordingDevice::new();
        let mut stencil = StencilSystem::new();
        for _ in 0..2 {
            stencil.push_begin(&gl);
            stencil.push_end(&gl);
        }
        assert_eq!(stencil.depth(), 2);
        assert_eq!(gl.count(|c| matches!(c, Call::ClearStencil(_))), 1);

        gl.clear();
        assert!(stencil.pop_begin(&gl));
        stencil.pop_end(&gl);
        assert_eq!(
            gl.take_calls(),
            vec![
                Call::ColorMask([false; 4]),
                Call::StencilOp([glow::KEEP, glow::KEEP, glow::DECR]),
                Call::ColorMask([true; 4]),
                Call::StencilFunc { func: glow::EQUAL, reference: 1 },
                Call::StencilOp([glow::KEEP; 3]),
            ]
        );

        assert!(!stencil.pop_begin(&gl));
        assert_eq!(gl.take_calls(), vec![Call::Disable(glow::STENCIL_TEST)]);
        assert_eq!(stencil.depth(), 0);
    }

    #[test]
    fn targets_keep_their_own_depth() {
        let gl = RecordingDevice::new();
        let mut stencil = StencilSystem::new();
        stencil.push_begin(&gl);
        stencil.push_end(&gl);

        let offscreen = ResourceId::next();
        gl.clear();
        stencil.switch_target(&gl, Some(offscreen));
        assert_eq!(stencil.depth(), 0);
        assert_eq!(gl.take_calls(), vec![Call::Disable(glow::STENCIL_TEST)]);

        stencil.switch_target(&gl, None);
        assert_eq!(stencil.depth(), 1);
        assert_eq!(
            gl.take_calls(),
            vec![
                Call::Enable(glow::STENCIL_TEST),
                Call::StencilFunc { func: glow::EQUAL, reference: 1 },
                Call::StencilOp([glow::KEEP; 3]),
            ]
        );
    }
}
