//! Converges fixed-function state with as few device calls as possible.

use super::{ContextInfo, System};
use crate::device::Device;
use crate::resources::state::{BlendMode, State, BLEND, STATE_BITS};

/// Follow-up work that runs after every [`StateSystem::set_state`] while the
/// bit governing it is on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Check {
    BlendMode,
    PolygonOffset,
}

type Handler<D> = fn(&mut StateSystem, &D, bool);

/// Tracks the active switches and applies only the bits that change.
#[derive(Debug)]
pub struct StateSystem {
    data: u8,
    blend_mode: Option<BlendMode>,
    blend_equation: bool,
    polygon_offset: Option<f32>,
    checks: Vec<Check>,
    default_state: State,
}

impl Default for StateSystem {
    fn default() -> Self {
        Self {
            data: 0,
            blend_mode: None,
            blend_equation: false,
            polygon_offset: None,
            checks: Vec::with_capacity(2),
            default_state: State::for_2d(),
        }
    }
}

impl StateSystem {
    /// Create with nothing known about the device.
    pub fn new() -> Self {
        Self::default()
    }

    /// One handler per bit, indexed by bit position.
    fn handlers<D: Device>() -> [Handler<D>; STATE_BITS] {
        [
            Self::set_blend,
            Self::set_offset,
            Self::set_cull_face,
            Self::set_depth_test,
            Self::set_front_face,
        ]
    }

    /// The switch bits currently applied.
    pub fn data(&self) -> u8 {
        self.data
    }

    /// The blend mode currently applied, `None` after a reset.
    pub fn blend_mode(&self) -> Option<BlendMode> {
        self.blend_mode
    }

    /// Apply `state`, issuing calls only for the switches that differ from
    /// the active ones, then run the checks of the switches that are on.
    pub fn set_state<D: Device>(&mut self, gl: &D, state: &State) {
        let mut target = state.data();
        if state.blend_mode() == BlendMode::None {
            target &= !BLEND;
        }

        let handlers = Self::handlers::<D>();
        let mut diff = self.data ^ target;
        let mut bit = 0;
        while diff != 0 {
            if diff & 1 != 0 {
                handlers[bit](self, gl, target & (1 << bit) != 0);
            }
            diff >>= 1;
            bit += 1;
        }
        self.data = target;

        for index in 0..self.checks.len() {
            self.run_check(gl, self.checks[index], state);
        }
    }

    /// Re-issue every switch of `state` regardless of the cached values.
    pub fn force_state<D: Device>(&mut self, gl: &D, state: &State) {
        let handlers = Self::handlers::<D>();
        let data = state.data();
        for (bit, handler) in handlers.iter().enumerate() {
            handler(self, gl, data & (1 << bit) != 0);
        }
        for index in 0..self.checks.len() {
            self.run_check(gl, self.checks[index], state);
        }
        self.data = data;
    }

    /// Forget everything and put the device into the default state.
    pub fn reset<D: Device>(&mut self, gl: &D) {
        self.polygon_offset = None;
        let default_state = self.default_state;
        self.force_state(gl, &default_state);
        self.blend_equation = true;
        self.blend_mode = None;
        self.set_blend_mode(gl, BlendMode::Normal);
    }

    /// Apply a blend mode if it is not the active one.
    pub fn set_blend_mode<D: Device>(&mut self, gl: &D, mode: BlendMode) {
        if self.blend_mode == Some(mode) {
            return;
        }
        self.blend_mode = Some(mode);
        let [src_rgb, dst_rgb, src_alpha, dst_alpha] = mode.factors();
        gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        if let Some((rgb, alpha)) = mode.equation() {
            self.blend_equation = true;
            gl.blend_equation_separate(rgb, alpha);
        } else if self.blend_equation {
            self.blend_equation = false;
            gl.blend_equation_separate(glow::FUNC_ADD, glow::FUNC_ADD);
        }
    }

    /// Apply a polygon offset if it is not the active one.
    pub fn set_polygon_offset<D: Device>(&mut self, gl: &D, value: f32) {
        if self.polygon_offset == Some(value) {
            return;
        }
        self.polygon_offset = Some(value);
        gl.polygon_offset(1.0, value);
    }

    fn run_check<D: Device>(&mut self, gl: &D, check: Check, state: &State) {
        match check {
            Check::BlendMode => self.set_blend_mode(gl, state.blend_mode()),
            Check::PolygonOffset => self.set_polygon_offset(gl, state.polygon_offset()),
        }
    }

    fn update_check(&mut self, check: Check, on: bool) {
        let index = self.checks.iter().position(|c| *c == check);
        match (on, index) {
            (true, None) => self.checks.push(check),
            (false, Some(index)) => {
                self.checks.remove(index);
            }
            _ => {}
        }
    }

    fn toggle<D: Device>(gl: &D, capability: u32, on: bool) {
        if on {
            gl.enable(capability);
        } else {
            gl.disable(capability);
        }
    }

    fn set_blend<D: Device>(&mut self, gl: &D, on: bool) {
        self.update_check(Check::BlendMode, on);
        Self::toggle(gl, glow::BLEND, on);
    }

    fn set_offset<D: Device>(&mut self, gl: &D, on: bool) {
        self.update_check(Check::PolygonOffset, on);
        Self::toggle(gl, glow::POLYGON_OFFSET_FILL, on);
    }

    fn set_cull_face<D: Device>(&mut self, gl: &D, on: bool) {
        Self::toggle(gl, glow::CULL_FACE, on);
    }

    fn set_depth_test<D: Device>(&mut self, gl: &D, on: bool) {
        Self::toggle(gl, glow::DEPTH_TEST, on);
    }

    fn set_front_face<D: Device>(&mut self, gl: &D, clockwise: bool) {
        gl.front_face(if clockwise { glow::CW } else { glow::CCW });
    }
}

impl<D: Device> System<D> for StateSystem {
    fn context_change(&mut self, gl: &D, _context: &ContextInfo) {
        self.checks.clear();
        self.reset(gl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};
    use crate::resources::state::{CULLING, DEPTH_TEST, OFFSET, WINDING};

    fn switch_calls(gl: &RecordingDevice) -> usize {
        gl.count(|c| matches!(c, Call::Enable(_) | Call::Disable(_) | Call::FrontFace(_)))
    }

    fn fresh() -> (RecordingDevice, StateSystem) {
        let gl = RecordingDevice::new();
        let mut system = StateSystem::new();
        system.reset(&gl);
        gl.clear();
        (gl, system)
    }

    #[test]
    fn transitions_issue_one_call_per_changed_bit() {
        for from in 0..32u8 {
            for to in 0..32u8 {
                let (gl, mut system) = fresh();
                system.set_state(&gl, &State::from_bits(from));
                gl.clear();
                system.set_state(&gl, &State::from_bits(to));
                assert_eq!(
                    switch_calls(&gl),
                    (from ^ to).count_ones() as usize,
                    "{from:05b} -> {to:05b}"
                );

                gl.clear();
                system.set_state(&gl, &State::from_bits(to));
                assert!(gl.is_empty(), "repeat of {to:05b} issued {:?}", gl.calls());
            }
        }
    }

    #[test]
    fn blend_mode_only_synced_while_blending() {
        let (gl, mut system) = fresh();
        let mut state = State::for_2d();
        state.set_blend_mode(BlendMode::Add);
        system.set_state(&gl, &state);
        assert_eq!(gl.take_calls(), vec![Call::BlendFunc(BlendMode::Add.factors())]);

        let mut off = State::default();
        off.set_blend_mode(BlendMode::Multiply);
        off.set_blend(false);
        system.set_state(&gl, &off);
        assert_eq!(gl.take_calls(), vec![Call::Disable(glow::BLEND)]);
        assert_eq!(system.blend_mode(), Some(BlendMode::Add));
    }

    #[test]
    fn none_blend_mode_forces_blending_off() {
        let (gl, mut system) = fresh();
        let mut state = State::for_2d();
        state.set_blend_mode(BlendMode::Normal);
        state.set_blend(true);
        let mut none = state;
        none.set_blend_mode(BlendMode::None);
        none.set_blend(true);
        system.set_state(&gl, &none);
        assert_eq!(gl.take_calls(), vec![Call::Disable(glow::BLEND)]);
        assert_eq!(system.data() & BLEND, 0);
    }

    #[test]
    fn subtract_sets_and_restores_equation() {
        let (gl, mut system) = fresh();
        system.set_blend_mode(&gl, BlendMode::Subtract);
        system.set_blend_mode(&gl, BlendMode::Normal);
        system.set_blend_mode(&gl, BlendMode::Add);
        assert_eq!(
            gl.count(|c| matches!(c, Call::BlendEquation(..))),
            2,
            "{:?}",
            gl.calls()
        );
    }

    #[test]
    fn polygon_offset_value_is_cached() {
        let (gl, mut system) = fresh();
        let mut state = State::for_2d();
        state.set_polygon_offset(2.0);
        system.set_state(&gl, &state);
        system.set_state(&gl, &state);
        assert_eq!(
            gl.take_calls(),
            vec![Call::Enable(glow::POLYGON_OFFSET_FILL), Call::PolygonOffset(1.0, 2.0)]
        );
    }

    #[test]
    fn reset_forces_every_switch() {
        let gl = RecordingDevice::new();
        let mut system = StateSystem::new();
        system.set_state(&gl, &State::from_bits(OFFSET | CULLING | DEPTH_TEST | WINDING));
        gl.clear();
        system.reset(&gl);
        assert_eq!(switch_calls(&gl), STATE_BITS);
        assert_eq!(system.data(), State::for_2d().data());
        assert_eq!(system.blend_mode(), Some(BlendMode::Normal));
        assert!(gl.calls().contains(&Call::BlendEquation(glow::FUNC_ADD, glow::FUNC_ADD)));
    }
}
