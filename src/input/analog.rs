//! Analog axis blending
//!
//! Each frame every button with an analog reading (or a held digital button
//! standing in at full scale) contributes its Down command to one output
//! channel. A held button keeps the command frozen at its down-edge unless
//! the live binding can take over without jumping to another channel.

use super::command::{Channel, Command};
use super::profile::ActionSlot;
use super::resolver::ResolvedBindings;

/// Continuous values for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Axes {
    /// Forward is positive
    pub movement: f32,
    pub turn: f32,
    pub strafe: f32,
    pub look_x: f32,
    pub mouse_x: f32,
    /// Down is positive
    pub mouse_y: f32,
    /// At least one mouse contribution came from a digital button
    pub mouse_digital: bool,
    /// Up is positive
    pub wheel_y: f32,
    pub wheel_digital: bool,
    /// A stepped scroll contributed; the consumer emits notches, not deltas
    pub wheel_stepped: bool,
}

impl Axes {
    pub fn is_idle(&self) -> bool {
        *self == Axes::default()
    }
}

/// Pick the Down command driving a held button's axis this frame
pub fn choose_down_command(frozen: &ResolvedBindings, live: &ResolvedBindings) -> Command {
    let frozen_cmd = frozen.get(ActionSlot::Down);
    let live_cmd = live.get(ActionSlot::Down);

    if !live_cmd.is_continuous() || live.get(ActionSlot::Press).is_bound() {
        return frozen_cmd;
    }
    if frozen_cmd.is_no_op() {
        return live_cmd;
    }
    match (frozen_cmd.channel(), live_cmd.channel()) {
        (Some(a), Some(b)) if a.hot_swappable(b) => live_cmd,
        _ => frozen_cmd,
    }
}

/// Per-frame accumulator
#[derive(Debug, Default)]
pub struct AxisAccumulator {
    axes: Axes,
}

impl AxisAccumulator {
    /// Add `command` scaled by `magnitude` (0.0-1.0); non-continuous
    /// commands are ignored
    pub fn add(&mut self, command: Command, magnitude: f32, digital: bool) {
        let Some((channel, sign)) = command.axis() else {
            return;
        };
        let value = sign * magnitude;
        let axes = &mut self.axes;
        match channel {
            Channel::Move => axes.movement += value,
            Channel::Turn => axes.turn += value,
            Channel::Strafe => axes.strafe += value,
            Channel::LookX => axes.look_x += value,
            Channel::MouseX | Channel::MouseY => {
                if channel == Channel::MouseX {
                    axes.mouse_x += value;
                } else {
                    axes.mouse_y += value;
                }
                axes.mouse_digital |= digital;
            }
            Channel::Wheel => {
                axes.wheel_y += value;
                axes.wheel_digital |= digital;
                if let Command::Scroll { stepped: true, .. } = command {
                    axes.wheel_stepped = true;
                }
            }
        }
    }

    /// Movement channels are clamped; mouse and wheel are left as summed
    pub fn finish(self) -> Axes {
        let mut axes = self.axes;
        axes.movement = axes.movement.clamp(-1.0, 1.0);
        axes.turn = axes.turn.clamp(-1.0, 1.0);
        axes.strafe = axes.strafe.clamp(-1.0, 1.0);
        axes.look_x = axes.look_x.clamp(-1.0, 1.0);
        axes
    }
}
