//! Command processor
//!
//! Dispatches one fired command. Structural commands act on the layer stack
//! or forward a single derived command; output commands append to the frame.

use super::buttons::Button;
use super::button_state::ButtonState;
use super::command::{Command, CycleId, KeyCode, KeybindId, LayerId};
use super::engine::EngineError;
use super::layers::LayerStack;
use super::output::{FrameBuilder, Host, MenuRequest, Output, SideEffect};
use super::profile::Profile;
use super::signals::{Signal, SignalBus, SpecialSignal};
use crate::log_error;

/// Deepest chain of forwarded commands (replace, cycle, menu confirm)
pub const MAX_FORWARD_DEPTH: u8 = 4;

/// What fired a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Button(Button),
    /// A layer's auto button
    Layer(LayerId),
    Signal,
}

/// Borrowed engine state for the duration of one dispatch batch
pub(crate) struct Processor<'a, H: Host + ?Sized> {
    pub profile: &'a Profile,
    pub stack: &'a mut LayerStack,
    pub buttons: &'a mut [ButtonState],
    pub auto_buttons: &'a mut [ButtonState],
    pub cycles: &'a mut [Option<usize>],
    pub signals: &'a mut SignalBus,
    pub frame: &'a mut FrameBuilder,
    pub host: &'a mut H,
}

impl<H: Host + ?Sized> Processor<'_, H> {
    /// Run `command`, fired from `source` and bound in layer `origin`
    pub fn execute(&mut self, command: Command, source: Source, origin: LayerId) {
        if command.is_no_op() {
            return;
        }
        if let Source::Button(_) = source {
            self.stack.mark_used(origin);
        }
        self.dispatch(command, source, 0);
    }

    /// Drop the reference a released button held on `layer`
    pub fn release_hold(&mut self, layer: LayerId, button: Button) {
        let result = self.stack.release_hold(self.profile, layer, button);
        self.after_layer_op(result);
    }

    fn dispatch(&mut self, command: Command, source: Source, depth: u8) {
        if depth > MAX_FORWARD_DEPTH {
            debug_assert!(false, "command forwarded more than {} times", MAX_FORWARD_DEPTH);
            log_error!(
                "Dropping {:?}: forwarded more than {} times",
                command,
                MAX_FORWARD_DEPTH
            );
            return;
        }

        match command {
            Command::Unassigned | Command::Defer | Command::DoNothing => {}

            Command::TapKey(key) => self.frame.actions.push(Output::KeyTap(key)),
            Command::HoldKey(key) => self.hold_key(key, source),
            Command::ReleaseKey(key) => self.frame.actions.push(Output::KeyRelease(key)),
            Command::ChatText(text) => self.frame.actions.push(Output::Text(text)),
            Command::Keybind(id) => self.frame.actions.push(Output::Keybind(id)),
            Command::KeybindCycle { cycle, step, wrap } => {
                if let Some(id) = self.step_cycle(cycle, step, wrap) {
                    self.dispatch(Command::Keybind(id), source, depth + 1);
                }
            }

            Command::AddLayer(layer) => {
                let result = self.stack.add(self.profile, layer, None);
                self.after_layer_op(result);
            }
            Command::RemoveLayer { layer, forced } => {
                let result = self.stack.remove(self.profile, layer, forced);
                self.after_layer_op(result);
            }
            Command::HoldLayer(layer) => self.hold_layer(layer, source),
            Command::ToggleLayer(layer) => {
                let result = if self.stack.is_active(layer) {
                    self.stack.remove(self.profile, layer, false)
                } else {
                    self.stack.add(self.profile, layer, None)
                };
                self.after_layer_op(result);
            }
            Command::ReplaceLayer { remove, add } => {
                self.dispatch(
                    Command::RemoveLayer {
                        layer: remove,
                        forced: false,
                    },
                    source,
                    depth + 1,
                );
                self.dispatch(Command::AddLayer(add), source, depth + 1);
            }

            Command::MenuOpen(menu) => {
                self.signals.raise(Signal::Special(SpecialSignal::MenuOpened));
                self.menu(MenuRequest::Open(menu), source, depth);
            }
            Command::MenuNavigate { dir, count, wrap } => {
                self.menu(MenuRequest::Navigate { dir, count, wrap }, source, depth);
            }
            Command::MenuConfirm => self.menu(MenuRequest::Confirm, source, depth),
            Command::MenuBack => self.menu(MenuRequest::Back, source, depth),
            Command::MenuClose => {
                self.signals.raise(Signal::Special(SpecialSignal::MenuClosed));
                self.menu(MenuRequest::Close, source, depth);
            }

            Command::SelectHotspot(dir) => self.frame.select_hotspot(dir),

            // Bound outside a Down slot: one frame at full scale
            Command::MoveTurn(_)
            | Command::MoveStrafe(_)
            | Command::MoveLook(_)
            | Command::MouseMove(_)
            | Command::Scroll { .. } => self.frame.axes.add(command, 1.0, true),

            Command::SetVariable { var, value } => {
                self.frame.effects.push(SideEffect::SetVariable { var, value });
            }
            Command::ReloadProfile => self.frame.effects.push(SideEffect::ReloadProfile),
            Command::LaunchLayoutEditor => self.frame.effects.push(SideEffect::LaunchLayoutEditor),
            Command::ReselectSyncFile => self.frame.effects.push(SideEffect::ReselectSyncFile),
            Command::Quit => self.frame.effects.push(SideEffect::Quit),
        }
    }

    fn menu(&mut self, request: MenuRequest, source: Source, depth: u8) {
        self.frame.actions.push(Output::Menu(request));
        if let Some(next) = self.host.menu(request) {
            self.dispatch(next, source, depth + 1);
        }
    }

    /// Press `key` downstream until the firing button or layer lets go;
    /// without a holder the key is tapped
    fn hold_key(&mut self, key: KeyCode, source: Source) {
        let holder = match source {
            Source::Button(button) => self.buttons.get_mut(button.index()),
            Source::Layer(layer) => self.auto_buttons.get_mut(layer.index()),
            Source::Signal => None,
        };
        match holder {
            Some(state) if state.is_down() => {
                self.host.hold_key(key, true);
                state.held_keys.push(key);
            }
            _ => self.frame.actions.push(Output::KeyTap(key)),
        }
    }

    fn hold_layer(&mut self, layer: LayerId, source: Source) {
        let Source::Button(button) = source else {
            let result = self.stack.add(self.profile, layer, None);
            self.after_layer_op(result);
            return;
        };
        let Some(state) = self.buttons.get(button.index()) else {
            return;
        };
        if !state.is_down() {
            log::debug!("Ignoring layer hold from released button {:?}", button);
            return;
        }
        let previous = state.held_layer;
        match previous {
            Some(current) if current == layer => return,
            Some(current) => {
                let result = self.stack.release_hold(self.profile, current, button);
                self.buttons[button.index()].held_layer = None;
                self.after_layer_op(result);
            }
            None => {}
        }

        let result = self.stack.add(self.profile, layer, Some(button));
        let holding = self
            .stack
            .state(layer)
            .is_some_and(|s| s.held_by().contains(button));
        if holding {
            self.buttons[button.index()].held_layer = Some(layer);
        }
        self.after_layer_op(result);
    }

    fn step_cycle(&mut self, cycle: CycleId, step: i8, wrap: bool) -> Option<KeybindId> {
        let Some(entries) = self.profile.keybind_cycles.get(cycle.index()) else {
            debug_assert!(false, "undefined keybind cycle {}", cycle.0);
            return None;
        };
        let slot = self.cycles.get_mut(cycle.index())?;
        let len = entries.len() as i64;
        if len == 0 {
            return None;
        }
        let step = i64::from(step);
        let next = match *slot {
            // First step lands on the first (or last) entry
            None if step >= 0 => (step - 1).max(0),
            None => len + step,
            Some(current) => current as i64 + step,
        };
        let next = if wrap {
            next.rem_euclid(len)
        } else {
            next.clamp(0, len - 1)
        };
        *slot = Some(next as usize);
        entries.get(next as usize).copied()
    }

    fn after_layer_op(&mut self, result: Result<(), EngineError>) {
        if let Err(err) = result {
            self.frame.record_fault(err);
        }
        for holder in self.stack.take_released_holders() {
            let Some(state) = self.buttons.get_mut(holder.button.index()) else {
                continue;
            };
            if state.held_layer == Some(holder.layer) {
                state.held_layer = None;
                if holder.consumed && state.is_down() {
                    state.mark_combo_consumed();
                }
            }
        }
    }
}
