//! Translation engine
//!
//! One owned value holding every piece of runtime state. Each call to
//! [`Engine::update`] runs one frame:
//!
//! 1. Advance timers; fire due auto-repeats for buttons still held
//! 2. Button transitions (press, hold, tap, release), in button order
//! 3. Analog blending of continuous Down commands
//! 4. Layer auto buttons for every activation change, until none remain
//! 5. Signal scan of this frame's snapshot
//! 6. Re-sort and re-resolve if the active set changed
//!
//! A fatal layer error stops layer processing for the session; output keeps
//! flowing from the last good resolution.

use thiserror::Error;

use super::analog::choose_down_command;
use super::buttons::Button;
use super::button_state::{ButtonState, Fired};
use super::command::{Command, LayerId};
use super::layers::LayerStack;
use super::output::{ButtonSource, FrameBuilder, FrameOutput, Host};
use super::processor::{Processor, Source};
use super::profile::{ActionSlot, Profile, ProfileError};
use super::repeat::{ExclusiveRepeat, Repeat, SyncRepeat};
use super::resolver::{resolve, ResolvedBindings, ResolvedTable};
use super::signals::{triggered_commands, Signal, SignalBus, SignalSet, SpecialSignal};
use super::sorter::sort_layers;
use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    #[error("layer cascade exceeded {limit} mutations in one frame")]
    LayerCascadeOverflow { limit: u32 },

    #[error("layer sort did not converge after {passes} passes")]
    SortDidNotConverge { passes: u32 },
}

#[derive(Debug)]
pub struct Engine {
    profile: Profile,
    config: EngineConfig,
    stack: LayerStack,
    resolved: ResolvedTable,
    buttons: Vec<ButtonState>,
    /// One auto button per layer, down while the layer is active
    auto_buttons: Vec<ButtonState>,
    /// Current position in each keybind cycle
    cycles: Vec<Option<usize>>,
    signals: SignalBus,
    exclusive: ExclusiveRepeat,
    synced: SyncRepeat,
    /// Entries of the stack's change list already handed to auto buttons
    changes_seen: usize,
    started: bool,
}

impl Engine {
    /// Validate `profile` and build an engine with only the root layer active
    pub fn new(profile: Profile, config: EngineConfig) -> Result<Self, EngineError> {
        profile.validate()?;
        let layer_count = profile.layer_count();
        let auto_buttons = (0..layer_count)
            .map(|i| ButtonState::new(auto_bindings(&profile, LayerId(i as u16))))
            .collect();

        let mut engine = Self {
            stack: LayerStack::new(layer_count, config.max_layer_ops),
            resolved: ResolvedTable::default(),
            buttons: vec![ButtonState::default(); Button::COUNT],
            auto_buttons,
            cycles: vec![None; profile.keybind_cycles.len()],
            signals: SignalBus::new(),
            exclusive: ExclusiveRepeat::default(),
            synced: SyncRepeat::default(),
            changes_seen: 0,
            started: false,
            profile,
            config,
        };
        engine.refresh_bindings()?;
        log::debug!(
            "Engine ready: {} layers, {} keybind cycles",
            layer_count,
            engine.cycles.len()
        );
        Ok(engine)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active layers, bottom to top
    pub fn layer_order(&self) -> &[LayerId] {
        self.stack.order()
    }

    pub fn is_layer_active(&self, layer: LayerId) -> bool {
        self.stack.is_active(layer)
    }

    pub fn layer_ref_count(&self, layer: LayerId) -> u32 {
        self.stack.ref_count(layer)
    }

    /// Bindings the current layer order gives `button`
    pub fn resolved(&self, button: Button) -> &ResolvedBindings {
        self.resolved.get(button)
    }

    pub fn button_state(&self, button: Button) -> &ButtonState {
        &self.buttons[button.index()]
    }

    /// Signals raised since the last scan
    pub fn pending_signals(&self) -> SignalSet {
        self.signals.pending()
    }

    /// Has a fatal layer error stopped layer processing?
    pub fn is_halted(&self) -> bool {
        self.stack.is_halted()
    }

    /// Run one frame
    pub fn update<S, H>(&mut self, source: &S, host: &mut H, elapsed_ms: u32) -> FrameOutput
    where
        S: ButtonSource + ?Sized,
        H: Host + ?Sized,
    {
        let mut frame = FrameBuilder::default();
        self.stack.begin_frame();
        self.changes_seen = 0;

        if !self.started {
            self.started = true;
            self.press_auto(LayerId::ROOT, host, &mut frame);
        }

        self.advance_timers(source, host, &mut frame, elapsed_ms);

        for button in Button::ALL {
            let held = source.is_held(button);
            let hit = source.was_hit(button);
            if hit {
                self.signals.raise(Signal::Button(button));
            }

            let down = self.buttons[button.index()].is_down();
            if down && (hit || !held) {
                // Up-edge, or released and pressed again between frames
                self.release_button(button, host, &mut frame);
            }
            if hit || (held && !down) {
                self.press_button(button, host, &mut frame);
                if !held {
                    self.release_button(button, host, &mut frame);
                }
            }
            if held {
                self.check_hold(button, host, &mut frame);
            }
        }

        self.blend_axes(source, &mut frame);
        self.apply_layer_changes(host, &mut frame);

        let snapshot = self.signals.swap();
        for (layer, command) in triggered_commands(&snapshot, &self.profile, self.stack.order()) {
            self.execute(command, Source::Signal, layer, host, &mut frame);
        }
        self.apply_layer_changes(host, &mut frame);

        if let Err(err) = self.refresh_bindings() {
            frame.record_fault(err);
        }

        let mut changed_layers = Vec::new();
        for &(layer, _) in self.stack.changed() {
            if !changed_layers.contains(&layer) {
                changed_layers.push(layer);
            }
        }
        frame.finish(changed_layers)
    }

    /// Release every held key and return to the root layer alone
    pub fn cleanup<H: Host + ?Sized>(&mut self, host: &mut H) {
        for state in self.buttons.iter_mut().chain(self.auto_buttons.iter_mut()) {
            for key in state.held_keys.drain(..) {
                host.hold_key(key, false);
            }
            state.reset();
        }
        self.stack.reset();
        self.signals.reset();
        self.exclusive.reset();
        self.synced.reset();
        self.cycles.iter_mut().for_each(|c| *c = None);
        self.changes_seen = 0;
        self.started = false;
        if let Err(err) = self.refresh_bindings() {
            log::warn!("Failed to re-resolve bindings after cleanup: {}", err);
        }
    }

    fn advance_timers<S, H>(&mut self, source: &S, host: &mut H, frame: &mut FrameBuilder, elapsed_ms: u32)
    where
        S: ButtonSource + ?Sized,
        H: Host + ?Sized,
    {
        for state in self.buttons.iter_mut().chain(self.auto_buttons.iter_mut()) {
            state.advance(elapsed_ms);
        }

        let mut repeats: Vec<Repeat> = Vec::new();
        repeats.extend(self.exclusive.tick(elapsed_ms, self.config.repeat_rate_ms));
        repeats.extend(self.synced.tick(
            elapsed_ms,
            self.config.hotspot_repeat_delay_ms,
            self.config.hotspot_repeat_rate_ms,
        ));
        for repeat in repeats {
            if source.is_held(repeat.button) {
                self.execute(repeat.command, Source::Button(repeat.button), repeat.origin, host, frame);
            }
        }

        let default_hold_ms = self.config.default_hold_ms;
        for layer in self.stack.order().to_vec() {
            let fired = self
                .auto_buttons
                .get_mut(layer.index())
                .and_then(|state| state.check_hold(default_hold_ms));
            if let Some(fired) = fired {
                self.execute(fired.command, Source::Layer(layer), fired.origin, host, frame);
            }
        }
    }

    fn press_button<H: Host + ?Sized>(&mut self, button: Button, host: &mut H, frame: &mut FrameBuilder) {
        let fired = self.buttons[button.index()].press();
        for Fired { command, origin, .. } in fired {
            self.execute(command, Source::Button(button), origin, host, frame);
            if command.repeats_exclusively() {
                self.exclusive
                    .trigger(button, command, origin, self.config.repeat_delay_ms);
            }
            if command.repeats_synchronized() {
                self.synced.track(button, command, origin);
            }
        }
    }

    fn check_hold<H: Host + ?Sized>(&mut self, button: Button, host: &mut H, frame: &mut FrameBuilder) {
        let default_hold_ms = self.config.default_hold_ms;
        if let Some(fired) = self.buttons[button.index()].check_hold(default_hold_ms) {
            self.execute(fired.command, Source::Button(button), fired.origin, host, frame);
        }
    }

    fn release_button<H: Host + ?Sized>(&mut self, button: Button, host: &mut H, frame: &mut FrameBuilder) {
        let edge = self.buttons[button.index()].release();
        for key in edge.held_keys {
            host.hold_key(key, false);
        }
        self.exclusive.release(button);
        self.synced.release(button);
        for Fired { command, origin, .. } in edge.fired {
            self.execute(command, Source::Button(button), origin, host, frame);
        }
        if let Some(layer) = edge.held_layer {
            self.processor(host, frame).release_hold(layer, button);
        }
    }

    fn blend_axes<S: ButtonSource + ?Sized>(&self, source: &S, frame: &mut FrameBuilder) {
        for button in Button::ALL {
            let state = &self.buttons[button.index()];
            let raw = source.analog_value(button);
            let (magnitude, digital) = if raw > 0 {
                (self.config.analog_scale(raw), false)
            } else if state.is_down() {
                (1.0, true)
            } else {
                continue;
            };
            if magnitude == 0.0 {
                continue;
            }
            let command = if state.is_down() {
                choose_down_command(state.frozen(), &state.live)
            } else {
                state.live.get(ActionSlot::Down)
            };
            frame.axes.add(command, magnitude, digital);
        }
    }

    /// Run auto buttons for activation changes, including those their own
    /// commands cause; the stack's mutation budget bounds the loop
    fn apply_layer_changes<H: Host + ?Sized>(&mut self, host: &mut H, frame: &mut FrameBuilder) {
        loop {
            let pending = self.stack.changed()[self.changes_seen..].to_vec();
            if pending.is_empty() {
                break;
            }
            self.changes_seen += pending.len();
            self.signals
                .raise(Signal::Special(SpecialSignal::LayersChanged));
            for (layer, active) in pending {
                if active {
                    self.press_auto(layer, host, frame);
                } else {
                    self.release_auto(layer, host, frame);
                }
            }
        }
    }

    fn press_auto<H: Host + ?Sized>(&mut self, layer: LayerId, host: &mut H, frame: &mut FrameBuilder) {
        let Some(state) = self.auto_buttons.get_mut(layer.index()) else {
            return;
        };
        for Fired { command, origin, .. } in state.press() {
            self.execute(command, Source::Layer(layer), origin, host, frame);
        }
    }

    fn release_auto<H: Host + ?Sized>(&mut self, layer: LayerId, host: &mut H, frame: &mut FrameBuilder) {
        let Some(state) = self.auto_buttons.get_mut(layer.index()) else {
            return;
        };
        let edge = state.release();
        for key in edge.held_keys {
            host.hold_key(key, false);
        }
        for Fired { command, origin, .. } in edge.fired {
            self.execute(command, Source::Layer(layer), origin, host, frame);
        }
    }

    fn execute<H: Host + ?Sized>(
        &mut self,
        command: Command,
        source: Source,
        origin: LayerId,
        host: &mut H,
        frame: &mut FrameBuilder,
    ) {
        self.processor(host, frame).execute(command, source, origin);
    }

    fn processor<'a, H: Host + ?Sized>(
        &'a mut self,
        host: &'a mut H,
        frame: &'a mut FrameBuilder,
    ) -> Processor<'a, H> {
        Processor {
            profile: &self.profile,
            stack: &mut self.stack,
            buttons: &mut self.buttons,
            auto_buttons: &mut self.auto_buttons,
            cycles: &mut self.cycles,
            signals: &mut self.signals,
            frame,
            host,
        }
    }

    /// Re-sort and re-resolve after membership changes
    fn refresh_bindings(&mut self) -> Result<(), EngineError> {
        if self.stack.is_halted() || !self.stack.is_dirty() {
            return Ok(());
        }
        let order = match sort_layers(&self.profile, &self.stack, self.config.max_sort_passes) {
            Ok(order) => order,
            Err(err) => {
                self.stack.halt();
                return Err(err);
            }
        };
        self.stack.set_order(order);
        self.resolved = resolve(&self.profile, self.stack.order());
        for button in Button::ALL {
            self.buttons[button.index()].live = *self.resolved.get(button);
        }
        Ok(())
    }
}

/// Fixed bindings of a layer's auto button
fn auto_bindings(profile: &Profile, layer: LayerId) -> ResolvedBindings {
    let Some(def) = profile.layer(layer) else {
        return ResolvedBindings::default();
    };
    let mut set = def.auto_bindings;
    if set.binds_hold_or_tap() {
        set.hold_time_ms = set.hold_time_ms.or(def.hold_time_ms);
    }
    ResolvedBindings::from_layer(layer, set)
}
