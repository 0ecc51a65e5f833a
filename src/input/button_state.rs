//! Button state machine
//!
//! Idle → Down → Idle, with Press/Down firing on the down-edge, Hold after
//! the hold threshold, and Tap/Release on the up-edge. The bindings in force
//! at the down-edge are frozen for the whole press, so a layer change while
//! the button is held cannot change which Hold/Tap/Release fires.

use super::command::{Command, KeyCode, LayerId};
use super::profile::ActionSlot;
use super::resolver::ResolvedBindings;

/// A command produced by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub slot: ActionSlot,
    pub command: Command,
    pub origin: LayerId,
}

impl Fired {
    fn from(bindings: &ResolvedBindings, slot: ActionSlot) -> Option<Self> {
        let command = bindings.get(slot);
        command.is_bound().then_some(Fired {
            slot,
            command,
            origin: bindings.origin(slot),
        })
    }
}

/// What the up-edge released besides the fired commands
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReleaseEdge {
    pub fired: Vec<Fired>,
    pub held_keys: Vec<KeyCode>,
    pub held_layer: Option<LayerId>,
}

#[derive(Debug, Clone, Default)]
pub struct ButtonState {
    /// Bindings from the current layer order
    pub live: ResolvedBindings,
    /// Snapshot of `live` taken at the down-edge
    commands_when_pressed: ResolvedBindings,
    held_ms: u32,
    /// Layer this button keeps active while down
    pub held_layer: Option<LayerId>,
    /// Keys dispatched as press-and-hold during this press
    pub held_keys: Vec<KeyCode>,
    down: bool,
    hold_fired: bool,
    combo_consumed: bool,
}

impl ButtonState {
    pub fn new(live: ResolvedBindings) -> Self {
        Self {
            live,
            ..Default::default()
        }
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    pub fn held_ms(&self) -> u32 {
        self.held_ms
    }

    pub fn frozen(&self) -> &ResolvedBindings {
        &self.commands_when_pressed
    }

    pub fn hold_fired(&self) -> bool {
        self.hold_fired
    }

    pub fn is_combo_consumed(&self) -> bool {
        self.combo_consumed
    }

    /// Silence this press's remaining Hold/Tap/Release
    pub fn mark_combo_consumed(&mut self) {
        self.combo_consumed = true;
    }

    /// Down-edge: Press from the live set, then Down from the fresh snapshot.
    /// Continuous Down commands are left to the analog blender.
    pub fn press(&mut self) -> Vec<Fired> {
        let mut fired = Vec::with_capacity(2);
        fired.extend(Fired::from(&self.live, ActionSlot::Press));

        self.commands_when_pressed = self.live;
        self.down = true;
        self.held_ms = 0;
        self.hold_fired = false;
        self.combo_consumed = false;

        if let Some(down) = Fired::from(&self.commands_when_pressed, ActionSlot::Down) {
            if !down.command.is_continuous() {
                fired.push(down);
            }
        }
        fired
    }

    /// Held frame: Hold fires once the frozen threshold is reached
    pub fn check_hold(&mut self, default_hold_ms: u32) -> Option<Fired> {
        if !self.down || self.hold_fired {
            return None;
        }
        let frozen = &self.commands_when_pressed;
        if !frozen.get(ActionSlot::Hold).is_bound() {
            return None;
        }
        let threshold = frozen.hold_time_ms().unwrap_or(default_hold_ms);
        if self.held_ms < threshold {
            return None;
        }
        self.hold_fired = true;
        if self.combo_consumed {
            return None;
        }
        Fired::from(frozen, ActionSlot::Hold)
    }

    pub fn advance(&mut self, elapsed_ms: u32) {
        if self.down {
            self.held_ms = self.held_ms.saturating_add(elapsed_ms);
        }
    }

    /// Up-edge: Tap unless Hold fired, then Release
    pub fn release(&mut self) -> ReleaseEdge {
        let mut edge = ReleaseEdge {
            fired: Vec::new(),
            held_keys: std::mem::take(&mut self.held_keys),
            held_layer: self.held_layer.take(),
        };
        if !self.down {
            return edge;
        }
        self.down = false;
        if self.combo_consumed {
            return edge;
        }

        let frozen = &self.commands_when_pressed;
        if !self.hold_fired {
            edge.fired.extend(Fired::from(frozen, ActionSlot::Tap));
        }
        let release = Fired::from(frozen, ActionSlot::Release).or_else(|| {
            if self.live.get(ActionSlot::Press).is_bound() {
                None
            } else {
                Fired::from(&self.live, ActionSlot::Release)
            }
        });
        edge.fired.extend(release);
        edge
    }

    /// Back to idle without firing anything
    pub fn reset(&mut self) {
        let live = self.live;
        *self = Self::new(live);
    }
}
