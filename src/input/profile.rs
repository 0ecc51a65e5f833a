//! Static binding table
//!
//! A `Profile` is the fully parsed, read-only configuration the engine runs
//! against: one `LayerDef` per layer (indexed by `LayerId`) plus the keybind
//! cycles referenced by `Command::KeybindCycle`.

use std::collections::BTreeMap;

use thiserror::Error;

use super::buttons::Button;
use super::command::{Command, CycleId, KeybindId, LayerId};
use super::signals::Signal;

/// Position in a button's press/release lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionSlot {
    Down,
    Press,
    Hold,
    Tap,
    Release,
}

impl ActionSlot {
    pub const COUNT: usize = 5;
    pub const ALL: [ActionSlot; ActionSlot::COUNT] = [
        ActionSlot::Down,
        ActionSlot::Press,
        ActionSlot::Hold,
        ActionSlot::Tap,
        ActionSlot::Release,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Commands for one button in one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingSet {
    pub slots: [Command; ActionSlot::COUNT],
    /// Hold threshold override in milliseconds
    pub hold_time_ms: Option<u32>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with every slot deferring to lower layers
    pub fn deferring() -> Self {
        Self {
            slots: [Command::Defer; ActionSlot::COUNT],
            hold_time_ms: None,
        }
    }

    pub fn get(&self, slot: ActionSlot) -> Command {
        self.slots[slot.index()]
    }

    pub fn set(&mut self, slot: ActionSlot, command: Command) {
        self.slots[slot.index()] = command;
    }

    pub fn with(mut self, slot: ActionSlot, command: Command) -> Self {
        self.set(slot, command);
        self
    }

    pub fn with_hold_time(mut self, ms: u32) -> Self {
        self.hold_time_ms = Some(ms);
        self
    }

    /// Does the set carry a non-deferring Hold or Tap?
    pub fn binds_hold_or_tap(&self) -> bool {
        self.get(ActionSlot::Hold).is_bound() || self.get(ActionSlot::Tap).is_bound()
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.slots.iter()
    }
}

/// Static definition of one layer
#[derive(Debug, Clone, Default)]
pub struct LayerDef {
    pub name: String,
    pub parent: Option<LayerId>,
    /// Second base layer of a combo layer
    pub combo_parent: Option<LayerId>,
    pub priority: u8,
    /// Hold threshold for this layer's bindings that give none
    pub hold_time_ms: Option<u32>,
    pub bindings: BTreeMap<Button, BindingSet>,
    /// Lifecycle commands of the layer's own auto button
    pub auto_bindings: BindingSet,
    pub signal_bindings: Vec<(Signal, Command)>,
    pub auto_add: Vec<LayerId>,
    pub auto_remove: Vec<LayerId>,
}

impl LayerDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: LayerId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Make this a combo layer over two base layers
    pub fn with_combo(mut self, base: LayerId, co_base: LayerId) -> Self {
        self.parent = Some(base);
        self.combo_parent = Some(co_base);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_hold_time(mut self, ms: u32) -> Self {
        self.hold_time_ms = Some(ms);
        self
    }

    /// Bind one slot; the rest of the button's slots stay `Unassigned`
    pub fn bind(mut self, button: Button, slot: ActionSlot, command: Command) -> Self {
        self.bindings.entry(button).or_default().set(slot, command);
        self
    }

    pub fn bind_set(mut self, button: Button, set: BindingSet) -> Self {
        self.bindings.insert(button, set);
        self
    }

    pub fn bind_auto(mut self, slot: ActionSlot, command: Command) -> Self {
        self.auto_bindings.set(slot, command);
        self
    }

    pub fn on_signal(mut self, signal: Signal, command: Command) -> Self {
        self.signal_bindings.push((signal, command));
        self
    }

    pub fn auto_adds(mut self, layer: LayerId) -> Self {
        self.auto_add.push(layer);
        self
    }

    pub fn auto_removes(mut self, layer: LayerId) -> Self {
        self.auto_remove.push(layer);
        self
    }

    pub fn is_combo(&self) -> bool {
        self.combo_parent.is_some()
    }

    fn all_commands(&self) -> impl Iterator<Item = &Command> {
        self.bindings
            .values()
            .flat_map(|set| set.commands())
            .chain(self.auto_bindings.commands())
            .chain(self.signal_bindings.iter().map(|(_, cmd)| cmd))
    }
}

/// Profile validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile defines no layers")]
    MissingRoot,

    #[error("root layer must not have a parent")]
    RootHasParent,

    #[error("layer {from} references undefined layer {to}")]
    UnknownLayer { from: u16, to: u16 },

    #[error("layer {layer} is its own ancestor")]
    ParentCycle { layer: u16 },

    #[error("combo layer {layer} has a co-parent but no parent")]
    ComboWithoutParent { layer: u16 },

    #[error("layer {layer} references undefined keybind cycle {cycle}")]
    UnknownCycle { layer: u16, cycle: u16 },

    #[error("keybind cycle {cycle} is empty")]
    EmptyCycle { cycle: u16 },
}

/// The whole read-only binding table
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub layers: Vec<LayerDef>,
    pub keybind_cycles: Vec<Vec<KeybindId>>,
}

impl Profile {
    /// Profile whose root layer is `root`
    pub fn new(root: LayerDef) -> Self {
        Self {
            layers: vec![root],
            keybind_cycles: Vec::new(),
        }
    }

    /// Append a layer and return its id
    pub fn add_layer(&mut self, layer: LayerDef) -> LayerId {
        self.layers.push(layer);
        LayerId((self.layers.len() - 1) as u16)
    }

    pub fn add_cycle(&mut self, keybinds: Vec<KeybindId>) -> CycleId {
        self.keybind_cycles.push(keybinds);
        CycleId((self.keybind_cycles.len() - 1) as u16)
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerDef> {
        self.layers.get(id.index())
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers whose parent or combo co-parent is `id`
    pub fn children_of(&self, id: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.layers
            .iter()
            .enumerate()
            .filter(move |(_, def)| def.parent == Some(id) || def.combo_parent == Some(id))
            .map(|(i, _)| LayerId(i as u16))
    }

    /// Check internal consistency before an engine is built over the profile
    pub fn validate(&self) -> Result<(), ProfileError> {
        let root = self.layers.first().ok_or(ProfileError::MissingRoot)?;
        if root.parent.is_some() || root.combo_parent.is_some() {
            return Err(ProfileError::RootHasParent);
        }

        for (cycle, keybinds) in self.keybind_cycles.iter().enumerate() {
            if keybinds.is_empty() {
                return Err(ProfileError::EmptyCycle {
                    cycle: cycle as u16,
                });
            }
        }

        for (index, def) in self.layers.iter().enumerate() {
            let from = index as u16;
            let check = |to: LayerId| {
                if to.index() < self.layers.len() {
                    Ok(())
                } else {
                    Err(ProfileError::UnknownLayer { from, to: to.0 })
                }
            };

            if index > 0 && def.parent.is_none() && def.combo_parent.is_some() {
                return Err(ProfileError::ComboWithoutParent { layer: from });
            }
            def.parent.map(check).transpose()?;
            def.combo_parent.map(check).transpose()?;
            for &id in def.auto_add.iter().chain(&def.auto_remove) {
                check(id)?;
            }

            for command in def.all_commands() {
                match *command {
                    Command::AddLayer(id)
                    | Command::HoldLayer(id)
                    | Command::ToggleLayer(id)
                    | Command::RemoveLayer { layer: id, .. } => check(id)?,
                    Command::ReplaceLayer { remove, add } => {
                        check(remove)?;
                        check(add)?;
                    }
                    Command::KeybindCycle { cycle, .. } => {
                        if cycle.index() >= self.keybind_cycles.len() {
                            return Err(ProfileError::UnknownCycle {
                                layer: from,
                                cycle: cycle.0,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        // Parent and combo base chains must reach the root
        let mut reaches_root = vec![false; self.layers.len()];
        reaches_root[0] = true;
        let mut progress = true;
        while progress {
            progress = false;
            for (index, def) in self.layers.iter().enumerate().skip(1) {
                if reaches_root[index] {
                    continue;
                }
                let bases_done = [def.parent, def.combo_parent]
                    .into_iter()
                    .flatten()
                    .all(|base| reaches_root[base.index()]);
                if bases_done {
                    reaches_root[index] = true;
                    progress = true;
                }
            }
        }
        if let Some(index) = reaches_root.iter().position(|done| !done) {
            return Err(ProfileError::ParentCycle {
                layer: index as u16,
            });
        }

        Ok(())
    }
}
