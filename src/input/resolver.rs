//! Binding resolver
//!
//! Folds the sorted active layers, bottom to top, into one resolved
//! `BindingSet` per button. The result depends only on the order and the
//! profile, so resolving twice with the same inputs yields identical tables.

use super::buttons::Button;
use super::command::{Command, LayerId};
use super::profile::{ActionSlot, BindingSet, LayerDef, Profile};

/// Does `incoming` from a higher layer replace `current`?
///
/// `Defer` passes through to whatever lower layers bound, and only fills a
/// slot nobody below has assigned. Everything else, `Unassigned` and
/// `DoNothing` included, replaces the lower binding.
pub fn overwrites(current: Command, incoming: Command) -> bool {
    match incoming {
        Command::Defer => current == Command::Unassigned,
        _ => true,
    }
}

/// Resolved commands for one button, with the layer each slot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedBindings {
    pub set: BindingSet,
    pub origins: [LayerId; ActionSlot::COUNT],
}

impl ResolvedBindings {
    /// Fixed bindings not tied to the layer order, e.g. a layer's auto button
    pub fn from_layer(layer: LayerId, set: BindingSet) -> Self {
        Self {
            set,
            origins: [layer; ActionSlot::COUNT],
        }
    }

    pub fn get(&self, slot: ActionSlot) -> Command {
        self.set.get(slot)
    }

    pub fn origin(&self, slot: ActionSlot) -> LayerId {
        self.origins[slot.index()]
    }

    pub fn hold_time_ms(&self) -> Option<u32> {
        self.set.hold_time_ms
    }
}

/// One resolved entry per button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    buttons: [ResolvedBindings; Button::COUNT],
}

impl Default for ResolvedTable {
    fn default() -> Self {
        Self {
            buttons: [ResolvedBindings::default(); Button::COUNT],
        }
    }
}

impl ResolvedTable {
    pub fn get(&self, button: Button) -> &ResolvedBindings {
        &self.buttons[button.index()]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    command: Command,
    origin: LayerId,
    /// Position in the order of the layer that last wrote this cell
    level: usize,
    /// Written by a synthetic any-direction parent, not by the button itself
    mirrored: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct HoldCell {
    hold_time_ms: Option<u32>,
    level: usize,
}

struct Fold {
    cells: [[Cell; ActionSlot::COUNT]; Button::COUNT],
    hold: [HoldCell; Button::COUNT],
}

impl Fold {
    fn new() -> Self {
        Self {
            cells: [[Cell::default(); ActionSlot::COUNT]; Button::COUNT],
            hold: [HoldCell::default(); Button::COUNT],
        }
    }

    fn cell(&mut self, button: Button, slot: ActionSlot) -> &mut Cell {
        &mut self.cells[button.index()][slot.index()]
    }

    /// Apply one layer's set to one button, returning which slots it wrote
    fn apply(
        &mut self,
        button: Button,
        set: &BindingSet,
        def: &LayerDef,
        layer: LayerId,
        level: usize,
    ) -> [bool; ActionSlot::COUNT] {
        let mut written = [false; ActionSlot::COUNT];
        for slot in ActionSlot::ALL {
            let incoming = set.get(slot);
            let cell = self.cell(button, slot);
            // A same-layer synthetic binding fills the slots a direction leaves blank
            let same_layer_mirror = cell.mirrored && cell.level == level && !incoming.is_bound();
            if !same_layer_mirror && overwrites(cell.command, incoming) {
                *cell = Cell {
                    command: incoming,
                    origin: layer,
                    level,
                    mirrored: false,
                };
                written[slot.index()] = true;
            }
        }
        if set.binds_hold_or_tap() {
            self.hold[button.index()] = HoldCell {
                hold_time_ms: set.hold_time_ms.or(def.hold_time_ms),
                level,
            };
        }
        written
    }

    fn apply_layer(&mut self, def: &LayerDef, layer: LayerId, level: usize) {
        // Synthetic buttons first so same-layer direction bindings win
        for (&button, set) in def.bindings.iter().filter(|(b, _)| b.is_multi_directional()) {
            let written = self.apply(button, set, def, layer, level);
            let Some(children) = button.children() else {
                continue;
            };
            for slot in ActionSlot::ALL {
                let incoming = set.get(slot);
                if !written[slot.index()] || incoming == Command::Defer {
                    continue;
                }
                for child in children {
                    let command = match child.direction() {
                        Some(d) if incoming.supports_direction(d) => incoming.with_direction(d),
                        Some(_) => Command::Unassigned,
                        None => incoming,
                    };
                    let cell = self.cell(child, slot);
                    *cell = Cell {
                        command,
                        origin: layer,
                        level,
                        mirrored: true,
                    };
                }
            }
            if set.binds_hold_or_tap() {
                for child in children {
                    self.hold[child.index()] = self.hold[button.index()];
                }
            }
        }

        for (&button, set) in def.bindings.iter().filter(|(b, _)| !b.is_multi_directional()) {
            self.apply(button, set, def, layer, level);
            let Some(parent) = button.parent() else {
                continue;
            };
            for slot in ActionSlot::ALL {
                if !set.get(slot).is_bound() {
                    continue;
                }
                let parent_cell = self.cell(parent, slot);
                if parent_cell.level < level && parent_cell.command.is_bound() {
                    *parent_cell = Cell {
                        command: Command::Unassigned,
                        origin: layer,
                        level,
                        mirrored: false,
                    };
                }
            }
        }
    }

    /// Settle synthetic bindings: direction-bearing commands move onto the
    /// children. Other commands stay on the synthetic button, unless a child
    /// was bound on its own at the same or a higher level, in which case the
    /// remaining children keep the mirror and the synthetic slot is cleared.
    fn reconcile(&mut self) {
        for parent in Button::MULTI_DIRECTIONAL {
            let Some(children) = parent.children() else {
                continue;
            };
            for slot in ActionSlot::ALL {
                let parent_cell = *self.cell(parent, slot);
                let directional = parent_cell.command.direction().is_some();
                let superseded = parent_cell.command.is_bound()
                    && children.iter().any(|child| {
                        let cell = &self.cells[child.index()][slot.index()];
                        !cell.mirrored && cell.level >= parent_cell.level && cell.command.is_bound()
                    });
                let spread = directional || superseded;
                for child in children {
                    let cell = self.cell(child, slot);
                    if !cell.mirrored {
                        continue;
                    }
                    let parent_intact = cell.level == parent_cell.level && !parent_cell.mirrored;
                    if parent_intact && !spread {
                        cell.command = Command::Unassigned;
                    }
                    cell.mirrored = false;
                }
                if spread {
                    self.cell(parent, slot).command = Command::Unassigned;
                }
            }
        }
    }

    fn finish(self) -> ResolvedTable {
        let mut table = ResolvedTable::default();
        for button in Button::ALL {
            let resolved = &mut table.buttons[button.index()];
            for slot in ActionSlot::ALL {
                let cell = self.cells[button.index()][slot.index()];
                resolved.set.set(slot, cell.command);
                resolved.origins[slot.index()] = cell.origin;
            }
            resolved.set.hold_time_ms = self.hold[button.index()].hold_time_ms;
        }
        table
    }
}

/// Flatten the active layers into one binding set per button
pub fn resolve(profile: &Profile, order: &[LayerId]) -> ResolvedTable {
    let mut fold = Fold::new();
    for (level, &layer) in order.iter().enumerate() {
        let Some(def) = profile.layer(layer) else {
            debug_assert!(false, "active layer {} is not defined", layer.0);
            continue;
        };
        fold.apply_layer(def, layer, level);
    }
    fold.reconcile();
    fold.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::buttons::Direction;
    use crate::input::command::KeyCode;
    use rstest::rstest;

    fn key(code: u16) -> Command {
        Command::TapKey(KeyCode(code))
    }

    fn two_layers(lower: Command, upper: Command) -> (Profile, Vec<LayerId>) {
        let mut profile = Profile::new(LayerDef::new("root").bind(Button::X, ActionSlot::Down, lower));
        let upper_id = profile.add_layer(LayerDef::new("upper").bind(Button::X, ActionSlot::Down, upper));
        (profile, vec![LayerId::ROOT, upper_id])
    }

    #[rstest]
    #[case::upper_wins(key(1), key(2), key(2))]
    #[case::defer_passes_through(key(1), Command::Defer, key(1))]
    #[case::defer_fills_blank(Command::Unassigned, Command::Defer, Command::Defer)]
    #[case::do_nothing_hides(key(1), Command::DoNothing, Command::DoNothing)]
    #[case::blank_hides(key(1), Command::Unassigned, Command::Unassigned)]
    fn test_cascade(#[case] lower: Command, #[case] upper: Command, #[case] expected: Command) {
        let (profile, order) = two_layers(lower, upper);
        let table = resolve(&profile, &order);
        assert_eq!(table.get(Button::X).get(ActionSlot::Down), expected);
    }

    #[test]
    fn test_origins_and_idempotence() {
        let (profile, order) = two_layers(key(1), Command::Defer);
        let first = resolve(&profile, &order);
        assert_eq!(first.get(Button::X).origin(ActionSlot::Down), LayerId::ROOT);
        assert_eq!(resolve(&profile, &order), first);

        let (profile, order) = two_layers(key(1), key(2));
        assert_eq!(
            resolve(&profile, &order).get(Button::X).origin(ActionSlot::Down),
            LayerId(1)
        );
    }

    #[test]
    fn test_hold_time_inherits_only_with_hold_or_tap() {
        let mut profile = Profile::new(LayerDef::new("root").bind_set(
            Button::A,
            BindingSet::new()
                .with(ActionSlot::Hold, key(1))
                .with_hold_time(250),
        ));
        // Overrides hold time but defers Hold and Tap: must not inherit
        let defer_only = profile.add_layer(LayerDef::new("defer").bind_set(
            Button::A,
            BindingSet::deferring().with_hold_time(900),
        ));
        let table = resolve(&profile, &[LayerId::ROOT, defer_only]);
        assert_eq!(table.get(Button::A).hold_time_ms(), Some(250));
        assert_eq!(table.get(Button::A).get(ActionSlot::Hold), key(1));

        let with_tap = profile.add_layer(
            LayerDef::new("tap")
                .with_hold_time(600)
                .bind(Button::A, ActionSlot::Tap, key(2)),
        );
        let table = resolve(&profile, &[LayerId::ROOT, with_tap]);
        assert_eq!(table.get(Button::A).hold_time_ms(), Some(600));
    }

    #[test]
    fn test_synthetic_binding_spreads_to_children() {
        let profile = Profile::new(LayerDef::new("root").bind(
            Button::LStick,
            ActionSlot::Down,
            Command::MouseMove(Direction::Up),
        ));
        let table = resolve(&profile, &[LayerId::ROOT]);

        let children = Button::LStick.children().unwrap();
        for (child, dir) in children.iter().zip(Direction::ALL) {
            assert_eq!(
                table.get(*child).get(ActionSlot::Down),
                Command::MouseMove(dir)
            );
        }
        assert_eq!(
            table.get(Button::LStick).get(ActionSlot::Down),
            Command::Unassigned
        );
    }

    #[test]
    fn test_separately_bound_child_keeps_its_binding() {
        let profile = Profile::new(
            LayerDef::new("root")
                .bind(Button::DPad, ActionSlot::Press, Command::MenuNavigate {
                    dir: Direction::Up,
                    count: 1,
                    wrap: false,
                })
                .bind(Button::DPadLeft, ActionSlot::Press, key(7)),
        );
        let table = resolve(&profile, &[LayerId::ROOT]);
        assert_eq!(table.get(Button::DPadLeft).get(ActionSlot::Press), key(7));
        assert_eq!(
            table.get(Button::DPadRight).get(ActionSlot::Press),
            Command::MenuNavigate {
                dir: Direction::Right,
                count: 1,
                wrap: false
            }
        );
    }

    #[test]
    fn test_same_layer_child_supersedes_plain_synthetic_binding() {
        let profile = Profile::new(
            LayerDef::new("root")
                .bind(Button::DPad, ActionSlot::Press, key(2))
                .bind(Button::DPad, ActionSlot::Tap, key(3))
                .bind(Button::DPadLeft, ActionSlot::Press, key(7)),
        );
        let table = resolve(&profile, &[LayerId::ROOT]);

        // One binding per button: the synthetic slot moves to the other children
        assert_eq!(table.get(Button::DPad).get(ActionSlot::Press), Command::Unassigned);
        assert_eq!(table.get(Button::DPadLeft).get(ActionSlot::Press), key(7));
        for child in [Button::DPadUp, Button::DPadDown, Button::DPadRight] {
            assert_eq!(table.get(child).get(ActionSlot::Press), key(2));
        }

        // Slots no child claimed stay on the synthetic button, blanks included
        assert_eq!(table.get(Button::DPad).get(ActionSlot::Tap), key(3));
        assert_eq!(table.get(Button::DPadLeft).get(ActionSlot::Tap), Command::Unassigned);
    }

    #[test]
    fn test_same_layer_child_keeps_unlisted_directional_slots() {
        let profile = Profile::new(
            LayerDef::new("root")
                .bind(Button::LStick, ActionSlot::Down, Command::MoveTurn(Direction::Up))
                .bind(Button::LStickLeft, ActionSlot::Press, key(4)),
        );
        let table = resolve(&profile, &[LayerId::ROOT]);

        assert_eq!(table.get(Button::LStickLeft).get(ActionSlot::Press), key(4));
        assert_eq!(
            table.get(Button::LStickLeft).get(ActionSlot::Down),
            Command::MoveTurn(Direction::Left)
        );
    }

    #[test]
    fn test_scroll_spreads_to_vertical_children_only() {
        let mut profile = Profile::new(LayerDef::new("root").bind(Button::RStickLeft, ActionSlot::Down, key(5)));
        let upper = profile.add_layer(LayerDef::new("wheel").bind(
            Button::RStick,
            ActionSlot::Down,
            Command::Scroll {
                dir: Direction::Up,
                stepped: true,
            },
        ));
        let table = resolve(&profile, &[LayerId::ROOT, upper]);

        assert_eq!(
            table.get(Button::RStickDown).get(ActionSlot::Down),
            Command::Scroll {
                dir: Direction::Down,
                stepped: true
            }
        );
        // Horizontal directions stay blank and still hide the lower binding
        assert_eq!(table.get(Button::RStickLeft).get(ActionSlot::Down), Command::Unassigned);
        assert_eq!(table.get(Button::RStickRight).get(ActionSlot::Down), Command::Unassigned);
        assert_eq!(table.get(Button::RStick).get(ActionSlot::Down), Command::Unassigned);
    }

    #[test]
    fn test_higher_synthetic_blocks_lower_child() {
        let mut profile = Profile::new(LayerDef::new("root").bind(Button::DPadUp, ActionSlot::Tap, key(1)));
        let upper = profile.add_layer(LayerDef::new("upper").bind(Button::DPad, ActionSlot::Tap, key(2)));
        let table = resolve(&profile, &[LayerId::ROOT, upper]);

        // Non-directional: fires once from the synthetic button
        assert_eq!(table.get(Button::DPad).get(ActionSlot::Tap), key(2));
        assert_eq!(table.get(Button::DPadUp).get(ActionSlot::Tap), Command::Unassigned);
    }

    #[test]
    fn test_higher_child_blocks_lower_synthetic() {
        let mut profile = Profile::new(LayerDef::new("root").bind(Button::RStick, ActionSlot::Tap, key(1)));
        let upper = profile.add_layer(LayerDef::new("upper").bind(Button::RStickDown, ActionSlot::Tap, key(2)));
        let table = resolve(&profile, &[LayerId::ROOT, upper]);

        assert_eq!(table.get(Button::RStick).get(ActionSlot::Tap), Command::Unassigned);
        assert_eq!(table.get(Button::RStickDown).get(ActionSlot::Tap), key(2));
        // The other directions keep the lower synthetic binding
        assert_eq!(table.get(Button::RStickUp).get(ActionSlot::Tap), key(1));
    }
}
