//! Layer stack
//!
//! Runtime state of every defined layer, stored in an arena indexed by
//! `LayerId`. A layer is active while its reference count is non-zero. The
//! count has three sources: normal adds, buttons holding the layer, and the
//! automatic contribution of a combo layer whose base layers are both up.
//!
//! All mutations run through one explicit worklist so cascades (auto-add,
//! auto-remove, combo activation, child removal) never recurse and are
//! bounded by a per-frame budget of layer-order mutations.

use super::buttons::{Button, ButtonMask};
use super::command::LayerId;
use super::engine::EngineError;
use super::profile::Profile;
use crate::log_fatal;

/// How a reference to a layer was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    Normal,
    Held(Button),
    Combo,
}

#[derive(Debug, Clone)]
enum LayerOp {
    Add {
        layer: LayerId,
        by: Contribution,
        /// Layers whose activation cascade produced this op
        via: Vec<LayerId>,
    },
    Remove {
        layer: LayerId,
        forced: bool,
    },
    ReleaseHold {
        layer: LayerId,
        button: Button,
    },
    Deactivate(LayerId),
}

/// Runtime record of one layer
#[derive(Debug, Clone, Default)]
pub struct LayerState {
    added: u32,
    held_by: ButtonMask,
    combo: bool,
    stamp: u64,
    used: bool,
    in_order: bool,
}

impl LayerState {
    pub fn ref_count(&self) -> u32 {
        self.added + self.held_by.len() as u32 + u32::from(self.combo)
    }

    pub fn is_active(&self) -> bool {
        self.ref_count() > 0
    }

    /// Last activation stamp, larger is more recent
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn held_by(&self) -> ButtonMask {
        self.held_by
    }

    /// Have any of this layer's bindings fired since it activated?
    pub fn was_used(&self) -> bool {
        self.used
    }
}

/// A holder unbound by a forced removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedHolder {
    pub button: Button,
    pub layer: LayerId,
    /// The layer's bindings were exercised while it was held
    pub consumed: bool,
}

#[derive(Debug)]
pub struct LayerStack {
    states: Vec<LayerState>,
    /// Active layers; activation order until the sorter rewrites it
    order: Vec<LayerId>,
    next_stamp: u64,
    changed: Vec<(LayerId, bool)>,
    released: Vec<ReleasedHolder>,
    mutations: u32,
    max_mutations: u32,
    dirty: bool,
    halted: bool,
}

impl LayerStack {
    /// Stack for `layer_count` layers with only the root active
    pub fn new(layer_count: usize, max_mutations: u32) -> Self {
        let mut stack = Self {
            states: vec![LayerState::default(); layer_count.max(1)],
            order: Vec::new(),
            next_stamp: 0,
            changed: Vec::new(),
            released: Vec::new(),
            mutations: 0,
            max_mutations,
            dirty: false,
            halted: false,
        };
        stack.reset();
        stack
    }

    /// Drop every layer except the root
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = LayerState::default();
        }
        let root = &mut self.states[LayerId::ROOT.index()];
        root.added = 1;
        root.in_order = true;
        self.order = vec![LayerId::ROOT];
        self.next_stamp = 1;
        self.changed.clear();
        self.released.clear();
        self.mutations = 0;
        self.dirty = true;
        self.halted = false;
    }

    /// Start a new frame's mutation budget and change list
    pub fn begin_frame(&mut self) {
        self.mutations = 0;
        self.changed.clear();
    }

    pub fn state(&self, layer: LayerId) -> Option<&LayerState> {
        self.states.get(layer.index())
    }

    pub fn is_active(&self, layer: LayerId) -> bool {
        self.state(layer).is_some_and(LayerState::is_active)
    }

    pub fn ref_count(&self, layer: LayerId) -> u32 {
        self.state(layer).map_or(0, LayerState::ref_count)
    }

    pub fn stamp(&self, layer: LayerId) -> u64 {
        self.state(layer).map_or(0, LayerState::stamp)
    }

    /// Is the layer held by at least one button?
    pub fn is_held(&self, layer: LayerId) -> bool {
        self.state(layer).is_some_and(|s| !s.held_by.is_empty())
    }

    pub fn order(&self) -> &[LayerId] {
        &self.order
    }

    /// Install a sorted order covering exactly the active layers
    pub fn set_order(&mut self, order: Vec<LayerId>) {
        debug_assert_eq!(order.len(), self.order.len());
        self.order = order;
        self.dirty = false;
    }

    /// Membership changed since the last `set_order`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Stop layer processing for the rest of the session
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Activation changes made this frame, in the order they happened
    pub fn changed(&self) -> &[(LayerId, bool)] {
        &self.changed
    }

    pub fn take_released_holders(&mut self) -> Vec<ReleasedHolder> {
        std::mem::take(&mut self.released)
    }

    pub fn mark_used(&mut self, layer: LayerId) {
        if let Some(state) = self.states.get_mut(layer.index()) {
            state.used = true;
        }
    }

    pub fn add(
        &mut self,
        profile: &Profile,
        layer: LayerId,
        held_by: Option<Button>,
    ) -> Result<(), EngineError> {
        let by = held_by.map_or(Contribution::Normal, Contribution::Held);
        self.run(
            profile,
            LayerOp::Add {
                layer,
                by,
                via: Vec::new(),
            },
        )
    }

    pub fn remove(
        &mut self,
        profile: &Profile,
        layer: LayerId,
        forced: bool,
    ) -> Result<(), EngineError> {
        self.run(profile, LayerOp::Remove { layer, forced })
    }

    /// Drop the reference `button` holds on `layer`
    pub fn release_hold(
        &mut self,
        profile: &Profile,
        layer: LayerId,
        button: Button,
    ) -> Result<(), EngineError> {
        self.run(profile, LayerOp::ReleaseHold { layer, button })
    }

    fn run(&mut self, profile: &Profile, op: LayerOp) -> Result<(), EngineError> {
        if self.halted {
            return Ok(());
        }
        let mut work = vec![op];
        while let Some(op) = work.pop() {
            match op {
                LayerOp::Add { layer, by, via } => {
                    self.apply_add(profile, layer, by, via, &mut work)?;
                }
                LayerOp::Remove { layer, forced } => {
                    self.apply_remove(profile, layer, forced, &mut work);
                }
                LayerOp::ReleaseHold { layer, button } => {
                    if let Some(state) = self.states.get_mut(layer.index()) {
                        state.held_by.remove(button);
                    }
                    self.schedule_deactivation(profile, layer, &mut work);
                }
                LayerOp::Deactivate(layer) => self.apply_deactivate(layer)?,
            }
        }
        Ok(())
    }

    fn apply_add(
        &mut self,
        profile: &Profile,
        layer: LayerId,
        by: Contribution,
        via: Vec<LayerId>,
        work: &mut Vec<LayerOp>,
    ) -> Result<(), EngineError> {
        let Some(def) = profile.layer(layer) else {
            debug_assert!(false, "add of undefined layer {}", layer.0);
            return Ok(());
        };
        if via.contains(&layer) {
            log::debug!("Skipping re-entrant add of layer '{}'", def.name);
            return Ok(());
        }

        let was_active = self.is_active(layer);
        if !was_active {
            let bases_up = def.parent.map_or(true, |p| self.is_active(p))
                && def.combo_parent.map_or(true, |p| self.is_active(p));
            if !bases_up {
                log::warn!("Layer '{}' added while its base layer is inactive", def.name);
                return Ok(());
            }
        }

        let state = &mut self.states[layer.index()];
        match by {
            Contribution::Normal => state.added += 1,
            Contribution::Held(button) => state.held_by.insert(button),
            Contribution::Combo => state.combo = true,
        }
        if was_active || state.in_order {
            return Ok(());
        }

        self.count_mutation()?;
        let state = &mut self.states[layer.index()];
        state.in_order = true;
        state.used = false;
        state.stamp = self.next_stamp;
        self.next_stamp += 1;
        self.order.push(layer);
        self.changed.push((layer, true));
        self.dirty = true;
        log::debug!("Layer '{}' activated", def.name);

        // Pushed in reverse so they pop in declaration order
        let mut via = via;
        via.push(layer);
        let mut cascade = Vec::new();
        for &id in &def.auto_add {
            cascade.push(LayerOp::Add {
                layer: id,
                by: Contribution::Normal,
                via: via.clone(),
            });
        }
        for &id in &def.auto_remove {
            cascade.push(LayerOp::Remove {
                layer: id,
                forced: false,
            });
        }
        for child in profile.children_of(layer) {
            let Some(child_def) = profile.layer(child) else {
                continue;
            };
            let bases_up = child_def.parent.is_some_and(|p| self.is_active(p))
                && child_def.combo_parent.is_some_and(|p| self.is_active(p));
            if child_def.is_combo() && bases_up && !self.is_active(child) {
                cascade.push(LayerOp::Add {
                    layer: child,
                    by: Contribution::Combo,
                    via: via.clone(),
                });
            }
        }
        work.extend(cascade.into_iter().rev());
        Ok(())
    }

    fn apply_remove(
        &mut self,
        profile: &Profile,
        layer: LayerId,
        forced: bool,
        work: &mut Vec<LayerOp>,
    ) {
        if layer == LayerId::ROOT {
            log::warn!("Ignoring removal of the root layer");
            return;
        }
        let Some(state) = self.states.get_mut(layer.index()) else {
            debug_assert!(false, "remove of undefined layer {}", layer.0);
            return;
        };
        if !state.is_active() {
            return;
        }

        if forced {
            let consumed = state.used;
            for button in state.held_by.iter() {
                self.released.push(ReleasedHolder {
                    button,
                    layer,
                    consumed,
                });
            }
            state.added = 0;
            state.held_by = ButtonMask::default();
            state.combo = false;
        } else if state.added > 0 {
            state.added -= 1;
        }
        self.schedule_deactivation(profile, layer, work);
    }

    /// Queue deactivation of `layer` if nothing references it, removing its
    /// children first
    fn schedule_deactivation(&mut self, profile: &Profile, layer: LayerId, work: &mut Vec<LayerOp>) {
        let Some(state) = self.states.get(layer.index()) else {
            return;
        };
        if state.is_active() || !state.in_order {
            return;
        }
        work.push(LayerOp::Deactivate(layer));
        for child in profile.children_of(layer) {
            if self.states.get(child.index()).is_some_and(|s| s.in_order) {
                work.push(LayerOp::Remove {
                    layer: child,
                    forced: true,
                });
            }
        }
    }

    fn apply_deactivate(&mut self, layer: LayerId) -> Result<(), EngineError> {
        let Some(state) = self.states.get(layer.index()) else {
            return Ok(());
        };
        // Re-added while its children were being removed
        if state.is_active() || !state.in_order {
            return Ok(());
        }
        self.count_mutation()?;
        self.states[layer.index()].in_order = false;
        self.order.retain(|&id| id != layer);
        self.changed.push((layer, false));
        self.dirty = true;
        Ok(())
    }

    fn count_mutation(&mut self) -> Result<(), EngineError> {
        self.mutations += 1;
        if self.mutations > self.max_mutations {
            self.halted = true;
            log_fatal!(
                "Layer cascade exceeded {} mutations in one frame; layer processing halted",
                self.max_mutations
            );
            return Err(EngineError::LayerCascadeOverflow {
                limit: self.max_mutations,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::profile::LayerDef;

    fn stack_for(profile: &Profile) -> LayerStack {
        LayerStack::new(profile.layer_count(), 32)
    }

    fn flat_profile(count: usize) -> Profile {
        let mut profile = Profile::new(LayerDef::new("root"));
        for i in 1..count {
            profile.add_layer(LayerDef::new(&format!("layer{}", i)));
        }
        profile
    }

    #[test]
    fn test_root_always_active() {
        let profile = flat_profile(2);
        let mut stack = stack_for(&profile);
        assert!(stack.is_active(LayerId::ROOT));
        stack.remove(&profile, LayerId::ROOT, true).unwrap();
        assert!(stack.is_active(LayerId::ROOT));
        assert_eq!(stack.order(), &[LayerId::ROOT]);
    }

    #[test]
    fn test_reference_count_floor() {
        let profile = flat_profile(2);
        let mut stack = stack_for(&profile);
        let layer = LayerId(1);

        stack.add(&profile, layer, None).unwrap();
        stack.add(&profile, layer, None).unwrap();
        stack.add(&profile, layer, Some(Button::A)).unwrap();
        assert_eq!(stack.ref_count(layer), 3);

        stack.remove(&profile, layer, false).unwrap();
        stack.remove(&profile, layer, false).unwrap();
        assert!(stack.is_active(layer), "held reference keeps the layer up");
        // Extra normal removals cannot drop the held reference
        stack.remove(&profile, layer, false).unwrap();
        assert_eq!(stack.ref_count(layer), 1);

        stack.release_hold(&profile, layer, Button::A).unwrap();
        assert!(!stack.is_active(layer));
        assert_eq!(stack.order(), &[LayerId::ROOT]);
    }

    #[test]
    fn test_forced_remove_reports_holders() {
        let profile = flat_profile(2);
        let mut stack = stack_for(&profile);
        let layer = LayerId(1);

        stack.add(&profile, layer, Some(Button::LeftBumper)).unwrap();
        stack.add(&profile, layer, None).unwrap();
        stack.mark_used(layer);
        stack.remove(&profile, layer, true).unwrap();

        assert!(!stack.is_active(layer));
        assert_eq!(
            stack.take_released_holders(),
            vec![ReleasedHolder {
                button: Button::LeftBumper,
                layer,
                consumed: true
            }]
        );
        assert!(stack.take_released_holders().is_empty());
    }

    #[test]
    fn test_stamps_and_change_list() {
        let profile = flat_profile(3);
        let mut stack = stack_for(&profile);
        stack.begin_frame();
        stack.add(&profile, LayerId(1), None).unwrap();
        stack.add(&profile, LayerId(2), None).unwrap();
        assert!(stack.stamp(LayerId(2)) > stack.stamp(LayerId(1)));
        stack.remove(&profile, LayerId(1), false).unwrap();
        assert_eq!(
            stack.changed(),
            &[(LayerId(1), true), (LayerId(2), true), (LayerId(1), false)]
        );
        assert!(stack.is_dirty());
        stack.begin_frame();
        assert!(stack.changed().is_empty());
    }

    #[test]
    fn test_child_requires_parent_and_falls_with_it() {
        let mut profile = flat_profile(2);
        let child = profile.add_layer(LayerDef::new("child").with_parent(LayerId(1)));
        let mut stack = stack_for(&profile);

        stack.add(&profile, child, None).unwrap();
        assert!(!stack.is_active(child), "parent is not active");

        stack.add(&profile, LayerId(1), None).unwrap();
        stack.add(&profile, child, None).unwrap();
        stack.begin_frame();
        stack.remove(&profile, LayerId(1), false).unwrap();
        assert!(!stack.is_active(child));
        // Child is dropped before its parent
        assert_eq!(stack.changed(), &[(child, false), (LayerId(1), false)]);
    }

    #[test]
    fn test_combo_layer_follows_both_bases() {
        let mut profile = flat_profile(3);
        let combo = profile.add_layer(LayerDef::new("combo").with_combo(LayerId(1), LayerId(2)));
        let mut stack = stack_for(&profile);

        stack.add(&profile, LayerId(1), None).unwrap();
        assert!(!stack.is_active(combo));
        stack.add(&profile, LayerId(2), None).unwrap();
        assert!(stack.is_active(combo));

        stack.remove(&profile, LayerId(2), false).unwrap();
        assert!(!stack.is_active(combo));
        assert!(stack.is_active(LayerId(1)));
    }

    #[test]
    fn test_auto_add_and_remove_cascade() {
        let mut profile = flat_profile(1);
        let a = profile.add_layer(LayerDef::new("a"));
        let b = profile.add_layer(LayerDef::new("b"));
        let c = profile.add_layer(LayerDef::new("c").auto_adds(b).auto_removes(a));
        let mut stack = stack_for(&profile);

        stack.add(&profile, a, None).unwrap();
        stack.add(&profile, c, None).unwrap();
        assert!(stack.is_active(b));
        assert!(!stack.is_active(a));
    }

    #[test]
    fn test_mutual_auto_add_is_guarded() {
        let mut profile = flat_profile(1);
        let a = profile.add_layer(LayerDef::new("a").auto_adds(LayerId(2)));
        let b = profile.add_layer(LayerDef::new("b").auto_adds(LayerId(1)));
        let mut stack = stack_for(&profile);

        stack.add(&profile, a, None).unwrap();
        assert_eq!(stack.ref_count(a), 1);
        assert_eq!(stack.ref_count(b), 1);
    }

    #[test]
    fn test_cascade_budget_halts() {
        // A chain longer than the budget
        let mut profile = flat_profile(1);
        for i in 1..40u16 {
            profile.add_layer(LayerDef::new("link").auto_adds(LayerId(i + 1)));
        }
        profile.add_layer(LayerDef::new("end"));
        let mut stack = stack_for(&profile);

        let result = stack.add(&profile, LayerId(1), None);
        assert_eq!(result, Err(EngineError::LayerCascadeOverflow { limit: 32 }));
        assert!(stack.is_halted());

        // Halted stacks ignore further work
        let before = stack.order().len();
        stack.add(&profile, LayerId(40), None).unwrap();
        assert_eq!(stack.order().len(), before);
    }
}
