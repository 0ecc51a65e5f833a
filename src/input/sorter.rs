//! Layer sorter
//!
//! Computes the bottom-to-top order of the active layers. Siblings sort by
//! (priority, band, combo tie-break, recency); every layer sits immediately
//! above its parent and below the parent's higher-ranked siblings. A combo
//! layer nests on whichever of its two bases was activated later, so it sits
//! above both of them. Combo tie-breaks read positions from the previous
//! pass, so the stable sort is repeated until the order stops changing.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::command::LayerId;
use super::engine::EngineError;
use super::layers::LayerStack;
use super::profile::Profile;
use crate::log_fatal;

/// Priority a held layer at priority 0 is boosted to
const HELD_BOOST: u16 = u8::MAX as u16 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SiblingKey {
    priority: u16,
    /// 0 = combo, 1 = normal, 2 = held
    band: u8,
    combo_tiebreak: usize,
    stamp: u64,
    id: LayerId,
}

struct SortContext<'a> {
    parents: &'a HashMap<LayerId, LayerId>,
    keys: HashMap<LayerId, SiblingKey>,
}

impl SortContext<'_> {
    fn parent(&self, layer: LayerId) -> Option<LayerId> {
        if layer == LayerId::ROOT {
            return None;
        }
        Some(self.parents.get(&layer).copied().unwrap_or(LayerId::ROOT))
    }

    fn depth(&self, layer: LayerId) -> usize {
        let mut depth = 0;
        let mut current = layer;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    fn key(&self, layer: LayerId) -> SiblingKey {
        self.keys.get(&layer).copied().unwrap_or(SiblingKey {
            priority: 0,
            band: 1,
            combo_tiebreak: 0,
            stamp: 0,
            id: layer,
        })
    }

    /// Nesting-aware comparison: ancestors first, otherwise compare the two
    /// siblings where the branches diverge
    fn compare(&self, a: LayerId, b: LayerId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (mut x, mut y) = (a, b);
        let (mut dx, mut dy) = (self.depth(a), self.depth(b));
        while dx > dy {
            x = self.parent(x).unwrap_or(LayerId::ROOT);
            dx -= 1;
        }
        while dy > dx {
            y = self.parent(y).unwrap_or(LayerId::ROOT);
            dy -= 1;
        }
        if x == y {
            // One is an ancestor of the other
            return if self.depth(a) < self.depth(b) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        loop {
            let (px, py) = (self.parent(x), self.parent(y));
            if px == py {
                return self.key(x).cmp(&self.key(y));
            }
            match (px, py) {
                (Some(px), Some(py)) => {
                    x = px;
                    y = py;
                }
                _ => return self.key(x).cmp(&self.key(y)),
            }
        }
    }
}

/// Base a combo nests on: the later-activated of its two bases
fn later_base(stack: &LayerStack, base: LayerId, co_base: Option<LayerId>) -> LayerId {
    match co_base {
        Some(co_base) if stack.stamp(co_base) > stack.stamp(base) => co_base,
        _ => base,
    }
}

/// Nesting parent of every active layer
fn nesting_parents(profile: &Profile, stack: &LayerStack) -> HashMap<LayerId, LayerId> {
    stack
        .order()
        .iter()
        .filter(|&&id| id != LayerId::ROOT)
        .map(|&id| {
            let parent = profile
                .layer(id)
                .and_then(|def| def.parent.map(|base| later_base(stack, base, def.combo_parent)))
                .filter(|&parent| stack.is_active(parent))
                .unwrap_or(LayerId::ROOT);
            (id, parent)
        })
        .collect()
}

fn sibling_keys(
    profile: &Profile,
    stack: &LayerStack,
    order: &[LayerId],
) -> HashMap<LayerId, SiblingKey> {
    let positions: HashMap<LayerId, usize> =
        order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    order
        .iter()
        .map(|&id| {
            let def = profile.layer(id);
            let priority = def.map_or(0, |d| d.priority);
            let held = stack.is_held(id);
            let combo = def.is_some_and(|d| d.is_combo());

            let priority = if held && priority == 0 {
                HELD_BOOST
            } else {
                u16::from(priority)
            };
            let band = if combo {
                0
            } else if held {
                2
            } else {
                1
            };
            let combo_tiebreak = match def {
                Some(d) if combo => d
                    .parent
                    .map(|base| later_base(stack, base, d.combo_parent))
                    .and_then(|base| positions.get(&base).copied())
                    .unwrap_or(0),
                _ => 0,
            };
            (
                id,
                SiblingKey {
                    priority,
                    band,
                    combo_tiebreak,
                    stamp: stack.stamp(id),
                    id,
                },
            )
        })
        .collect()
}

/// Sort the stack's active layers, root first
pub fn sort_layers(
    profile: &Profile,
    stack: &LayerStack,
    max_passes: u32,
) -> Result<Vec<LayerId>, EngineError> {
    let parents = nesting_parents(profile, stack);
    let mut order = stack.order().to_vec();
    for _ in 0..max_passes {
        let context = SortContext {
            parents: &parents,
            keys: sibling_keys(profile, stack, &order),
        };
        let mut next = order.clone();
        next.sort_by(|&a, &b| context.compare(a, b));
        if next == order {
            debug_assert_eq!(order.first(), Some(&LayerId::ROOT));
            return Ok(order);
        }
        order = next;
    }
    log_fatal!(
        "Layer sort did not converge after {} passes; layer processing halted",
        max_passes
    );
    Err(EngineError::SortDidNotConverge { passes: max_passes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::buttons::Button;
    use crate::input::profile::LayerDef;
    use proptest::prelude::*;

    fn sorted(profile: &Profile, stack: &LayerStack) -> Vec<LayerId> {
        sort_layers(profile, stack, 16).unwrap()
    }

    #[test]
    fn test_priority_then_recency() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let high = profile.add_layer(LayerDef::new("high").with_priority(3));
        let low_a = profile.add_layer(LayerDef::new("low_a").with_priority(1));
        let low_b = profile.add_layer(LayerDef::new("low_b").with_priority(1));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, high, None).unwrap();
        stack.add(&profile, low_b, None).unwrap();
        stack.add(&profile, low_a, None).unwrap();

        assert_eq!(sorted(&profile, &stack), vec![LayerId::ROOT, low_b, low_a, high]);
    }

    #[test]
    fn test_child_sits_directly_above_parent() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let a = profile.add_layer(LayerDef::new("a"));
        let b = profile.add_layer(LayerDef::new("b").with_priority(1));
        let a_child = profile.add_layer(LayerDef::new("a_child").with_parent(a).with_priority(9));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, a, None).unwrap();
        stack.add(&profile, b, None).unwrap();
        stack.add(&profile, a_child, None).unwrap();

        assert_eq!(sorted(&profile, &stack), vec![LayerId::ROOT, a, a_child, b]);
    }

    #[test]
    fn test_held_layer_boosted_above_siblings() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let held = profile.add_layer(LayerDef::new("held"));
        let normal = profile.add_layer(LayerDef::new("normal").with_priority(5));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, held, Some(Button::LeftBumper)).unwrap();
        stack.add(&profile, normal, None).unwrap();

        assert_eq!(sorted(&profile, &stack), vec![LayerId::ROOT, normal, held]);
    }

    #[test]
    fn test_held_band_above_equal_priority() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let held = profile.add_layer(LayerDef::new("held").with_priority(2));
        let normal = profile.add_layer(LayerDef::new("normal").with_priority(2));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, held, Some(Button::A)).unwrap();
        stack.add(&profile, normal, None).unwrap();

        assert_eq!(sorted(&profile, &stack), vec![LayerId::ROOT, normal, held]);
    }

    #[test]
    fn test_combo_sits_above_later_base() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let a = profile.add_layer(LayerDef::new("a"));
        let b = profile.add_layer(LayerDef::new("b"));
        let a_child = profile.add_layer(LayerDef::new("a_child").with_parent(a));
        let combo = profile.add_layer(LayerDef::new("combo").with_combo(a, b));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, a, None).unwrap();
        stack.add(&profile, a_child, None).unwrap();
        stack.add(&profile, b, None).unwrap();
        assert!(stack.is_active(combo));

        assert_eq!(
            sorted(&profile, &stack),
            vec![LayerId::ROOT, a, a_child, b, combo]
        );
    }

    #[test]
    fn test_combo_sorts_below_siblings_of_its_base() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let a = profile.add_layer(LayerDef::new("a"));
        let b = profile.add_layer(LayerDef::new("b"));
        let a_child = profile.add_layer(LayerDef::new("a_child").with_parent(a));
        let combo = profile.add_layer(LayerDef::new("combo").with_combo(a, b));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, b, None).unwrap();
        stack.add(&profile, a, None).unwrap();
        stack.add(&profile, a_child, None).unwrap();
        assert!(stack.is_active(combo));

        // a came up last: the combo nests on it, lowest among a's children
        assert_eq!(
            sorted(&profile, &stack),
            vec![LayerId::ROOT, b, a, combo, a_child]
        );
    }

    #[test]
    fn test_sort_is_a_fixpoint() {
        let mut profile = Profile::new(LayerDef::new("root"));
        let a = profile.add_layer(LayerDef::new("a").with_priority(2));
        let b = profile.add_layer(LayerDef::new("b"));
        let mut stack = LayerStack::new(profile.layer_count(), 32);
        stack.add(&profile, a, None).unwrap();
        stack.add(&profile, b, None).unwrap();

        let first = sorted(&profile, &stack);
        stack.set_order(first.clone());
        assert_eq!(sorted(&profile, &stack), first);
    }

    proptest! {
        #[test]
        fn prop_sort_converges_on_acyclic_configs(
            shape in prop::collection::vec(
                (
                    any::<prop::sample::Index>(),
                    any::<prop::sample::Index>(),
                    0u8..3,
                    any::<bool>(),
                    any::<bool>(),
                    any::<bool>(),
                ),
                1..12,
            )
        ) {
            let mut profile = Profile::new(LayerDef::new("root"));
            for (i, (parent, co_base, priority, nested, combo, _)) in shape.iter().enumerate() {
                let mut def = LayerDef::new("layer").with_priority(*priority);
                if *nested && i > 0 {
                    let base = LayerId(parent.index(i) as u16 + 1);
                    let other = LayerId(co_base.index(i) as u16 + 1);
                    def = if *combo && other != base {
                        def.with_combo(base, other)
                    } else {
                        def.with_parent(base)
                    };
                }
                profile.add_layer(def);
            }
            prop_assert!(profile.validate().is_ok());

            let mut stack = LayerStack::new(profile.layer_count(), 64);
            for (i, (.., held)) in shape.iter().enumerate() {
                let id = LayerId(i as u16 + 1);
                if profile.layers[id.index()].is_combo() {
                    // Comes up on its own once both bases are active
                    continue;
                }
                let holder = if *held { Some(Button::A) } else { None };
                stack.add(&profile, id, holder).unwrap();
            }

            let order = sort_layers(&profile, &stack, 16).unwrap();
            prop_assert_eq!(order.len(), profile.layer_count());
            prop_assert_eq!(order[0], LayerId::ROOT);

            // Already sorted input stays put
            stack.set_order(order.clone());
            prop_assert_eq!(&sort_layers(&profile, &stack, 16).unwrap(), &order);

            let position = |id: LayerId| order.iter().position(|&x| x == id).unwrap();
            for (i, def) in profile.layers.iter().enumerate().skip(1) {
                let id = LayerId(i as u16);
                for base in [def.parent.or(Some(LayerId::ROOT)), def.combo_parent]
                    .into_iter()
                    .flatten()
                {
                    prop_assert!(position(base) < position(id));
                }
                if def.is_combo() || stack.is_held(id) {
                    continue;
                }
                for (j, other) in profile.layers.iter().enumerate().skip(i + 1) {
                    let later = LayerId(j as u16);
                    if !other.is_combo()
                        && !stack.is_held(later)
                        && other.parent == def.parent
                        && other.priority == def.priority
                    {
                        prop_assert!(position(id) < position(later));
                    }
                }
            }
        }
    }
}
