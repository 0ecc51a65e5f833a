//! Signal bus
//!
//! Button hits and layer changes raise signals into a write buffer. Once per
//! frame the buffer becomes the read snapshot and a fresh write buffer starts
//! collecting, so anything raised while the snapshot is being handled waits
//! for the next frame.

use super::buttons::Button;
use super::command::{Command, LayerId};
use super::profile::Profile;

/// Signals that are not tied to a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialSignal {
    LayersChanged,
    MenuOpened,
    MenuClosed,
}

impl SpecialSignal {
    pub const COUNT: usize = 3;
    pub const ALL: [SpecialSignal; SpecialSignal::COUNT] = [
        SpecialSignal::LayersChanged,
        SpecialSignal::MenuOpened,
        SpecialSignal::MenuClosed,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Button(Button),
    Special(SpecialSignal),
}

impl Signal {
    pub const COUNT: usize = Button::COUNT + SpecialSignal::COUNT;

    fn bit(self) -> usize {
        match self {
            Signal::Button(button) => button.index(),
            Signal::Special(special) => Button::COUNT + special as usize,
        }
    }

    fn from_bit(bit: usize) -> Option<Signal> {
        if bit < Button::COUNT {
            Button::from_index(bit).map(Signal::Button)
        } else {
            SpecialSignal::ALL
                .get(bit - Button::COUNT)
                .copied()
                .map(Signal::Special)
        }
    }
}

/// Fixed-size set with one bit per signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet(u64);

const _: () = assert!(Signal::COUNT <= 64);

impl SignalSet {
    pub fn insert(&mut self, signal: Signal) {
        self.0 |= 1u64 << signal.bit();
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & (1u64 << signal.bit()) != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Set signals in bit order
    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        (0..Signal::COUNT)
            .filter(|bit| self.0 & (1u64 << bit) != 0)
            .filter_map(Signal::from_bit)
    }
}

/// Double-buffered signal sets
#[derive(Debug, Default)]
pub struct SignalBus {
    write: SignalSet,
    read: SignalSet,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a signal for the next scan
    pub fn raise(&mut self, signal: Signal) {
        self.write.insert(signal);
    }

    /// Signals waiting for the next scan
    pub fn pending(&self) -> SignalSet {
        self.write
    }

    /// Swap buffers and return the snapshot to scan this frame
    pub fn swap(&mut self) -> SignalSet {
        std::mem::swap(&mut self.read, &mut self.write);
        self.write.clear();
        self.read
    }

    pub fn reset(&mut self) {
        self.read.clear();
        self.write.clear();
    }
}

/// Commands bound to the signals in `snapshot`, bottom layer first
pub fn triggered_commands(
    snapshot: &SignalSet,
    profile: &Profile,
    order: &[LayerId],
) -> Vec<(LayerId, Command)> {
    if snapshot.is_empty() {
        return Vec::new();
    }
    let mut triggered = Vec::new();
    for signal in snapshot.iter() {
        for &layer in order {
            let Some(def) = profile.layer(layer) else {
                continue;
            };
            triggered.extend(
                def.signal_bindings
                    .iter()
                    .filter(|(bound, _)| *bound == signal)
                    .map(|(_, command)| (layer, *command)),
            );
        }
    }
    triggered
}
