//! Auto-repeat
//!
//! Two independent tracks. The exclusive track repeats only the most
//! recently triggered repeatable button. The synchronized track drives
//! hotspot direction selection: once any held direction passes the initial
//! delay, one shared timer re-fires every held direction together so two
//! perpendicular directions land as one diagonal step.

use super::buttons::Button;
use super::command::{Command, LayerId};

/// A repeat to execute this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    pub button: Button,
    pub command: Command,
    pub origin: LayerId,
}

#[derive(Debug, Clone, Copy)]
struct ExclusiveTrack {
    repeat: Repeat,
    elapsed_ms: u32,
    next_ms: u32,
}

#[derive(Debug, Default)]
pub struct ExclusiveRepeat {
    track: Option<ExclusiveTrack>,
}

impl ExclusiveRepeat {
    /// Start repeating `command` for `button`, superseding any other
    pub fn trigger(&mut self, button: Button, command: Command, origin: LayerId, delay_ms: u32) {
        self.track = Some(ExclusiveTrack {
            repeat: Repeat {
                button,
                command,
                origin,
            },
            elapsed_ms: 0,
            next_ms: delay_ms,
        });
    }

    pub fn release(&mut self, button: Button) {
        if self.track.is_some_and(|t| t.repeat.button == button) {
            self.track = None;
        }
    }

    pub fn current(&self) -> Option<Button> {
        self.track.map(|t| t.repeat.button)
    }

    pub fn reset(&mut self) {
        self.track = None;
    }

    /// Advance the timer; at most one repeat per frame
    pub fn tick(&mut self, elapsed_ms: u32, rate_ms: u32) -> Option<Repeat> {
        let track = self.track.as_mut()?;
        track.elapsed_ms = track.elapsed_ms.saturating_add(elapsed_ms);
        if track.elapsed_ms < track.next_ms {
            return None;
        }
        track.next_ms = track.next_ms.saturating_add(rate_ms.max(1));
        if track.elapsed_ms >= track.next_ms {
            // Long frame: skip the backlog instead of bursting
            track.next_ms = track.elapsed_ms.saturating_add(rate_ms.max(1));
        }
        Some(track.repeat)
    }
}

#[derive(Debug, Clone, Copy)]
struct SyncEntry {
    repeat: Repeat,
    held_ms: u32,
}

#[derive(Debug, Default)]
pub struct SyncRepeat {
    held: Vec<SyncEntry>,
    /// Time since the shared timer last started or fired
    shared_ms: Option<u32>,
}

impl SyncRepeat {
    /// Track a freshly pressed qualifying direction
    pub fn track(&mut self, button: Button, command: Command, origin: LayerId) {
        self.held.retain(|e| e.repeat.button != button);
        self.held.push(SyncEntry {
            repeat: Repeat {
                button,
                command,
                origin,
            },
            held_ms: 0,
        });
    }

    pub fn release(&mut self, button: Button) {
        self.held.retain(|e| e.repeat.button != button);
        if self.held.is_empty() {
            self.shared_ms = None;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared_ms.is_some()
    }

    pub fn reset(&mut self) {
        self.held.clear();
        self.shared_ms = None;
    }

    /// Advance the timers; returns every held direction when the shared
    /// timer elapses
    pub fn tick(&mut self, elapsed_ms: u32, delay_ms: u32, rate_ms: u32) -> Vec<Repeat> {
        for entry in &mut self.held {
            entry.held_ms = entry.held_ms.saturating_add(elapsed_ms);
        }
        match self.shared_ms.as_mut() {
            None => {
                if self.held.iter().any(|e| e.held_ms >= delay_ms) {
                    self.shared_ms = Some(0);
                }
                Vec::new()
            }
            Some(shared) => {
                *shared = shared.saturating_add(elapsed_ms);
                if *shared < rate_ms {
                    return Vec::new();
                }
                *shared = 0;
                self.held.iter().map(|e| e.repeat).collect()
            }
        }
    }
}
