//! Controller input translation
//!
//! Turns per-frame controller state into keyboard, mouse and menu actions
//! through a stack of binding layers.
//!
//! # Architecture
//!
//! - `profile`: static layer definitions and their bindings
//! - `layers` / `sorter` / `resolver`: active layer set, its order, and the
//!   per-button bindings that order produces
//! - `button_state` / `repeat` / `analog`: per-button lifecycle, auto-repeat
//!   and continuous axes
//! - `processor` / `signals`: command dispatch and deferred signal triggers
//! - `engine`: the per-frame driver owning all of the above
//!
//! Everything is owned by one [`Engine`] value; there is no global state.

pub mod analog;
pub mod button_state;
pub mod buttons;
pub mod command;
pub mod engine;
pub mod layers;
pub mod output;
pub mod processor;
pub mod profile;
pub mod repeat;
pub mod resolver;
pub mod signals;
pub mod sorter;

pub use analog::Axes;
pub use buttons::{Button, Direction};
pub use command::{Command, CycleId, KeyCode, KeybindId, LayerId, MenuId, TextId, VarId};
pub use engine::{Engine, EngineError};
pub use output::{
    ButtonSource, FrameOutput, Host, HotspotDir, InputSnapshot, MenuRequest, NullHost, Output,
    SideEffect,
};
pub use profile::{ActionSlot, BindingSet, LayerDef, Profile, ProfileError};
pub use signals::{Signal, SpecialSignal};
