//! Command values
//!
//! A `Command` is one action bound to one (layer, button, slot). Commands are
//! small `Copy` values; equality compares the tag and every field.

use super::buttons::Direction;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u16);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Index of a layer definition in the profile
    LayerId
);
id_type!(
    /// Downstream key code, opaque to the engine
    KeyCode
);
id_type!(
    /// Named keybind understood by the dispatcher
    KeybindId
);
id_type!(
    /// Index of a keybind cycle in the profile
    CycleId
);
id_type!(MenuId);
id_type!(
    /// Chat text entry, resolved to a string by the dispatcher
    TextId
);
id_type!(VarId);

impl LayerId {
    /// The root layer, always active and always first in the order
    pub const ROOT: LayerId = LayerId(0);
}

/// Continuous output channels accumulated once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Move,
    Turn,
    Strafe,
    LookX,
    MouseX,
    MouseY,
    Wheel,
}

impl Channel {
    /// Can a held button switch from `self` to `other` mid-press?
    ///
    /// Turn, strafe and look-X steer the same horizontal axis and may swap
    /// among each other. Every other channel only matches itself.
    pub fn hot_swappable(self, other: Channel) -> bool {
        const STEERING: [Channel; 3] = [Channel::Turn, Channel::Strafe, Channel::LookX];
        self == other || (STEERING.contains(&self) && STEERING.contains(&other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Command {
    /// Nothing bound; a higher layer's `Defer` cannot replace real bindings
    #[default]
    Unassigned,
    /// Explicit pass-through to lower layers
    Defer,
    /// Explicitly inert; hides lower layers
    DoNothing,
    TapKey(KeyCode),
    /// Key stays down downstream until the button is released
    HoldKey(KeyCode),
    ReleaseKey(KeyCode),
    ChatText(TextId),
    Keybind(KeybindId),
    KeybindCycle {
        cycle: CycleId,
        step: i8,
        wrap: bool,
    },
    AddLayer(LayerId),
    RemoveLayer {
        layer: LayerId,
        forced: bool,
    },
    /// Layer stays active while the triggering button is down
    HoldLayer(LayerId),
    ToggleLayer(LayerId),
    ReplaceLayer {
        remove: LayerId,
        add: LayerId,
    },
    MenuOpen(MenuId),
    MenuNavigate {
        dir: Direction,
        count: u8,
        wrap: bool,
    },
    MenuConfirm,
    MenuBack,
    MenuClose,
    SelectHotspot(Direction),
    /// Vertical drives move, horizontal drives turn
    MoveTurn(Direction),
    /// Vertical drives move, horizontal drives strafe
    MoveStrafe(Direction),
    /// Vertical drives move, horizontal drives look-X
    MoveLook(Direction),
    MouseMove(Direction),
    Scroll {
        dir: Direction,
        stepped: bool,
    },
    SetVariable {
        var: VarId,
        value: i16,
    },
    ReloadProfile,
    LaunchLayoutEditor,
    ReselectSyncFile,
    Quit,
}

impl Command {
    /// Does this slot carry a real binding (including `DoNothing`)?
    pub fn is_bound(&self) -> bool {
        !matches!(self, Command::Unassigned | Command::Defer)
    }

    /// Does firing this command have no effect at all?
    pub fn is_no_op(&self) -> bool {
        matches!(
            self,
            Command::Unassigned | Command::Defer | Command::DoNothing
        )
    }

    pub fn direction(&self) -> Option<Direction> {
        match *self {
            Command::MenuNavigate { dir, .. }
            | Command::Scroll { dir, .. }
            | Command::SelectHotspot(dir)
            | Command::MoveTurn(dir)
            | Command::MoveStrafe(dir)
            | Command::MoveLook(dir)
            | Command::MouseMove(dir) => Some(dir),
            _ => None,
        }
    }

    /// Copy with the direction field replaced; other commands are unchanged
    pub fn with_direction(self, new_dir: Direction) -> Command {
        match self {
            Command::MenuNavigate { count, wrap, .. } => Command::MenuNavigate {
                dir: new_dir,
                count,
                wrap,
            },
            Command::Scroll { stepped, .. } => Command::Scroll {
                dir: new_dir,
                stepped,
            },
            Command::SelectHotspot(_) => Command::SelectHotspot(new_dir),
            Command::MoveTurn(_) => Command::MoveTurn(new_dir),
            Command::MoveStrafe(_) => Command::MoveStrafe(new_dir),
            Command::MoveLook(_) => Command::MoveLook(new_dir),
            Command::MouseMove(_) => Command::MouseMove(new_dir),
            other => other,
        }
    }

    /// Can this command point in `dir`? The wheel only scrolls vertically.
    pub fn supports_direction(&self, dir: Direction) -> bool {
        match self {
            Command::Scroll { .. } => dir.is_vertical(),
            _ => true,
        }
    }

    /// Commands driven every held frame by the analog blender
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            Command::MoveTurn(_)
                | Command::MoveStrafe(_)
                | Command::MoveLook(_)
                | Command::MouseMove(_)
                | Command::Scroll { .. }
        )
    }

    /// Output channel and sign of a continuous command
    pub fn axis(&self) -> Option<(Channel, f32)> {
        let (dir, horizontal) = match *self {
            Command::MoveTurn(dir) => (dir, Channel::Turn),
            Command::MoveStrafe(dir) => (dir, Channel::Strafe),
            Command::MoveLook(dir) => (dir, Channel::LookX),
            Command::MouseMove(dir) => {
                let (x, y) = dir.vector();
                return Some(if dir.is_vertical() {
                    (Channel::MouseY, y as f32)
                } else {
                    (Channel::MouseX, x as f32)
                });
            }
            Command::Scroll { dir, .. } => {
                return match dir {
                    Direction::Up => Some((Channel::Wheel, 1.0)),
                    Direction::Down => Some((Channel::Wheel, -1.0)),
                    _ => None,
                };
            }
            _ => return None,
        };
        let (x, y) = dir.vector();
        if dir.is_vertical() {
            // Up means forward
            Some((Channel::Move, -(y as f32)))
        } else {
            Some((horizontal, x as f32))
        }
    }

    pub fn channel(&self) -> Option<Channel> {
        self.axis().map(|(channel, _)| channel)
    }

    /// Repeatable on the exclusive auto-repeat track
    pub fn repeats_exclusively(&self) -> bool {
        matches!(
            self,
            Command::MenuNavigate { .. } | Command::KeybindCycle { .. }
        )
    }

    /// Repeatable on the synchronized hotspot track
    pub fn repeats_synchronized(&self) -> bool {
        matches!(self, Command::SelectHotspot(_))
    }
}
