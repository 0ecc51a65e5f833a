//! Button catalog
//!
//! Every physical or virtual input channel has a fixed numeric identity.
//! Stick and pad directions are separate channels, and each stick/pad also
//! has one synthetic any-direction channel that is held whenever any of its
//! four directions is.

/// One of the four cardinal directions of a stick or pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector, y grows downward
    pub fn vector(self) -> (i8, i8) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// Input channel identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Button {
    A = 0,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    LeftStickClick,
    RightStickClick,
    Back,
    Start,
    Guide,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    DPad,
    LStickUp,
    LStickDown,
    LStickLeft,
    LStickRight,
    LStick,
    RStickUp,
    RStickDown,
    RStickLeft,
    RStickRight,
    RStick,
}

impl Button {
    pub const COUNT: usize = Button::RStick as usize + 1;

    pub const ALL: [Button; Button::COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::LeftTrigger,
        Button::RightTrigger,
        Button::LeftStickClick,
        Button::RightStickClick,
        Button::Back,
        Button::Start,
        Button::Guide,
        Button::DPadUp,
        Button::DPadDown,
        Button::DPadLeft,
        Button::DPadRight,
        Button::DPad,
        Button::LStickUp,
        Button::LStickDown,
        Button::LStickLeft,
        Button::LStickRight,
        Button::LStick,
        Button::RStickUp,
        Button::RStickDown,
        Button::RStickLeft,
        Button::RStickRight,
        Button::RStick,
    ];

    /// The synthetic any-direction buttons
    pub const MULTI_DIRECTIONAL: [Button; 3] = [Button::DPad, Button::LStick, Button::RStick];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Button> {
        Button::ALL.get(index).copied()
    }

    /// Is this a synthetic any-direction channel?
    pub fn is_multi_directional(self) -> bool {
        matches!(self, Button::DPad | Button::LStick | Button::RStick)
    }

    /// Direction channels of a synthetic button, in `Direction::ALL` order
    pub fn children(self) -> Option<[Button; 4]> {
        match self {
            Button::DPad => Some([
                Button::DPadUp,
                Button::DPadDown,
                Button::DPadLeft,
                Button::DPadRight,
            ]),
            Button::LStick => Some([
                Button::LStickUp,
                Button::LStickDown,
                Button::LStickLeft,
                Button::LStickRight,
            ]),
            Button::RStick => Some([
                Button::RStickUp,
                Button::RStickDown,
                Button::RStickLeft,
                Button::RStickRight,
            ]),
            _ => None,
        }
    }

    /// Synthetic button owning this direction channel
    pub fn parent(self) -> Option<Button> {
        match self {
            Button::DPadUp | Button::DPadDown | Button::DPadLeft | Button::DPadRight => {
                Some(Button::DPad)
            }
            Button::LStickUp | Button::LStickDown | Button::LStickLeft | Button::LStickRight => {
                Some(Button::LStick)
            }
            Button::RStickUp | Button::RStickDown | Button::RStickLeft | Button::RStickRight => {
                Some(Button::RStick)
            }
            _ => None,
        }
    }

    /// Direction of a direction channel
    pub fn direction(self) -> Option<Direction> {
        let parent = self.parent()?;
        let children = parent.children()?;
        children
            .iter()
            .position(|&c| c == self)
            .map(|i| Direction::ALL[i])
    }
}

/// Bounded shared set of buttons, used where a `HashSet` would be overkill
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonMask(u32);

impl ButtonMask {
    pub fn insert(&mut self, button: Button) {
        self.0 |= 1u32 << button.index();
    }

    pub fn remove(&mut self, button: Button) {
        self.0 &= !(1u32 << button.index());
    }

    pub fn contains(&self, button: Button) -> bool {
        self.0 & (1u32 << button.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.into_iter().filter(|b| self.contains(*b))
    }
}
