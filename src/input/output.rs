//! Engine inputs and per-frame outputs

use super::analog::{AxisAccumulator, Axes};
use super::buttons::{Button, Direction};
use super::command::{Command, KeyCode, KeybindId, LayerId, MenuId, TextId, VarId};
use super::engine::EngineError;

/// Per-frame view of the controller
pub trait ButtonSource {
    fn is_held(&self, button: Button) -> bool;

    /// True exactly once, on the frame the button went down
    ///
    /// For a multi-directional button that is the frame its first direction
    /// went down; adding a second direction while one is held is not a hit.
    fn was_hit(&self, button: Button) -> bool;

    /// Analog reading 0-255; digital-only buttons report 0
    fn analog_value(&self, button: Button) -> u8 {
        let _ = button;
        0
    }
}

/// Collaborators called synchronously while commands execute
pub trait Host {
    /// Press or release a key downstream right away
    fn hold_key(&mut self, key: KeyCode, down: bool) {
        let _ = (key, down);
    }

    /// Handle a menu request; may return one command to run in its place
    fn menu(&mut self, request: MenuRequest) -> Option<Command> {
        let _ = request;
        None
    }
}

/// Host that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuRequest {
    Open(MenuId),
    Navigate {
        dir: Direction,
        count: u8,
        wrap: bool,
    },
    Confirm,
    Back,
    Close,
}

/// Discrete actions for the downstream dispatcher, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    KeyTap(KeyCode),
    KeyRelease(KeyCode),
    Text(TextId),
    Keybind(KeybindId),
    Menu(MenuRequest),
}

/// Requests routed to the application rather than the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    SetVariable { var: VarId, value: i16 },
    ReloadProfile,
    LaunchLayoutEditor,
    ReselectSyncFile,
    Quit,
}

/// 8-way hotspot selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotspotDir {
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl HotspotDir {
    /// Direction of a summed (x, y) step, y down; `None` when it cancels out
    pub fn from_vector(x: i8, y: i8) -> Option<HotspotDir> {
        match (x.signum(), y.signum()) {
            (0, -1) => Some(HotspotDir::Up),
            (1, -1) => Some(HotspotDir::UpRight),
            (1, 0) => Some(HotspotDir::Right),
            (1, 1) => Some(HotspotDir::DownRight),
            (0, 1) => Some(HotspotDir::Down),
            (-1, 1) => Some(HotspotDir::DownLeft),
            (-1, 0) => Some(HotspotDir::Left),
            (-1, -1) => Some(HotspotDir::UpLeft),
            _ => None,
        }
    }
}

/// Everything one `update` produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub actions: Vec<Output>,
    pub axes: Axes,
    pub hotspot: Option<HotspotDir>,
    /// Layers whose active status changed, first change first
    pub changed_layers: Vec<LayerId>,
    pub effects: Vec<SideEffect>,
    /// Fatal layer error raised this frame
    pub fault: Option<EngineError>,
}

impl FrameOutput {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
            && self.axes.is_idle()
            && self.hotspot.is_none()
            && self.changed_layers.is_empty()
            && self.effects.is_empty()
            && self.fault.is_none()
    }
}

/// Output under construction during a frame
#[derive(Debug, Default)]
pub(crate) struct FrameBuilder {
    pub actions: Vec<Output>,
    pub axes: AxisAccumulator,
    hotspot: Option<(i8, i8)>,
    pub effects: Vec<SideEffect>,
    pub fault: Option<EngineError>,
}

impl FrameBuilder {
    pub fn select_hotspot(&mut self, dir: Direction) {
        let (dx, dy) = dir.vector();
        let (x, y) = self.hotspot.unwrap_or((0, 0));
        self.hotspot = Some(((x + dx).clamp(-1, 1), (y + dy).clamp(-1, 1)));
    }

    pub fn record_fault(&mut self, err: EngineError) {
        self.fault.get_or_insert(err);
    }

    pub fn finish(self, changed_layers: Vec<LayerId>) -> FrameOutput {
        FrameOutput {
            actions: self.actions,
            axes: self.axes.finish(),
            hotspot: self.hotspot.and_then(|(x, y)| HotspotDir::from_vector(x, y)),
            changed_layers,
            effects: self.effects,
            fault: self.fault,
        }
    }
}

/// Plain `ButtonSource` built up field by field
///
/// A multi-directional button reads as held or hit when any of its four
/// directions does, unless it was set explicitly.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    held: [bool; Button::COUNT],
    hit: [bool; Button::COUNT],
    analog: [u8; Button::COUNT],
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Still down from an earlier frame
    pub fn hold(mut self, button: Button) -> Self {
        self.held[button.index()] = true;
        self
    }

    /// Went down this frame and is still down
    pub fn press(mut self, button: Button) -> Self {
        self.held[button.index()] = true;
        self.hit[button.index()] = true;
        self
    }

    /// Went down and came back up within this frame
    pub fn tap(mut self, button: Button) -> Self {
        self.hit[button.index()] = true;
        self
    }

    /// Analog reading; a non-zero value also counts as held
    pub fn analog(mut self, button: Button, value: u8) -> Self {
        self.analog[button.index()] = value;
        self.held[button.index()] |= value > 0;
        self
    }

    fn any_child(&self, button: Button, flags: &[bool; Button::COUNT]) -> bool {
        button
            .children()
            .is_some_and(|children| children.iter().any(|c| flags[c.index()]))
    }

    /// Some direction was already down before this frame
    fn child_held_over(&self, button: Button) -> bool {
        button.children().is_some_and(|children| {
            children
                .iter()
                .any(|c| self.held[c.index()] && !self.hit[c.index()])
        })
    }
}

impl ButtonSource for InputSnapshot {
    fn is_held(&self, button: Button) -> bool {
        self.held[button.index()] || self.any_child(button, &self.held)
    }

    fn was_hit(&self, button: Button) -> bool {
        self.hit[button.index()]
            || (self.any_child(button, &self.hit) && !self.child_held_over(button))
    }

    fn analog_value(&self, button: Button) -> u8 {
        self.analog[button.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotspot_combines_diagonals() {
        let mut frame = FrameBuilder::default();
        frame.select_hotspot(Direction::Up);
        frame.select_hotspot(Direction::Right);
        assert_eq!(frame.finish(Vec::new()).hotspot, Some(HotspotDir::UpRight));

        let mut frame = FrameBuilder::default();
        frame.select_hotspot(Direction::Left);
        frame.select_hotspot(Direction::Right);
        assert_eq!(frame.finish(Vec::new()).hotspot, None);
    }

    #[test]
    fn test_repeated_direction_stays_unit() {
        let mut frame = FrameBuilder::default();
        frame.select_hotspot(Direction::Down);
        frame.select_hotspot(Direction::Down);
        assert_eq!(frame.finish(Vec::new()).hotspot, Some(HotspotDir::Down));
    }

    #[test]
    fn test_snapshot_derives_multi_directional() {
        let input = InputSnapshot::new().press(Button::DPadLeft);
        assert!(input.is_held(Button::DPad));
        assert!(input.was_hit(Button::DPad));
        assert!(!input.is_held(Button::LStick));

        let tap = InputSnapshot::new().tap(Button::A);
        assert!(tap.was_hit(Button::A) && !tap.is_held(Button::A));
    }

    #[test]
    fn test_second_direction_is_not_a_new_hit() {
        let input = InputSnapshot::new()
            .hold(Button::DPadUp)
            .press(Button::DPadRight);
        assert!(input.is_held(Button::DPad));
        assert!(!input.was_hit(Button::DPad));
        assert!(input.was_hit(Button::DPadRight));

        // Both directions arriving together is still one down-edge
        let both = InputSnapshot::new()
            .press(Button::LStickUp)
            .press(Button::LStickLeft);
        assert!(both.was_hit(Button::LStick));
    }

    #[test]
    fn test_first_fault_wins() {
        let mut frame = FrameBuilder::default();
        frame.record_fault(EngineError::LayerCascadeOverflow { limit: 32 });
        frame.record_fault(EngineError::SortDidNotConverge { passes: 16 });
        assert_eq!(
            frame.finish(Vec::new()).fault,
            Some(EngineError::LayerCascadeOverflow { limit: 32 })
        );
    }
}
