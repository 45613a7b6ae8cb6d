//! Control-surface boundary: input events in, light snapshots out
//!
//! The device driver is external. It delivers [`SurfaceEvent`]s over a
//! channel the controller consumes, and accepts one [`Lights`] snapshot per
//! render cycle plus an occasional status line through [`ControlSurface`].

use crate::error::Result;

/// Number of velocity-sensitive pads on the surface
pub const PAD_COUNT: usize = 16;

/// Number of logical buttons in [`Button::ALL`]
pub const BUTTON_COUNT: usize = 6;

/// Pad identity, `0..PAD_COUNT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pad(u8);

impl Pad {
    pub fn new(index: usize) -> Option<Self> {
        (index < PAD_COUNT).then(|| Pad(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Pad> {
        (0..PAD_COUNT as u8).map(Pad)
    }
}

/// Logical buttons the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Enter color-picking mode
    PadMode,
    /// Enter step-editing mode
    Step,
    /// Enter pattern-slot selection mode
    Pattern,
    /// Enter live (momentary) mode
    Keyboard,
    ArrowLeft,
    ArrowRight,
}

impl Button {
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::PadMode,
        Button::Step,
        Button::Pattern,
        Button::Keyboard,
        Button::ArrowLeft,
        Button::ArrowRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAction {
    Touched,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadEvent {
    pub pad: Pad,
    /// Pressure in `0..=4095`
    pub velocity: u16,
    pub action: PadAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The set of buttons currently held down
    Buttons(Vec<Button>),
    Pad(PadEvent),
}

/// Named colors the pad LEDs can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PadColor {
    Off,
    Red,
    Orange,
    LightOrange,
    WarmYellow,
    Yellow,
    Lime,
    Green,
    Mint,
    Cyan,
    Turquoise,
    Blue,
    Plum,
    Violet,
    Purple,
    Magenta,
    Fuchsia,
    White,
}

impl PadColor {
    pub const ALL: [PadColor; 18] = [
        PadColor::Off,
        PadColor::Red,
        PadColor::Orange,
        PadColor::LightOrange,
        PadColor::WarmYellow,
        PadColor::Yellow,
        PadColor::Lime,
        PadColor::Green,
        PadColor::Mint,
        PadColor::Cyan,
        PadColor::Turquoise,
        PadColor::Blue,
        PadColor::Plum,
        PadColor::Violet,
        PadColor::Purple,
        PadColor::Magenta,
        PadColor::Fuchsia,
        PadColor::White,
    ];
}

/// Brightness of a colored pad LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightLevel {
    Faded,
    Low,
    High,
}

/// Brightness of a single-color button LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intensity {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadLight {
    pub color: PadColor,
    pub level: LightLevel,
}

impl Default for PadLight {
    fn default() -> Self {
        Self {
            color: PadColor::Off,
            level: LightLevel::Low,
        }
    }
}

/// Full light state of the surface for one render cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lights {
    pub pads: [PadLight; PAD_COUNT],
    pub buttons: [Intensity; BUTTON_COUNT],
}

impl Lights {
    pub fn pad(&self, pad: Pad) -> PadLight {
        self.pads[pad.index()]
    }

    pub fn button(&self, button: Button) -> Intensity {
        self.buttons[button.index()]
    }
}

/// Output side of a control-surface driver
pub trait ControlSurface {
    fn set_lights(&mut self, lights: &Lights) -> Result<()>;

    /// Show a short status line (active channel etc.)
    fn set_status(&mut self, status: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_bounds() {
        assert_eq!(Pad::new(0).map(Pad::index), Some(0));
        assert_eq!(Pad::new(15).map(Pad::index), Some(15));
        assert!(Pad::new(16).is_none());
        assert_eq!(Pad::all().count(), PAD_COUNT);
    }

    #[test]
    fn test_button_indices_cover_light_array() {
        for (i, b) in Button::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
        }
    }
}
