//! Immutable lookup tables for the authoring surface
//!
//! Built once at startup and shared by reference: named color values,
//! the pad → swatch layout used for picking and live play, and the
//! mode-selection buttons.

use crate::color::Rgba;
use crate::controller::PadMode;
use crate::surface::{Button, Pad, PadColor, PAD_COUNT};

/// RGBA value of every named pad color, indexed by `PadColor as usize`
const COLOR_VALUES: [Rgba; 18] = [
    Rgba::new(0, 0, 0, 255),       // Off
    Rgba::new(255, 0, 0, 255),     // Red
    Rgba::new(255, 110, 65, 255),  // Orange
    Rgba::new(255, 154, 18, 255),  // LightOrange
    Rgba::new(255, 215, 0, 255),   // WarmYellow
    Rgba::new(255, 255, 0, 255),   // Yellow
    Rgba::new(172, 255, 47, 255),  // Lime
    Rgba::new(0, 255, 0, 255),     // Green
    Rgba::new(0, 255, 172, 255),   // Mint
    Rgba::new(0, 255, 255, 255),   // Cyan
    Rgba::new(0, 202, 255, 255),   // Turquoise
    Rgba::new(0, 48, 255, 255),    // Blue
    Rgba::new(66, 50, 210, 255),   // Plum
    Rgba::new(116, 48, 211, 255),  // Violet
    Rgba::new(211, 50, 245, 255),  // Purple
    Rgba::new(255, 0, 255, 255),   // Magenta
    Rgba::new(255, 0, 136, 255),   // Fuchsia
    Rgba::new(255, 255, 255, 255), // White
];

/// Swatch under each pad, bottom row first
const SWATCHES: [PadColor; PAD_COUNT] = [
    PadColor::Violet,
    PadColor::Purple,
    PadColor::Magenta,
    PadColor::Fuchsia,
    PadColor::Mint,
    PadColor::Turquoise,
    PadColor::Blue,
    PadColor::Plum,
    PadColor::WarmYellow,
    PadColor::Yellow,
    PadColor::Lime,
    PadColor::Green,
    PadColor::White,
    PadColor::Red,
    PadColor::Orange,
    PadColor::LightOrange,
];

#[derive(Debug, Clone)]
pub struct Palette {
    values: [Rgba; 18],
    swatches: [Option<PadColor>; PAD_COUNT],
    mode_buttons: [(Button, PadMode); 4],
}

impl Palette {
    pub fn new() -> Self {
        Self {
            values: COLOR_VALUES,
            swatches: SWATCHES.map(Some),
            mode_buttons: [
                (Button::PadMode, PadMode::Color),
                (Button::Step, PadMode::Step),
                (Button::Pattern, PadMode::Pattern),
                (Button::Keyboard, PadMode::Live),
            ],
        }
    }

    pub fn rgba(&self, color: PadColor) -> Rgba {
        self.values[color as usize]
    }

    /// Swatch mapped to `pad`, if any
    pub fn swatch_for(&self, pad: Pad) -> Option<PadColor> {
        self.swatches[pad.index()]
    }

    /// Mode selected by `button`, if it is a mode button
    pub fn mode_for(&self, button: Button) -> Option<PadMode> {
        self.mode_buttons
            .iter()
            .find(|(b, _)| *b == button)
            .map(|(_, mode)| *mode)
    }

    /// Named color closest to `color`
    ///
    /// Squared distance over all four channels; ties go to the color listed
    /// first, so pure black always classifies as [`PadColor::Off`].
    pub fn nearest(&self, color: Rgba) -> PadColor {
        let distance = |c: Rgba| {
            let d = |a: u8, b: u8| {
                let x = a as i32 - b as i32;
                (x * x) as u32
            };
            d(c.r, color.r) + d(c.g, color.g) + d(c.b, color.b) + d(c.a, color.a)
        };

        let mut best = PadColor::Off;
        let mut best_distance = u32::MAX;
        for named in PadColor::ALL {
            let dist = distance(self.rgba(named));
            if dist < best_distance {
                best = named;
                best_distance = dist;
                if dist == 0 {
                    break;
                }
            }
        }
        best
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}
