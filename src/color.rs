//! RGBA colors and live-mode compositing

use std::fmt;

/// Upper bound of pad pressure reported by the control surface
pub const MAX_VELOCITY: u16 = 4095;

/// 8-bit straight-alpha RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Fully opaque black, the value of every fresh pattern step
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::BLACK
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Scale a pad pressure in `0..=4095` to an alpha in `0..=255`
///
/// Values above the device maximum are clamped.
pub fn scale_velocity(velocity: u16) -> u8 {
    let v = velocity.min(MAX_VELOCITY) as u32;
    (v * 255 / MAX_VELOCITY as u32) as u8
}

/// Composite colors with sequential Porter-Duff "over"
///
/// Starts from transparent black and folds each color into the accumulator
/// in slice order, the accumulator staying on top. Channels are truncated to
/// 8 bits after every step. An empty slice yields [`Rgba::TRANSPARENT`].
pub fn blend_over(colors: &[Rgba]) -> Rgba {
    let mut result = Rgba::TRANSPARENT;

    for c in colors {
        let a1 = result.a as f64 / 255.0;
        let a2 = c.a as f64 / 255.0;

        let a_out = a1 + a2 * (1.0 - a1);
        if a_out == 0.0 {
            continue;
        }

        let mix = |top: u8, under: u8| {
            ((top as f64 * a1 + under as f64 * a2 * (1.0 - a1)) / a_out) as u8
        };

        result = Rgba::new(
            mix(result.r, c.r),
            mix(result.g, c.g),
            mix(result.b, c.b),
            (a_out * 255.0) as u8,
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_opaque_black() {
        assert_eq!(Rgba::default(), Rgba::new(0, 0, 0, 255));
    }

    #[test]
    fn test_scale_velocity_bounds() {
        assert_eq!(scale_velocity(0), 0);
        assert_eq!(scale_velocity(4095), 255);
        assert_eq!(scale_velocity(u16::MAX), 255);
        assert_eq!(scale_velocity(2048), 127);
    }

    #[test]
    fn test_blend_empty_is_transparent() {
        assert_eq!(blend_over(&[]), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_blend_single_opaque_color_is_identity() {
        let red = Rgba::new(255, 0, 0, 255);
        assert_eq!(blend_over(&[red]), red);
    }

    #[test]
    fn test_opaque_accumulator_hides_later_colors() {
        let red = Rgba::new(255, 0, 0, 255);
        let blue = Rgba::new(0, 48, 255, 255);
        assert_eq!(blend_over(&[red, blue]), red);
    }

    #[test]
    fn test_half_alpha_over_opaque() {
        let top = Rgba::new(255, 0, 0, 128);
        let under = Rgba::new(0, 0, 255, 255);
        let out = blend_over(&[top, under]);
        assert!(out.a >= 254, "a = {}", out.a);
        assert!(out.r > 120 && out.r < 135, "r = {}", out.r);
        assert!(out.b > 120 && out.b < 135, "b = {}", out.b);
    }

    #[test]
    fn test_display_hex() {
        assert_eq!(Rgba::new(255, 110, 65, 255).to_string(), "#ff6e41ff");
    }
}
