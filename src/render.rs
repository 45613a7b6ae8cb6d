//! Frame builders for the render callback
//!
//! Clients agree on a frame format out of band; these cover the two the
//! deployment uses, a solid screen image and a DMX universe.

use crate::color::Rgba;

/// Number of slots in one DMX universe
pub const DMX_SLOTS: usize = 512;

/// Packed RGBA8 pixel buffer, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaFrame {
    /// Frame filled with a single color
    pub fn solid(color: Rgba, width: u32, height: u32) -> Self {
        let count = width as usize * height as usize;
        let pixels = color.to_array().repeat(count);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes: [u8; 4] = self.pixels[offset..offset + 4].try_into().ok()?;
        Some(Rgba::from_array(bytes))
    }
}

/// One DMX universe; slot numbering starts at 1 as on the fixtures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxUniverse {
    slots: [u8; DMX_SLOTS],
}

impl DmxUniverse {
    /// Universe driving an RGB fixture patched at slot 1
    pub fn from_color(color: Rgba) -> Self {
        let mut slots = [0u8; DMX_SLOTS];
        slots[0] = color.r;
        slots[1] = color.g;
        slots[2] = color.b;
        Self { slots }
    }

    /// Value of 1-based `slot`
    pub fn slot(&self, slot: usize) -> Option<u8> {
        slot.checked_sub(1).and_then(|i| self.slots.get(i).copied())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_is_uniform() {
        let color = Rgba::new(10, 20, 30, 255);
        let frame = RgbaFrame::solid(color, 640, 480);
        assert_eq!(frame.pixels.len(), 640 * 480 * 4);
        assert_eq!(frame.pixel(0, 0), Some(color));
        assert_eq!(frame.pixel(639, 479), Some(color));
        assert_eq!(frame.pixel(640, 0), None);
    }

    #[test]
    fn test_dmx_puts_rgb_in_first_three_slots() {
        let universe = DmxUniverse::from_color(Rgba::new(255, 128, 7, 99));
        assert_eq!(universe.slot(1), Some(255));
        assert_eq!(universe.slot(2), Some(128));
        assert_eq!(universe.slot(3), Some(7));
        assert_eq!(universe.slot(4), Some(0));
        assert_eq!(universe.slot(0), None);
        assert_eq!(universe.slot(513), None);
        assert_eq!(universe.as_bytes().len(), DMX_SLOTS);
    }
}
