//! Drawing surface used by the render loop, and the bar-graph geometry
//! drawn onto it.

pub mod bar;
pub mod framebuffer;
pub mod terminal;

pub use bar::{clamp_percent, fill_width, scale_marks, BarGraph, FULL_SCALE};
pub use framebuffer::Framebuffer;
pub use terminal::TerminalDisplay;

use crate::Result;

/// Pixel-level primitives of a small monochrome panel.
///
/// Coordinates are pixels from the top-left corner; anything outside the
/// surface is clipped by the implementation.
pub trait Display {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self);
    fn draw_text(&mut self, text: &str, x: u32, y: u32);
    /// One-pixel outline.
    fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32);
    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32);
    fn draw_vline(&mut self, x: u32, y: u32, len: u32);
    /// Pushes the drawn frame to the physical surface.
    fn present(&mut self) -> Result<()>;
}
