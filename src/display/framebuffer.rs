use super::Display;
use crate::Result;

/// Width of one glyph cell, matching the 8x8 font of SSD1306-class panels.
pub const GLYPH_WIDTH: u32 = 8;

/// A text run placed on the framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub x: u32,
    pub y: u32,
    pub text: String,
}

/// In-memory monochrome canvas.
///
/// Shapes are rasterized into a pixel grid; text is kept as positioned runs
/// so callers without a font can still inspect or reproduce it.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
    text: Vec<TextRun>,
    presented: u64,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; (width as usize).saturating_mul(height as usize)],
            text: Vec::new(),
            presented: 0,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.pixels[self.index(x, y)]
    }

    pub fn text_runs(&self) -> &[TextRun] {
        &self.text
    }

    /// Whether any text run contains `needle`.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.text.iter().any(|run| run.text.contains(needle))
    }

    /// Number of lit pixels in row `y` between `x` and `x + w`.
    pub fn lit_in_row(&self, x: u32, y: u32, w: u32) -> u32 {
        (x..x.saturating_add(w))
            .filter(|px| self.pixel(*px, y))
            .count() as u32
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn set(&mut self, x: u32, y: u32) {
        if x < self.width && y < self.height {
            let at = self.index(x, y);
            self.pixels[at] = true;
        }
    }
}

impl Display for Framebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.pixels.iter_mut().for_each(|px| *px = false);
        self.text.clear();
    }

    fn draw_text(&mut self, text: &str, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let room = ((self.width - x) / GLYPH_WIDTH) as usize;
        let clipped: String = text.chars().take(room).collect();
        if !clipped.is_empty() {
            self.text.push(TextRun {
                x,
                y,
                text: clipped,
            });
        }
    }

    fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        if w == 0 || h == 0 {
            return;
        }
        let (right, bottom) = (x.saturating_add(w - 1), y.saturating_add(h - 1));
        for px in x..=right {
            self.set(px, y);
            self.set(px, bottom);
        }
        for py in y..=bottom {
            self.set(x, py);
            self.set(right, py);
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        for py in y..y.saturating_add(h) {
            for px in x..x.saturating_add(w) {
                self.set(px, py);
            }
        }
    }

    fn draw_vline(&mut self, x: u32, y: u32, len: u32) {
        for py in y..y.saturating_add(len) {
            self.set(x, py);
        }
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_outline_leaves_interior_dark() {
        let mut fb = Framebuffer::new(16, 8);
        fb.draw_rect(2, 1, 5, 4);
        assert!(fb.pixel(2, 1));
        assert!(fb.pixel(6, 4));
        assert!(!fb.pixel(4, 2));
    }

    #[test]
    fn shapes_clip_at_edges() {
        let mut fb = Framebuffer::new(8, 8);
        fb.fill_rect(6, 6, 10, 10);
        fb.draw_vline(7, 5, 100);
        assert!(fb.pixel(7, 7));
        assert!(!fb.pixel(8, 8));
    }

    #[test]
    fn outline_near_the_coordinate_limit_does_not_overflow() {
        let mut fb = Framebuffer::new(8, 8);
        fb.draw_rect(u32::MAX - 1, 6, 10, 10);
        fb.draw_rect(6, u32::MAX, 10, 10);
        assert_eq!(fb.lit_in_row(0, 7, 8), 0);
    }

    #[test]
    fn text_is_clipped_to_width_and_cleared() {
        let mut fb = Framebuffer::new(32, 8);
        fb.draw_text("CPU LOAD", 8, 0);
        assert_eq!(fb.text_runs()[0].text, "CPU");
        fb.clear();
        assert!(fb.text_runs().is_empty());
    }
}
