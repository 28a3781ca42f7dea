use super::Display;

/// Percentage drawn as a completely filled bar.
pub const FULL_SCALE: f32 = 99.0;

/// Number of scale ticks along a bar.
const SCALE_TICKS: u32 = 10;

/// Clamps a raw percentage into the drawable range `[0, 99]`.
///
/// Anything at or above 99 (including 100) renders full-scale; NaN renders
/// empty.
pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, FULL_SCALE)
    }
}

/// Width of the filled part of a bar `box_width` pixels wide.
pub fn fill_width(value: f32, box_width: u32) -> u32 {
    let fraction = f64::from(clamp_percent(value)) / f64::from(FULL_SCALE);
    (fraction * f64::from(box_width)).floor() as u32
}

/// X offsets of the scale ticks, at ten equal intervals from the left edge.
pub fn scale_marks(box_width: u32) -> impl Iterator<Item = u32> {
    (0..SCALE_TICKS).map(move |i| i * box_width / SCALE_TICKS)
}

/// A boxed horizontal bar that fills left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarGraph {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub show_scale: bool,
}

impl BarGraph {
    /// Draws the outline, then the fill for `value` when there is one.
    pub fn draw<D: Display + ?Sized>(&self, display: &mut D, value: Option<f32>) {
        let Self {
            x,
            y,
            width,
            height,
            show_scale,
        } = *self;

        display.draw_rect(x, y, width, height);

        if let Some(value) = value {
            let filled = fill_width(value, width);
            if filled > 0 {
                display.fill_rect(x, y, filled, height.saturating_sub(1));
            }
        }

        if show_scale && height >= 2 {
            for offset in scale_marks(width) {
                display.draw_vline(x.saturating_add(offset), y.saturating_add(height - 2), 2);
            }
        }
    }
}
