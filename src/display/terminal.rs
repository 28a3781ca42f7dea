use super::{Display, Framebuffer};
use crate::Result;
use crossterm::{
    cursor, style,
    terminal::{self, ClearType},
    ExecutableCommand, QueueableCommand,
};
use std::io::{self, Write};

/// Paints a [`Framebuffer`] into the terminal, two pixel rows per line.
///
/// Stands in for the physical panel when running on a desktop.
pub struct TerminalDisplay<W: Write = io::Stdout> {
    canvas: Framebuffer,
    out: W,
    started: bool,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout(width: u32, height: u32) -> Self {
        Self::new(Framebuffer::new(width, height), io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(canvas: Framebuffer, out: W) -> Self {
        Self {
            canvas,
            out,
            started: false,
        }
    }

    pub fn canvas(&self) -> &Framebuffer {
        &self.canvas
    }

    /// Character rows, each covering two pixel rows.
    fn rows(&self) -> Vec<Vec<char>> {
        let (width, height) = (self.canvas.width(), self.canvas.height());
        let mut rows: Vec<Vec<char>> = (0..height.div_ceil(2))
            .map(|row| {
                (0..width)
                    .map(|x| {
                        let top = self.canvas.pixel(x, row * 2);
                        let bottom = self.canvas.pixel(x, row * 2 + 1);
                        match (top, bottom) {
                            (true, true) => '█',
                            (true, false) => '▀',
                            (false, true) => '▄',
                            (false, false) => ' ',
                        }
                    })
                    .collect()
            })
            .collect();

        // One cell per character, starting at the run's pixel column.
        for run in self.canvas.text_runs() {
            let row = (run.y / 2) as usize;
            let Some(line) = rows.get_mut(row) else {
                continue;
            };
            for (i, ch) in run.text.chars().enumerate() {
                let col = run.x as usize + i;
                if let Some(cell) = line.get_mut(col) {
                    *cell = ch;
                }
            }
        }
        rows
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn clear(&mut self) {
        self.canvas.clear();
    }

    fn draw_text(&mut self, text: &str, x: u32, y: u32) {
        self.canvas.draw_text(text, x, y);
    }

    fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        self.canvas.draw_rect(x, y, w, h);
    }

    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        self.canvas.fill_rect(x, y, w, h);
    }

    fn draw_vline(&mut self, x: u32, y: u32, len: u32) {
        self.canvas.draw_vline(x, y, len);
    }

    fn present(&mut self) -> Result<()> {
        if !self.started {
            self.out
                .execute(terminal::Clear(ClearType::All))?
                .execute(cursor::Hide)?;
            self.started = true;
        }
        for (y, line) in self.rows().into_iter().enumerate() {
            let text: String = line.into_iter().collect();
            self.out
                .queue(cursor::MoveTo(0, y as u16))?
                .queue(style::Print(text))?;
        }
        self.out.flush()?;
        self.canvas.present()
    }
}

impl<W: Write> Drop for TerminalDisplay<W> {
    fn drop(&mut self) {
        if self.started {
            let _ = self.out.execute(cursor::Show);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_writes_half_blocks_and_text() {
        let mut display = TerminalDisplay::new(Framebuffer::new(16, 4), Vec::new());
        display.fill_rect(0, 0, 2, 1);
        display.draw_text("A", 4, 2);
        display.present().unwrap();
        assert_eq!(display.canvas().frames_presented(), 1);

        let rows = display.rows();
        assert_eq!(rows[0][0], '▀');
        assert_eq!(rows[1][4], 'A');

        let out = String::from_utf8_lossy(&display.out).into_owned();
        assert!(out.contains('▀'));
    }
}
