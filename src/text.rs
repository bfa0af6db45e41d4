//! Text rasterisation for the marquee.
//!
//! A [`GridCanvas`] is an `embedded-graphics` draw target backed by a
//! brightness grid, so any mono font or primitive from that crate can be
//! drawn straight into a matrix frame.

use crate::Grid;
use crate::shapes;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_5X7;
use embedded_graphics::pixelcolor::{Gray8, GrayColor};
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

/// Glyph height of the marquee font, in cells.
pub const FONT_HEIGHT: u32 = 7;

/// Brightness grid exposed as an `embedded-graphics` draw target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCanvas {
    width: u32,
    height: u32,
    pixels: Grid,
}

impl GridCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: shapes::clear(width, height),
        }
    }

    pub fn into_grid(self) -> Grid {
        self.pixels
    }
}

impl OriginDimensions for GridCanvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for GridCanvas {
    type Color = Gray8;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            shapes::set_pixel(
                &mut self.pixels,
                self.width,
                self.height,
                coord.x,
                coord.y,
                color.luma() as i32,
            );
        }
        Ok(())
    }
}

/// Render `text` with its left edge at column `x`, vertically centred.
///
/// Glyphs that fall outside the grid are clipped, so `x` may be negative
/// (text leaving on the left) or beyond the width (text still entering).
pub fn render_line(text: &str, x: i32, width: u32, height: u32, brightness: u8) -> Grid {
    let mut canvas = GridCanvas::new(width, height);
    let y = (height.saturating_sub(FONT_HEIGHT) / 2) as i32;
    let style = MonoTextStyle::new(&FONT_5X7, Gray8::new(brightness));
    // Infallible: drawing into memory cannot fail.
    let _ = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top).draw(&mut canvas);
    canvas.into_grid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit_columns(grid: &[u8], width: u32) -> Vec<u32> {
        let mut cols: Vec<u32> = grid
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0)
            .map(|(i, _)| i as u32 % width)
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    #[test]
    fn grid_has_requested_size() {
        assert_eq!(render_line("Hi", 0, 25, 25, 255).len(), 625);
    }

    #[test]
    fn text_lights_cells_at_full_brightness() {
        let g = render_line("A", 0, 25, 25, 255);
        assert!(g.iter().any(|&v| v == 255));
        assert!(g.iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn text_respects_brightness() {
        let g = render_line("A", 0, 25, 25, 90);
        assert!(g.iter().all(|&v| v == 0 || v == 90));
    }

    #[test]
    fn text_is_vertically_centred() {
        let g = render_line("I", 0, 25, 25, 255);
        let rows: Vec<usize> = g
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0)
            .map(|(i, _)| i / 25)
            .collect();
        assert!(rows.iter().all(|&r| (9..16).contains(&r)), "{rows:?}");
    }

    #[test]
    fn offscreen_text_is_blank() {
        assert!(render_line("Hello", 30, 25, 25, 255).iter().all(|&v| v == 0));
        assert!(render_line("Hello", -40, 25, 25, 255).iter().all(|&v| v == 0));
    }

    #[test]
    fn shifting_x_moves_glyphs() {
        let a = lit_columns(&render_line("I", 2, 25, 25, 255), 25);
        let b = lit_columns(&render_line("I", 5, 25, 25, 255), 25);
        let shifted: Vec<u32> = a.iter().map(|c| c + 3).collect();
        assert_eq!(b, shifted);
    }

    #[test]
    fn canvas_reports_its_size() {
        assert_eq!(GridCanvas::new(7, 3).size(), Size::new(7, 3));
    }
}
