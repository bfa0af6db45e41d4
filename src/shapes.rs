//! Primitive shapes rasterised into brightness grids.
//!
//! Every function is out-of-bounds safe: cells outside `[0,width)×[0,height)`
//! are silently skipped, so callers may pass any `i32` coordinates.

use crate::Grid;

/// Row-major index of `(x, y)`, or `None` when outside the grid.
fn index_of(width: u32, height: u32, x: i64, y: i64) -> Option<usize> {
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return None;
    }
    Some(y as usize * width as usize + x as usize)
}

fn plot(pixels: &mut [u8], width: u32, height: u32, x: i64, y: i64, value: i32) {
    if let Some(cell) = index_of(width, height, x, y).and_then(|i| pixels.get_mut(i)) {
        *cell = value.clamp(0, 255) as u8;
    }
}

/// `n / d` rounded to nearest, halves rounding up.
fn div_round(n: i128, d: i128) -> i128 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    (2 * n + d).div_euclid(2 * d)
}

/// An all-zero grid.
pub fn clear(width: u32, height: u32) -> Grid {
    vec![0; width as usize * height as usize]
}

/// Set one cell, clamping `value` into 0..=255. Out-of-range coordinates
/// (or a grid shorter than `width*height`) leave the grid untouched.
pub fn set_pixel(pixels: &mut [u8], width: u32, height: u32, x: i32, y: i32, value: i32) {
    plot(pixels, width, height, x as i64, y as i64, value);
}

/// Straight line between two points, one cell per step along the major
/// axis with the minor coordinate rounded to nearest.
///
/// Only the part of the major axis that overlaps the grid is walked, so
/// endpoints may lie arbitrarily far outside it.
pub fn line(width: u32, height: u32, x0: i32, y0: i32, x1: i32, y1: i32, value: i32) -> Grid {
    let mut out = clear(width, height);
    if out.is_empty() {
        return out;
    }
    let (x0, y0, x1, y1) = (x0 as i64, y0 as i64, x1 as i64, y1 as i64);
    let (dx, dy) = (x1 - x0, y1 - y0);

    if dx == 0 && dy == 0 {
        plot(&mut out, width, height, x0, y0, value);
    } else if dx.abs() >= dy.abs() {
        let (lo, hi) = (x0.min(x1).max(0), x0.max(x1).min(width as i64 - 1));
        for x in lo..=hi {
            let y = y0 as i128 + div_round((x - x0) as i128 * dy as i128, dx as i128);
            plot(&mut out, width, height, x, y.clamp(-1, height as i128) as i64, value);
        }
    } else {
        let (lo, hi) = (y0.min(y1).max(0), y0.max(y1).min(height as i64 - 1));
        for y in lo..=hi {
            let x = x0 as i128 + div_round((y - y0) as i128 * dx as i128, dy as i128);
            plot(&mut out, width, height, x.clamp(-1, width as i128) as i64, y, value);
        }
    }
    out
}

/// Normalise two corners into `(left, top, right, bottom)`.
fn corners(left: i32, top: i32, right: i32, bottom: i32) -> (i32, i32, i32, i32) {
    (left.min(right), top.min(bottom), left.max(right), top.max(bottom))
}

/// Rectangle outline; corners may be given in any order.
pub fn rect(width: u32, height: u32, left: i32, top: i32, right: i32, bottom: i32, value: i32) -> Grid {
    let mut out = clear(width, height);
    let (l, t, r, b) = corners(left, top, right, bottom);
    for x in l.max(0)..=r.min(width as i32 - 1) {
        set_pixel(&mut out, width, height, x, t, value);
        set_pixel(&mut out, width, height, x, b, value);
    }
    for y in t.max(0)..=b.min(height as i32 - 1) {
        set_pixel(&mut out, width, height, l, y, value);
        set_pixel(&mut out, width, height, r, y, value);
    }
    out
}

/// Filled rectangle; corners may be given in any order.
pub fn fill_rect(width: u32, height: u32, left: i32, top: i32, right: i32, bottom: i32, value: i32) -> Grid {
    let mut out = clear(width, height);
    let (l, t, r, b) = corners(left, top, right, bottom);
    // Only walk the visible part.
    let (l, r) = (l.max(0), r.min(width as i32 - 1));
    let (t, b) = (t.max(0), b.min(height as i32 - 1));
    for y in t..=b {
        for x in l..=r {
            set_pixel(&mut out, width, height, x, y, value);
        }
    }
    out
}

/// Circle outline as a distance band: a cell is lit when its squared
/// distance from the center differs from `radius²` by at most
/// `max(1, radius / 2)`.
pub fn circle(width: u32, height: u32, cx: i32, cy: i32, radius: i32, value: i32) -> Grid {
    let mut out = clear(width, height);
    let r2 = radius as i128 * radius as i128;
    let band = (radius / 2).max(1) as i128;
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let dx = (x - cx as i64) as i128;
            let dy = (y - cy as i64) as i128;
            if (dx * dx + dy * dy - r2).abs() <= band {
                plot(&mut out, width, height, x, y, value);
            }
        }
    }
    out
}
