//! Raw pixel payloads for SHOW_PIXEL_DATA.
//!
//! Accepts either a JSON array (`[255,0,255,0]`) or a plain comma list
//! (`255, 0, 255, 0`). Values are clamped to 0..=255 and the result is
//! truncated or zero-padded to exactly `width * height` cells.

use crate::Grid;
use crate::error::PayloadError;

pub fn parse_pixels(payload: &str, width: u32, height: u32) -> Result<Grid, PayloadError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }

    let values: Vec<i64> = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<f64>>(trimmed)
            .map_err(|e| PayloadError::Malformed(e.to_string()))?
            .into_iter()
            .map(|v| v as i64)
            .collect()
    } else {
        trimmed
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<i64>()
                    .map_err(|_| PayloadError::Malformed(format!("not an integer: {part:?}")))
            })
            .collect::<Result<_, _>>()?
    };

    let len = width as usize * height as usize;
    let mut grid: Grid = values.into_iter().take(len).map(|v| v.clamp(0, 255) as u8).collect();
    grid.resize(len, 0);
    Ok(grid)
}
