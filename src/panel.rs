//! RGB LED panel backend (Raspberry Pi, `rpi-led-matrix`).
//!
//! The panel is much larger than the logical grid, so each grid cell is
//! drawn as a square block of LEDs, centred on the panel, in gray levels.
//!
//! The C library is not thread-safe: a `PanelMatrix` must be created and
//! used on the render thread only.

use crate::error::HardwareError;
use crate::hardware::{ConnectionEvent, ConnectionSink, MatrixHardware};
use crate::{Color, PanelConfig};
use rpi_led_matrix::{LedCanvas, LedMatrix, LedMatrixOptions, LedRuntimeOptions};

/// Create and configure the LED matrix from panel dimensions.
pub fn create_matrix(panel: PanelConfig) -> Result<LedMatrix, Box<dyn std::error::Error>> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(panel.rows);
    options.set_cols(panel.cols);
    options.set_hardware_mapping("adafruit-hat");
    options.set_pwm_bits(8)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    let matrix = LedMatrix::new(Some(options), Some(rt_options))?;
    Ok(matrix)
}

pub struct PanelMatrix {
    panel: PanelConfig,
    matrix: Option<LedMatrix>,
    canvas: Option<LedCanvas>,
}

impl PanelMatrix {
    pub fn new(panel: PanelConfig) -> Self {
        Self {
            panel,
            matrix: None,
            canvas: None,
        }
    }

    fn swap_in(&mut self, draw: impl FnOnce(&mut LedCanvas)) -> Result<(), HardwareError> {
        let (Some(matrix), Some(mut canvas)) = (self.matrix.as_ref(), self.canvas.take()) else {
            return Err(HardwareError::NotConnected);
        };
        canvas.clear();
        draw(&mut canvas);
        self.canvas = Some(matrix.swap(canvas));
        Ok(())
    }
}

impl MatrixHardware for PanelMatrix {
    fn connect(&mut self, sink: ConnectionSink) -> Result<(), HardwareError> {
        if self.matrix.is_none() {
            let matrix = create_matrix(self.panel).map_err(|e| HardwareError::Unavailable(e.to_string()))?;
            self.canvas = Some(matrix.offscreen_canvas());
            self.matrix = Some(matrix);
            tracing::info!("LED panel initialised ({}x{})", self.panel.cols, self.panel.rows);
        }
        // Ready immediately, but still reported through the sink.
        sink(ConnectionEvent::Connected);
        Ok(())
    }

    fn register(&mut self, device_code: &str) -> Result<(), HardwareError> {
        tracing::debug!("LED panel driving device profile {}", device_code);
        Ok(())
    }

    fn push_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), HardwareError> {
        if pixels.len() != width as usize * height as usize {
            return Err(HardwareError::Rejected(format!(
                "frame has {} cells, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        let (cell, x0, y0) = self.panel.grid_layout(width, height);
        self.swap_in(|canvas| {
            for (i, &v) in pixels.iter().enumerate() {
                if v == 0 {
                    continue;
                }
                let gx = (i as u32 % width) * cell + x0;
                let gy = (i as u32 / width) * cell + y0;
                let color = Color::gray(v).into();
                for dy in 0..cell {
                    for dx in 0..cell {
                        canvas.set((gx + dx) as i32, (gy + dy) as i32, &color);
                    }
                }
            }
        })
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        self.swap_in(|_| {})
    }

    fn disconnect(&mut self) {
        let _ = self.swap_in(|_| {});
        self.canvas = None;
        self.matrix = None;
        tracing::info!("LED panel released");
    }
}
