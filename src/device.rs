//! Device profile resolution.
//!
//! Maps whatever the host tells us about itself (model, product,
//! build fingerprint) onto the device code the matrix service expects and
//! the grid size it drives. Unknown hardware never fails: it degrades to
//! the first fallback profile.

use serde::Serialize;
use std::fs;

/// Default matrix edge length when no rule overrides it.
pub const DEFAULT_GRID: u32 = 25;

/// Known device codes, most likely first.
pub const FALLBACK_DEVICE_CODES: &[&str] = &["23111", "23113", "24111", "23112", "22111", "20111"];

/// Resolved hardware target for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DeviceProfile {
    pub device_code: String,
    pub grid_width: u32,
    pub grid_height: u32,
}

impl DeviceProfile {
    pub fn new(device_code: impl Into<String>, grid_width: u32, grid_height: u32) -> Self {
        Self {
            device_code: device_code.into(),
            grid_width,
            grid_height,
        }
    }
}

/// Raw identifiers reported by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HardwareIds {
    pub model: String,
    pub product: String,
    pub fingerprint: String,
}

impl HardwareIds {
    pub fn new(model: impl Into<String>, product: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            product: product.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Best-effort identifiers of the machine we are running on.
    ///
    /// Reads the device-tree model (ARM boards) or DMI product name (x86);
    /// anything unreadable stays empty.
    pub fn detect() -> Self {
        let read = |path: &str| {
            fs::read_to_string(path)
                .map(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
                .unwrap_or_default()
        };

        let model = read("/proc/device-tree/model");
        let model = if model.is_empty() {
            read("/sys/class/dmi/id/product_name")
        } else {
            model
        };

        Self {
            model,
            product: read("/sys/class/dmi/id/product_family"),
            fingerprint: read("/proc/sys/kernel/osrelease"),
        }
    }

    /// Replace individual fields with explicit overrides (CLI flags).
    pub fn with_overrides(mut self, model: Option<String>, product: Option<String>, fingerprint: Option<String>) -> Self {
        if let Some(m) = model {
            self.model = m;
        }
        if let Some(p) = product {
            self.product = p;
        }
        if let Some(f) = fingerprint {
            self.fingerprint = f;
        }
        self
    }
}

/// Pick the profile for `ids`. Matching is case-insensitive substring search.
pub fn resolve(ids: &HardwareIds) -> DeviceProfile {
    let model = ids.model.to_lowercase();
    let product = ids.product.to_lowercase();
    let fingerprint = ids.fingerprint.to_lowercase();

    // Phone (3) family: 25x25 matrix, device code 23112.
    if model.contains("phone") && (fingerprint.contains("phone_3") || product.contains("phone3")) {
        return DeviceProfile::new("23112", DEFAULT_GRID, DEFAULT_GRID);
    }

    DeviceProfile::new(FALLBACK_DEVICE_CODES[0], DEFAULT_GRID, DEFAULT_GRID)
}

/// Like [`resolve`], but an explicit grid size (from configuration) wins
/// over the rule's dimensions. Zero-sized overrides are ignored.
pub fn resolve_with_grid(ids: &HardwareIds, grid: Option<(u32, u32)>) -> DeviceProfile {
    let mut profile = resolve(ids);
    if let Some((w, h)) = grid.filter(|(w, h)| *w > 0 && *h > 0) {
        profile.grid_width = w;
        profile.grid_height = h;
    }
    profile
}

/// Parse a `WIDTHxHEIGHT` grid size such as `25x25`.
pub fn parse_grid_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    if w == 0 || h == 0 {
        return Err("grid dimensions must be positive".to_string());
    }
    Ok((w, h))
}
