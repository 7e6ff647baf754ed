use super::catalog::{parse_dims, SizeCatalog, SupportedSize};
use crate::error::{BatchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SizeResolution {
    pub size: SupportedSize,
    pub requested: (u32, u32),
    pub exact: bool,
    pub ratio_delta: f64,
}

impl SizeResolution {
    pub fn requested_text(&self) -> String {
        format!("{}x{}", self.requested.0, self.requested.1)
    }
}

/// Snaps arbitrary target dimensions onto the closest catalog entry by aspect ratio.
#[derive(Debug, Clone, Default)]
pub struct SizeResolver {
    pub catalog: SizeCatalog,
}

impl SizeResolver {
    pub fn new(catalog: SizeCatalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, target_width: u32, target_height: u32) -> Result<SupportedSize> {
        self.resolve_detailed(target_width, target_height)
            .map(|resolution| resolution.size)
    }

    pub fn resolve_size_text(&self, raw: &str) -> Result<SizeResolution> {
        let (width, height) = parse_dims(raw)?;
        self.resolve_detailed(width, height)
    }

    pub fn resolve_detailed(&self, target_width: u32, target_height: u32) -> Result<SizeResolution> {
        if target_width == 0 || target_height == 0 {
            return Err(BatchError::invalid_input(format!(
                "target size {target_width}x{target_height} must have positive width and height"
            )));
        }
        let target_ratio = f64::from(target_width) / f64::from(target_height);

        // Strict `<` keeps the first-declared candidate on ties.
        let mut best: Option<(SupportedSize, f64)> = None;
        for candidate in self.catalog.sizes() {
            let delta = (candidate.ratio() - target_ratio).abs();
            match best {
                Some((_, best_delta)) if delta >= best_delta => {}
                _ => best = Some((*candidate, delta)),
            }
        }
        let Some((size, ratio_delta)) = best else {
            return Err(BatchError::invalid_input("size catalog is empty"));
        };

        Ok(SizeResolution {
            size,
            requested: (target_width, target_height),
            exact: size.width == target_width && size.height == target_height,
            ratio_delta,
        })
    }
}
