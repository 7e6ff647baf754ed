use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

/// A provider-supported `(width, height)` pair. Both sides are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupportedSize {
    pub width: u32,
    pub height: u32,
}

impl SupportedSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BatchError::invalid_input(format!(
                "size {width}x{height} must have positive width and height"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for SupportedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for SupportedSize {
    type Err = BatchError;

    fn from_str(raw: &str) -> Result<Self> {
        let (width, height) = parse_dims(raw)?;
        Self::new(width, height)
    }
}

/// Parses `"WxH"` (case-insensitive separator, surrounding whitespace allowed).
pub fn parse_dims(raw: &str) -> Result<(u32, u32)> {
    let normalized = raw.trim().to_ascii_lowercase();
    let Some((left, right)) = normalized.split_once('x') else {
        return Err(BatchError::invalid_input(format!(
            "size '{raw}' is not in WxH form"
        )));
    };
    let parse = |side: &str| {
        side.trim().parse::<u32>().map_err(|_| {
            BatchError::invalid_input(format!("size '{raw}' has a non-numeric or negative side"))
        })
    };
    Ok((parse(left)?, parse(right)?))
}

/// Ordered, non-empty set of sizes a provider accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeCatalog {
    sizes: Vec<SupportedSize>,
}

impl SizeCatalog {
    pub fn new(sizes: Vec<SupportedSize>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(BatchError::invalid_input("size catalog is empty"));
        }
        if let Some(bad) = sizes.iter().find(|size| size.width == 0 || size.height == 0) {
            return Err(BatchError::invalid_input(format!(
                "catalog entry {bad} must have positive width and height"
            )));
        }
        Ok(Self { sizes })
    }

    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let sizes = entries
            .iter()
            .map(|entry| entry.as_ref().parse::<SupportedSize>())
            .collect::<Result<Vec<_>>>()?;
        Self::new(sizes)
    }

    /// Sizes accepted by Recraft v3, in declaration order.
    pub fn recraft_v3() -> Self {
        Self {
            sizes: default_sizes(),
        }
    }

    pub fn sizes(&self) -> &[SupportedSize] {
        self.sizes.as_slice()
    }

    pub fn contains(&self, size: &SupportedSize) -> bool {
        self.sizes.contains(size)
    }
}

impl Default for SizeCatalog {
    fn default() -> Self {
        Self::recraft_v3()
    }
}

fn default_sizes() -> Vec<SupportedSize> {
    [
        (1024, 1024),
        (1365, 1024), // 4:3
        (1024, 1365),
        (1536, 1024), // 3:2
        (1024, 1536),
        (1820, 1024), // 16:9
        (1024, 1820),
    ]
    .into_iter()
    .map(|(width, height)| SupportedSize { width, height })
    .collect()
}
