use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use imagebatch_contracts::sizes::parse_dims;
use imagebatch_contracts::styles::{style_slug, DEFAULT_STYLE};
use imagebatch_contracts::BatchError;
use serde::Deserialize;

pub const HERO_PROMPT: &str = "professional enterprise SaaS platform interface, featuring 'Ship SaaS One Click' text in modern typography, \
clean and minimal business software dashboard, enterprise-grade UI design, \
professional blue and white color scheme with subtle gradients, \
modern tech elements, cloud deployment visualization, \
high-end corporate aesthetic, premium business software appearance";

pub const HERO_SIZE: &str = "1280x500";

/// One image to produce. `identifier` is the record key and must be unique in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationItem {
    pub identifier: String,
    pub prompt: String,
    pub requested_width: u32,
    pub requested_height: u32,
    pub style: String,
    pub destination: PathBuf,
}

impl GenerationItem {
    pub fn new(
        identifier: impl Into<String>,
        prompt: impl Into<String>,
        size: &str,
        style: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Result<Self, BatchError> {
        let (requested_width, requested_height) = parse_dims(size)?;
        Ok(Self {
            identifier: identifier.into(),
            prompt: prompt.into(),
            requested_width,
            requested_height,
            style: style.into(),
            destination: destination.into(),
        })
    }

    pub fn requested_size(&self) -> String {
        format!("{}x{}", self.requested_width, self.requested_height)
    }
}

/// Rejects batches where two items would share a record key.
pub fn ensure_unique_identifiers(items: &[GenerationItem]) -> Result<(), BatchError> {
    let mut seen = HashSet::new();
    for item in items {
        if item.identifier.trim().is_empty() {
            return Err(BatchError::invalid_input(format!(
                "item for {} has an empty identifier",
                item.destination.display()
            )));
        }
        if !seen.insert(item.identifier.as_str()) {
            return Err(BatchError::invalid_input(format!(
                "duplicate identifier '{}' in batch",
                item.identifier
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    #[serde(default, alias = "filename")]
    identifier: Option<String>,
    prompt: String,
    size: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(alias = "destination")]
    output_path: PathBuf,
}

impl ManifestEntry {
    fn into_item(self) -> Result<GenerationItem, BatchError> {
        let identifier = self
            .identifier
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.output_path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
            })
            .ok_or_else(|| {
                BatchError::invalid_input(format!(
                    "manifest entry for {} has no identifier",
                    self.output_path.display()
                ))
            })?;
        GenerationItem::new(
            identifier,
            self.prompt,
            &self.size,
            self.style.unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            self.output_path,
        )
    }
}

/// Reads a JSON array of `{identifier?, prompt, size, style?, output_path}`.
pub fn load_manifest(path: &Path) -> Result<Vec<GenerationItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading manifest {}", path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("manifest {} is not a JSON array of items", path.display()))?;
    let items = entries
        .into_iter()
        .map(ManifestEntry::into_item)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid entry in manifest {}", path.display()))?;
    ensure_unique_identifiers(&items)?;
    Ok(items)
}

/// Landing page image set: logo, hero banner and three feature sections.
pub fn marketing_manifest(out_dir: &Path) -> Result<Vec<GenerationItem>, BatchError> {
    let rows: [(&str, &str, &str); 5] = [
        (
            "logo.png",
            "512x512",
            "minimalist modern rocket logo with 'Ship SaaS 1 Click' text, \
clean geometric rocket shape pointing upward, professional blue and white color scheme, \
simple and memorable tech startup logo, modern sans-serif typography, \
scalable vector style, suitable for website header and app icon",
        ),
        ("hero.png", HERO_SIZE, HERO_PROMPT),
        (
            "section-1.png",
            "700x500",
            "enterprise user management dashboard, featuring 'Complete User System' text, \
professional authentication interface mockup, corporate user analytics view, \
clean enterprise design system, business software UI components, \
modern data visualization, premium SaaS platform aesthetic, \
professional blue and white corporate color scheme",
        ),
        (
            "section-2.png",
            "700x500",
            "enterprise AI integration platform, showing 'AI Integration' text, \
professional machine learning dashboard interface, corporate tech visualization, \
modern business analytics view, premium enterprise software design, \
clean data processing workflow, high-end tech platform appearance, \
professional blue and white business aesthetic",
        ),
        (
            "section-3.png",
            "700x500",
            "enterprise deployment workflow, featuring 'Launch in 3 Steps' text, \
professional DevOps dashboard interface, corporate cloud infrastructure view, \
modern step-by-step process visualization, premium business platform design, \
clean enterprise aesthetic, high-end tech deployment appearance, \
professional blue and white color scheme",
        ),
    ];
    rows.into_iter()
        .map(|(identifier, size, prompt)| {
            GenerationItem::new(
                identifier,
                prompt,
                size,
                DEFAULT_STYLE,
                out_dir.join(identifier),
            )
        })
        .collect()
}

/// Fans one prompt/size across a list of styles.
#[derive(Debug, Clone)]
pub struct StyleSweep {
    pub prefix: String,
    pub prompt: String,
    pub size: String,
    pub out_dir: PathBuf,
}

impl StyleSweep {
    pub fn hero(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: "hero".to_string(),
            prompt: HERO_PROMPT.to_string(),
            size: HERO_SIZE.to_string(),
            out_dir: out_dir.into(),
        }
    }

    /// `index` is 1-based and part of the identifier, so reordering styles
    /// changes which record entries a sweep maps onto.
    pub fn identifier(&self, style: &str, index: usize) -> String {
        format!("{}_style_{index:02}_{}.png", self.prefix, style_slug(style))
    }

    pub fn items<S: AsRef<str>>(&self, styles: &[S]) -> Result<Vec<GenerationItem>, BatchError> {
        let items = styles
            .iter()
            .enumerate()
            .map(|(idx, style)| {
                let style = style.as_ref();
                let identifier = self.identifier(style, idx + 1);
                let destination = self.out_dir.join(&identifier);
                GenerationItem::new(identifier, self.prompt.clone(), &self.size, style, destination)
            })
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_identifiers(&items)?;
        Ok(items)
    }
}
