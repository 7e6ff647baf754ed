use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{GenerateRequest, GeneratedImage, ImageProvider};

/// Offline provider: a solid PNG whose color is derived from prompt and style.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage> {
        let [r, g, b] = color_from_prompt(&request.prompt, &request.style);
        let image = RgbImage::from_pixel(request.size.width, request.size.height, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .with_context(|| format!("failed to encode dryrun image {}", request.size))?;
        Ok(GeneratedImage {
            bytes,
            mime_type: Some("image/png".to_string()),
        })
    }
}

fn color_from_prompt(prompt: &str, style: &str) -> [u8; 3] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(style.as_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2]]
}
