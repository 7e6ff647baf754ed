/// Styles accepted by Recraft v3. `any` lets the model choose.
pub const RECRAFT_STYLES: &[&str] = &[
    "any",
    "digital_illustration",
    "digital_illustration/pixel_art",
    "digital_illustration/hand_drawn",
    "digital_illustration/grain",
    "digital_illustration/infantile_sketch",
    "digital_illustration/2d_art_poster",
    "digital_illustration/handmade_3d",
    "digital_illustration/hand_drawn_outline",
    "digital_illustration/engraving_color",
    "digital_illustration/2d_art_poster_2",
    "realistic_image/b_and_w",
    "realistic_image/hard_flash",
    "realistic_image/hdr",
    "realistic_image/natural_light",
    "realistic_image/studio_portrait",
    "realistic_image/enterprise",
    "realistic_image/motion_blur",
];

pub const DEFAULT_STYLE: &str = "any";

pub fn is_known_style(style: &str) -> bool {
    RECRAFT_STYLES.contains(&style)
}

/// File-name-safe form of a style tag (`digital_illustration/grain` -> `digital_illustration_grain`).
pub fn style_slug(style: &str) -> String {
    style.trim().replace('/', "_")
}
