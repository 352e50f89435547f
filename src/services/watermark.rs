// src/services/watermark.rs
use crate::errors::PortraitError;
use crate::models::Dimensions;
use crate::services::glyphs::{CELL_COLUMNS, GLYPH_COLUMNS, GLYPH_ROWS, glyph};
use crate::services::image_validator::strip_data_url;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageFormat as ImgFormat, Rgba, RgbaImage, imageops};
use std::io::Cursor;

pub const WATERMARK_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    BottomRight,
    BottomCenter,
    Center,
    TopRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Middle,
    End,
}

/// Anchor point of the text; `y` is the vertical center of the text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
    pub x: i64,
    pub y: i64,
    pub align: TextAlign,
}

#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub text: String,
    pub opacity: f32,
    pub font_size: u32,
    pub color: String,
    pub background_color: Option<String>,
    pub position: Anchor,
    pub padding: u32,
}

impl WatermarkSpec {
    /// Fixed profile for every preview-class image.
    pub fn preview() -> Self {
        Self {
            text: "PREVIEW".to_string(),
            opacity: 0.8,
            font_size: 48,
            color: "#ffffff".to_string(),
            background_color: Some("#000000".to_string()),
            position: Anchor::BottomCenter,
            padding: 20,
        }
    }

    /// Low-key attribution mark for full-resolution deliverables.
    pub fn subtle() -> Self {
        Self {
            text: "AI PORTRAIT".to_string(),
            opacity: 0.3,
            font_size: 16,
            color: "#ffffff".to_string(),
            background_color: None,
            position: Anchor::BottomRight,
            padding: 10,
        }
    }

    pub fn validate(&self) -> Result<(), PortraitError> {
        if self.text.trim().is_empty() {
            return Err(PortraitError::Watermark("Watermark text is empty".to_string()));
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(PortraitError::Watermark(format!(
                "Opacity {} is outside [0, 1]",
                self.opacity
            )));
        }
        if !(8..=72).contains(&self.font_size) {
            return Err(PortraitError::Watermark(format!(
                "Font size {} is outside [8, 72]",
                self.font_size
            )));
        }
        parse_color(&self.color)?;
        if let Some(background) = &self.background_color {
            parse_color(background)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WatermarkedImage {
    pub image_data: String,
    pub mime_type: &'static str,
    pub dimensions: Dimensions,
}

/// Accepts `#rgb`, `#rrggbb` and a handful of names.
pub fn parse_color(value: &str) -> Result<[u8; 3], PortraitError> {
    let value = value.trim().to_lowercase();
    let named = match value.as_str() {
        "white" => Some([255, 255, 255]),
        "black" => Some([0, 0, 0]),
        "gray" | "grey" => Some([128, 128, 128]),
        "red" => Some([255, 0, 0]),
        _ => None,
    };
    if let Some(rgb) = named {
        return Ok(rgb);
    }

    let invalid = || PortraitError::Watermark(format!("Invalid color '{}'", value));
    let hex = value
        .strip_prefix('#')
        .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(invalid)?;
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Err(invalid()),
    };

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

pub fn compute_position(
    dimensions: Dimensions,
    anchor: Anchor,
    font_size: u32,
    padding: u32,
) -> TextPosition {
    let width = dimensions.width as i64;
    let height = dimensions.height as i64;
    let half_line = font_size as i64 / 2;
    let padding = padding as i64;

    match anchor {
        Anchor::BottomRight => TextPosition {
            x: width - padding,
            y: height - padding - half_line,
            align: TextAlign::End,
        },
        Anchor::BottomCenter => TextPosition {
            x: width / 2,
            y: height - padding - half_line,
            align: TextAlign::Middle,
        },
        Anchor::Center => TextPosition {
            x: width / 2,
            y: height / 2,
            align: TextAlign::Middle,
        },
        Anchor::TopRight => TextPosition {
            x: width - padding,
            y: padding + half_line,
            align: TextAlign::End,
        },
    }
}

struct TextBox {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    pixel: f32,
}

fn text_box(text: &str, font_size: u32, position: TextPosition) -> TextBox {
    let pixel = font_size as f32 / 10.0;
    let chars = text.chars().count() as f32;
    let width = (chars * CELL_COLUMNS as f32 - 1.0).max(0.0) * pixel;
    let height = GLYPH_ROWS as f32 * pixel;

    let left = match position.align {
        TextAlign::Middle => position.x as f32 - width / 2.0,
        TextAlign::End => position.x as f32 - width,
    };

    TextBox {
        left,
        top: position.y as f32 - height / 2.0,
        width,
        height,
        pixel,
    }
}

fn fill_rect(canvas: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    let x_start = x0.round().max(0.0) as u32;
    let y_start = y0.round().max(0.0) as u32;
    let x_end = (x1.round().max(0.0) as u32).min(width);
    let y_end = (y1.round().max(0.0) as u32).min(height);

    for y in y_start..y_end {
        for x in x_start..x_end {
            canvas.put_pixel(x, y, color);
        }
    }
}

fn render_overlay(dimensions: Dimensions, spec: &WatermarkSpec) -> Result<RgbaImage, PortraitError> {
    let mut overlay = RgbaImage::new(dimensions.width, dimensions.height);
    let position = compute_position(dimensions, spec.position, spec.font_size, spec.padding);
    let text = spec.text.trim();
    let bbox = text_box(text, spec.font_size, position);
    let alpha = (spec.opacity * 255.0).round() as u8;

    if let Some(background) = &spec.background_color {
        let [r, g, b] = parse_color(background)?;
        let margin = spec.font_size as f32 / 4.0;
        let backing_alpha = (spec.opacity * 0.6 * 255.0).round() as u8;
        fill_rect(
            &mut overlay,
            bbox.left - margin,
            bbox.top - margin,
            bbox.left + bbox.width + margin,
            bbox.top + bbox.height + margin,
            Rgba([r, g, b, backing_alpha]),
        );
    }

    let [r, g, b] = parse_color(&spec.color)?;
    let ink = Rgba([r, g, b, alpha]);
    for (index, c) in text.chars().enumerate() {
        let cell_left = bbox.left + (index as u32 * CELL_COLUMNS) as f32 * bbox.pixel;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_COLUMNS {
                if bits & (1 << (GLYPH_COLUMNS - 1 - col)) == 0 {
                    continue;
                }
                let x0 = cell_left + col as f32 * bbox.pixel;
                let y0 = bbox.top + row as f32 * bbox.pixel;
                fill_rect(&mut overlay, x0, y0, x0 + bbox.pixel, y0 + bbox.pixel, ink);
            }
        }
    }

    Ok(overlay)
}

/// Bakes the watermark into base64 image data and re-encodes as PNG.
pub fn add_watermark(image_data: &str, spec: &WatermarkSpec) -> Result<WatermarkedImage, PortraitError> {
    spec.validate()?;

    let bytes = general_purpose::STANDARD
        .decode(strip_data_url(image_data))
        .map_err(|e| PortraitError::Watermark(format!("Invalid base64 image data: {}", e)))?;

    let image = image::load_from_memory(&bytes)
        .map_err(|e| PortraitError::Watermark(format!("Failed to load image: {}", e)))?;

    watermark_image(&image, spec)
}

/// Same as [`add_watermark`] for an image that is already decoded.
pub fn watermark_image(image: &DynamicImage, spec: &WatermarkSpec) -> Result<WatermarkedImage, PortraitError> {
    spec.validate()?;

    let mut base = image.to_rgba8();
    let (width, height) = base.dimensions();
    let dimensions = Dimensions::new(width, height);

    let overlay = render_overlay(dimensions, spec)?;
    imageops::overlay(&mut base, &overlay, 0, 0);

    let mut output = Vec::new();
    base.write_to(&mut Cursor::new(&mut output), ImgFormat::Png)
        .map_err(|e| PortraitError::Watermark(format!("Failed to encode watermarked image: {}", e)))?;

    Ok(WatermarkedImage {
        image_data: general_purpose::STANDARD.encode(output),
        mime_type: WATERMARK_MIME,
        dimensions,
    })
}

pub fn add_preview_watermark(image_data: &str) -> Result<WatermarkedImage, PortraitError> {
    add_watermark(image_data, &WatermarkSpec::preview())
}

pub fn add_subtle_watermark(image_data: &str) -> Result<WatermarkedImage, PortraitError> {
    add_watermark(image_data, &WatermarkSpec::subtle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::image_validator::tests::png_bytes;

    fn encoded(width: u32, height: u32) -> String {
        general_purpose::STANDARD.encode(png_bytes(width, height))
    }

    fn decode(data: &str) -> RgbaImage {
        let bytes = general_purpose::STANDARD.decode(data).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    #[test]
    fn preview_watermark_keeps_dimensions() {
        for (w, h) in [(512, 512), (1024, 768), (600, 1100)] {
            let result = add_preview_watermark(&encoded(w, h)).unwrap();
            assert_eq!(result.dimensions, Dimensions::new(w, h));
            assert_eq!(decode(&result.image_data).dimensions(), (w, h));
        }
    }

    #[test]
    fn first_application_changes_pixels() {
        let input = encoded(512, 512);
        let result = add_preview_watermark(&input).unwrap();
        assert_ne!(decode(&input), decode(&result.image_data));
    }

    #[test]
    fn subtle_watermark_succeeds() {
        let input = encoded(1024, 1024);
        let result = add_subtle_watermark(&input).unwrap();
        assert_ne!(decode(&input), decode(&result.image_data));
    }

    #[test]
    fn invalid_spec_is_rejected_not_clamped() {
        let mut spec = WatermarkSpec::preview();
        spec.opacity = 1.5;
        assert!(add_watermark(&encoded(512, 512), &spec).is_err());

        let mut spec = WatermarkSpec::preview();
        spec.font_size = 100;
        assert!(spec.validate().is_err());

        let mut spec = WatermarkSpec::preview();
        spec.color = "#12345".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn decoded_input_marks_like_encoded_input() {
        let decoded = image::load_from_memory(&png_bytes(600, 600)).unwrap();
        let from_encoded = add_watermark(&encoded(600, 600), &WatermarkSpec::preview()).unwrap();
        let from_decoded = watermark_image(&decoded, &WatermarkSpec::preview()).unwrap();

        assert_eq!(from_encoded.image_data, from_decoded.image_data);
    }

    #[test]
    fn undecodable_input_fails() {
        let garbage = general_purpose::STANDARD.encode(b"definitely not an image");
        assert!(matches!(
            add_preview_watermark(&garbage),
            Err(PortraitError::Watermark(_))
        ));
    }

    #[test]
    fn positions_are_deterministic_per_anchor() {
        let dims = Dimensions::new(1000, 800);
        assert_eq!(
            compute_position(dims, Anchor::BottomRight, 20, 10),
            TextPosition { x: 990, y: 780, align: TextAlign::End }
        );
        assert_eq!(
            compute_position(dims, Anchor::BottomCenter, 20, 10),
            TextPosition { x: 500, y: 780, align: TextAlign::Middle }
        );
        assert_eq!(
            compute_position(dims, Anchor::Center, 20, 10),
            TextPosition { x: 500, y: 400, align: TextAlign::Middle }
        );
        assert_eq!(
            compute_position(dims, Anchor::TopRight, 20, 10),
            TextPosition { x: 990, y: 20, align: TextAlign::End }
        );
    }

    #[test]
    fn parses_colors() {
        assert_eq!(parse_color("#fff").unwrap(), [255, 255, 255]);
        assert_eq!(parse_color("#1A2b3C").unwrap(), [0x1a, 0x2b, 0x3c]);
        assert_eq!(parse_color("black").unwrap(), [0, 0, 0]);
        assert!(parse_color("teal-ish").is_err());
    }
}
