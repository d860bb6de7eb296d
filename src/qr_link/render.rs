//! QR raster rendering
//!
//! Encodes a payload with `qrcode`, paints it onto an RGBA canvas with an
//! optional centred logo and the caption band, and returns PNG bytes.

use super::caption;
use crate::error::{Error, Result};
use base64::Engine;
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use serde::Deserialize;
use std::io::Cursor;

/// Text drawn under every code
pub const CAPTION: &str = "Scan me";
/// Largest accepted code area side in pixels
pub const MAX_QR_SIZE: u32 = 4096;

/// Height of the caption band in pixels
const CAPTION_BAND: u32 = 40;
/// Caption baseline, measured from the top of the band
const CAPTION_BASELINE: u32 = 28;
const CAPTION_SCALE: u32 = 3;
/// Logo side relative to the code area
const LOGO_RATIO: f32 = 0.4;

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ErrorCorrection {
    L,
    M,
    #[default]
    Q,
    H,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::L => EcLevel::L,
            ErrorCorrection::M => EcLevel::M,
            ErrorCorrection::Q => EcLevel::Q,
            ErrorCorrection::H => EcLevel::H,
        }
    }
}

/// QR rendering options
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QrRenderOptions {
    /// Side of the code area in pixels
    pub size: u32,
    /// Foreground (`#rrggbb` / `#rgb`)
    pub color: String,
    pub background_color: String,
    /// Quiet border around the code in pixels
    pub margin: u32,
    #[serde(rename = "errorCorrectionLevel")]
    pub error_correction: ErrorCorrection,
    /// Encoded logo image (PNG/JPEG) drawn at the centre
    #[serde(skip)]
    pub logo: Option<Vec<u8>>,
    /// Background clearance around the logo in pixels
    pub logo_margin: u32,
    /// Extra query parameters for the encoded link
    pub params: Vec<(String, String)>,
}

impl Default for QrRenderOptions {
    fn default() -> Self {
        Self {
            size: 300,
            color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            margin: 0,
            error_correction: ErrorCorrection::default(),
            logo: None,
            logo_margin: 10,
            params: Vec::new(),
        }
    }
}

/// Rendered QR image
#[derive(Debug, Clone)]
pub struct QrImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl QrImage {
    /// `data:image/png;base64,...`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// Render `data` as a captioned QR PNG on a blocking worker
pub async fn render_qr_image(data: &str, options: &QrRenderOptions) -> Result<QrImage> {
    let data = data.to_string();
    let options = options.clone();
    tokio::task::spawn_blocking(move || render_blocking(&data, &options))
        .await
        .map_err(|e| Error::Render(format!("render task failed: {}", e)))?
}

fn render_blocking(data: &str, options: &QrRenderOptions) -> Result<QrImage> {
    if data.is_empty() {
        return Err(Error::Render("cannot encode empty payload".to_string()));
    }

    let size = options.size;
    if size > MAX_QR_SIZE {
        return Err(Error::Render(format!(
            "size {} exceeds maximum {}",
            size, MAX_QR_SIZE
        )));
    }
    let margins = options
        .margin
        .checked_mul(2)
        .ok_or_else(|| Error::Render(format!("margin {} out of range", options.margin)))?;
    let height = size
        .checked_add(CAPTION_BAND)
        .ok_or_else(|| Error::Render(format!("size {} out of range", size)))?;

    let fg = parse_color(&options.color)?;
    let bg = parse_color(&options.background_color)?;

    let code = QrCode::with_error_correction_level(data.as_bytes(), options.error_correction.into())
        .map_err(|e| Error::Render(format!("QR encoding failed: {}", e)))?;

    let inner = size.saturating_sub(margins);
    let modules = code.width() as u32;
    let module_px = inner / modules.max(1);
    if module_px == 0 {
        return Err(Error::Render(format!(
            "size {} too small for {} modules",
            size, modules
        )));
    }

    let mut canvas = RgbaImage::from_pixel(size, height, bg);

    let offset = options.margin + (inner - module_px * modules) / 2;
    let colors = code.to_colors();
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules;
        let my = i as u32 / modules;
        let x0 = offset + mx * module_px;
        let y0 = offset + my * module_px;
        for y in y0..y0 + module_px {
            for x in x0..x0 + module_px {
                canvas.put_pixel(x, y, fg);
            }
        }
    }

    if let Some(ref logo_bytes) = options.logo {
        draw_logo(&mut canvas, logo_bytes, inner, size, options.logo_margin, bg)?;
    }

    caption::draw_text(
        &mut canvas,
        CAPTION,
        size / 2,
        size + CAPTION_BASELINE,
        CAPTION_SCALE,
        fg,
    );

    let (width, height) = canvas.dimensions();
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::Render(format!("PNG encoding failed: {}", e)))?;

    tracing::debug!(width = width, height = height, bytes = png.len(), "QR image rendered");

    Ok(QrImage { png, width, height })
}

fn draw_logo(
    canvas: &mut RgbaImage,
    logo_bytes: &[u8],
    inner: u32,
    size: u32,
    logo_margin: u32,
    bg: Rgba<u8>,
) -> Result<()> {
    let logo = image::load_from_memory(logo_bytes)
        .map_err(|e| Error::Render(format!("logo decode failed: {}", e)))?;

    let max_side = ((inner as f32) * LOGO_RATIO) as u32;
    if max_side == 0 {
        return Ok(());
    }
    let logo = logo
        .resize(max_side, max_side, imageops::FilterType::Lanczos3)
        .to_rgba8();
    let (lw, lh) = logo.dimensions();

    let x = (size - lw) / 2;
    let y = (size - lh) / 2;

    // Clear behind the logo so no modules show through its margin
    let clear_x = x.saturating_sub(logo_margin);
    let clear_y = y.saturating_sub(logo_margin);
    let clearance = logo_margin.saturating_mul(2);
    let clear_w = lw.saturating_add(clearance).min(size - clear_x);
    let clear_h = lh.saturating_add(clearance).min(size - clear_y);
    for py in clear_y..clear_y + clear_h {
        for px in clear_x..clear_x + clear_w {
            canvas.put_pixel(px, py, bg);
        }
    }

    imageops::overlay(canvas, &logo, x as i64, y as i64);
    Ok(())
}

/// Parse `#rrggbb`, `#rgb` or `#rrggbbaa`
fn parse_color(s: &str) -> Result<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    let invalid = || Error::Render(format!("invalid color: {}", s));
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let nibble = |i: usize| {
        u8::from_str_radix(&hex[i..i + 1], 16)
            .map(|v| v * 17)
            .map_err(|_| invalid())
    };

    if !hex.is_ascii() {
        return Err(invalid());
    }

    match hex.len() {
        3 => Ok(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        6 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => Err(invalid()),
    }
}
