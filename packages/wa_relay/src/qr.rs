//! Pairing code rendering.
//!
//! The engine hands out a raw pairing string; viewers get it as an SVG QR code
//! wrapped in a `data:` URL so an `<img src>` can show it directly.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

pub fn render_data_url(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).context("Pairing code does not fit in a QR code")?;
    let image = qr
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();
    Ok(format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(image)))
}
