use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

use super::PaymentError;

/// Render `data` (normally a `solana:` URI) as an inline SVG QR code.
pub fn render_svg(data: &str, min_px: u32) -> Result<String, PaymentError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| PaymentError::QrCode(e.to_string()))?;

    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(min_px, min_px)
        .quiet_zone(true)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}
