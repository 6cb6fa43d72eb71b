//! Image encoding for upload and for multimodal LLM requests.
//!
//! Panels are stored and sent as JPEG at quality 75: they are photographs of
//! ink and colour, not text pages, and a 50-panel story must stay within
//! request-size limits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

pub const JPEG_QUALITY: u8 = 75;

/// Encode a panel as JPEG bytes.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    // JPEG has no alpha channel.
    img.to_rgb8().write_with_encoder(encoder)?;
    Ok(buf)
}

/// Wrap already-encoded JPEG bytes for a vision request.
pub fn jpeg_image_data(jpeg: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(jpeg);
    debug!("Encoded panel → {} bytes base64", b64.len());
    ImageData::new(b64, "image/jpeg").with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let jpeg = encode_jpeg(&img).expect("encode should succeed");
        // JPEG SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let data = jpeg_image_data(&jpeg);
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, jpeg);
    }
}
