use base64::{engine::general_purpose, Engine};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

use crate::core::errors::{ConversionError, ConversionResult};

/// Largest raster surface we are willing to allocate (16384 x 16384 pixels)
pub const MAX_SURFACE_PIXELS: u64 = 16_384 * 16_384;

/// A PNG produced from a source image
#[derive(Debug, Clone)]
pub struct PngImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// MIME type sniffed from the leading bytes of an image
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Encode bytes as a `data:<mime>;base64,...` URL
pub fn to_data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_mime(bytes),
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Decode an image, applying its EXIF orientation the way a browser does
pub fn decode_image(bytes: &[u8]) -> ConversionResult<DynamicImage> {
    let decode_err = |source: ImageError| ConversionError::Decode { source };

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(ImageError::IoError(e)))?
        .into_decoder()
        .map_err(decode_err)?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);

    Ok(img)
}

/// Check that a raster surface of the given size can be allocated
pub fn acquire_surface(width: u32, height: u32) -> ConversionResult<()> {
    let pixels = width as u64 * height as u64;
    if pixels == 0 || pixels > MAX_SURFACE_PIXELS {
        return Err(ConversionError::SurfaceUnavailable { width, height });
    }
    Ok(())
}

/// Draw a decoded image onto an RGBA surface at its native size
pub fn draw_to_surface(img: &DynamicImage) -> ConversionResult<RgbaImage> {
    acquire_surface(img.width(), img.height())?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA surface as PNG bytes
pub fn encode_png(surface: &RgbaImage) -> ConversionResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    surface
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|source| ConversionError::Encode { source })?;
    Ok(png_bytes)
}

/// Decode, draw and re-encode as PNG in a single blocking task.
///
/// Decoding and encoding are CPU-intensive and would stall the async runtime
/// if run inline.
pub async fn convert_to_png_async(bytes: Arc<Vec<u8>>) -> ConversionResult<PngImage> {
    tokio::task::spawn_blocking(move || {
        let img = decode_image(&bytes)?;
        let surface = draw_to_surface(&img)?;
        let png = encode_png(&surface)?;
        Ok(PngImage {
            bytes: png,
            width: surface.width(),
            height: surface.height(),
        })
    })
    .await
    .map_err(|e| ConversionError::TaskJoin(e.to_string()))?
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_convert_jpeg_to_png_async() {
        let jpeg = fixtures::jpeg(40, 30);

        let png = convert_to_png_async(Arc::new(jpeg)).await.unwrap();

        assert_eq!((png.width, png.height), (40, 30));
        assert_eq!(sniff_mime(&png.bytes), "image/png");

        let decoded = image::load_from_memory(&png.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[tokio::test]
    async fn test_garbage_fails_to_decode() {
        let result = convert_to_png_async(Arc::new(b"definitely not a jpeg".to_vec())).await;
        assert!(matches!(result, Err(ConversionError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_truncated_jpeg_fails_to_decode() {
        let mut jpeg = fixtures::jpeg(32, 32);
        jpeg.truncate(20);
        let result = convert_to_png_async(Arc::new(jpeg)).await;
        assert!(matches!(result, Err(ConversionError::Decode { .. })));
    }

    #[test]
    fn test_surface_limits() {
        assert!(acquire_surface(1, 1).is_ok());
        assert!(acquire_surface(16_384, 16_384).is_ok());
        assert!(matches!(
            acquire_surface(0, 10),
            Err(ConversionError::SurfaceUnavailable { width: 0, height: 10 })
        ));
        assert!(acquire_surface(16_385, 16_384).is_err());
    }

    #[test]
    fn test_data_url() {
        let jpeg = fixtures::jpeg(2, 2);
        let url = to_data_url(&jpeg);
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let payload = url.split(',').nth(1).unwrap();
        assert_eq!(general_purpose::STANDARD.decode(payload).unwrap(), jpeg);
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(sniff_mime(b"hello"), "application/octet-stream");
    }
}
