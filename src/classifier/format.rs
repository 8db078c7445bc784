//! Image format sniffing ahead of inference

use super::ClassificationError;
use image::ImageFormat;

/// Short lowercase name for a detected format
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        _ => "other",
    }
}

/// Detect the format from magic bytes and make sure the data decodes.
///
/// Returns the detected format name when it is in `allowed`.
pub fn inspect_image(bytes: &[u8], allowed: &[String]) -> Result<&'static str, ClassificationError> {
    let format = image::guess_format(bytes).map_err(|_| {
        ClassificationError::UnsupportedFormat("unrecognised image data".to_string())
    })?;
    let name = format_name(format);

    if !allowed.iter().any(|a| a.eq_ignore_ascii_case(name)) {
        return Err(ClassificationError::UnsupportedFormat(format!(
            "{name} is not one of the accepted formats ({})",
            allowed.join(", ")
        )));
    }

    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ClassificationError::CorruptImage(e.to_string()))?;

    Ok(name)
}
