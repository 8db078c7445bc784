//! Shared test data: tiny encoded images, a sample roster and multipart bodies

use crate::resolver::Roster;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Roster covering the reference scenarios
pub const SAMPLE_ROSTER_TOML: &str = r#"
[tickets.PNR123]
route_incharge = "RI-02"

[tickets.PNR123.responsible]
violence = "CRPF-07"
default = "TT-11"

[tickets.PNR456]
route_incharge = "RI-05"

[tickets.PNR456.responsible]
violence = "CRPF-03"
default = "TT-20"
"#;

pub fn sample_roster() -> Roster {
    Roster::from_toml(SAMPLE_ROSTER_TOML).expect("sample roster parses")
}

fn encode(format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30])));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .expect("in-memory encode succeeds");
    buffer.into_inner()
}

/// A valid 4x4 PNG
pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

/// A valid 4x4 JPEG
pub fn jpeg_bytes() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

/// PNG signature and header with the image data cut off
pub fn truncated_png_bytes() -> Vec<u8> {
    let mut bytes = png_bytes();
    bytes.truncate(40);
    bytes
}

pub const MULTIPART_BOUNDARY: &str = "railwatch-test-boundary";

/// Build a `multipart/form-data` body with an optional file part and ticket
pub fn multipart_body(file: Option<(&str, &[u8])>, pnr: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();

    if let Some(pnr) = pnr {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"pnr\"\r\n\r\n{pnr}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

/// Content-Type header value matching [`multipart_body`]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}")
}
