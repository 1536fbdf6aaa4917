use anyhow::Context;
use bytes::Bytes;
use image::ImageFormat;
use uuid::Uuid;

pub const IMAGE_PREFIX: &str = "uploads/recipe";

/// An upload that decoded successfully.
#[derive(Debug)]
pub struct CheckedImage {
    pub body: Bytes,
    pub format: ImageFormat,
}

impl CheckedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

/// Sniffs the format and fully decodes the payload; anything that does not
/// decode is rejected. Decoding is CPU-bound, so callers run this on the
/// blocking pool.
pub fn check_image(body: Bytes) -> anyhow::Result<CheckedImage> {
    anyhow::ensure!(!body.is_empty(), "empty upload");
    let format = image::guess_format(&body).context("unknown image format")?;
    image::load_from_memory_with_format(&body, format).context("decode image")?;
    Ok(CheckedImage { body, format })
}

pub async fn check_image_blocking(body: Bytes) -> anyhow::Result<CheckedImage> {
    tokio::task::spawn_blocking(move || check_image(body))
        .await
        .context("image check task")?
}

/// Fresh storage key so uploads never overwrite each other.
pub fn recipe_image_key(ext: &str) -> String {
    format!("{}/{}.{}", IMAGE_PREFIX, Uuid::new_v4(), ext)
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;

    let buf: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(10, 10, Rgb([200, 80, 40]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buf)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
