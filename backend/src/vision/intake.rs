use image::{DynamicImage, ImageError, ImageReader};
use std::io::Cursor;

use super::PredictError;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// A file pulled out of the `file` field of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, extension)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension)),
        None => false,
    }
}

pub fn validate_upload(upload: Option<UploadedImage>) -> Result<UploadedImage, PredictError> {
    let upload = upload.ok_or(PredictError::NoFilePart)?;
    if upload.filename.is_empty() {
        return Err(PredictError::NoFileSelected);
    }
    if !allowed_file(&upload.filename) {
        return Err(PredictError::InvalidFileType);
    }
    Ok(upload)
}

/// Decodes `bytes` into an image.
///
/// The header is read by a first reader so unknown or mangled containers fail
/// before any pixel work. A second reader over the same bytes then performs the
/// full decode, which is where truncated pixel data is caught.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    log::debug!("Upload header ok: {}x{}", width, height);

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(image)
}
