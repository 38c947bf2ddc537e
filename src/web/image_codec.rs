// Image codec adapter: decodes uploaded bytes into the canonical RGB8
// in-memory representation and encodes rendered results into the negotiated
// response format.

use super::error::ApiError;
use super::headers::Accept;
use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use image::RgbImage;
use mime::Mime;
use std::io::Cursor;
use tracing::debug;

/// Response encoding negotiated from the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
    WebP,
}

const DEFAULT_JPEG_QUALITY: u8 = 85;

impl OutputFormat {
    /// The original service only ever answered JPEG; that stays the default
    /// when the client states no usable preference.
    pub const fn default_jpeg() -> Self {
        OutputFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Picks the first satisfiable media range. A missing `Accept` header
    /// means JPEG; a present one that matches none of the supported formats
    /// is a 406.
    pub fn negotiate(accept: Option<&Accept>) -> Result<Self, ApiError> {
        let Some(accept) = accept else {
            return Ok(OutputFormat::default_jpeg());
        };
        accept
            .0
            .iter()
            .find_map(Self::from_mime)
            .ok_or_else(|| {
                ApiError::NotAcceptable(format!(
                    "no supported image format in Accept header (supported: image/jpeg, image/png, image/webp); got: {:?}",
                    accept.0.iter().map(Mime::to_string).collect::<Vec<_>>()
                ))
            })
    }

    fn from_mime(mime: &Mime) -> Option<Self> {
        if *mime == mime::STAR_STAR {
            return Some(OutputFormat::default_jpeg());
        }
        if mime.type_() != mime::IMAGE {
            return None;
        }
        match mime.subtype().as_str() {
            "*" => Some(OutputFormat::default_jpeg()),
            "jpeg" => {
                let quality = mime
                    .get_param("quality")
                    .and_then(|q| q.as_str().parse::<u8>().ok())
                    .filter(|q| (1..=100).contains(q))
                    .unwrap_or(DEFAULT_JPEG_QUALITY);
                Some(OutputFormat::Jpeg { quality })
            }
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}


/// Decodes uploaded bytes into the canonical three-channel representation.
/// The part's content type is only a hint; anything the decoder can sniff is
/// accepted, and failures are a client error rather than a blind 500.
pub fn decode_input_image(
    file_data: &[u8],
    content_type: Option<&str>,
) -> Result<RgbImage, ApiError> {
    let media_type = content_type.map(|s| s[0..s.find(';').unwrap_or(s.len())].trim());

    let format_hint = match media_type {
        Some("image/jpeg") => Some(image::ImageFormat::Jpeg),
        Some("image/png") => Some(image::ImageFormat::Png),
        Some("image/webp") => Some(image::ImageFormat::WebP),
        Some(other) => {
            debug!("no decoder hint for content type '{}', sniffing instead", other);
            None
        }
        None => None,
    };

    let dyn_img = match format_hint {
        Some(format) => image::load_from_memory_with_format(file_data, format).map_err(|e| {
            ApiError::ImageProcessingError(format!(
                "failed to decode image (format {:?}): {}",
                format, e
            ))
        })?,
        None => image::load_from_memory(file_data).map_err(|e| {
            ApiError::ImageProcessingError(format!("failed to auto-detect and decode image: {}", e))
        })?,
    };

    Ok(dyn_img.to_rgb8())
}

/// Encodes an RGB8 image into the negotiated format and wraps it into a
/// response with the matching content type.
pub fn encode_output_image(image: &RgbImage, format: OutputFormat) -> Result<Response, ApiError> {
    let (width, height) = image.dimensions();
    let mut buffer = Cursor::new(Vec::new());

    match format {
        OutputFormat::Jpeg { quality } => {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder
                .encode(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .map_err(|e| {
                    ApiError::ImageProcessingError(format!("JPEG encoding failed: {}", e))
                })?;
        }
        OutputFormat::Png | OutputFormat::WebP => {
            let image_format = match format {
                OutputFormat::Png => image::ImageFormat::Png,
                _ => image::ImageFormat::WebP,
            };
            image::write_buffer_with_format(
                &mut buffer,
                image.as_raw(),
                width,
                height,
                image::ColorType::Rgb8,
                image_format,
            )
            .map_err(|e| {
                ApiError::ImageProcessingError(format!(
                    "{} encoding failed: {}",
                    format.mime_type(),
                    e
                ))
            })?;
        }
    }

    debug!(
        content_type = format.mime_type(),
        bytes = buffer.get_ref().len(),
        "encoded response image"
    );
    Ok((
        [(header::CONTENT_TYPE, format.mime_type())],
        buffer.into_inner(),
    )
        .into_response())
}
