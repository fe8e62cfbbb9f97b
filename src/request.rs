use crate::error::InferenceError;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const JPEG_QUALITY: u8 = 90;
pub(crate) const UPLOAD_FIELD_NAME: &str = "imageToUpload";

/// A reference to an image or video: either a file on disk or a URL the
/// remote service can fetch itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MediaReference {
    Hosted(String),
    Local(String),
}

impl MediaReference {
    pub(crate) fn classify(reference: &str) -> Result<Self, InferenceError> {
        if is_hosted(reference) {
            return Ok(Self::Hosted(reference.to_string()));
        }
        if !reference.is_empty() && Path::new(reference).is_file() {
            return Ok(Self::Local(reference.to_string()));
        }
        Err(InferenceError::InvalidImageReference(reference.to_string()))
    }
}

pub(crate) fn is_hosted(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Pixel dimensions reported alongside a prediction. Hosted images are
/// never decoded locally, so their dimensions stay unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDims {
    pub width: String,
    pub height: String,
}

impl ImageDims {
    fn unknown() -> Self {
        Self {
            width: "unknown".to_string(),
            height: "unknown".to_string(),
        }
    }
}

pub(crate) struct InferenceRequest {
    pub params: BTreeMap<String, String>,
    pub jpeg_body: Option<Vec<u8>>,
    pub dims: ImageDims,
}

/// Build the transport pieces for one inference request: query params,
/// an optional in-memory JPEG body, and the reported image dimensions.
/// No network I/O happens here.
pub(crate) fn build_image_request(
    reference: &MediaReference,
) -> Result<InferenceRequest, InferenceError> {
    match reference {
        MediaReference::Hosted(url) => Ok(InferenceRequest {
            params: BTreeMap::from([("image".to_string(), url.clone())]),
            jpeg_body: None,
            dims: ImageDims::unknown(),
        }),
        MediaReference::Local(path) => {
            let image = image::ImageReader::open(path)
                .map_err(|e| InferenceError::ImageDecode {
                    path: path.clone(),
                    source: image::ImageError::IoError(e),
                })?
                .decode()
                .map_err(|e| InferenceError::ImageDecode {
                    path: path.clone(),
                    source: e,
                })?;

            let dims = ImageDims {
                width: image.width().to_string(),
                height: image.height().to_string(),
            };

            // The service expects JPEG; re-encode whatever was on disk at
            // fixed quality, alpha stripped.
            let rgb = image.to_rgb8();
            let mut buffer = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(|e| InferenceError::ImageDecode {
                    path: path.clone(),
                    source: e,
                })?;

            Ok(InferenceRequest {
                params: BTreeMap::new(),
                jpeg_body: Some(buffer),
                dims,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("visionflow-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn hosted_reference_is_classified_by_scheme() {
        let reference = MediaReference::classify("https://example.com/cat.jpg").unwrap();
        assert_eq!(
            reference,
            MediaReference::Hosted("https://example.com/cat.jpg".to_string())
        );
    }

    #[test]
    fn missing_file_is_an_invalid_reference() {
        for bad in ["", "no-such-file.jpg", "ftp://example.com/cat.jpg"] {
            let result = MediaReference::classify(bad);
            assert!(
                matches!(result, Err(InferenceError::InvalidImageReference(_))),
                "expected InvalidImageReference for {:?}",
                bad
            );
        }
    }

    #[test]
    fn hosted_request_carries_url_param_and_unknown_dims() {
        let reference = MediaReference::Hosted("https://example.com/cat.jpg".to_string());
        let request = build_image_request(&reference).unwrap();

        assert_eq!(
            request.params.get("image").map(String::as_str),
            Some("https://example.com/cat.jpg")
        );
        assert!(request.jpeg_body.is_none());
        assert_eq!(request.dims.width, "unknown");
        assert_eq!(request.dims.height, "unknown");
    }

    #[test]
    fn local_image_is_reencoded_with_true_dimensions() {
        let path = temp_path("cat.png");
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(200, 150, Rgb([255, 0, 0]));
        img.save(&path).unwrap();

        let reference = MediaReference::classify(path.to_str().unwrap()).unwrap();
        let request = build_image_request(&reference).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(request.dims.width, "200");
        assert_eq!(request.dims.height, "150");
        assert!(request.params.is_empty());

        // Re-encoded body starts with the JPEG SOI marker regardless of the
        // on-disk format.
        let body = request.jpeg_body.unwrap();
        assert_eq!(&body[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn unreadable_image_is_a_decode_error() {
        let path = temp_path("not-an-image.jpg");
        std::fs::write(&path, b"definitely not image data").unwrap();

        let reference = MediaReference::classify(path.to_str().unwrap()).unwrap();
        let result = build_image_request(&reference);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            result,
            Err(InferenceError::ImageDecode { .. })
        ));
    }
}
