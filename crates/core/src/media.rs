//! Media encoding and upload validation.
//!
//! [`MediaEncoder`] turns a user-selected [`SourceFile`] into an
//! [`EncodedMedia`]: the base64 payload sent to the try-on service and a
//! `data:` URI preview, both built from the same bytes in one step.
//!
//! In strict mode the encoder enforces the upload limits of the try-on
//! service (format, size, pixel dimensions) before encoding anything.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;

use crate::error::{MediaError, ValidationError};
use crate::types::MediaRole;

/* --------------------------------------------------------------------------
Named constants
-------------------------------------------------------------------------- */

/// MIME type for JPEG images.
pub const MIME_JPEG: &str = "image/jpeg";

/// MIME type for PNG images.
pub const MIME_PNG: &str = "image/png";

/// Fallback MIME type when neither the extension nor the content identify
/// the file.
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// MIME types accepted in strict mode.
pub const ALLOWED_MIME_TYPES: &[&str] = &[MIME_JPEG, MIME_PNG];

/// Largest accepted upload in strict mode (50 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Smallest accepted width or height, inclusive.
pub const MIN_DIMENSION: u32 = 512;

/// Largest accepted width or height, inclusive.
pub const MAX_DIMENSION: u32 = 4096;

/* --------------------------------------------------------------------------
Source files
-------------------------------------------------------------------------- */

/// A file picked by the user, before validation or encoding.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Display name (usually the file name).
    pub name: String,
    /// Declared MIME type. Strict validation trusts this, not the content.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, deriving its MIME type with
    /// [`detect_mime_type`].
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| MediaError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = detect_mime_type(path, &bytes).to_string();

        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }

    /// Size of the file in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Derive a MIME type from the file extension, falling back to the
/// content's magic bytes.
pub fn detect_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg") => MIME_JPEG,
        Some("png") => MIME_PNG,
        _ => image::guess_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or(MIME_OCTET_STREAM),
    }
}

/* --------------------------------------------------------------------------
Encoded media
-------------------------------------------------------------------------- */

/// Transport-ready image: standard base64 without a `data:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    role: MediaRole,
    mime_type: String,
    data: Arc<str>,
}

impl MediaPayload {
    pub fn role(&self) -> MediaRole {
        self.role
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 text sent to the remote service.
    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Displayable reference to an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    mime_type: String,
    data: Arc<str>,
}

impl Preview {
    /// Render as a `data:<mime>;base64,<data>` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A payload and its preview, always derived from the same source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMedia {
    source_name: String,
    payload: MediaPayload,
    preview: Preview,
}

impl EncodedMedia {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn payload(&self) -> &MediaPayload {
        &self.payload
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn into_payload(self) -> MediaPayload {
        self.payload
    }
}

/* --------------------------------------------------------------------------
Encoder
-------------------------------------------------------------------------- */

/// Validates and encodes user-selected images.
#[derive(Debug, Clone, Copy)]
pub struct MediaEncoder {
    strict: bool,
}

impl MediaEncoder {
    /// * `strict` - enforce format, size, and resolution limits. When
    ///   `false` every file is encoded as-is.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Encode `file` for the given slot.
    ///
    /// In strict mode the checks run in order: MIME type, size, then pixel
    /// dimensions. The dimension check decodes only the image header, on the
    /// blocking thread pool.
    pub async fn encode(
        &self,
        role: MediaRole,
        file: SourceFile,
    ) -> Result<EncodedMedia, MediaError> {
        let SourceFile {
            name,
            mime_type,
            bytes,
        } = file;

        let bytes = if self.strict {
            validate_strict(&mime_type, bytes).await?
        } else {
            bytes
        };

        let data: Arc<str> = base64::engine::general_purpose::STANDARD
            .encode(&bytes)
            .into();

        Ok(EncodedMedia {
            source_name: name,
            payload: MediaPayload {
                role,
                mime_type: mime_type.clone(),
                data: Arc::clone(&data),
            },
            preview: Preview { mime_type, data },
        })
    }
}

/* --------------------------------------------------------------------------
Validation functions
-------------------------------------------------------------------------- */

/// Validate that the declared MIME type is JPEG or PNG.
pub fn validate_mime_type(mime_type: &str) -> Result<(), ValidationError> {
    if ALLOWED_MIME_TYPES.contains(&mime_type) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFormat {
            mime_type: mime_type.to_string(),
        })
    }
}

/// Validate that the upload does not exceed [`MAX_UPLOAD_BYTES`].
pub fn validate_size(size: u64) -> Result<(), ValidationError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::PayloadTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Validate that both sides lie within `MIN_DIMENSION..=MAX_DIMENSION`.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ValidationError> {
    let range = MIN_DIMENSION..=MAX_DIMENSION;
    if range.contains(&width) && range.contains(&height) {
        Ok(())
    } else {
        Err(ValidationError::InvalidResolution {
            width,
            height,
            min: MIN_DIMENSION,
            max: MAX_DIMENSION,
        })
    }
}

/// Read the intrinsic pixel size from the image header.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32), ValidationError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ValidationError::UnreadableImage(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ValidationError::UnreadableImage(e.to_string()))
}

async fn validate_strict(mime_type: &str, bytes: Vec<u8>) -> Result<Vec<u8>, MediaError> {
    validate_mime_type(mime_type)?;
    validate_size(bytes.len() as u64)?;

    let (bytes, dimensions) = tokio::task::spawn_blocking(move || {
        let dimensions = read_dimensions(&bytes);
        (bytes, dimensions)
    })
    .await
    .map_err(|e| MediaError::Decode(e.to_string()))?;

    let (width, height) = dimensions?;
    validate_dimensions(width, height)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::GrayImage::new(width, height)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::GrayImage::new(width, height)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    async fn encode_strict(mime_type: &str, bytes: Vec<u8>) -> Result<EncodedMedia, MediaError> {
        MediaEncoder::new(true)
            .encode(MediaRole::Subject, SourceFile::new("photo", mime_type, bytes))
            .await
    }

    // -- Format --

    #[test]
    fn mime_type_accepts_jpeg_and_png() {
        assert!(validate_mime_type(MIME_JPEG).is_ok());
        assert!(validate_mime_type(MIME_PNG).is_ok());
    }

    #[test]
    fn mime_type_rejects_everything_else() {
        for mime in ["image/gif", "image/webp", "image/jpg", "IMAGE/PNG", "", MIME_OCTET_STREAM] {
            assert_matches!(
                validate_mime_type(mime),
                Err(ValidationError::UnsupportedFormat { .. }),
                "{mime} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn strict_rejects_valid_png_declared_as_webp() {
        let result = encode_strict("image/webp", png_bytes(600, 600)).await;
        assert_matches!(
            result,
            Err(MediaError::Validation(ValidationError::UnsupportedFormat { mime_type }))
                if mime_type == "image/webp"
        );
    }

    // -- Size --

    #[test]
    fn size_at_limit_is_accepted() {
        assert!(validate_size(MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn size_over_limit_is_rejected() {
        assert_matches!(
            validate_size(MAX_UPLOAD_BYTES + 1),
            Err(ValidationError::PayloadTooLarge { limit: MAX_UPLOAD_BYTES, .. })
        );
    }

    #[tokio::test]
    async fn sixty_megabyte_png_is_too_large() {
        let bytes = vec![0u8; 60 * 1024 * 1024];
        let result = encode_strict(MIME_PNG, bytes).await;
        assert_matches!(
            result,
            Err(MediaError::Validation(ValidationError::PayloadTooLarge { size, .. }))
                if size == 60 * 1024 * 1024
        );
    }

    // -- Resolution --

    #[test]
    fn dimensions_accept_inclusive_bounds() {
        assert!(validate_dimensions(512, 512).is_ok());
        assert!(validate_dimensions(4096, 4096).is_ok());
        assert!(validate_dimensions(512, 4096).is_ok());
    }

    #[test]
    fn dimensions_reject_outside_bounds() {
        for (w, h) in [(511, 512), (512, 511), (4097, 512), (512, 4097), (0, 0)] {
            assert_matches!(
                validate_dimensions(w, h),
                Err(ValidationError::InvalidResolution { width, height, .. })
                    if width == w && height == h
            );
        }
    }

    #[test]
    fn read_dimensions_from_png_header() {
        assert_eq!(read_dimensions(&png_bytes(640, 520)).unwrap(), (640, 520));
    }

    #[test]
    fn read_dimensions_rejects_garbage() {
        assert_matches!(
            read_dimensions(b"definitely not an image"),
            Err(ValidationError::UnreadableImage(_))
        );
    }

    #[tokio::test]
    async fn strict_accepts_boundary_sized_images() {
        assert!(encode_strict(MIME_PNG, png_bytes(4096, 512)).await.is_ok());
        assert!(encode_strict(MIME_PNG, png_bytes(512, 4096)).await.is_ok());
    }

    #[tokio::test]
    async fn strict_rejects_small_and_large_images() {
        assert_matches!(
            encode_strict(MIME_PNG, png_bytes(511, 800)).await,
            Err(MediaError::Validation(ValidationError::InvalidResolution { .. }))
        );
        assert_matches!(
            encode_strict(MIME_PNG, png_bytes(4097, 512)).await,
            Err(MediaError::Validation(ValidationError::InvalidResolution { .. }))
        );
    }

    #[tokio::test]
    async fn strict_rejects_undecodable_content() {
        assert_matches!(
            encode_strict(MIME_JPEG, b"not a jpeg".to_vec()).await,
            Err(MediaError::Validation(ValidationError::UnreadableImage(_)))
        );
    }

    // -- Encoding --

    #[tokio::test]
    async fn payload_round_trips_source_bytes() {
        let source = jpeg_bytes(1024, 1024);
        let encoded = encode_strict(MIME_JPEG, source.clone()).await.unwrap();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.payload().data())
            .unwrap();
        assert_eq!(decoded.len(), source.len());
        assert_eq!(decoded, source);
    }

    #[tokio::test]
    async fn preview_and_payload_share_source() {
        let encoded = encode_strict(MIME_PNG, png_bytes(800, 800)).await.unwrap();
        let uri = encoded.preview().data_uri();

        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.ends_with(encoded.payload().data()));
        assert!(!encoded.payload().data().starts_with("data:"));
        assert_eq!(encoded.payload().role(), MediaRole::Subject);
        assert_eq!(encoded.source_name(), "photo");
    }

    #[tokio::test]
    async fn permissive_mode_skips_all_checks() {
        let encoder = MediaEncoder::new(false);
        let file = SourceFile::new("notes.txt", "text/plain", b"hello".to_vec());

        let encoded = encoder.encode(MediaRole::Garment, file).await.unwrap();
        assert_eq!(encoded.payload().data(), "aGVsbG8=");
        assert_eq!(encoded.payload().role(), MediaRole::Garment);
    }

    // -- MIME detection --

    #[test]
    fn detect_mime_type_prefers_extension() {
        assert_eq!(detect_mime_type(Path::new("a.JPG"), b""), MIME_JPEG);
        assert_eq!(detect_mime_type(Path::new("a.jpeg"), b""), MIME_JPEG);
        assert_eq!(detect_mime_type(Path::new("a.png"), b""), MIME_PNG);
    }

    #[test]
    fn detect_mime_type_sniffs_unknown_extension() {
        assert_eq!(detect_mime_type(Path::new("upload.bin"), &png_bytes(8, 8)), MIME_PNG);
        assert_eq!(detect_mime_type(Path::new("upload"), b"plain"), MIME_OCTET_STREAM);
    }
}
