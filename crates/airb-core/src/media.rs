//! Media resolution
//!
//! Turns an opaque `ImageHandle` delivered by the host's picker into decoded
//! pixels. The host passes its `ContentResolver` in at call time; nothing is
//! cached between requests.

use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use tracing::debug;

use crate::error::ResolutionError;

/// First platform level that ships the guarded decoder
pub const GUARDED_DECODER_MIN_LEVEL: u32 = 28;
/// Level assumed when the host does not report one
pub const CURRENT_PLATFORM_LEVEL: u32 = 34;

const JPEG_QUALITY: u8 = 80;
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;
const MAX_DIMENSION: u32 = 16_384;

/// Opaque reference to a user-selected image.
///
/// May be a `file://` URI, a `content://` URI or a bare path depending on the
/// host. The backing resource can disappear between pick and send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle(String);

impl ImageHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host facility that opens an image handle as raw bytes
pub trait ContentResolver: Send + Sync + 'static {
    fn open(&self, handle: &ImageHandle) -> io::Result<Vec<u8>>;
}

/// Resolves `file://` URIs and plain filesystem paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentResolver;

impl FsContentResolver {
    fn path_for(handle: &ImageHandle) -> io::Result<PathBuf> {
        let raw = handle.as_str().trim();
        if raw.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty image handle"));
        }
        if let Some(rest) = raw.strip_prefix("file://") {
            return Ok(PathBuf::from(rest));
        }
        if raw.contains("://") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported handle scheme: {}", raw),
            ));
        }
        Ok(PathBuf::from(raw))
    }
}

impl ContentResolver for FsContentResolver {
    fn open(&self, handle: &ImageHandle) -> io::Result<Vec<u8>> {
        let path = Self::path_for(handle)?;
        std::fs::read(path)
    }
}

/// Decoded pixels plus the container format they came from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Re-encode as JPEG for the inline request payload
    pub fn to_jpeg(&self) -> image::ImageResult<Vec<u8>> {
        let rgb = self.pixels.to_rgb8();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&rgb)?;
        Ok(buf)
    }
}

/// How bytes become pixels on a given host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Older hosts: load the whole buffer and sniff the format.
    Buffered,
    /// Newer hosts: guessed-format reader with allocation limits.
    Guarded,
}

impl DecodeStrategy {
    pub fn decode(&self, bytes: Vec<u8>) -> Result<DecodedImage, ResolutionError> {
        match self {
            DecodeStrategy::Buffered => {
                let format = image::guess_format(&bytes).ok();
                let pixels = image::load_from_memory(&bytes)
                    .map_err(|e| ResolutionError::DecodeFailed(e.to_string()))?;
                Ok(DecodedImage { pixels, format })
            }
            DecodeStrategy::Guarded => {
                let mut reader = ImageReader::new(Cursor::new(bytes))
                    .with_guessed_format()
                    .map_err(|e| ResolutionError::DecodeFailed(e.to_string()))?;
                let format = reader.format();
                if format.is_none() {
                    return Err(ResolutionError::DecodeFailed(
                        "unrecognized image format".to_string(),
                    ));
                }

                let mut limits = Limits::default();
                limits.max_alloc = Some(MAX_DECODE_ALLOC);
                limits.max_image_width = Some(MAX_DIMENSION);
                limits.max_image_height = Some(MAX_DIMENSION);
                reader.limits(limits);

                let pixels = reader
                    .decode()
                    .map_err(|e| ResolutionError::DecodeFailed(e.to_string()))?;
                Ok(DecodedImage { pixels, format })
            }
        }
    }
}

/// What the host platform can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub platform_level: u32,
}

impl HostCapabilities {
    pub fn new(platform_level: u32) -> Self {
        Self { platform_level }
    }

    /// `AIRB_PLATFORM_LEVEL` wins, then the configured level, then the current one.
    pub fn detect(configured: Option<u32>) -> Self {
        let from_env = std::env::var("AIRB_PLATFORM_LEVEL")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        Self::new(from_env.or(configured).unwrap_or(CURRENT_PLATFORM_LEVEL))
    }

    pub fn decode_strategy(&self) -> DecodeStrategy {
        if self.platform_level >= GUARDED_DECODER_MIN_LEVEL {
            DecodeStrategy::Guarded
        } else {
            DecodeStrategy::Buffered
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::new(CURRENT_PLATFORM_LEVEL)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MediaResolver {
    strategy: DecodeStrategy,
}

impl MediaResolver {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            strategy: capabilities.decode_strategy(),
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    /// Open and decode the handle on the blocking pool.
    pub async fn resolve<R: ContentResolver>(
        &self,
        content: Arc<R>,
        handle: Option<&ImageHandle>,
    ) -> Result<DecodedImage, ResolutionError> {
        let handle = handle.cloned().ok_or(ResolutionError::NoImageSelected)?;
        let strategy = self.strategy;

        debug!(%handle, ?strategy, "resolving image");

        let decoded = tokio::task::spawn_blocking(move || {
            let bytes = content
                .open(&handle)
                .map_err(|e| ResolutionError::DecodeFailed(e.to_string()))?;
            strategy.decode(bytes)
        })
        .await
        .map_err(|e| ResolutionError::DecodeFailed(format!("decoder task failed: {}", e)))??;

        debug!(
            width = decoded.width(),
            height = decoded.height(),
            format = ?decoded.format,
            "image decoded"
        );
        Ok(decoded)
    }
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new(HostCapabilities::default())
    }
}
