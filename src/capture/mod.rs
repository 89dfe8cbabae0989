//! Media capture: camera streams and selected files, reduced to one JPEG frame
//!
//! # Example
//!
//! ```no_run
//! use umabase::capture::{CaptureConfig, CaptureMode, MediaCapture, MediaFile};
//!
//! let mut capture = MediaCapture::new(CaptureConfig::default());
//! capture.start_capture(CaptureMode::File(MediaFile::from_path("paddock.jpg").unwrap()))?;
//! let frame = capture.capture_frame()?;
//! println!("{}x{} frame, {} base64 bytes", frame.width, frame.height, frame.base64.len());
//! # Ok::<(), umabase::capture::CaptureError>(())
//! ```

mod camera;
mod preview;
mod source;

pub use camera::{CameraDevice, FfmpegCamera, LiveSource};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use source::{FrameSource, StaticImageSource, VideoFileSource};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Camera access denied: {0}")]
    PermissionDenied(String),

    #[error("Camera not available: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("No capture source is active")]
    NoActiveSource,

    #[error("Source has not produced a frame yet")]
    FrameNotReady,

    #[error("Failed to start ffmpeg: {0}")]
    FfmpegSpawn(#[source] std::io::Error),

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("Failed to decode or encode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera: FfmpegCamera,
    /// Offset into a video file used for captures, in seconds
    pub video_seek_secs: f64,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: FfmpegCamera::default(),
            video_seek_secs: 0.0,
            jpeg_quality: 92,
        }
    }
}

/// Local media file chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub mime: String,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>, mime: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime: mime.into(),
        }
    }

    /// Build from a path, inferring the MIME type from its extension
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let mime = media_type_for_path(&path)?;
        Some(Self::new(path, mime))
    }

    fn kind(&self) -> Option<FileKind> {
        if self.mime.starts_with("image/") {
            Some(FileKind::Image)
        } else if self.mime.starts_with("video/") {
            Some(FileKind::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Image,
    Video,
}

/// What to capture from
#[derive(Debug, Clone)]
pub enum CaptureMode {
    Camera,
    File(MediaFile),
}

/// Kind of the active source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    File,
}

/// Encoded still frame ready for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct FramePayload {
    /// Base64 JPEG bytes, no `data:` prefix
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl FramePayload {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    /// Encode an image as base64 JPEG at its native resolution
    pub fn encode(img: &DynamicImage, quality: u8) -> Result<Self, CaptureError> {
        let mut jpeg = Vec::new();
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)))?;

        Ok(Self {
            base64: STANDARD.encode(&jpeg),
            width: img.width(),
            height: img.height(),
        })
    }
}

struct ActiveSource {
    kind: SourceKind,
    frames: Box<dyn FrameSource>,
}

/// Media capture adapter: owns at most one active frame source
pub struct MediaCapture {
    config: CaptureConfig,
    camera: Box<dyn CameraDevice>,
    previews: PreviewRegistry,
    active: Option<ActiveSource>,
}

impl MediaCapture {
    /// Adapter using the configured ffmpeg camera
    pub fn new(config: CaptureConfig) -> Self {
        let camera = Box::new(config.camera.clone());
        Self::with_camera(config, camera)
    }

    /// Adapter with a custom camera device
    pub fn with_camera(config: CaptureConfig, camera: Box<dyn CameraDevice>) -> Self {
        Self {
            config,
            camera,
            previews: PreviewRegistry::new(),
            active: None,
        }
    }

    /// Switch to a camera stream or a selected file.
    ///
    /// On any error the previous source stays active.
    pub fn start_capture(&mut self, mode: CaptureMode) -> Result<SourceKind, CaptureError> {
        let next = match mode {
            CaptureMode::Camera => ActiveSource {
                kind: SourceKind::Camera,
                frames: self.camera.open()?,
            },
            CaptureMode::File(file) => {
                let kind = file
                    .kind()
                    .ok_or_else(|| CaptureError::UnsupportedMedia(file.mime.clone()))?;
                let preview = self.previews.register(&file.path);
                let frames: Box<dyn FrameSource> = match kind {
                    FileKind::Image => Box::new(StaticImageSource::new(preview)),
                    FileKind::Video => Box::new(VideoFileSource::new(
                        preview,
                        self.config.camera.ffmpeg.clone(),
                        self.config.video_seek_secs,
                    )),
                };
                ActiveSource {
                    kind: SourceKind::File,
                    frames,
                }
            }
        };

        info!("Capture source: {}", next.frames.describe());
        let kind = next.kind;
        // Replacing drops the previous source, releasing its preview or camera
        self.active = Some(next);
        Ok(kind)
    }

    pub fn active_kind(&self) -> Option<SourceKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn describe_source(&self) -> Option<String> {
        self.active.as_ref().map(|a| a.frames.describe())
    }

    /// Grab the current frame and encode it
    pub fn capture_frame(&mut self) -> Result<FramePayload, CaptureError> {
        let active = self.active.as_mut().ok_or(CaptureError::NoActiveSource)?;
        let img = active
            .frames
            .current_frame()?
            .ok_or(CaptureError::FrameNotReady)?;

        let payload = FramePayload::encode(&img, self.config.jpeg_quality)?;
        debug!(
            "Captured {}x{} frame ({} base64 bytes)",
            payload.width,
            payload.height,
            payload.base64.len()
        );
        Ok(payload)
    }

    /// Release the active source
    pub fn stop(&mut self) {
        self.active = None;
    }

    /// Preview references still held by this adapter
    pub fn live_previews(&self) -> usize {
        self.previews.live_count()
    }
}

/// MIME type for a media file, by extension
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct DeniedCamera;

    impl CameraDevice for DeniedCamera {
        fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
            Err(CaptureError::PermissionDenied("test".to_string()))
        }
    }

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(w, h, Rgb([10, 200, 30])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_media_type_for_path() {
        assert_eq!(media_type_for_path(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(media_type_for_path(Path::new("b.mov")), Some("video/quicktime"));
        assert_eq!(media_type_for_path(Path::new("c.pdf")), None);
        assert_eq!(media_type_for_path(Path::new("noext")), None);
    }

    #[test]
    fn test_capture_without_source() {
        let mut capture = MediaCapture::new(CaptureConfig::default());
        assert!(matches!(
            capture.capture_frame(),
            Err(CaptureError::NoActiveSource)
        ));
    }

    #[test]
    fn test_unsupported_file_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "horse.png", 8, 8);

        let mut capture = MediaCapture::new(CaptureConfig::default());
        capture
            .start_capture(CaptureMode::File(MediaFile::new(&image, "image/png")))
            .unwrap();
        let before = capture.describe_source();

        let result = capture.start_capture(CaptureMode::File(MediaFile::new(
            dir.path().join("notes.pdf"),
            "application/pdf",
        )));
        assert!(matches!(result, Err(CaptureError::UnsupportedMedia(_))));
        assert_eq!(capture.describe_source(), before);
        assert_eq!(capture.live_previews(), 1);
    }

    #[test]
    fn test_camera_denied_keeps_previous_source() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "horse.png", 8, 8);

        let mut capture =
            MediaCapture::with_camera(CaptureConfig::default(), Box::new(DeniedCamera));
        assert!(matches!(
            capture.start_capture(CaptureMode::Camera),
            Err(CaptureError::PermissionDenied(_))
        ));
        assert_eq!(capture.active_kind(), None);

        capture
            .start_capture(CaptureMode::File(MediaFile::new(&image, "image/png")))
            .unwrap();
        assert!(capture.start_capture(CaptureMode::Camera).is_err());
        assert_eq!(capture.active_kind(), Some(SourceKind::File));
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_ffmpeg_camera_keeps_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "horse.png", 8, 8);

        let config = CaptureConfig {
            camera: FfmpegCamera {
                device: "testsrc".to_string(),
                input_format: "lavfi".to_string(),
                ffmpeg: PathBuf::from("/bin/false"),
            },
            ..Default::default()
        };
        let mut capture = MediaCapture::new(config);
        capture
            .start_capture(CaptureMode::File(MediaFile::new(&image, "image/png")))
            .unwrap();

        assert!(matches!(
            capture.start_capture(CaptureMode::Camera),
            Err(CaptureError::Ffmpeg(_))
        ));
        assert_eq!(capture.active_kind(), Some(SourceKind::File));
        assert!(capture.capture_frame().is_ok());
    }

    #[test]
    fn test_capture_frame_from_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_png(dir.path(), "horse.png", 40, 30);

        let mut capture = MediaCapture::new(CaptureConfig::default());
        capture
            .start_capture(CaptureMode::File(MediaFile::from_path(&image).unwrap()))
            .unwrap();

        let frame = capture.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (40, 30));
        assert!(!frame.base64.starts_with("data:"));

        let jpeg = STANDARD.decode(&frame.base64).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_previews_released_on_replace_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 4, 4);
        let b = write_png(dir.path(), "b.png", 4, 4);

        let mut capture = MediaCapture::new(CaptureConfig::default());
        let registry = capture.previews.clone();

        capture
            .start_capture(CaptureMode::File(MediaFile::new(&a, "image/png")))
            .unwrap();
        capture
            .start_capture(CaptureMode::File(MediaFile::new(&b, "image/png")))
            .unwrap();
        assert_eq!(registry.live_count(), 1);

        drop(capture);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_encode_strips_alpha() {
        let img = DynamicImage::new_rgba8(5, 7);
        let payload = FramePayload::encode(&img, 92).unwrap();
        assert_eq!((payload.width, payload.height), (5, 7));
    }
}
