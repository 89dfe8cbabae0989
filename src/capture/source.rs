//! Frame sources: anything that can hand back the frame currently on screen

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use super::preview::PreviewHandle;
use super::CaptureError;

/// Produces the frame that would currently be displayed.
///
/// `Ok(None)` means the source exists but has not rendered a frame yet.
pub trait FrameSource: Send {
    fn current_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError>;

    fn describe(&self) -> String;
}

/// Still image selected from disk
pub struct StaticImageSource {
    preview: PreviewHandle,
    decoded: Option<DynamicImage>,
}

impl StaticImageSource {
    pub fn new(preview: PreviewHandle) -> Self {
        Self {
            preview,
            decoded: None,
        }
    }
}

impl FrameSource for StaticImageSource {
    fn current_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        if self.decoded.is_none() {
            let bytes = std::fs::read(self.preview.path())?;
            let img = image::load_from_memory(&bytes)?;
            debug!(
                "Decoded {:?}: {}x{}",
                self.preview.path(),
                img.width(),
                img.height()
            );
            self.decoded = Some(img);
        }
        Ok(self.decoded.clone())
    }

    fn describe(&self) -> String {
        format!("image {}", self.preview.path().display())
    }
}

/// Video file; each capture grabs the frame at the seek offset
pub struct VideoFileSource {
    preview: PreviewHandle,
    ffmpeg: PathBuf,
    seek_secs: f64,
}

impl VideoFileSource {
    /// Negative offsets are treated as the start of the video
    pub fn new(preview: PreviewHandle, ffmpeg: PathBuf, seek_secs: f64) -> Self {
        Self {
            preview,
            ffmpeg,
            seek_secs: seek_secs.max(0.0),
        }
    }
}

impl FrameSource for VideoFileSource {
    fn current_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        let jpeg = extract_video_frame(&self.ffmpeg, self.preview.path(), self.seek_secs)?;
        if jpeg.is_empty() {
            return Ok(None);
        }
        Ok(Some(image::load_from_memory(&jpeg)?))
    }

    fn describe(&self) -> String {
        format!(
            "video {} @ {:.1}s",
            self.preview.path().display(),
            self.seek_secs
        )
    }
}

/// Run ffmpeg once and return a single MJPEG frame (empty if none was decoded)
fn extract_video_frame(ffmpeg: &Path, path: &Path, seek_secs: f64) -> Result<Vec<u8>, CaptureError> {
    let seek = format!("{:.3}", seek_secs);
    let output = Command::new(ffmpeg)
        .args(["-loglevel", "error", "-ss", seek.as_str(), "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .map_err(CaptureError::FfmpegSpawn)?;

    if !output.status.success() {
        return Err(CaptureError::Ffmpeg(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::preview::PreviewRegistry;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_static_image_native_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paddock.png");
        RgbImage::from_pixel(64, 48, Rgb([120, 80, 40]))
            .save(&path)
            .unwrap();

        let registry = PreviewRegistry::new();
        let mut source = StaticImageSource::new(registry.register(&path));
        let frame = source.current_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }

    #[test]
    fn test_static_image_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let registry = PreviewRegistry::new();
        let mut source = StaticImageSource::new(registry.register(&path));
        assert!(matches!(source.current_frame(), Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_video_source_missing_ffmpeg() {
        let registry = PreviewRegistry::new();
        let mut source = VideoFileSource::new(
            registry.register(Path::new("/tmp/clip.mp4")),
            PathBuf::from("/nonexistent/ffmpeg"),
            0.0,
        );
        assert!(matches!(
            source.current_frame(),
            Err(CaptureError::FfmpegSpawn(_))
        ));
    }

    #[test]
    fn test_video_seek_clamps_negative() {
        let registry = PreviewRegistry::new();
        let source = VideoFileSource::new(
            registry.register(Path::new("/tmp/clip.mp4")),
            PathBuf::from("ffmpeg"),
            -3.0,
        );
        assert!(source.describe().ends_with("@ 0.0s"));
    }
}
