//! Live camera capture through an ffmpeg child process
//!
//! ffmpeg reads the capture device and writes an MJPEG stream to stdout. A
//! reader thread splits the stream into JPEG frames and keeps only the
//! latest one, which is what a capture grabs.

use image::DynamicImage;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::source::FrameSource;
use super::CaptureError;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Buffered bytes allowed without a complete frame before the buffer is reset
const MAX_PENDING_BYTES: usize = 8 * 1024 * 1024;
/// ffmpeg stderr kept for error messages
const MAX_STDERR_BYTES: usize = 4096;
/// How long `open` watches a fresh ffmpeg process for an early exit
const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STARTUP_POLL: Duration = Duration::from_millis(25);

/// Something that can be opened as a live frame stream
pub trait CameraDevice: Send {
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Camera configuration for the ffmpeg-backed device
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    /// Device path or name passed to `-i`
    pub device: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`)
    pub input_format: String,
    pub ffmpeg: PathBuf,
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegCamera {
    /// Device files must be readable before ffmpeg is spawned, so a
    /// permission problem is reported as such instead of as an ffmpeg exit.
    fn check_access(&self) -> Result<(), CaptureError> {
        if self.input_format != "v4l2" {
            return Ok(());
        }
        match std::fs::File::open(&self.device) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CaptureError::PermissionDenied(self.device.clone()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CaptureError::DeviceUnavailable(self.device.clone()))
            }
            Err(e) => Err(CaptureError::Io(e)),
        }
    }
}

impl CameraDevice for FfmpegCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        self.check_access()?;

        info!("Opening camera {} ({})", self.device, self.input_format);

        let mut child = Command::new(&self.ffmpeg)
            .args(["-loglevel", "error", "-f", self.input_format.as_str(), "-i"])
            .arg(&self.device)
            .args(["-f", "image2pipe", "-vcodec", "mjpeg", "-q:v", "2", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CaptureError::FfmpegSpawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Ffmpeg("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let state = Arc::new(Mutex::new(StreamState::default()));
        let slot = Arc::clone(&state);
        let reader = thread::spawn(move || read_mjpeg_stream(stdout, slot));
        let stderr_reader = stderr.map(|stderr| {
            let slot = Arc::clone(&state);
            thread::spawn(move || collect_stderr(stderr, slot))
        });

        let mut source = LiveSource {
            device: self.device.clone(),
            child: Some(child),
            reader: Some(reader),
            stderr_reader,
            state,
        };
        // On error the source is dropped here, which kills ffmpeg
        source.await_startup()?;
        Ok(Box::new(source))
    }
}

/// Shared between a `LiveSource` and its reader threads
#[derive(Debug, Default)]
struct StreamState {
    latest: Option<Vec<u8>>,
    ended: bool,
    stderr: String,
}

fn lock_state(state: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Running camera stream
pub struct LiveSource {
    device: String,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stderr_reader: Option<JoinHandle<()>>,
    state: Arc<Mutex<StreamState>>,
}

impl LiveSource {
    /// Stop the ffmpeg process and wait for the readers to finish
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("Stopping camera {}", self.device);
            let _ = child.kill();
            let _ = child.wait();
        }
        for handle in [self.reader.take(), self.stderr_reader.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }

    /// Fail if ffmpeg exits before the grace period is over
    fn await_startup(&mut self) -> Result<(), CaptureError> {
        let deadline = Instant::now() + STARTUP_GRACE;
        loop {
            if lock_state(&self.state).latest.is_some() {
                return Ok(());
            }
            if let Some(status) = self.exit_status() {
                return Err(self.stream_error(Some(status)));
            }
            if Instant::now() >= deadline {
                debug!("Camera {} running, no frame yet", self.device);
                return Ok(());
            }
            thread::sleep(STARTUP_POLL);
        }
    }

    fn exit_status(&mut self) -> Option<ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Error describing a stream that is no longer delivering frames
    fn stream_error(&mut self, status: Option<ExitStatus>) -> CaptureError {
        if status.is_some() {
            // stderr reaches EOF once the process is gone
            if let Some(handle) = self.stderr_reader.take() {
                let _ = handle.join();
            }
        }
        let stderr = lock_state(&self.state).stderr.trim().to_string();
        let exit = match status {
            Some(status) => format!("ffmpeg exited ({})", status),
            None => "stream ended".to_string(),
        };
        let msg = if stderr.is_empty() {
            format!("camera {}: {}", self.device, exit)
        } else {
            format!("camera {}: {}: {}", self.device, exit, stderr)
        };
        warn!("{}", msg);
        CaptureError::Ffmpeg(msg)
    }
}

impl FrameSource for LiveSource {
    fn current_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
        let (jpeg, ended) = {
            let state = lock_state(&self.state);
            (state.latest.clone(), state.ended)
        };
        if ended {
            let status = self.exit_status();
            return Err(self.stream_error(status));
        }
        match jpeg {
            Some(bytes) => Ok(Some(image::load_from_memory(&bytes)?)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        format!("camera {}", self.device)
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_mjpeg_stream<R: Read>(mut reader: R, state: Arc<Mutex<StreamState>>) {
    let mut pending = Vec::with_capacity(256 * 1024);
    let mut buf = vec![0u8; 64 * 1024];
    let mut frames = 0u64;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                info!("Camera stream ended after {} frames", frames);
                break;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                if let Some(frame) = take_latest_jpeg(&mut pending) {
                    frames += 1;
                    if frames % 100 == 0 {
                        debug!("Camera: {} frames", frames);
                    }
                    lock_state(&state).latest = Some(frame);
                }
                if pending.len() > MAX_PENDING_BYTES {
                    warn!("Discarding {} bytes with no complete frame", pending.len());
                    pending.clear();
                }
            }
            Err(e) => {
                error!("Error reading camera stream: {}", e);
                break;
            }
        }
    }

    lock_state(&state).ended = true;
}

fn collect_stderr<R: Read>(stderr: R, state: Arc<Mutex<StreamState>>) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else { break };
        let mut state = lock_state(&state);
        if state.stderr.len() + line.len() < MAX_STDERR_BYTES {
            state.stderr.push_str(&line);
            state.stderr.push('\n');
        }
    }
}

/// Remove every complete JPEG from the front of `buf` and return the last one.
///
/// Bytes before the first SOI marker are discarded; an incomplete trailing
/// frame is left in `buf` for the next read.
pub(crate) fn take_latest_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let mut latest = None;

    loop {
        let start = match find_marker(buf, JPEG_SOI, 0) {
            Some(i) => i,
            None => {
                // Keep a trailing 0xFF in case it begins the next SOI
                let keep = usize::from(buf.last() == Some(&0xFF));
                buf.drain(..buf.len() - keep);
                break;
            }
        };
        if start > 0 {
            buf.drain(..start);
        }

        match find_marker(buf, JPEG_EOI, 2) {
            Some(end) => {
                let frame: Vec<u8> = buf.drain(..end + 2).collect();
                latest = Some(frame);
            }
            None => break,
        }
    }

    latest
}

fn find_marker(buf: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if buf.len() < from + 2 {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(tag: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, tag, tag, 0x00, 0xFF, 0xD9]
    }

    #[test]
    fn test_take_latest_single_frame() {
        let mut buf = fake_jpeg(1);
        assert_eq!(take_latest_jpeg(&mut buf), Some(fake_jpeg(1)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_latest_keeps_last_complete_frame() {
        let mut buf = Vec::new();
        buf.extend(fake_jpeg(1));
        buf.extend(fake_jpeg(2));
        buf.extend(&[0xFF, 0xD8, 3]); // partial third frame

        assert_eq!(take_latest_jpeg(&mut buf), Some(fake_jpeg(2)));
        assert_eq!(buf, vec![0xFF, 0xD8, 3]);
    }

    #[test]
    fn test_take_latest_partial_frame_completed_later() {
        let frame = fake_jpeg(7);
        let mut buf = frame[..4].to_vec();
        assert_eq!(take_latest_jpeg(&mut buf), None);

        buf.extend_from_slice(&frame[4..]);
        assert_eq!(take_latest_jpeg(&mut buf), Some(frame));
    }

    #[test]
    fn test_take_latest_discards_garbage() {
        let mut buf = vec![0x00, 0x11, 0x22];
        buf.extend(fake_jpeg(5));
        assert_eq!(take_latest_jpeg(&mut buf), Some(fake_jpeg(5)));

        let mut noise = vec![0x01, 0x02, 0xFF];
        assert_eq!(take_latest_jpeg(&mut noise), None);
        assert_eq!(noise, vec![0xFF]);
    }

    fn idle_source(state: StreamState) -> LiveSource {
        LiveSource {
            device: "test".to_string(),
            child: None,
            reader: None,
            stderr_reader: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    #[test]
    fn test_live_source_without_frame_is_not_ready() {
        let mut source = idle_source(StreamState::default());
        assert!(source.current_frame().unwrap().is_none());
    }

    #[test]
    fn test_ended_stream_is_an_error_even_with_stale_frame() {
        let mut source = idle_source(StreamState {
            latest: Some(fake_jpeg(1)),
            ended: true,
            stderr: "Device or resource busy\n".to_string(),
        });
        match source.current_frame() {
            Err(CaptureError::Ffmpeg(msg)) => assert!(msg.contains("resource busy")),
            other => panic!("expected ffmpeg error, got {:?}", other.map(|f| f.is_some())),
        }
    }

    #[test]
    fn test_reader_marks_stream_ended() {
        let mut stream = Vec::new();
        stream.extend(fake_jpeg(1));
        stream.extend(fake_jpeg(2));

        let state = Arc::new(Mutex::new(StreamState::default()));
        read_mjpeg_stream(std::io::Cursor::new(stream), Arc::clone(&state));

        let state = lock_state(&state);
        assert!(state.ended);
        assert_eq!(state.latest, Some(fake_jpeg(2)));
    }

    #[test]
    fn test_reader_resets_unterminated_frame() {
        let mut stream = JPEG_SOI.to_vec();
        stream.resize(MAX_PENDING_BYTES + 256 * 1024, 0x00);
        stream.extend(fake_jpeg(9));

        let state = Arc::new(Mutex::new(StreamState::default()));
        read_mjpeg_stream(std::io::Cursor::new(stream), Arc::clone(&state));

        assert_eq!(lock_state(&state).latest, Some(fake_jpeg(9)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_ffmpeg_fails_open() {
        let camera = FfmpegCamera {
            device: "testsrc".to_string(),
            input_format: "lavfi".to_string(),
            ffmpeg: PathBuf::from("/bin/false"),
        };
        assert!(matches!(camera.open(), Err(CaptureError::Ffmpeg(_))));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let camera = FfmpegCamera {
            device: "/nonexistent/video9".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            camera.open(),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }
}
