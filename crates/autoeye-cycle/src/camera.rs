//! Camera collaborator and frame source
//!
//! [`Camera`] is the boundary to whatever produces encoded frames (a sensor
//! driver, a directory of stills, a test fixture). [`FrameSource`] wraps an
//! initialized camera and turns its output into ledger-counted
//! [`CaptureFrame`]s.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use autoeye::tracing::prefix;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use thiserror::Error;
use tracing::{debug, info};

use crate::buffer::{BufferLedger, CaptureFrame, PixelBuffer};
use crate::error::{CycleError, Result};
use crate::types::{FrameFormat, Resolution};

/// Failures reported by a camera collaborator
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no frame available")]
    NoFrame,

    #[error("device error: {0}")]
    Device(String),

    #[error("cannot decode frame: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera collaborator
pub trait Camera: Send {
    /// Bring the device up. Called once before any capture.
    fn init(&mut self) -> std::result::Result<(), CameraError>;

    /// Grab the latest frame in the camera's encoded format.
    fn capture_encoded(&mut self) -> std::result::Result<Vec<u8>, CameraError>;

    /// Format of the bytes returned by [`Camera::capture_encoded`]
    fn format(&self) -> FrameFormat {
        FrameFormat::Jpeg
    }

    /// Decode `bytes` into `dest`, a packed RGB888 buffer at `resolution`.
    fn decode_to_pixels(
        &mut self,
        bytes: &[u8],
        format: FrameFormat,
        resolution: Resolution,
        dest: &mut [u8],
    ) -> std::result::Result<(), CameraError> {
        decode_into(bytes, format, resolution, dest)
    }
}

/// Decode an encoded frame into a packed RGB888 destination.
///
/// The decoded image must match `resolution` exactly. On error the contents
/// of `dest` are unspecified and must be discarded.
pub fn decode_into(
    bytes: &[u8],
    format: FrameFormat,
    resolution: Resolution,
    dest: &mut [u8],
) -> std::result::Result<(), CameraError> {
    if dest.len() != resolution.rgb_bytes() {
        return Err(CameraError::Decode(format!(
            "destination holds {} bytes, {} needs {}",
            dest.len(),
            resolution,
            resolution.rgb_bytes()
        )));
    }

    match format {
        FrameFormat::Rgb888 => {
            if bytes.len() != dest.len() {
                return Err(CameraError::Decode(format!(
                    "raw frame is {} bytes, expected {}",
                    bytes.len(),
                    dest.len()
                )));
            }
            dest.copy_from_slice(bytes);
        }
        FrameFormat::Jpeg => decode_jpeg_into(bytes, resolution, dest)?,
    }
    Ok(())
}

/// Decode straight into `dest` without an intermediate image.
///
/// Grayscale frames are decoded into the front of `dest` and widened to RGB
/// from the back.
fn decode_jpeg_into(
    bytes: &[u8],
    resolution: Resolution,
    dest: &mut [u8],
) -> std::result::Result<(), CameraError> {
    let decoder =
        JpegDecoder::new(Cursor::new(bytes)).map_err(|e| CameraError::Decode(e.to_string()))?;
    let (width, height) = decoder.dimensions();
    if (width, height) != (resolution.width, resolution.height) {
        return Err(CameraError::Decode(format!(
            "frame is {}x{}, sensor resolution is {}",
            width, height, resolution
        )));
    }

    let pixels = resolution.pixels();
    let gray = match decoder.color_type() {
        ColorType::Rgb8 => false,
        ColorType::L8 => true,
        other => {
            return Err(CameraError::Decode(format!(
                "unsupported JPEG color type {:?}",
                other
            )))
        }
    };
    let target = if gray { &mut dest[..pixels] } else { &mut dest[..] };
    if decoder.total_bytes() != target.len() as u64 {
        return Err(CameraError::Decode(format!(
            "decoder wants {} bytes, frame buffer has {}",
            decoder.total_bytes(),
            target.len()
        )));
    }
    decoder
        .read_image(target)
        .map_err(|e| CameraError::Decode(e.to_string()))?;

    if gray {
        for i in (0..pixels).rev() {
            let v = dest[i];
            dest[i * 3..i * 3 + 3].fill(v);
        }
    }
    Ok(())
}

/// Initialized camera producing counted capture frames
pub struct FrameSource {
    camera: Box<dyn Camera>,
    resolution: Resolution,
    captured: u64,
}

impl FrameSource {
    /// Initialize `camera` and discard `warmup_frames` captures.
    ///
    /// This is the only fatal failure point of the node; it is not retried.
    pub fn init(
        mut camera: Box<dyn Camera>,
        resolution: Resolution,
        warmup_frames: u32,
    ) -> Result<Self> {
        camera
            .init()
            .map_err(|e| CycleError::CameraInit(e.to_string()))?;

        for i in 0..warmup_frames {
            camera.capture_encoded().map_err(|e| {
                CycleError::CameraInit(format!("warm-up capture {} failed: {}", i + 1, e))
            })?;
        }

        info!(
            "{} Camera ready at {} ({} warm-up frames)",
            prefix::PULSE_OPEN,
            resolution,
            warmup_frames
        );

        Ok(Self {
            camera,
            resolution,
            captured: 0,
        })
    }

    /// Sensor resolution frames decode to
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Frames captured since init, warm-up excluded
    pub fn captured(&self) -> u64 {
        self.captured
    }

    /// Capture one frame into a ledger-counted buffer.
    pub fn capture(&mut self, ledger: &BufferLedger) -> Result<CaptureFrame> {
        let bytes = self
            .camera
            .capture_encoded()
            .map_err(|e| CycleError::Capture(e.to_string()))?;
        if bytes.is_empty() {
            return Err(CycleError::Capture("camera returned an empty frame".into()));
        }
        let frame = CaptureFrame::copy_from(ledger, &bytes, self.camera.format())?;
        self.captured += 1;
        debug!("Captured frame #{} ({} bytes)", self.captured, frame.len());
        Ok(frame)
    }

    /// Decode `frame` into `dest` via the camera collaborator.
    pub fn decode(&mut self, frame: &CaptureFrame, dest: &mut PixelBuffer) -> Result<()> {
        let resolution = dest.resolution();
        self.camera
            .decode_to_pixels(frame.bytes(), frame.format(), resolution, dest.as_bytes_mut())
            .map_err(|e| CycleError::Decode(e.to_string()))
    }
}

/// Consumer of capture frames after decode (e.g. a preview stream server)
pub trait FrameSink: Send {
    /// Take ownership of `frame`; it is released whenever the sink drops it.
    fn accept(&mut self, frame: CaptureFrame);
}

/// Frame sink feeding a bounded channel; frames are dropped when it is full
pub struct ChannelFrameSink {
    tx: Sender<CaptureFrame>,
}

impl ChannelFrameSink {
    /// Create a sink and the receiving end with room for `capacity` frames.
    pub fn bounded(capacity: usize) -> (Self, Receiver<CaptureFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelFrameSink {
    fn accept(&mut self, frame: CaptureFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Frame sink full, dropping frame"),
            Err(TrySendError::Disconnected(_)) => debug!("Frame sink disconnected, dropping frame"),
        }
    }
}

/// Camera replaying JPEG stills from a directory in name order, looping
pub struct DirectoryCamera {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            frames: Vec::new(),
            next: 0,
        }
    }
}

impl Camera for DirectoryCamera {
    fn init(&mut self) -> std::result::Result<(), CameraError> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(CameraError::Device(format!(
                "no JPEG frames in {}",
                self.dir.display()
            )));
        }
        info!("Replaying {} frames from {}", frames.len(), self.dir.display());
        self.frames = frames;
        self.next = 0;
        Ok(())
    }

    fn capture_encoded(&mut self) -> std::result::Result<Vec<u8>, CameraError> {
        let path = self.frames.get(self.next).ok_or(CameraError::NoFrame)?;
        let bytes = std::fs::read(path)?;
        self.next = (self.next + 1) % self.frames.len();
        Ok(bytes)
    }
}

/// Camera cycling through in-memory encoded frames
pub struct MemoryCamera {
    frames: Vec<Vec<u8>>,
    format: FrameFormat,
    next: usize,
}

impl MemoryCamera {
    pub fn new(frames: Vec<Vec<u8>>, format: FrameFormat) -> Self {
        Self {
            frames,
            format,
            next: 0,
        }
    }
}

impl Camera for MemoryCamera {
    fn init(&mut self) -> std::result::Result<(), CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::Device("no frames loaded".to_string()));
        }
        Ok(())
    }

    fn capture_encoded(&mut self) -> std::result::Result<Vec<u8>, CameraError> {
        let frame = self.frames.get(self.next).ok_or(CameraError::NoFrame)?.clone();
        self.next = (self.next + 1) % self.frames.len();
        Ok(frame)
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn decode_jpeg_matching_resolution() {
        let res = Resolution::new(24, 16);
        let mut dest = vec![0u8; res.rgb_bytes()];
        decode_into(&jpeg(24, 16), FrameFormat::Jpeg, res, &mut dest).unwrap();
        // JPEG is lossy; red should still dominate
        assert!(dest[0] > 150 && dest[1] < 100);
    }

    #[test]
    fn decode_rejects_wrong_size_and_garbage() {
        let res = Resolution::new(24, 16);
        let mut dest = vec![0u8; res.rgb_bytes()];
        assert!(decode_into(&jpeg(32, 16), FrameFormat::Jpeg, res, &mut dest).is_err());
        assert!(decode_into(b"not a jpeg", FrameFormat::Jpeg, res, &mut dest).is_err());
        assert!(dest.iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_grayscale_jpeg_widens_to_rgb() {
        let res = Resolution::new(16, 8);
        let luma = vec![90u8; res.pixels()];
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, 95)
            .encode(&luma, res.width, res.height, ExtendedColorType::L8)
            .unwrap();

        let mut dest = vec![0u8; res.rgb_bytes()];
        decode_into(&encoded, FrameFormat::Jpeg, res, &mut dest).unwrap();
        for px in dest.chunks(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert!(px[0].abs_diff(90) <= 3);
        }
    }

    #[test]
    fn init_runs_warmup() {
        let camera = MemoryCamera::new(vec![jpeg(8, 8)], FrameFormat::Jpeg);
        let mut source = FrameSource::init(Box::new(camera), Resolution::new(8, 8), 7).unwrap();
        assert_eq!(source.captured(), 0);

        let ledger = BufferLedger::new();
        let frame = source.capture(&ledger).unwrap();
        assert_eq!(frame.format(), FrameFormat::Jpeg);
        assert_eq!(source.captured(), 1);
    }

    #[test]
    fn init_fails_without_frames() {
        let camera = MemoryCamera::new(Vec::new(), FrameFormat::Jpeg);
        let err = FrameSource::init(Box::new(camera), Resolution::new(8, 8), 0)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "camera_init");
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let ledger = BufferLedger::new();
        let (mut sink, rx) = ChannelFrameSink::bounded(1);
        sink.accept(CaptureFrame::copy_from(&ledger, b"a", FrameFormat::Jpeg).unwrap());
        sink.accept(CaptureFrame::copy_from(&ledger, b"b", FrameFormat::Jpeg).unwrap());

        // Second frame was released immediately
        assert_eq!(ledger.outstanding(), 1);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.bytes(), b"a");
        drop(frame);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn directory_camera_loops_sorted_frames() {
        let dir = std::env::temp_dir().join(format!("autoeye-dircam-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.join("a.jpg"), b"first").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let mut camera = DirectoryCamera::new(&dir);
        camera.init().unwrap();
        assert_eq!(camera.capture_encoded().unwrap(), b"first");
        assert_eq!(camera.capture_encoded().unwrap(), b"second");
        assert_eq!(camera.capture_encoded().unwrap(), b"first");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
